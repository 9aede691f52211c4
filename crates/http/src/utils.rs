/// Returns early with `$error` unless `$predicate` holds.
///
/// ```ignore
/// ensure!(method_end > 0, ParseError::InvalidMethod);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

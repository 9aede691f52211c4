//! Line splitting over a partially filled read buffer.
//!
//! Lines end at `\n`; a `\r` right before it is dropped, and a bare `\n` is accepted for
//! lenient clients. Bytes after the line stay in the buffer untouched, so whatever comes
//! next (more header lines, a body, the next request) sees a continuous stream.

use bytes::{Buf, BytesMut};

/// Finds lines in a buffer that may still be growing.
///
/// Remembers how far the previous call already scanned, so a slow client trickling bytes
/// in does not make every call rescan the whole pending line.
#[derive(Debug, Default, Clone)]
pub(crate) struct LineReader {
    scanned: usize,
}

/// The pending line is longer than allowed. Carries the length seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineTooLong(pub usize);

impl LineReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Splits the next complete line off `src`, without its terminator.
    ///
    /// `max_len` bounds the line including its terminator. Returns `Ok(None)` when no full
    /// line is buffered yet and the partial one still fits.
    pub(crate) fn take_line(&mut self, src: &mut BytesMut, max_len: usize) -> Result<Option<BytesMut>, LineTooLong> {
        let start = self.scanned.min(src.len());
        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = start + offset;
                self.scanned = 0;
                if end + 1 > max_len {
                    return Err(LineTooLong(end + 1));
                }

                let mut line = src.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                Ok(Some(line))
            }
            None => {
                self.scanned = src.len();
                if src.len() >= max_len {
                    return Err(LineTooLong(src.len()));
                }
                Ok(None)
            }
        }
    }

    /// Consumes a bare line terminator, as found after chunk data.
    ///
    /// Returns `Ok(false)` while the terminator is not fully buffered and `Err(())` when
    /// something else is there.
    pub(crate) fn take_terminator(src: &mut BytesMut) -> Result<bool, ()> {
        match src.first() {
            None => Ok(false),
            Some(b'\n') => {
                src.advance(1);
                Ok(true)
            }
            Some(b'\r') => match src.get(1) {
                None => Ok(false),
                Some(b'\n') => {
                    src.advance(2);
                    Ok(true)
                }
                Some(_) => Err(()),
            },
            Some(_) => Err(()),
        }
    }
}

//! Case-insensitive, multi-valued request header storage.
//!
//! Header bytes on the wire are not guaranteed to be valid UTF-8, so values are kept as raw
//! [`HeaderValue`]s and only decoded to strings on access, using the [`HeaderCharset`] the
//! parser was configured with.
//!
//! Two derived views are computed lazily and cached per header name:
//!
//! - comma-delimited tokens, e.g. `Connection: keep-alive, Upgrade`
//! - `;key=value` directives, e.g. `Content-Type: text/plain; charset=utf-8`

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use http::header::{AsHeaderName, HeaderName};
use http::{HeaderMap, HeaderValue};

/// Environment variable consulted by [`HeaderCharset::from_env`].
pub const HEADER_CHARSET_ENV: &str = "HATCH_HEADER_CHARSET";

/// Charset used to turn raw header bytes into strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderCharset {
    /// Every byte maps to the code point of the same value.
    #[default]
    Latin1,
    /// Invalid sequences are replaced with `U+FFFD`.
    Utf8,
}

impl HeaderCharset {
    /// Reads [`HEADER_CHARSET_ENV`], if set to a known charset name.
    pub fn from_env() -> Option<Self> {
        std::env::var(HEADER_CHARSET_ENV).ok().and_then(|value| value.parse().ok())
    }

    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            HeaderCharset::Utf8 => String::from_utf8_lossy(bytes),
            HeaderCharset::Latin1 => {
                if bytes.is_ascii() {
                    // ascii is a subset of both charsets
                    Cow::Borrowed(std::str::from_utf8(bytes).unwrap_or_default())
                } else {
                    Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
                }
            }
        }
    }
}

impl FromStr for HeaderCharset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "us-ascii" => Ok(HeaderCharset::Latin1),
            "utf-8" | "utf8" => Ok(HeaderCharset::Utf8),
            other => Err(format!("unsupported header charset: {other}")),
        }
    }
}

/// A header value split into its primary part and its `;key=value` directives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directives {
    value: String,
    params: Vec<(String, String)>,
}

impl Directives {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let value = parts.next().unwrap_or_default().trim().to_string();
        let params = parts
            .filter_map(|part| {
                let (key, value) = part.split_once('=')?;
                let value = value.trim().trim_matches('"');
                Some((key.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        Self { value, params }
    }

    /// The part before the first `;`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Looks up a directive by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.as_str())
    }
}

/// Maps header names (compared case-insensitively) to their ordered list of raw values.
///
/// Immutable once built by the request parser.
pub struct HeaderMultiMap {
    map: HeaderMap,
    charset: HeaderCharset,
    tokens: Mutex<HashMap<HeaderName, Arc<[String]>>>,
    directives: Mutex<HashMap<HeaderName, Arc<Directives>>>,
}

impl HeaderMultiMap {
    pub fn new(map: HeaderMap, charset: HeaderCharset) -> Self {
        Self { map, charset, tokens: Mutex::default(), directives: Mutex::default() }
    }

    pub fn empty(charset: HeaderCharset) -> Self {
        Self::new(HeaderMap::new(), charset)
    }

    pub fn charset(&self) -> HeaderCharset {
        self.charset
    }

    /// The underlying map, for callers that want `http` crate types.
    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    /// Number of values, counting every value of a repeated header.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.map.contains_key(name)
    }

    /// The first raw value of `name`.
    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.map.get(name)
    }

    /// The first value of `name`, decoded with the configured charset.
    pub fn get_str<K: AsHeaderName>(&self, name: K) -> Option<Cow<'_, str>> {
        self.map.get(name).map(|value| self.charset.decode(value.as_bytes()))
    }

    /// Every value of `name` in arrival order, decoded with the configured charset.
    pub fn get_all<K: AsHeaderName>(&self, name: K) -> Vec<Cow<'_, str>> {
        self.map.get_all(name).iter().map(|value| self.charset.decode(value.as_bytes())).collect()
    }

    /// Comma-delimited tokens across every value of `name`, trimmed and without empties.
    pub fn tokens(&self, name: &HeaderName) -> Arc<[String]> {
        let mut cache = self.tokens.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tokens) = cache.get(name) {
            return Arc::clone(tokens);
        }

        let tokens: Arc<[String]> = self
            .get_all(name)
            .iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        cache.insert(name.clone(), Arc::clone(&tokens));
        tokens
    }

    /// Whether `name` carries `token`, compared case-insensitively.
    pub fn has_token(&self, name: &HeaderName, token: &str) -> bool {
        self.tokens(name).iter().any(|t| t.eq_ignore_ascii_case(token))
    }

    /// The first value of `name` split into its primary value and directives.
    pub fn directives(&self, name: &HeaderName) -> Option<Arc<Directives>> {
        let mut cache = self.directives.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(directives) = cache.get(name) {
            return Some(Arc::clone(directives));
        }

        let directives = Arc::new(Directives::parse(&self.get_str(name)?));
        cache.insert(name.clone(), Arc::clone(&directives));
        Some(directives)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, Cow<'_, str>)> {
        self.map.iter().map(|(name, value)| (name, self.charset.decode(value.as_bytes())))
    }
}

impl fmt::Debug for HeaderMultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderMultiMap").field("map", &self.map).field("charset", &self.charset).finish()
    }
}

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::connection::{ConnectionInfo, RequestInfo};
use crate::protocol::body::{ReqBody, ReqBodySender};
use crate::protocol::{HeaderCharset, ParseError};

/// What an [`HttpHandler`](crate::handler::HttpHandler) sees of one request.
///
/// The body is read from the socket on demand, either as a stream through
/// [`HttpSession::body_mut`] or all at once through [`HttpSession::bytes`] and friends; the
/// latter are cached, so `text()` after `bytes()` does not read again.
#[derive(Debug)]
pub struct HttpSession {
    info: Arc<RequestInfo>,
    body: ReqBody,
    cached: Option<Bytes>,
    pub(crate) body_sender: Option<ReqBodySender>,
}

impl HttpSession {
    pub(crate) fn new(info: Arc<RequestInfo>, body: ReqBody, body_sender: ReqBodySender) -> Self {
        Self { info, body, cached: None, body_sender: Some(body_sender) }
    }

    /// The body as a [`http_body::Body`] stream.
    pub fn body_mut(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    /// Reads the whole body.
    pub async fn bytes(&mut self) -> Result<Bytes, ParseError> {
        if let Some(bytes) = &self.cached {
            return Ok(bytes.clone());
        }
        let bytes = (&mut self.body).collect().await?.to_bytes();
        self.cached = Some(bytes.clone());
        Ok(bytes)
    }

    /// Reads the whole body as text, in the charset named by `Content-Type` (UTF-8 if none).
    pub async fn text(&mut self) -> Result<String, ParseError> {
        let charset = match self.headers().directives(&CONTENT_TYPE).and_then(|d| d.get("charset").map(str::to_string)) {
            Some(charset) => charset.parse::<HeaderCharset>().map_err(ParseError::invalid_body)?,
            None => HeaderCharset::Utf8,
        };

        let bytes = self.bytes().await?;
        match charset {
            HeaderCharset::Utf8 => String::from_utf8(bytes.to_vec()).map_err(ParseError::invalid_body),
            HeaderCharset::Latin1 => Ok(charset.decode(&bytes).into_owned()),
        }
    }

    /// Deserializes the body, which must be declared as `application/json`.
    pub async fn json<T>(&mut self) -> Result<T, ParseError>
    where
        T: DeserializeOwned,
    {
        let is_json = self
            .headers()
            .directives(&CONTENT_TYPE)
            .is_some_and(|content_type| content_type.value().eq_ignore_ascii_case(mime::APPLICATION_JSON.essence_str()));
        if !is_json {
            return Err(ParseError::invalid_body("content type is not application/json"));
        }

        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ParseError::invalid_body)
    }
}

impl ConnectionInfo for HttpSession {
    fn request_info(&self) -> &RequestInfo {
        &self.info
    }
}

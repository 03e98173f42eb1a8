//! Request extractors and path parsing
//!
//! Route parameters arrive as raw strings. The helpers here turn them into
//! validated identifiers and dimensions, or reject them so the handler can
//! redirect home.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use std::fmt;
use std::net::SocketAddr;

use crate::pipeline::OutputFormat;

const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting identity of the caller: the peer IP address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn from_parts(parts: &Parts) -> Self {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Self(ip)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(client) = parts.extensions.get::<ClientId>() {
            return Ok(client.clone());
        }
        Ok(Self::from_parts(parts))
    }
}

/// An identifier path segment with its optional extension removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub id: String,
    pub format: Option<OutputFormat>,
}

/// Split `raw` into identifier and output format.
///
/// Accepts `{id}` or `{id}.{ext}` where the id is exactly `id_length`
/// ASCII alphanumerics and ext is one of png, jpg, jpeg or gif. Anything
/// else, including a second dot, is rejected.
pub fn classify_identifier(raw: &str, id_length: usize) -> Option<Identifier> {
    let (id, format) = match raw.split_once('.') {
        Some((id, ext)) => (id, Some(OutputFormat::from_extension(ext)?)),
        None => (raw, None),
    };

    let valid = id.len() == id_length && id.bytes().all(|b| b.is_ascii_alphanumeric());
    valid.then(|| Identifier {
        id: id.to_string(),
        format,
    })
}

/// Parse a width or height segment: plain decimal digits only
pub fn parse_dimension(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use rstest::rstest;

    #[rstest]
    #[case("abc123", Some(("abc123", None)))]
    #[case("abc123.png", Some(("abc123", Some(OutputFormat::Png))))]
    #[case("AbC123.jpg", Some(("AbC123", Some(OutputFormat::Jpeg))))]
    #[case("abc123.jpeg", Some(("abc123", Some(OutputFormat::Jpeg))))]
    #[case("abc123.gif", Some(("abc123", Some(OutputFormat::Gif))))]
    #[case("abc123.bmp", None)]
    #[case("abc123.png.png", None)]
    #[case("abc123.", None)]
    #[case("abc12", None)]
    #[case("abc1234", None)]
    #[case("abc-12", None)]
    #[case("../etc", None)]
    #[case("", None)]
    fn test_classify_identifier(
        #[case] raw: &str,
        #[case] expected: Option<(&str, Option<OutputFormat>)>,
    ) {
        let expected = expected.map(|(id, format)| Identifier {
            id: id.to_string(),
            format,
        });
        assert_eq!(classify_identifier(raw, 6), expected);
    }

    #[rstest]
    #[case("120", Some(120))]
    #[case("0", Some(0))]
    #[case("10000", Some(10_000))]
    #[case("-1", None)]
    #[case("+5", None)]
    #[case("12px", None)]
    #[case("", None)]
    #[case("99999999999", None)]
    fn test_parse_dimension(#[case] raw: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_dimension(raw), expected);
    }

    #[tokio::test]
    async fn test_client_id_from_connect_info() {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 40000))));
        let (mut parts, _) = request.into_parts();

        let client = ClientId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.as_str(), "192.168.1.20");
    }

    #[tokio::test]
    async fn test_client_id_without_connect_info() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = request.into_parts();

        let client = ClientId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(client.as_str(), "unknown");
    }
}

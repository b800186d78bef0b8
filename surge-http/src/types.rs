use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use http_body_util::Empty;

use super::PrepareError;
use super::estimate::request_head_bytes;
use super::util::{host_header_value, parse_http_url};

/// Status and wire sizes of one exchange. The body is counted, not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body_len: u64,
    /// Request line and headers.
    pub bytes_sent: u64,
    /// Status line, headers and body.
    pub bytes_received: u64,
}

/// A validated GET, built once and sent many times.
///
/// The Host header is filled in up front so the wire size is known before
/// the first send.
#[derive(Debug, Clone)]
pub struct GetRequest {
    uri: http::Uri,
    headers: HeaderMap,
    timeout: Option<Duration>,
    wire_bytes: u64,
}

impl GetRequest {
    pub fn new(url: &str, headers: &[(String, String)]) -> Result<Self, PrepareError> {
        let parsed = parse_http_url(url)?;
        let uri: http::Uri = parsed
            .as_str()
            .parse()
            .map_err(|_| PrepareError::InvalidUrl(url.to_string()))?;

        let mut map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers {
            let invalid = |reason: String| PrepareError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            map.append(header, value);
        }
        if !map.contains_key(HOST)
            && let Some(host) = host_header_value(&parsed)
        {
            let value = HeaderValue::from_str(&host).map_err(|_| PrepareError::InvalidUrl(url.to_string()))?;
            map.insert(HOST, value);
        }

        let target = uri.path_and_query().map_or("/", |p| p.as_str());
        let wire_bytes = request_head_bytes(target, &map);

        Ok(Self {
            uri,
            headers: map,
            timeout: None,
            wire_bytes,
        })
    }

    /// Bounds the whole exchange, body included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Bytes the request occupies on the wire.
    pub fn wire_bytes(&self) -> u64 {
        self.wire_bytes
    }

    pub(crate) fn to_hyper(&self) -> http::Request<Empty<Bytes>> {
        let mut req = http::Request::new(Empty::new());
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_filled_in_and_counted() {
        let req = GetRequest::new("http://localhost:8080/hello", &[]).unwrap_or_else(|e| panic!("{e}"));
        let hyper_req = req.to_hyper();

        assert_eq!(hyper_req.method(), http::Method::GET);
        assert_eq!(
            hyper_req.headers().get(HOST).and_then(|v| v.to_str().ok()),
            Some("localhost:8080")
        );
        // "GET /hello HTTP/1.1\r\n" + "host: localhost:8080\r\n" + "\r\n"
        assert_eq!(req.wire_bytes(), 21 + 22 + 2);
    }

    #[test]
    fn explicit_host_is_kept() {
        let req = GetRequest::new("http://localhost/?q=1", &[("Host".to_string(), "x".to_string())])
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(req.to_hyper().headers().get_all(HOST).iter().count(), 1);
        // "GET /?q=1 HTTP/1.1\r\n" + "host: x\r\n" + "\r\n"
        assert_eq!(req.wire_bytes(), 20 + 9 + 2);
    }

    #[test]
    fn bad_headers_and_schemes_are_rejected() {
        let err = GetRequest::new("http://localhost/", &[("x-bad".to_string(), "a\nb".to_string())])
            .err();
        assert!(matches!(err, Some(PrepareError::InvalidHeader { name, .. }) if name == "x-bad"));

        assert!(matches!(
            GetRequest::new("ftp://example.com/", &[]),
            Err(PrepareError::UnsupportedScheme(_))
        ));
    }
}

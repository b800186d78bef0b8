//! HTTP/1.1 framing sizes used for `data_sent` / `data_received`.
//!
//! Sizes are computed from the parsed message, not read off the socket, so
//! TLS records and chunked-encoding overhead are not counted.

use http::{HeaderMap, StatusCode, Version};

/// `GET <target> HTTP/1.1\r\n`, header lines and the blank line.
pub(crate) fn request_head_bytes(target: &str, headers: &HeaderMap) -> u64 {
    let line = "GET ".len() + target.len() + " HTTP/1.1\r\n".len();
    (line as u64).saturating_add(header_block_bytes(headers))
}

/// `<version> <code>\r\n`, header lines and the blank line. The reason phrase
/// is not counted.
pub(crate) fn response_head_bytes(version: Version, status: StatusCode, headers: &HeaderMap) -> u64 {
    let version = match version {
        Version::HTTP_2 | Version::HTTP_3 => "HTTP/2",
        _ => "HTTP/1.1",
    };
    let line = version.len() + 1 + status.as_str().len() + 2;
    (line as u64).saturating_add(header_block_bytes(headers))
}

fn header_block_bytes(headers: &HeaderMap) -> u64 {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().len() + ": ".len() + value.len() + 2) as u64)
        .fold(2, u64::saturating_add)
}

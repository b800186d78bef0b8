use super::PrepareError;

/// `host[:port]` as it goes in the Host header; default ports are dropped.
pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Parses `raw` and rejects anything that is not plain http(s).
pub fn parse_http_url(raw: &str) -> Result<url::Url, PrepareError> {
    let parsed = url::Url::parse(raw).map_err(|_| PrepareError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(PrepareError::UnsupportedScheme(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_explicit_port_only() {
        let u = parse_http_url("http://127.0.0.1:8080/hello").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("127.0.0.1:8080"));

        let u = parse_http_url("https://example.com:443/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("example.com"));
    }

    #[test]
    fn parse_http_url_rejects_other_schemes() {
        assert_eq!(
            parse_http_url("ftp://example.com/"),
            Err(PrepareError::UnsupportedScheme("ftp://example.com/".to_string()))
        );
        assert!(matches!(parse_http_url("not a url"), Err(PrepareError::InvalidUrl(_))));
    }
}

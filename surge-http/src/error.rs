use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a sent request produced no response. Rendered as the `error` tag of
/// `http_req_errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    Connect,
    Request,
    Timeout,
    /// The connection broke while the response body was streaming.
    Body,
}

/// A request template that cannot be sent at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported, got `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    #[error("response body interrupted: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::Request(e) if e.is_connect() => HttpTransportErrorKind::Connect,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::Timeout(_) => HttpTransportErrorKind::Timeout,
            Self::Body(_) => HttpTransportErrorKind::Body,
        }
    }
}

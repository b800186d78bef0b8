//! Minimal GET client for load generation: validated request templates,
//! pooled connections and wire-size accounting without keeping bodies.

#![forbid(unsafe_code)]

mod client;
mod error;
mod estimate;
mod types;
mod util;

pub use client::HttpClient;
pub use error::{Error, HttpTransportErrorKind, PrepareError, Result};
pub use types::{GetRequest, HttpResponse};
pub use util::parse_http_url;

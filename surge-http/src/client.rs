use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Empty};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::estimate::response_head_bytes;
use super::{Error, GetRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client shared by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_nodelay(true);
        tcp.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(tcp);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    /// Sends `req` and drains the response body. The request timeout, if
    /// any, covers the body too.
    pub async fn send(&self, req: &GetRequest) -> Result<HttpResponse> {
        let exchange = self.exchange(req);
        let Some(timeout) = req.timeout() else {
            return exchange.await;
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .unwrap_or(Err(Error::Timeout(timeout)))
    }

    async fn exchange(&self, req: &GetRequest) -> Result<HttpResponse> {
        let (head, mut body) = self.inner.request(req.to_hyper()).await?.into_parts();

        let mut body_len: u64 = 0;
        while let Some(frame) = body.frame().await {
            if let Some(chunk) = frame?.data_ref() {
                body_len = body_len.saturating_add(chunk.len() as u64);
            }
        }

        Ok(HttpResponse {
            status: head.status.as_u16(),
            body_len,
            bytes_sent: req.wire_bytes(),
            bytes_received: response_head_bytes(head.version, head.status, &head.headers)
                .saturating_add(body_len),
        })
    }
}

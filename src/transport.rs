//! Wire transport for API calls

use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::{ApiRequest, ApiResponse};
use reqwest::Client;
use std::future::Future;
use tracing::debug;

/// Sends a fully prepared request
///
/// Implementations return every HTTP status as an [`ApiResponse`]; only
/// failures to get a response at all are errors.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    config: ClientConfig,
    http_client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.config.url_for(&request.path);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(method = %request.method, url = %url, status = %status, "API call completed");

        Ok(ApiResponse::new(status, body))
    }
}

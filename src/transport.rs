use std::future::Future;
use std::io;
use std::pin::Pin;

use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::credentials::Credentials;
use crate::error::ChartError;

pub type ChartBody = Pin<Box<dyn AsyncRead + Send>>;

/// Response head plus a body that is read chunk by chunk.
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ChartBody,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues chart requests. `Err` means the request never produced a response.
pub trait ChartTransport: Send + Sync {
    fn open(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<TransportResponse, ChartError>> + Send;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(credentials: Credentials) -> Result<Self, ChartError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("wxchart/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ChartError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| ChartError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl ChartTransport for HttpTransport {
    async fn open(&self, url: &str) -> Result<TransportResponse, ChartError> {
        let mut request = self.client.get(url);
        if let Some(credential) = self.credentials.for_url(url) {
            request = request.basic_auth(&credential.user, Some(&credential.password));
        }
        let response = request
            .send()
            .await
            .map_err(|err| ChartError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(TransportResponse {
            status,
            content_length,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}

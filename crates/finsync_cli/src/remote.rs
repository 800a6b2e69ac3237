//! reqwest transport and reachability probing.

use crate::error::{CliError, CliResult};
use async_trait::async_trait;
use finsync_engine::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use std::time::Duration;
use tokio::net::TcpStream;

/// [`HttpClient`] backed by reqwest.
pub struct ReqwestClient {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> CliResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Decides reachability by opening a TCP connection to the server.
#[derive(Debug, Clone)]
pub struct Reachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Reachability {
    /// Targets the host and port of `server_url`.
    pub fn for_server(server_url: &str, timeout: Duration) -> CliResult<Self> {
        let invalid = || CliError::InvalidServerUrl(server_url.to_string());
        let url = reqwest::Url::parse(server_url).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        let port = url.port_or_known_default().ok_or_else(invalid)?;
        Ok(Self {
            host,
            port,
            timeout,
        })
    }

    /// Returns true if a connection could be opened within the timeout.
    pub async fn check(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let reachable = matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)));
        tracing::debug!(host = %self.host, port = self.port, reachable, "reachability probe");
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn server_url_parsing() {
        let probe = Reachability::for_server("https://api.example.com/v1", Duration::from_secs(1))
            .unwrap();
        assert_eq!(probe.host, "api.example.com");
        assert_eq!(probe.port, 443);

        let probe =
            Reachability::for_server("http://localhost:8080", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.port, 8080);

        assert!(matches!(
            Reachability::for_server("not a url", Duration::from_secs(1)),
            Err(CliError::InvalidServerUrl(_))
        ));
    }

    #[tokio::test]
    async fn probe_sees_listening_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let probe = Reachability::for_server(&url, Duration::from_secs(1)).unwrap();
        assert!(probe.check().await);

        drop(listener);
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn base_url_trailing_slash_trimmed() {
        let client = ReqwestClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}

//! HTTP remote gateway.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so the engine
//! does not depend on a particular HTTP library. [`HttpGateway`] layers the
//! cross-cutting concerns on top of it, in this order: connectivity
//! precondition, bearer credential, bounded retry, structured logging.

use crate::config::RetryPolicy;
use crate::connectivity::ConnectivityProbe;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{status_error, DeleteOutcome, RemoteGateway, ServerRecord};
use async_trait::async_trait;
use finsync_store::{Account, Confirmed, Identity, Transaction};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// An outbound request, relative to the client's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Path beginning with `/`.
    pub path: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Attaches a JSON body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> SyncResult<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| SyncError::unknown(format!("failed to encode request: {e}")))?;
        self.headers
            .push(("Content-Type".into(), "application/json".into()));
        self.body = Some(bytes);
        Ok(self)
    }

    /// Returns the first header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        Self::new(status, serde_json::to_vec(body).unwrap_or_default())
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level I/O failure (connection reset, timeout, DNS, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns whatever response the server produced.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Supplies the bearer credential attached to every call.
pub trait CredentialSource: Send + Sync {
    /// Returns the current bearer token.
    fn bearer_token(&self) -> String;
}

/// A fixed bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> String {
        self.0.clone()
    }
}

/// Remote gateway over HTTP + JSON.
pub struct HttpGateway<C: HttpClient, N: ConnectivityProbe> {
    client: C,
    connectivity: Arc<N>,
    credentials: Box<dyn CredentialSource>,
    retry: RetryPolicy,
}

impl<C: HttpClient, N: ConnectivityProbe> HttpGateway<C, N> {
    /// Creates a gateway.
    pub fn new(
        client: C,
        connectivity: Arc<N>,
        credentials: impl CredentialSource + 'static,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            connectivity,
            credentials: Box::new(credentials),
            retry,
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs one logical call: connectivity check, auth, retry.
    async fn execute(&self, mut request: HttpRequest) -> SyncResult<HttpResponse> {
        let method = request.method.as_str();
        if !self.connectivity.has_validated_internet() {
            tracing::debug!(method, path = %request.path, "no validated internet, call skipped");
            return Err(SyncError::NoConnectivity);
        }

        request.headers.push((
            "Authorization".into(),
            format!("Bearer {}", self.credentials.bearer_token()),
        ));

        let mut last_failure = None;
        for attempt in 0..self.retry.max_attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.client.send(&request).await {
                Ok(response) if response.is_server_error() => {
                    tracing::warn!(
                        method,
                        path = %request.path,
                        status = response.status,
                        attempt = attempt + 1,
                        "server error"
                    );
                    last_failure = Some(status_error(response.status, response.body_text()));
                }
                Ok(response) => {
                    tracing::debug!(
                        method,
                        path = %request.path,
                        status = response.status,
                        attempt = attempt + 1,
                        "remote call completed"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    tracing::warn!(
                        method,
                        path = %request.path,
                        attempt = attempt + 1,
                        error = %err,
                        "transport failure"
                    );
                    last_failure = Some(SyncError::ServerError {
                        status: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| SyncError::unknown("no attempts made")))
    }

    async fn call<T: DeserializeOwned>(&self, request: HttpRequest) -> SyncResult<T> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(status_error(response.status, response.body_text()));
        }
        serde_json::from_slice(&response.body).map_err(|e| SyncError::Unknown {
            status: Some(response.status),
            message: format!("malformed response: {e}"),
        })
    }
}

#[async_trait]
impl<C: HttpClient, N: ConnectivityProbe> RemoteGateway for HttpGateway<C, N> {
    async fn create_transaction(&self, payload: &Transaction) -> SyncResult<Confirmed<Transaction>> {
        let request = HttpRequest::new(Method::Post, "/transactions").with_json(payload)?;
        let record: ServerRecord<Transaction> = self.call(request).await?;
        Ok(record.into())
    }

    async fn update_transaction(
        &self,
        identity: Identity,
        payload: &Transaction,
    ) -> SyncResult<Confirmed<Transaction>> {
        let request =
            HttpRequest::new(Method::Put, format!("/transactions/{identity}")).with_json(payload)?;
        let record: ServerRecord<Transaction> = self.call(request).await?;
        Ok(record.into())
    }

    async fn delete_transaction(&self, identity: Identity) -> SyncResult<DeleteOutcome> {
        let request = HttpRequest::new(Method::Delete, format!("/transactions/{identity}"));
        let response = self.execute(request).await?;
        match response.status {
            404 => Ok(DeleteOutcome::AlreadyGone),
            _ if response.is_success() => Ok(DeleteOutcome::Deleted),
            status => Err(status_error(status, response.body_text())),
        }
    }

    async fn fetch_accounts(&self) -> SyncResult<Vec<Confirmed<Account>>> {
        let records: Vec<ServerRecord<Account>> =
            self.call(HttpRequest::new(Method::Get, "/accounts")).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn update_account(
        &self,
        identity: Identity,
        payload: &Account,
    ) -> SyncResult<Confirmed<Account>> {
        let request =
            HttpRequest::new(Method::Put, format!("/accounts/{identity}")).with_json(payload)?;
        let record: ServerRecord<Account> = self.call(request).await?;
        Ok(record.into())
    }
}

/// A scripted HTTP client for testing.
///
/// Responses are consumed in order; once the script is empty the fallback
/// response is returned for every request.
pub struct MockHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Mutex<HttpResponse>,
    requests: Mutex<Vec<(tokio::time::Instant, HttpRequest)>>,
}

impl MockHttpClient {
    /// Creates a client that answers 200 with an empty JSON object.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(HttpResponse::new(200, "{}")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .push_back(Err(TransportError(message.into())));
    }

    /// Sets the response used once the script runs out.
    pub fn set_fallback(&self, response: HttpResponse) {
        *self.fallback.lock() = response;
    }

    /// Returns every request received.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Returns when each request was received.
    pub fn request_times(&self) -> Vec<tokio::time::Instant> {
        self.requests.lock().iter().map(|(t, _)| *t).collect()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .push((tokio::time::Instant::now(), request.clone()));
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.fallback.lock().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use std::time::Duration;

    fn tx() -> Transaction {
        Transaction {
            account_id: 1,
            category_id: 3,
            amount: 500,
            transaction_date: "2026-03-01T10:00:00Z".into(),
            comment: None,
        }
    }

    fn gateway(online: bool) -> HttpGateway<MockHttpClient, ConnectivityMonitor> {
        HttpGateway::new(
            MockHttpClient::new(),
            Arc::new(ConnectivityMonitor::new(online)),
            StaticToken::new("secret"),
            RetryPolicy::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_5xx_makes_three_spaced_attempts() {
        let gateway = gateway(true);
        gateway
            .client()
            .set_fallback(HttpResponse::new(503, "unavailable"));

        let start = tokio::time::Instant::now();
        let result = gateway.delete_transaction(Identity::new(9)).await;

        assert!(matches!(
            result,
            Err(SyncError::ServerError { status: Some(503), .. })
        ));
        let times = gateway.client().request_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(2));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let gateway = gateway(true);
        gateway
            .client()
            .push_response(HttpResponse::new(400, "bad amount"));

        let result = gateway.create_transaction(&tx()).await;

        assert!(matches!(
            result,
            Err(SyncError::Unknown { status: Some(400), .. })
        ));
        assert_eq!(gateway.client().requests().len(), 1);
    }

    #[tokio::test]
    async fn offline_call_never_reaches_client() {
        let gateway = gateway(false);
        let result = gateway.create_transaction(&tx()).await;
        assert!(matches!(result, Err(SyncError::NoConnectivity)));
        assert!(gateway.client().requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_then_success() {
        let gateway = gateway(true);
        gateway.client().push_transport_error("connection reset");
        gateway.client().push_response(HttpResponse::json(
            201,
            &ServerRecord {
                id: 87,
                fields: tx(),
            },
        ));

        let created = gateway.create_transaction(&tx()).await.unwrap();
        assert_eq!(created.identity, Identity::new(87));
        assert_eq!(gateway.client().requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_exhausts_as_server_error() {
        let gateway = gateway(true);
        for _ in 0..3 {
            gateway.client().push_transport_error("timeout");
        }
        let result = gateway.fetch_accounts().await;
        assert!(matches!(
            result,
            Err(SyncError::ServerError { status: None, .. })
        ));
        assert_eq!(gateway.client().requests().len(), 3);
    }

    #[tokio::test]
    async fn bearer_token_and_body_attached() {
        let gateway = gateway(true);
        gateway.client().push_response(HttpResponse::json(
            200,
            &ServerRecord {
                id: 5,
                fields: tx(),
            },
        ));
        gateway
            .update_transaction(Identity::new(5), &tx())
            .await
            .unwrap();

        let request = &gateway.client().requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, "/transactions/5");
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
        let body: Transaction = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, tx());
    }

    #[tokio::test]
    async fn delete_tolerates_not_found() {
        let gateway = gateway(true);
        gateway.client().push_response(HttpResponse::new(404, ""));
        let outcome = gateway.delete_transaction(Identity::new(9)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyGone);
        assert_eq!(gateway.client().requests().len(), 1);

        gateway.client().push_response(HttpResponse::new(204, ""));
        let outcome = gateway.delete_transaction(Identity::new(9)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn malformed_body_is_unknown() {
        let gateway = gateway(true);
        gateway.client().push_response(HttpResponse::new(200, "not json"));
        let result = gateway.fetch_accounts().await;
        assert!(matches!(
            result,
            Err(SyncError::Unknown { status: Some(200), .. })
        ));
    }
}

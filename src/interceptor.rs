//! Request pipeline: attach credentials, send, recover from expired tokens

use crate::error::Result;
use crate::refresh::{RefreshCoordinator, RefreshPhase};
use crate::token_store::CredentialStore;
use crate::transport::Transport;
use crate::types::{ApiRequest, ApiResponse};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;

/// Attach the stored access token as a bearer credential
///
/// Without a stored token the request goes out unauthenticated.
pub fn attach_auth_header(store: &CredentialStore, request: &mut ApiRequest) {
    if let Some(token) = store.access_token() {
        request.set_bearer(&token);
    }
}

/// Authenticated API client used by every call the UI makes
///
/// Expired access tokens are refreshed transparently; callers only see a
/// failure when the session cannot be recovered.
pub struct ApiClient<T: Transport> {
    transport: Arc<T>,
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: Arc<T>, store: CredentialStore, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        attach_auth_header(&self.store, &mut request);

        let response = self.transport.send(request.clone()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        self.coordinator
            .recover(self.transport.as_ref(), &self.store, request)
            .await
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize>(&self, path: impl Into<String>, body: &B) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).with_body(body)?).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        self.coordinator.phase()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_utils::{scripted_session, RefreshOutcome, ScriptedTransport};

    #[test]
    fn test_attach_auth_header() {
        let store = CredentialStore::open(MemoryStorage::new()).unwrap();
        let mut request = ApiRequest::get("/api/tasks/");

        attach_auth_header(&store, &mut request);
        assert_eq!(request.bearer_token(), None);

        store
            .set(crate::types::CredentialUpdate::access_token("T1".to_string()))
            .unwrap();
        attach_auth_header(&store, &mut request);
        assert_eq!(request.bearer_token(), Some("T1"));
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_refresh() {
        let transport = Arc::new(ScriptedTransport::new("T1", RefreshOutcome::Reject));
        let (client, _store, _events) = scripted_session(transport.clone(), Some("T1"), Some("R1"));

        let response = client.get("/api/tasks/").await.unwrap();

        assert!(response.is_success());
        assert_eq!(transport.refresh_calls(), 0);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer.as_deref(), Some("T1"));
        assert!(!sent[0].retried);
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through() {
        let transport = Arc::new(ScriptedTransport::new("T1", RefreshOutcome::Reject));
        transport.respond_with("/api/missing/", StatusCode::NOT_FOUND);
        let (client, _store, _events) = scripted_session(transport.clone(), Some("T1"), Some("R1"));

        let response = client.get("/api/missing/").await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_invisible_to_caller() {
        let transport = Arc::new(ScriptedTransport::new("T2", RefreshOutcome::Grant("T2".to_string())));
        let (client, store, _events) = scripted_session(transport.clone(), Some("T1"), Some("R1"));

        let response = client.post("/api/tasks/", &serde_json::json!({"title": "Write report"})).await.unwrap();

        assert!(response.is_success());
        assert_eq!(store.access_token().as_deref(), Some("T2"));
        let posts: Vec<_> = transport
            .sent()
            .into_iter()
            .filter(|sent| sent.path == "/api/tasks/")
            .collect();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|sent| sent.method == reqwest::Method::POST));
        assert_eq!(posts[1].bearer.as_deref(), Some("T2"));
        assert_eq!(posts[1].body, Some(serde_json::json!({"title": "Write report"})));
    }
}

//! Scripted transport and session builders shared by the unit tests

use crate::error::{ClientError, Result};
use crate::interceptor::ApiClient;
use crate::refresh::RefreshCoordinator;
use crate::storage::MemoryStorage;
use crate::token_store::CredentialStore;
use crate::transport::Transport;
use crate::types::{ApiRequest, ApiResponse, CredentialUpdate, Role, SessionEvent, UserProfile};
use reqwest::{Method, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

pub(crate) const REFRESH_PATH: &str = "/api/token/refresh/";

pub(crate) fn profile(role: Role) -> UserProfile {
    UserProfile {
        id: 1,
        username: format!("{}_user", role.as_str().to_lowercase()),
        role: Some(role),
        email: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        department: None,
        employee_number: None,
        picture: None,
        is_active: true,
        approved: true,
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RefreshOutcome {
    /// Answer with this access token
    Grant(String),
    /// Answer `401 token_not_valid`
    Reject,
    /// Never answer
    Hang,
    /// Fail below HTTP, as a dropped connection would
    ConnectionLost,
}

/// A request as the transport saw it
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub retried: bool,
    pub body: Option<serde_json::Value>,
}

/// Fake API: protected paths answer `200` only for the currently valid token
///
/// Every request is recorded synchronously on the first poll, so the recorded
/// order is the order in which requests were issued.
pub(crate) struct ScriptedTransport {
    valid_token: Mutex<String>,
    refresh_outcome: RefreshOutcome,
    refresh_gate: Semaphore,
    rejected_paths: Mutex<Vec<String>>,
    fixed_statuses: Mutex<HashMap<String, StatusCode>>,
    sent: Mutex<Vec<SentRequest>>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Refresh answers immediately
    pub(crate) fn new(valid_token: &str, refresh_outcome: RefreshOutcome) -> Self {
        Self::with_permits(valid_token, refresh_outcome, Semaphore::MAX_PERMITS)
    }

    /// Refresh answers only after [`open_refresh_gate`](Self::open_refresh_gate)
    pub(crate) fn gated(valid_token: &str, refresh_outcome: RefreshOutcome) -> Self {
        Self::with_permits(valid_token, refresh_outcome, 0)
    }

    fn with_permits(valid_token: &str, refresh_outcome: RefreshOutcome, permits: usize) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_outcome,
            refresh_gate: Semaphore::new(permits),
            rejected_paths: Mutex::new(Vec::new()),
            fixed_statuses: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open_refresh_gate(&self) {
        self.refresh_gate.add_permits(1);
    }

    /// `path` answers `401` whatever token is presented
    pub(crate) fn always_reject(&self, path: &str) {
        self.rejected_paths.lock().unwrap().push(path.to_string());
    }

    /// `path` answers `status` for a valid token
    pub(crate) fn respond_with(&self, path: &str, status: StatusCode) {
        self.fixed_statuses.lock().unwrap().insert(path.to_string(), status);
    }

    pub(crate) fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_to(&self, path: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| s.path == path).count()
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ApiRequest) {
        self.sent.lock().unwrap().push(SentRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: request.bearer_token().map(str::to_string),
            retried: request.is_retried(),
            body: request.body.clone(),
        });
    }

    fn protected_response(&self, request: &ApiRequest) -> ApiResponse {
        let valid = self.valid_token.lock().unwrap().clone();
        let rejected = self.rejected_paths.lock().unwrap().contains(&request.path);

        if rejected || request.bearer_token() != Some(valid.as_str()) {
            return ApiResponse::from_json(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
            );
        }

        let status = self
            .fixed_statuses
            .lock()
            .unwrap()
            .get(&request.path)
            .copied()
            .unwrap_or(StatusCode::OK);
        ApiResponse::from_json(status, &json!({"path": request.path}))
    }

    async fn refresh(&self) -> Result<ApiResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.refresh_gate.acquire().await {
            permit.forget();
        }

        match &self.refresh_outcome {
            RefreshOutcome::Grant(token) => {
                *self.valid_token.lock().unwrap() = token.clone();
                Ok(ApiResponse::from_json(StatusCode::OK, &json!({"access": token})))
            }
            RefreshOutcome::Reject => Ok(ApiResponse::from_json(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
            )),
            RefreshOutcome::Hang => std::future::pending().await,
            RefreshOutcome::ConnectionLost => Err(ClientError::InvalidResponse(
                "connection closed before a response was received".to_string(),
            )),
        }
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.record(&request);
        if request.path == REFRESH_PATH {
            return self.refresh().await;
        }
        Ok(self.protected_response(&request))
    }
}

/// Wire an [`ApiClient`] over `transport` with the given stored tokens
pub(crate) fn scripted_session(
    transport: Arc<ScriptedTransport>,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> (
    ApiClient<ScriptedTransport>,
    CredentialStore,
    broadcast::Receiver<SessionEvent>,
) {
    scripted_session_with_timeout(transport, access_token, refresh_token, Duration::from_secs(5))
}

pub(crate) fn scripted_session_with_timeout(
    transport: Arc<ScriptedTransport>,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    refresh_timeout: Duration,
) -> (
    ApiClient<ScriptedTransport>,
    CredentialStore,
    broadcast::Receiver<SessionEvent>,
) {
    let store = CredentialStore::open(MemoryStorage::new()).unwrap();
    store
        .set(CredentialUpdate {
            access_token: access_token.map(str::to_string),
            refresh_token: refresh_token.map(str::to_string),
            user_profile: Some(profile(Role::Member)),
        })
        .unwrap();

    let (events, receiver) = broadcast::channel(16);
    let coordinator = Arc::new(RefreshCoordinator::new(REFRESH_PATH, refresh_timeout, events));
    let client = ApiClient::new(transport, store.clone(), coordinator);
    (client, store, receiver)
}

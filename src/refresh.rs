//! Single-flight access token refresh
//!
//! When a call comes back `401`, the first caller to notice moves the
//! coordinator from [`RefreshState::Idle`] to [`RefreshState::Refreshing`] and
//! performs the one refresh call. Every other caller that fails while the
//! refresh is in flight is parked in a FIFO queue. Once the refresh settles the
//! leader either replays everything with the new token (trigger first, then
//! the queue in arrival order) or rejects everything and ends the session.
//!
//! The state flag is checked and set under one lock, and the lock is never
//! held across an await.

use crate::error::{ClientError, Result};
use crate::token_store::CredentialStore;
use crate::transport::Transport;
use crate::types::{
    ApiRequest, ApiResponse, CredentialUpdate, LogoutReason, RefreshRequest, RefreshResponse,
    SessionEvent,
};
use futures::future::join_all;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// A caller suspended until the in-flight refresh settles
struct PendingRequest {
    request: ApiRequest,
    responder: oneshot::Sender<Result<ApiResponse>>,
}

enum RefreshState {
    Idle,
    Refreshing { queue: VecDeque<PendingRequest> },
}

/// Observable coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing { queued: usize },
}

/// What a caller that just saw a `401` has to do
enum Admission {
    /// Perform the refresh
    Lead(ApiRequest),
    /// Wait for the in-flight refresh
    Queued(oneshot::Receiver<Result<ApiResponse>>),
    /// A refresh already happened since this request was sent; replay with the stored token
    Replay(ApiRequest, String),
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refresh_path: String,
    refresh_timeout: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        refresh_path: impl Into<String>,
        refresh_timeout: Duration,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            refresh_path: refresh_path.into(),
            refresh_timeout,
            events,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        match &*self.lock_state() {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::Refreshing { queue } => RefreshPhase::Refreshing {
                queued: queue.len(),
            },
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recover a request whose first attempt was rejected with `401`
    pub(crate) async fn recover<T: Transport>(
        &self,
        transport: &T,
        store: &CredentialStore,
        request: ApiRequest,
    ) -> Result<ApiResponse> {
        match self.admit(store, request) {
            Admission::Queued(receiver) => receiver.await.unwrap_or_else(|_| {
                Err(ClientError::RefreshFailed(
                    "token refresh was abandoned".to_string(),
                ))
            }),
            Admission::Replay(request, token) => {
                debug!(path = %request.path, "Replaying request sent with a superseded token");
                replay(transport, request, &token).await
            }
            Admission::Lead(request) => self.lead(transport, store, request).await,
        }
    }

    fn admit(&self, store: &CredentialStore, request: ApiRequest) -> Admission {
        let mut state = self.lock_state();

        if let RefreshState::Refreshing { queue } = &mut *state {
            let (responder, receiver) = oneshot::channel();
            debug!(path = %request.path, position = queue.len() + 1, "Queued request behind token refresh");
            queue.push_back(PendingRequest { request, responder });
            return Admission::Queued(receiver);
        }

        if let Some(current) = store.access_token() {
            if request.bearer_token() != Some(current.as_str()) {
                return Admission::Replay(request, current);
            }
        }

        *state = RefreshState::Refreshing {
            queue: VecDeque::new(),
        };
        Admission::Lead(request)
    }

    async fn lead<T: Transport>(
        &self,
        transport: &T,
        store: &CredentialStore,
        request: ApiRequest,
    ) -> Result<ApiResponse> {
        let guard = RefreshGuard {
            coordinator: self,
            armed: true,
        };
        info!(path = %request.path, "Access token rejected, refreshing");

        match self.refresh_access_token(transport, store).await {
            Ok(token) => {
                let queue = guard.finish();
                let _ = self.events.send(SessionEvent::TokenRefreshed);
                info!(queued = queue.len(), "Access token refreshed, replaying requests");
                replay_all(transport, request, queue, &token).await
            }
            Err(err) => {
                let err = match err {
                    ClientError::MissingRefreshToken
                    | ClientError::RefreshTimeout(_)
                    | ClientError::RefreshFailed(_) => err,
                    other => ClientError::RefreshFailed(other.to_string()),
                };
                let reason = match err {
                    ClientError::MissingRefreshToken => LogoutReason::MissingRefreshToken,
                    _ => LogoutReason::RefreshFailed,
                };
                // The record is cleared before leaving `Refreshing` so no caller
                // can start another refresh with the rejected refresh token.
                end_session(store, &self.events, reason);
                let queue = guard.finish();
                warn!(error = %err, rejected = queue.len(), "Token refresh failed, session cleared");

                let message = err.to_string();
                for pending in queue {
                    let _ = pending
                        .responder
                        .send(Err(ClientError::RefreshFailed(message.clone())));
                }
                Err(err)
            }
        }
    }

    async fn refresh_access_token<T: Transport>(
        &self,
        transport: &T,
        store: &CredentialStore,
    ) -> Result<String> {
        let refresh_token = store.refresh_token().ok_or(ClientError::MissingRefreshToken)?;

        let request = ApiRequest::post(self.refresh_path.as_str()).with_body(&RefreshRequest {
            refresh: refresh_token,
        })?;

        let response = tokio::time::timeout(self.refresh_timeout, transport.send(request))
            .await
            .map_err(|_| ClientError::RefreshTimeout(self.refresh_timeout))??;

        if !response.is_success() {
            let message = response.error_message(&["detail", "message"], "refresh rejected");
            return Err(ClientError::RefreshFailed(format!(
                "{} with status {}",
                message, response.status
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| ClientError::RefreshFailed(format!("unreadable refresh response: {e}")))?;
        store.set(CredentialUpdate::access_token(refreshed.access.clone()))?;

        Ok(refreshed.access)
    }

    /// Leave `Refreshing`, handing back the callers that queued up meanwhile
    fn take_queue(&self) -> VecDeque<PendingRequest> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => VecDeque::new(),
        }
    }
}

/// Returns the coordinator to `Idle` if the leading task is dropped mid-refresh
struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn finish(mut self) -> VecDeque<PendingRequest> {
        self.armed = false;
        self.coordinator.take_queue()
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let queue = self.coordinator.take_queue();
        warn!(rejected = queue.len(), "Token refresh abandoned");
        for pending in queue {
            let _ = pending.responder.send(Err(ClientError::RefreshFailed(
                "token refresh was abandoned".to_string(),
            )));
        }
    }
}

/// Replay the trigger and then the queue, issuing requests in that order
///
/// `join!` and `join_all` poll their futures in order, so each request reaches
/// the transport in FIFO order while the round trips still overlap.
async fn replay_all<T: Transport>(
    transport: &T,
    trigger: ApiRequest,
    queue: VecDeque<PendingRequest>,
    token: &str,
) -> Result<ApiResponse> {
    let queued = queue.into_iter().map(|pending| async move {
        let outcome = replay(transport, pending.request, token).await;
        let _ = pending.responder.send(outcome);
    });

    let (outcome, _) = futures::join!(replay(transport, trigger, token), join_all(queued));
    outcome
}

/// Send `request` once more with `token`; a second `401` is final
async fn replay<T: Transport>(transport: &T, mut request: ApiRequest, token: &str) -> Result<ApiResponse> {
    request.mark_retried();
    request.set_bearer(token);
    let path = request.path.clone();

    let response = transport.send(request).await?;
    if response.status == StatusCode::UNAUTHORIZED {
        warn!(path = %path, "Request rejected again after token refresh");
        return Err(ClientError::RetryExhausted { path });
    }
    Ok(response)
}

/// Clear the credential record and tell the shell to go to the login screen
pub(crate) fn end_session(
    store: &CredentialStore,
    events: &broadcast::Sender<SessionEvent>,
    reason: LogoutReason,
) {
    if let Err(e) = store.clear() {
        warn!(error = %e, "Failed to remove persisted credentials");
    }
    info!(?reason, "Session ended");
    let _ = events.send(SessionEvent::LoggedOut { reason });
}

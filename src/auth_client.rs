//! Session lifecycle: login, registration, logout, and the handles the UI shell uses

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::interceptor::{attach_auth_header, ApiClient};
use crate::refresh::{end_session, RefreshCoordinator};
use crate::role_gate::{can_access, guard_route, visible_links, AccessDecision, NavLink};
use crate::storage::Storage;
use crate::token_store::CredentialStore;
use crate::transport::{HttpTransport, Transport};
use crate::types::*;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

const LOGIN_FALLBACK_MESSAGE: &str = "Login failed, please check credentials.";
const REGISTER_FALLBACK_MESSAGE: &str = "Registration failed";
const EVENT_CAPACITY: usize = 32;

/// Entry point for the UI shell
///
/// Owns the credential store and the authenticated [`ApiClient`]; every
/// mutation of the session goes through here or through the refresh path.
pub struct SessionClient<T: Transport = HttpTransport> {
    config: ClientConfig,
    store: CredentialStore,
    transport: Arc<T>,
    api: ApiClient<T>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionClient<HttpTransport> {
    /// Create a client talking HTTP to `config.base_url`, persisting into `storage`
    pub fn new(config: ClientConfig, storage: impl Storage) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let store = CredentialStore::open(storage)?;
        Ok(Self::with_transport(config, store, transport))
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(config: ClientConfig, store: CredentialStore, transport: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let transport = Arc::new(transport);
        let coordinator = Arc::new(RefreshCoordinator::new(
            config.refresh_path.as_str(),
            config.refresh_timeout,
            events.clone(),
        ));
        let api = ApiClient::new(Arc::clone(&transport), store.clone(), coordinator);

        Self {
            config,
            store,
            transport,
            api,
            events,
        }
    }

    /// Log in and store the whole session in one write
    ///
    /// Returns the profile so the shell can navigate to
    /// [`Role::landing_route`]. On failure the store is not touched.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let request = ApiRequest::post(self.config.login_path.as_str()).with_body(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let message = response.error_message(&["detail", "message"], LOGIN_FALLBACK_MESSAGE);
            warn!(username = %username, status = %response.status, "Login rejected");
            return Err(ClientError::Authentication(message));
        }

        let login: LoginResponse = response
            .json()
            .map_err(|e| ClientError::InvalidResponse(format!("login response: {e}")))?;
        let profile = login.user_info.clone();
        self.store
            .set(CredentialUpdate::login(login.access, login.refresh, login.user_info))?;

        info!(username = %profile.username, role = ?profile.role, "Logged in");
        let _ = self.events.send(SessionEvent::LoggedIn {
            username: profile.username.clone(),
            role: profile.role,
        });
        Ok(profile)
    }

    /// Submit a registration; the account needs admin approval before it can log in
    ///
    /// Returns the server's account payload. The credential store is never touched.
    pub async fn register(&self, registration: &RegistrationRequest) -> Result<serde_json::Value> {
        let request = ApiRequest::post(self.config.signup_path.as_str()).with_body(registration)?;

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let message = response.error_message(
                &["detail", "username", "email", "password"],
                REGISTER_FALLBACK_MESSAGE,
            );
            return Err(ClientError::Authentication(message));
        }

        info!(username = %registration.username, "Registration submitted, awaiting approval");
        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        response.json()
    }

    /// Log out: tell the server if it is reachable, then clear the session regardless
    pub async fn logout(&self) {
        let mut request = ApiRequest::post(self.config.logout_path.as_str());
        if let Some(refresh) = self.store.refresh_token() {
            request = request.with_json(serde_json::json!({ "refresh": refresh }));
        }
        attach_auth_header(&self.store, &mut request);

        match self.transport.send(request).await {
            Ok(response) if !response.is_success() => {
                warn!(status = %response.status, "Server refused logout");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Logout request failed"),
        }

        end_session(&self.store, &self.events, LogoutReason::UserInitiated);
    }

    /// Clear the session without contacting the server and signal navigation to login
    pub fn force_logout(&self) {
        end_session(&self.store, &self.events, LogoutReason::Forced);
    }

    /// The current session, or `None` when nothing is stored
    pub fn current_credential(&self) -> Option<CredentialRecord> {
        let record = self.store.get();
        (!record.is_empty()).then_some(record)
    }

    pub fn current_role(&self) -> Option<Role> {
        self.store.current_role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn can_access(&self, required_roles: Option<&[Role]>) -> AccessDecision {
        can_access(required_roles, &self.store.get())
    }

    pub fn guard_route(&self, path: &str) -> AccessDecision {
        guard_route(path, &self.store.get())
    }

    pub fn visible_links(&self) -> Vec<&'static NavLink> {
        visible_links(&self.store.get())
    }

    /// Authenticated client for every other API call
    pub fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

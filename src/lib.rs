//! RBAC Rust Client
//!
//! Session layer for the RBAC task-management API: persisted credentials,
//! bearer authentication on every call, transparent single-flight token
//! refresh, and the role gate that decides which routes and links a session
//! may see.

pub mod auth_client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod refresh;
pub mod role_gate;
pub mod storage;
pub mod token_store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use auth_client::SessionClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use interceptor::{attach_auth_header, ApiClient};
pub use refresh::{RefreshCoordinator, RefreshPhase};
pub use role_gate::{can_access, guard_route, visible_links, AccessDecision, NavLink};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use token_store::CredentialStore;
pub use transport::{HttpTransport, Transport};
pub use types::{
    ApiRequest, ApiResponse, CredentialRecord, CredentialUpdate, LogoutReason, Role, SessionEvent,
    UserProfile,
};

//! Process-wide credential store persisted through a [`Storage`] backend

use crate::error::Result;
use crate::storage::Storage;
use crate::types::{CredentialRecord, CredentialUpdate, Role, UserProfile};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_INFO_KEY: &str = "user_info";

/// Credential store shared by the whole client
///
/// Readers always see a whole [`CredentialRecord`]: a merged update becomes
/// visible in one step, after it has been persisted. Writers are serialized on
/// their own lock, so readers never wait on the storage backend.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    record: Arc<RwLock<CredentialRecord>>,
    writer: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Open the store, loading whatever the backend persisted previously
    pub fn open(storage: impl Storage) -> Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let record = load_record(storage.as_ref())?;

        Ok(Self {
            storage,
            record: Arc::new(RwLock::new(record)),
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Snapshot of the current record
    pub fn get(&self) -> CredentialRecord {
        self.record.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    pub fn current_role(&self) -> Option<Role> {
        self.record.read().unwrap_or_else(PoisonError::into_inner).role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_access_token()
    }

    /// Merge `update` into the record and persist it
    ///
    /// On a storage error the in-memory record is left untouched.
    pub fn set(&self, update: CredentialUpdate) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let profile_json = update
            .user_profile
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut items: Vec<(&str, &str)> = Vec::with_capacity(3);
        if let Some(token) = update.access_token.as_deref() {
            items.push((ACCESS_TOKEN_KEY, token));
        }
        if let Some(token) = update.refresh_token.as_deref() {
            items.push((REFRESH_TOKEN_KEY, token));
        }
        if let Some(json) = profile_json.as_deref() {
            items.push((USER_INFO_KEY, json));
        }
        if items.is_empty() {
            return Ok(());
        }
        self.storage.set_items(&items)?;

        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = update.access_token {
            record.access_token = Some(token);
        }
        if let Some(token) = update.refresh_token {
            record.refresh_token = Some(token);
        }
        if let Some(profile) = update.user_profile {
            record.user_profile = Some(profile);
        }
        Ok(())
    }

    /// Remove all three fields
    ///
    /// The in-memory record is cleared even when the backend fails; the
    /// storage error is still reported.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = CredentialRecord::default();
        self.storage
            .remove_items(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_INFO_KEY])
    }
}

fn load_record(storage: &dyn Storage) -> Result<CredentialRecord> {
    let access_token = storage.get_item(ACCESS_TOKEN_KEY)?;
    let refresh_token = storage.get_item(REFRESH_TOKEN_KEY)?;
    let user_profile = match storage.get_item(USER_INFO_KEY)? {
        Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored user profile");
                None
            }
        },
        None => None,
    };

    Ok(CredentialRecord {
        access_token,
        refresh_token,
        user_profile,
    })
}

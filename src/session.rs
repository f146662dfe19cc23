//! Authentication state: the live `Session`, its persisted form and the
//! identity codec used to store it.

use std::sync::Arc;

use base64::{engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD}, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::StorageError;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::storage::{KeyValueStore, IDENTITY_KEY, TOKEN_KEY};

const CODEC_VERSION: &str = "v1";
const CHECKSUM_HEX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Participation {
    /// Currently enrolled in a running evaluation.
    Active,
    #[default]
    None,
    /// Invited but has not answered yet.
    Invited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub participation: Participation,
    #[serde(default)]
    pub newcomer: bool,
    #[serde(default)]
    pub linked_account: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            admin: false,
            participation: Participation::None,
            newcomer: false,
            linked_account: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn is_participant(&self) -> bool {
        self.participation == Participation::Active
    }

    pub fn has_pending_invite(&self) -> bool {
        self.participation == Participation::Invited && !self.newcomer
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub token: Option<String>,
    pub is_mobile: bool,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.identity.is_none()
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().map(Identity::is_admin).unwrap_or(false)
    }

    pub fn is_participant(&self) -> bool {
        self.identity.as_ref().map(Identity::is_participant).unwrap_or(false)
    }
}

// =============================================================================
// Identity codec
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported identity record version: {0}")]
    UnsupportedVersion(String),
    #[error("identity record is not in <version>.<payload>.<checksum> form")]
    Malformed,
    #[error("identity record checksum mismatch")]
    Checksum,
    #[error("identity payload is not valid base64: {0}")]
    Base64(String),
    #[error("identity payload is not a valid record: {0}")]
    Json(String),
}

fn checksum(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)[..CHECKSUM_HEX_LEN].to_string()
}

/// `v1.<base64url(json)>.<sha256 prefix of the payload>`
pub fn encode_identity(identity: &Identity) -> Result<String, StorageError> {
    let json = serde_json::to_vec(identity).map_err(|e| StorageError::Encode(e.to_string()))?;
    let payload = URL_SAFE_NO_PAD.encode(json);
    let sum = checksum(&payload);
    Ok(format!("{}.{}.{}", CODEC_VERSION, payload, sum))
}

pub fn decode_identity(record: &str) -> Result<Identity, CodecError> {
    let parts: Vec<&str> = record.trim().split('.').collect();
    let [version, payload, sum] = parts.as_slice() else {
        return Err(CodecError::Malformed);
    };
    if *version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(version.to_string()));
    }
    if checksum(payload) != *sum {
        return Err(CodecError::Checksum);
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CodecError::Json(e.to_string()))
}

/// HTTP basic credential for `name:password`.
pub fn create_token(name: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", name, password)))
}

pub fn is_mobile_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    ["iphone", "ipod", "android", "iemobile", "blackberry", "fennec"]
        .iter()
        .any(|marker| ua.contains(marker))
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoSessionReason {
    Absent,
    Corrupt(CodecError),
    Storage(StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(Identity),
    NoSession(NoSessionReason),
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    session: Session,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, is_mobile: bool) -> Self {
        Self {
            storage,
            session: Session { is_mobile, ..Session::default() },
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token.as_deref()
    }

    /// Rebuilds the session from storage. Absent or corrupt records leave
    /// the session empty and are reported, never raised.
    pub fn restore(&mut self) -> RestoreOutcome {
        let outcome = self.read_persisted();
        match &outcome {
            Ok((identity, token)) => {
                self.session.identity = Some(identity.clone());
                self.session.token = Some(token.clone());
                log(Level::Info, Domain::Session, "restored", obj(&[("user", v_str(&identity.name))]));
            }
            Err(reason) => {
                self.session.identity = None;
                self.session.token = None;
                let level = match reason {
                    NoSessionReason::Absent => Level::Debug,
                    _ => Level::Warn,
                };
                log(level, Domain::Session, "no_session", obj(&[("msg", v_str(&format!("{:?}", reason)))]));
            }
        }
        match outcome {
            Ok((identity, _)) => RestoreOutcome::Restored(identity),
            Err(reason) => RestoreOutcome::NoSession(reason),
        }
    }

    fn read_persisted(&self) -> Result<(Identity, String), NoSessionReason> {
        let token = self.storage.get(TOKEN_KEY).map_err(NoSessionReason::Storage)?;
        let record = self.storage.get(IDENTITY_KEY).map_err(NoSessionReason::Storage)?;
        match (token, record) {
            (Some(token), Some(record)) if !token.is_empty() => {
                let identity = decode_identity(&record).map_err(NoSessionReason::Corrupt)?;
                Ok((identity, token))
            }
            _ => Err(NoSessionReason::Absent),
        }
    }

    pub fn login(&mut self, identity: Identity, token: String) -> Result<(), StorageError> {
        let record = encode_identity(&identity)?;
        self.storage.set(TOKEN_KEY, &token)?;
        self.storage.set(IDENTITY_KEY, &record)?;
        log(Level::Info, Domain::Session, "login", obj(&[("user", v_str(&identity.name))]));
        self.session.identity = Some(identity);
        self.session.token = Some(token);
        Ok(())
    }

    /// Clears the in-memory session first so a storage failure can not leave
    /// the process authenticated.
    pub fn logout(&mut self) -> Result<(), StorageError> {
        let name = self.session.identity.take().map(|i| i.name);
        self.session.token = None;
        self.storage.clear()?;
        log(
            Level::Info,
            Domain::Session,
            "logout",
            obj(&[("user", name.as_deref().map(v_str).unwrap_or(Value::Null))]),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn alice() -> Identity {
        Identity {
            email: Some("alice@example.org".to_string()),
            participation: Participation::Invited,
            linked_account: Some("älice-ünïcode".to_string()),
            ..Identity::new("alice")
        }
    }

    #[test]
    fn test_basic_token() {
        assert_eq!(create_token("alice", "secret"), "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn test_codec_round_trip_preserves_identity() {
        let record = encode_identity(&alice()).unwrap();
        assert!(record.starts_with("v1."));
        assert_eq!(decode_identity(&record).unwrap(), alice());
    }

    #[test]
    fn test_codec_rejects_tampering() {
        let record = encode_identity(&alice()).unwrap();
        let mut parts: Vec<String> = record.split('.').map(str::to_string).collect();
        let replacement = if parts[1].starts_with('A') { "B" } else { "A" };
        parts[1].replace_range(0..1, replacement);
        assert_eq!(decode_identity(&parts.join(".")), Err(CodecError::Checksum));
        assert_eq!(decode_identity("garbage"), Err(CodecError::Malformed));
        assert!(matches!(
            decode_identity(&record.replacen("v1", "v9", 1)),
            Err(CodecError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_codec_reports_bad_payload() {
        let payload = URL_SAFE_NO_PAD.encode(b"{not json");
        let record = format!("v1.{}.{}", payload, checksum(&payload));
        assert!(matches!(decode_identity(&record), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_restore_after_login() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut first = SessionStore::new(storage.clone(), false);
        first.login(alice(), create_token("alice", "pw")).unwrap();

        let mut second = SessionStore::new(storage, false);
        assert_eq!(second.restore(), RestoreOutcome::Restored(alice()));
        assert_eq!(second.token(), Some(create_token("alice", "pw").as_str()));
    }

    #[test]
    fn test_restore_on_corrupt_record_yields_empty_session() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "Basic abc").unwrap();
        storage.set(IDENTITY_KEY, "%%%").unwrap();
        let mut store = SessionStore::new(storage, false);
        assert!(matches!(
            store.restore(),
            RestoreOutcome::NoSession(NoSessionReason::Corrupt(_))
        ));
        assert!(store.session().is_empty());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_restore_without_token_is_absent() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage.set(IDENTITY_KEY, &encode_identity(&alice()).unwrap()).unwrap();
        let mut store = SessionStore::new(storage, false);
        assert_eq!(store.restore(), RestoreOutcome::NoSession(NoSessionReason::Absent));
    }

    #[test]
    fn test_logout_clears_memory_and_storage() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut store = SessionStore::new(storage.clone(), true);
        store.login(alice(), "Basic x".to_string()).unwrap();
        store.logout().unwrap();
        assert!(store.session().is_empty());
        assert!(store.session().is_mobile);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
    }

    #[test]
    fn test_mobile_agents() {
        assert!(is_mobile_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"));
        assert!(!is_mobile_agent("Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0"));
    }
}

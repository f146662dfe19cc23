//! Recommender preferences with a local working copy and a synced baseline.
//!
//! `current` is what the user is editing, `baseline` is the last value the
//! remote authority confirmed. Both live in ephemeral storage; only a
//! successful write-back moves `baseline`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ClientError, ClientResult, StorageError};
use crate::guard::InFlight;
use crate::logging::{log, log_remote_failure, obj, v_str, Domain, Level};
use crate::remote::RemoteService;
use crate::storage::{KeyValueStore, SETTINGS_BASELINE_KEY, SETTINGS_CURRENT_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommenderId(pub u32);

/// How recommendations from several recommenders are merged into one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Mixed,
    Dynamic,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub recommenders: Vec<RecommenderId>,
    pub behavior: Behavior,
}

impl Settings {
    pub fn recommender_set(&self) -> BTreeSet<RecommenderId> {
        self.recommenders.iter().copied().collect()
    }

    /// Order and duplicates in the recommender list are ignored.
    pub fn same_as(&self, other: &Settings) -> bool {
        self.behavior == other.behavior && self.recommender_set() == other.recommender_set()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub recommenders: Option<Vec<RecommenderId>>,
    pub behavior: Option<Behavior>,
}

impl SettingsPatch {
    fn apply(self, settings: &mut Settings) {
        if let Some(recommenders) = self.recommenders {
            settings.recommenders = recommenders;
        }
        if let Some(behavior) = self.behavior {
            settings.behavior = behavior;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Clean,
    Synced,
    /// Another flush was still waiting on the remote authority.
    InFlight,
}

pub struct SettingsCache {
    storage: Arc<dyn KeyValueStore>,
    flushing: InFlight,
}

impl SettingsCache {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage, flushing: InFlight::new() }
    }

    fn read(&self, key: &str) -> Result<Option<Settings>, StorageError> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(Some(settings)),
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Settings,
                    "discard_malformed",
                    obj(&[("key", v_str(key)), ("msg", v_str(&err.to_string()))]),
                );
                Ok(None)
            }
        }
    }

    fn write(&self, key: &str, settings: &Settings) -> Result<(), StorageError> {
        let raw = serde_json::to_string(settings).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.storage.set(key, &raw)
    }

    pub fn current(&self) -> Result<Option<Settings>, StorageError> {
        self.read(SETTINGS_CURRENT_KEY)
    }

    pub fn baseline(&self) -> Result<Option<Settings>, StorageError> {
        self.read(SETTINGS_BASELINE_KEY)
    }

    /// Returns the working copy, going to the remote authority only when
    /// forced or when the cached pair is incomplete or unreadable.
    pub async fn get(
        &self,
        remote: &dyn RemoteService,
        user: &str,
        force_remote: bool,
    ) -> ClientResult<Settings> {
        if !force_remote {
            if let (Some(current), Some(_)) = (self.current()?, self.baseline()?) {
                return Ok(current);
            }
        }
        let fetched = remote.fetch_settings(user).await.map_err(|err| {
            log_remote_failure("fetch_settings", &err.user_message());
            err
        })?;
        self.write(SETTINGS_CURRENT_KEY, &fetched)?;
        self.write(SETTINGS_BASELINE_KEY, &fetched)?;
        log(Level::Debug, Domain::Settings, "fetched", obj(&[("user", v_str(user))]));
        Ok(fetched)
    }

    /// Local edit only; baseline and remote are untouched.
    pub fn set_current(&self, patch: SettingsPatch) -> ClientResult<Settings> {
        let mut current = self.current()?.ok_or(ClientError::SettingsNotLoaded)?;
        patch.apply(&mut current);
        self.write(SETTINGS_CURRENT_KEY, &current)?;
        Ok(current)
    }

    /// A working copy without a baseline counts as dirty.
    pub fn is_dirty(&self) -> Result<bool, StorageError> {
        Ok(match (self.current()?, self.baseline()?) {
            (Some(current), Some(baseline)) => !current.same_as(&baseline),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Pushes `current` when it drifted from `baseline`. Baseline moves only
    /// after the remote authority acknowledged the write.
    pub async fn flush(&self, remote: &dyn RemoteService, user: &str, token: &str) -> ClientResult<FlushOutcome> {
        let Some(_in_flight) = self.flushing.try_begin() else {
            return Ok(FlushOutcome::InFlight);
        };
        if !self.is_dirty()? {
            return Ok(FlushOutcome::Clean);
        }
        let current = self.current()?.ok_or(ClientError::SettingsNotLoaded)?;
        match remote.write_settings(user, &current, token).await {
            Ok(()) => {
                self.write(SETTINGS_BASELINE_KEY, &current)?;
                log(
                    Level::Info,
                    Domain::Settings,
                    "synced",
                    obj(&[("user", v_str(user)), ("recommenders", json!(current.recommenders))]),
                );
                Ok(FlushOutcome::Synced)
            }
            Err(err) => {
                log_remote_failure("write_settings", &err.user_message());
                Err(err.into())
            }
        }
    }

    /// Drops both copies, e.g. when a different user signs in.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(SETTINGS_CURRENT_KEY)?;
        self.storage.remove(SETTINGS_BASELINE_KEY)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.is_set()
    }
}

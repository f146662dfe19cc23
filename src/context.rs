//! Application context: the one place that owns the session, the settings
//! cache and the remote collaborator. Built once at startup and handed to
//! the router and the views by reference.

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::remote::{HttpRemote, OfflineRemote, RemoteService};
use crate::session::{create_token, Identity, RestoreOutcome, SessionStore};
use crate::settings::{FlushOutcome, SettingsCache};
use crate::storage::{open_store, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    pub identity: Identity,
    /// Show the evaluation invitation dialog.
    pub invite_pending: bool,
}

pub struct AppContext {
    config: Config,
    pub session: SessionStore,
    pub settings: SettingsCache,
    remote: Arc<dyn RemoteService>,
    today: Option<NaiveDate>,
}

impl AppContext {
    pub fn new(config: Config, storage: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteService>) -> Self {
        let is_mobile = config.is_mobile();
        Self {
            session: SessionStore::new(storage.clone(), is_mobile),
            settings: SettingsCache::new(storage),
            remote,
            config,
            today: None,
        }
    }

    /// Opens storage and picks the remote collaborator named by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = open_store(&config.storage_path)?;
        let remote: Arc<dyn RemoteService> = if config.offline {
            Arc::new(OfflineRemote::seeded())
        } else {
            Arc::new(HttpRemote::new(&config)?)
        };
        log(
            Level::Info,
            Domain::System,
            "context_ready",
            obj(&[
                ("service_url", v_str(&config.service_url)),
                ("storage", v_str(&config.storage_path)),
                ("offline", json!(config.offline)),
            ]),
        );
        Ok(Self::new(config, storage, remote))
    }

    /// Pins the calendar day used as the creation date of new evaluations.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn remote(&self) -> &dyn RemoteService {
        self.remote.as_ref()
    }

    pub fn user_name(&self) -> Option<String> {
        self.session.identity().map(|i| i.name.clone())
    }

    /// Restores a persisted session, if any.
    pub fn init(&mut self) -> RestoreOutcome {
        self.session.restore()
    }

    /// Signs out and wipes ephemeral storage.
    pub fn reset(&mut self) -> ClientResult<()> {
        self.session.logout()?;
        Ok(())
    }

    pub async fn sign_in(&mut self, name: &str, password: &str) -> ClientResult<SignIn> {
        let identity = self.remote.login(name, password).await.map_err(|err| {
            log(
                Level::Warn,
                Domain::Session,
                "login_failed",
                obj(&[("user", v_str(name)), ("msg", v_str(&err.user_message()))]),
            );
            err
        })?;
        let token = create_token(&identity.name, password);
        let switching_user = self.user_name().map(|n| n != identity.name).unwrap_or(true);
        if switching_user {
            self.settings.clear()?;
        }
        self.session.login(identity.clone(), token)?;
        Ok(SignIn {
            invite_pending: identity.has_pending_invite(),
            identity,
        })
    }

    /// Pushes unsynced settings edits of the signed-in user.
    pub async fn flush_settings(&self) -> ClientResult<FlushOutcome> {
        let (Some(identity), Some(token)) = (self.session.identity(), self.session.token()) else {
            return Err(ClientError::NoSession);
        };
        self.settings.flush(self.remote(), &identity.name, token).await
    }
}

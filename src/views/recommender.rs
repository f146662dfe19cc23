use serde_json::json;

use crate::context::AppContext;
use crate::error::{ClientError, ClientResult};
use crate::guard::InFlight;
use crate::logging::{log, obj, Domain, Level};
use crate::settings::FlushOutcome;

pub const NO_RECOMMENDER_SELECTED: &str = "Please choose at least one recommender in the settings tab.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A refresh was already running; nothing was done.
    Busy,
    Refreshed(FlushOutcome),
}

/// Recommendation list page. Refreshing the list pushes settings edits
/// made on the options page first.
pub struct RecommenderView {
    generation: u64,
    refreshing: InFlight,
}

impl RecommenderView {
    pub async fn load(ctx: &AppContext, generation: u64) -> ClientResult<Self> {
        let user = ctx.user_name().ok_or(ClientError::NoSession)?;
        ctx.settings.get(ctx.remote(), &user, false).await?;
        Ok(Self {
            generation,
            refreshing: InFlight::new(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.is_set()
    }

    /// Refuses an empty recommender selection. Otherwise flushes dirty
    /// settings so the next list is built from what the user picked.
    pub async fn refresh_list(&self, ctx: &AppContext) -> ClientResult<RefreshOutcome> {
        let Some(_refreshing) = self.refreshing.try_begin() else {
            return Ok(RefreshOutcome::Busy);
        };
        let settings = ctx.settings.current()?.ok_or(ClientError::SettingsNotLoaded)?;
        if settings.recommenders.is_empty() {
            return Err(ClientError::Validation(vec![NO_RECOMMENDER_SELECTED.to_string()]));
        }
        let flushed = if ctx.settings.is_dirty()? {
            ctx.flush_settings().await?
        } else {
            FlushOutcome::Clean
        };
        log(
            Level::Debug,
            Domain::Settings,
            "list_refresh",
            obj(&[
                ("generation", json!(self.generation)),
                ("flush", json!(format!("{:?}", flushed))),
            ]),
        );
        Ok(RefreshOutcome::Refreshed(flushed))
    }
}

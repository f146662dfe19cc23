use crate::context::AppContext;
use crate::error::{ClientError, ClientResult};
use crate::remote::{RecommenderFilter, RecommenderSummary};
use crate::settings::{Behavior, RecommenderId, Settings, SettingsPatch};

/// Recommender and list-behavior preferences of the signed-in user.
///
/// Edits only touch the local working copy; the router pushes them when
/// the user leaves the page.
pub struct OptionsView {
    generation: u64,
    catalogue: Vec<RecommenderSummary>,
}

impl OptionsView {
    pub async fn load(ctx: &AppContext, generation: u64) -> ClientResult<Self> {
        let user = ctx.user_name().ok_or(ClientError::NoSession)?;
        let catalogue = ctx.remote().fetch_recommender_list(RecommenderFilter::Active).await?;
        ctx.settings.get(ctx.remote(), &user, false).await?;
        Ok(Self { generation, catalogue })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn catalogue(&self) -> &[RecommenderSummary] {
        &self.catalogue
    }

    pub fn settings(&self, ctx: &AppContext) -> ClientResult<Settings> {
        ctx.settings.current()?.ok_or(ClientError::SettingsNotLoaded)
    }

    pub fn toggle_recommender(&self, ctx: &AppContext, id: RecommenderId) -> ClientResult<Settings> {
        let mut recommenders = self.settings(ctx)?.recommenders;
        if recommenders.contains(&id) {
            recommenders.retain(|r| *r != id);
        } else {
            recommenders.push(id);
        }
        ctx.settings.set_current(SettingsPatch { recommenders: Some(recommenders), ..Default::default() })
    }

    pub fn set_behavior(&self, ctx: &AppContext, behavior: Behavior) -> ClientResult<Settings> {
        ctx.settings.set_current(SettingsPatch { behavior: Some(behavior), ..Default::default() })
    }

    /// Drives the "changes not saved yet" hint.
    pub fn has_unsaved_changes(&self, ctx: &AppContext) -> ClientResult<bool> {
        Ok(ctx.settings.is_dirty()?)
    }
}

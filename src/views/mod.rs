//! Views the router keeps in its registry and the seam to the presentation
//! layer that renders them.

mod details;
mod evaluation;
mod options;
mod recommender;

use async_trait::async_trait;

use crate::context::AppContext;
use crate::error::ClientResult;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::router::Route;

pub use details::EvaluationDetailsView;
pub use evaluation::EvaluationView;
pub use options::OptionsView;
pub use recommender::{RecommenderView, RefreshOutcome, NO_RECOMMENDER_SELECTED};

/// Rendering side of the application. Receives activation and message
/// signals; what it draws is its own business.
pub trait ViewLayer: Send + Sync {
    fn show(&self, route: &Route);
    fn prompt_login(&self);
    fn notify(&self, message: &str);
}

/// Logs the signals and renders nothing.
pub struct NullLayer;

impl ViewLayer for NullLayer {
    fn show(&self, route: &Route) {
        log(Level::Trace, Domain::Router, "show", obj(&[("route", v_str(&route.fragment()))]));
    }

    fn prompt_login(&self) {
        log(Level::Trace, Domain::Router, "prompt_login", obj(&[]));
    }

    fn notify(&self, message: &str) {
        log(Level::Info, Domain::System, "notify", obj(&[("msg", v_str(message))]));
    }
}

/// A view for a route whose content is rendered entirely outside the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticView {
    pub route: Route,
    pub generation: u64,
}

pub enum AppView {
    Static(StaticView),
    Options(OptionsView),
    Recommender(RecommenderView),
    Evaluation(EvaluationView),
    Details(EvaluationDetailsView),
}

impl AppView {
    pub fn generation(&self) -> u64 {
        match self {
            AppView::Static(v) => v.generation,
            AppView::Options(v) => v.generation(),
            AppView::Recommender(v) => v.generation(),
            AppView::Evaluation(v) => v.generation(),
            AppView::Details(v) => v.generation(),
        }
    }

    pub fn as_options(&self) -> Option<&OptionsView> {
        match self {
            AppView::Options(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_recommender(&self) -> Option<&RecommenderView> {
        match self {
            AppView::Recommender(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_evaluation_mut(&mut self) -> Option<&mut EvaluationView> {
        match self {
            AppView::Evaluation(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_details_mut(&mut self) -> Option<&mut EvaluationDetailsView> {
        match self {
            AppView::Details(v) => Some(v),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ViewFactory: Send + Sync {
    /// Builds the view for `route`. May call the remote collaborator.
    async fn build(&self, ctx: &AppContext, route: Route, generation: u64) -> ClientResult<AppView>;
}

/// The factory used by the application.
pub struct StandardViews;

#[async_trait]
impl ViewFactory for StandardViews {
    async fn build(&self, ctx: &AppContext, route: Route, generation: u64) -> ClientResult<AppView> {
        let view = match route {
            Route::Options => AppView::Options(OptionsView::load(ctx, generation).await?),
            Route::Recommender => AppView::Recommender(RecommenderView::load(ctx, generation).await?),
            Route::Evaluation => AppView::Evaluation(EvaluationView::load(ctx, generation).await?),
            Route::EvaluationDetails(id) => AppView::Details(EvaluationDetailsView::load(ctx, id, generation).await?),
            other => AppView::Static(StaticView { route: other, generation }),
        };
        log(
            Level::Debug,
            Domain::Router,
            "view_built",
            obj(&[("route", v_str(&route.fragment())), ("generation", serde_json::json!(generation))]),
        );
        Ok(view)
    }
}

//! Route resolution, access guards and the lazily filled view registry.

pub mod registry;

use std::sync::Arc;

use serde_json::json;

use crate::context::AppContext;
use crate::error::ClientResult;
use crate::logging::{log, log_navigation, obj, v_str, Domain, Level};
use crate::remote::EvaluationId;
use crate::session::Session;
use crate::views::{AppView, ViewFactory, ViewLayer};

use registry::{Reservation, ViewRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Options,
    Recommender,
    Statistics,
    Help,
    Profile,
    Configuration,
    Log,
    Evaluation,
    EvaluationDetails(EvaluationId),
}

/// Who may enter a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Session,
    Admin,
    /// Signed-in users that are not taking part in a running evaluation.
    NonParticipant,
}

impl Route {
    /// Parses a location fragment such as `#options` or
    /// `evaluation?details=4`. Unknown fragments yield `None`.
    pub fn parse(fragment: &str) -> Option<Route> {
        let fragment = fragment.trim().trim_start_matches('#').trim_start_matches('/');
        let route = match fragment {
            "" | "home" => Route::Home,
            "options" => Route::Options,
            "recommender" => Route::Recommender,
            "statistics" => Route::Statistics,
            "help" => Route::Help,
            "profile" => Route::Profile,
            "configuration" => Route::Configuration,
            "log" => Route::Log,
            "evaluation" => Route::Evaluation,
            other => {
                let id = other.strip_prefix("evaluation?details=")?;
                Route::EvaluationDetails(id.parse().ok()?)
            }
        };
        Some(route)
    }

    /// Registry key. All detail pages share one slot.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Options => "options",
            Route::Recommender => "recommender",
            Route::Statistics => "statistics",
            Route::Help => "help",
            Route::Profile => "profile",
            Route::Configuration => "configuration",
            Route::Log => "log",
            Route::Evaluation => "evaluation",
            Route::EvaluationDetails(_) => "evaluation_details",
        }
    }

    pub fn fragment(&self) -> String {
        match self {
            Route::EvaluationDetails(id) => format!("evaluation?details={}", id),
            other => other.name().to_string(),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Home | Route::Help => Access::Public,
            Route::Recommender | Route::Profile => Access::Session,
            Route::Options => Access::NonParticipant,
            Route::Statistics
            | Route::Configuration
            | Route::Log
            | Route::Evaluation
            | Route::EvaluationDetails(_) => Access::Admin,
        }
    }

    /// Routes whose view edits the settings working copy.
    pub fn owns_settings(&self) -> bool {
        matches!(self, Route::Options)
    }

    /// Detail pages are rebuilt on every visit instead of being reused.
    pub fn rebuilt_on_visit(&self) -> bool {
        matches!(self, Route::EvaluationDetails(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Login,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect { to: Route, prompt: Prompt },
    /// Stay where we are without any feedback.
    Stay,
}

pub fn check_access(route: &Route, session: &Session) -> GuardDecision {
    match route.access() {
        Access::Public => GuardDecision::Allow,
        _ if session.is_empty() => GuardDecision::Redirect { to: Route::Home, prompt: Prompt::Login },
        Access::Session => GuardDecision::Allow,
        Access::Admin if session.is_admin() => GuardDecision::Allow,
        Access::Admin => GuardDecision::Stay,
        Access::NonParticipant if session.is_participant() => GuardDecision::Stay,
        Access::NonParticipant => GuardDecision::Allow,
    }
}

/// Proof that the caller reserved a registry slot and must complete it.
#[derive(Debug)]
pub struct ConstructTicket {
    route: Route,
    generation: u64,
}

impl ConstructTicket {
    pub fn route(&self) -> Route {
        self.route
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub enum NavigationPlan {
    Stay,
    Redirect { to: Route, prompt: Prompt },
    Activate {
        route: Route,
        /// Leaving a settings view with unsynced edits.
        flush: bool,
        construct: Option<ConstructTicket>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Ignored,
    Stayed,
    Redirected { to: Route, prompt: Prompt },
    /// `constructed` is false when an existing or pending view was reused.
    Activated { route: Route, constructed: bool },
    /// The view could not be built; the slot was released.
    Failed { route: Route, message: String },
    /// A newer navigation replaced the slot while this one was building.
    Superseded { route: Route },
}

impl NavigationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            NavigationOutcome::Ignored => "ignored",
            NavigationOutcome::Stayed => "stayed",
            NavigationOutcome::Redirected { .. } => "redirected",
            NavigationOutcome::Activated { .. } => "activated",
            NavigationOutcome::Failed { .. } => "failed",
            NavigationOutcome::Superseded { .. } => "superseded",
        }
    }
}

pub struct ViewRouter<F: ViewFactory> {
    factory: F,
    layer: Arc<dyn ViewLayer>,
    registry: ViewRegistry<AppView>,
    current: Option<Route>,
}

impl<F: ViewFactory> ViewRouter<F> {
    pub fn new(factory: F, layer: Arc<dyn ViewLayer>) -> Self {
        Self {
            factory,
            layer,
            registry: ViewRegistry::new(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<Route> {
        self.current
    }

    pub fn view(&self, route: Route) -> Option<&AppView> {
        self.registry.get(route.name())
    }

    pub fn view_mut(&mut self, route: Route) -> Option<&mut AppView> {
        self.registry.get_mut(route.name())
    }

    pub fn is_pending(&self, route: Route) -> bool {
        self.registry.is_pending(route.name())
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Synchronous half of a navigation: runs the guards, moves the current
    /// route and reserves the registry slot. Nothing here suspends, so two
    /// navigations to the same route can never both get a ticket.
    pub fn begin_navigation(&mut self, ctx: &AppContext, route: Route) -> NavigationPlan {
        let from = self.current.map(|r| r.fragment());
        match check_access(&route, ctx.session.session()) {
            GuardDecision::Stay => {
                log_navigation(from.as_deref(), &route.fragment(), "stay");
                return NavigationPlan::Stay;
            }
            GuardDecision::Redirect { to, prompt } => {
                log_navigation(from.as_deref(), &route.fragment(), "redirect");
                self.current = Some(to);
                self.layer.prompt_login();
                self.layer.show(&to);
                return NavigationPlan::Redirect { to, prompt };
            }
            GuardDecision::Allow => {}
        }

        let leaving_settings = self.current.map(|r| r.owns_settings() && r != route).unwrap_or(false);
        // an unreadable cache is flushed too; the flush reports the storage error
        let flush = leaving_settings && !matches!(ctx.settings.is_dirty(), Ok(false));

        let key = route.name();
        let construct = if route.rebuilt_on_visit() {
            Some(self.registry.replace(key))
        } else {
            match self.registry.reserve(key) {
                Reservation::Reserved(generation) => Some(generation),
                Reservation::Pending(_) => None,
                Reservation::Ready(_) => {
                    self.layer.show(&route);
                    None
                }
            }
        };
        self.current = Some(route);
        log_navigation(from.as_deref(), &route.fragment(), "allow");

        NavigationPlan::Activate {
            route,
            flush,
            construct: construct.map(|generation| ConstructTicket { route, generation }),
        }
    }

    /// Stores the built view unless the slot moved on in the meantime.
    pub fn complete_construction(&mut self, ticket: ConstructTicket, built: ClientResult<AppView>) -> NavigationOutcome {
        let ConstructTicket { route, generation } = ticket;
        let key = route.name();
        match built {
            Ok(view) => match self.registry.fulfil(key, generation, view) {
                Ok(()) => {
                    if self.current == Some(route) {
                        self.layer.show(&route);
                    }
                    NavigationOutcome::Activated { route, constructed: true }
                }
                Err(_) => {
                    log(
                        Level::Debug,
                        Domain::Router,
                        "stale_view_dropped",
                        obj(&[("route", v_str(&route.fragment())), ("generation", json!(generation))]),
                    );
                    NavigationOutcome::Superseded { route }
                }
            },
            Err(err) => {
                let message = err.user_message();
                self.registry.abandon(key, generation);
                log(
                    Level::Warn,
                    Domain::Router,
                    "construct_failed",
                    obj(&[("route", v_str(&route.fragment())), ("msg", v_str(&message))]),
                );
                self.layer.notify(&message);
                NavigationOutcome::Failed { route, message }
            }
        }
    }

    async fn flush_settings(&self, ctx: &AppContext) {
        // navigation goes on; the edits stay local until the next flush
        if let Err(err) = ctx.flush_settings().await {
            self.layer.notify(&err.user_message());
        }
    }

    pub async fn navigate_to(&mut self, ctx: &AppContext, route: Route) -> NavigationOutcome {
        match self.begin_navigation(ctx, route) {
            NavigationPlan::Stay => NavigationOutcome::Stayed,
            NavigationPlan::Redirect { to, prompt } => NavigationOutcome::Redirected { to, prompt },
            NavigationPlan::Activate { route, flush, construct } => {
                if flush {
                    self.flush_settings(ctx).await;
                }
                match construct {
                    None => NavigationOutcome::Activated { route, constructed: false },
                    Some(ticket) => {
                        let built = self.factory.build(ctx, route, ticket.generation).await;
                        self.complete_construction(ticket, built)
                    }
                }
            }
        }
    }

    /// Unknown fragments leave the router where it is.
    pub async fn navigate(&mut self, ctx: &AppContext, fragment: &str) -> NavigationOutcome {
        match Route::parse(fragment) {
            Some(route) => self.navigate_to(ctx, route).await,
            None => {
                log(Level::Debug, Domain::Router, "unknown_route", obj(&[("route", v_str(fragment))]));
                NavigationOutcome::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Identity, Participation};

    fn session(identity: Option<Identity>) -> Session {
        Session { token: identity.as_ref().map(|_| "Basic x".to_string()), identity, is_mobile: false }
    }

    #[test]
    fn test_parse_fragments() {
        assert_eq!(Route::parse(""), Some(Route::Home));
        assert_eq!(Route::parse("#options"), Some(Route::Options));
        assert_eq!(Route::parse("evaluation?details=12"), Some(Route::EvaluationDetails(12)));
        assert_eq!(Route::parse("evaluation?details=abc"), None);
        assert_eq!(Route::parse("nowhere"), None);
        assert_eq!(Route::parse(&Route::EvaluationDetails(3).fragment()), Some(Route::EvaluationDetails(3)));
    }

    #[test]
    fn test_empty_session_redirects_home_with_prompt() {
        let empty = session(None);
        for route in [Route::Options, Route::Profile, Route::Evaluation, Route::Log] {
            assert_eq!(
                check_access(&route, &empty),
                GuardDecision::Redirect { to: Route::Home, prompt: Prompt::Login }
            );
        }
        assert_eq!(check_access(&Route::Help, &empty), GuardDecision::Allow);
    }

    #[test]
    fn test_admin_routes_stay_silently_for_plain_users() {
        let plain = session(Some(Identity::new("bob")));
        assert_eq!(check_access(&Route::Statistics, &plain), GuardDecision::Stay);
        assert_eq!(check_access(&Route::EvaluationDetails(1), &plain), GuardDecision::Stay);
        assert_eq!(check_access(&Route::Recommender, &plain), GuardDecision::Allow);

        let admin = session(Some(Identity { admin: true, ..Identity::new("root") }));
        assert_eq!(check_access(&Route::Configuration, &admin), GuardDecision::Allow);
    }

    #[test]
    fn test_participants_can_not_open_options() {
        let participant = session(Some(Identity { participation: Participation::Active, ..Identity::new("eve") }));
        assert_eq!(check_access(&Route::Options, &participant), GuardDecision::Stay);
        let invited = session(Some(Identity { participation: Participation::Invited, ..Identity::new("eve") }));
        assert_eq!(check_access(&Route::Options, &invited), GuardDecision::Allow);
    }
}

//! Three-step state machine that collects an evaluation definition,
//! previews the participant assignment and submits the evaluation.
//!
//! Remote work is split into a `begin_*` half that runs synchronously and
//! returns a ticket, and a `complete_*` half that consumes the ticket when
//! the response arrives. The `sending` flag is set by the first half and
//! cleared by the second, on success and on failure. Tickets carry the
//! wizard's generation and the draft revision, so responses addressed to a
//! replaced wizard or to an outdated draft are dropped.

use chrono::NaiveDate;
use serde_json::json;

use crate::error::{RemoteError, RemoteResult};
use crate::evaluation::draft::{EvaluationDraft, ExistingEvaluation};
use crate::evaluation::validate::ScheduleValidator;
use crate::logging::{log, log_remote_failure, obj, v_str, Domain, Level};
use crate::remote::{EvaluationRequest, ParticipantAssignment, RemoteService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Define,
    Groups,
    SummaryPreview,
}

impl WizardStep {
    fn next(self) -> Self {
        match self {
            WizardStep::Define => WizardStep::Groups,
            WizardStep::Groups | WizardStep::SummaryPreview => WizardStep::SummaryPreview,
        }
    }

    fn prev(self) -> Self {
        match self {
            WizardStep::Define | WizardStep::Groups => WizardStep::Define,
            WizardStep::SummaryPreview => WizardStep::Groups,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryTicket {
    generation: u64,
    revision: u64,
    pub request: EvaluationRequest,
}

#[derive(Debug, Clone)]
pub struct SubmitTicket {
    generation: u64,
    pub request: EvaluationRequest,
}

#[derive(Debug)]
pub enum SummaryStep {
    /// The cached preview is still valid.
    Cached,
    Busy,
    Invalid(Vec<String>),
    Request(SummaryTicket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Reused,
    Busy,
    Invalid(Vec<String>),
    Applied,
    Failed(RemoteError),
    /// The response belonged to a replaced wizard or an outdated draft.
    Stale,
}

#[derive(Debug)]
pub enum SubmitStep {
    Busy,
    Invalid(Vec<String>),
    Request(SubmitTicket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    Busy,
    Invalid(Vec<String>),
    Failed(RemoteError),
    Stale,
}

#[derive(Debug)]
pub struct EvaluationWizard {
    generation: u64,
    creator: String,
    step: WizardStep,
    draft: EvaluationDraft,
    existing: Vec<ExistingEvaluation>,
    sending: bool,
}

impl EvaluationWizard {
    pub fn new(generation: u64, creator: impl Into<String>, existing: Vec<ExistingEvaluation>) -> Self {
        Self {
            generation,
            creator: creator.into(),
            step: WizardStep::Define,
            draft: EvaluationDraft::default(),
            existing,
            sending: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &EvaluationDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut EvaluationDraft {
        &mut self.draft
    }

    pub fn existing(&self) -> &[ExistingEvaluation] {
        &self.existing
    }

    pub fn set_existing(&mut self, existing: Vec<ExistingEvaluation>) {
        self.existing = existing;
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn next_step(&mut self) -> WizardStep {
        self.step = self.step.next();
        self.step
    }

    pub fn prev_step(&mut self) -> WizardStep {
        self.step = self.step.prev();
        self.step
    }

    pub fn validate(&self, created: NaiveDate) -> Vec<String> {
        ScheduleValidator::validate(&self.draft, &self.existing, created)
    }

    // =========================================================================
    // Participant preview
    // =========================================================================

    pub fn begin_summary(&mut self, created: NaiveDate) -> SummaryStep {
        if self.sending {
            return SummaryStep::Busy;
        }
        let errors = self.validate(created);
        if !errors.is_empty() {
            return SummaryStep::Invalid(errors);
        }
        if self.draft.summary_created() {
            return SummaryStep::Cached;
        }
        self.sending = true;
        log(
            Level::Debug,
            Domain::Wizard,
            "summary_requested",
            obj(&[("generation", json!(self.generation)), ("revision", json!(self.draft.revision()))]),
        );
        SummaryStep::Request(SummaryTicket {
            generation: self.generation,
            revision: self.draft.revision(),
            request: self.draft.to_request(&self.creator, created),
        })
    }

    pub fn complete_summary(&mut self, ticket: SummaryTicket, result: RemoteResult<ParticipantAssignment>) -> Preview {
        if ticket.generation != self.generation {
            return Preview::Stale;
        }
        self.sending = false;
        match result {
            Ok(_) if ticket.revision != self.draft.revision() => Preview::Stale,
            Ok(assignment) => {
                self.draft.apply_summary(&assignment);
                Preview::Applied
            }
            Err(err) => {
                log_remote_failure("fetch_evaluation_summary", &err.user_message());
                Preview::Failed(err)
            }
        }
    }

    pub async fn refresh_summary(&mut self, remote: &dyn RemoteService, created: NaiveDate) -> Preview {
        match self.begin_summary(created) {
            SummaryStep::Cached => Preview::Reused,
            SummaryStep::Busy => Preview::Busy,
            SummaryStep::Invalid(errors) => Preview::Invalid(errors),
            SummaryStep::Request(ticket) => {
                let result = remote.fetch_evaluation_summary(&ticket.request).await;
                self.complete_summary(ticket, result)
            }
        }
    }

    /// Moves forward; arriving at the preview step fetches the preview
    /// unless the cached one is still valid.
    pub async fn advance(&mut self, remote: &dyn RemoteService, created: NaiveDate) -> (WizardStep, Option<Preview>) {
        let step = self.next_step();
        if step != WizardStep::SummaryPreview {
            return (step, None);
        }
        let preview = self.refresh_summary(remote, created).await;
        (step, Some(preview))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    pub fn begin_submit(&mut self, created: NaiveDate) -> SubmitStep {
        if self.sending {
            return SubmitStep::Busy;
        }
        let errors = self.validate(created);
        if !errors.is_empty() {
            return SubmitStep::Invalid(errors);
        }
        self.sending = true;
        SubmitStep::Request(SubmitTicket {
            generation: self.generation,
            request: self.draft.to_request(&self.creator, created),
        })
    }

    /// On `Created` the caller replaces this wizard with a fresh one; on
    /// failure the draft is left as it was so the user can retry.
    pub fn complete_submit(&mut self, ticket: SubmitTicket, result: RemoteResult<()>) -> SubmitOutcome {
        if ticket.generation != self.generation {
            return SubmitOutcome::Stale;
        }
        self.sending = false;
        match result {
            Ok(()) => {
                log(
                    Level::Info,
                    Domain::Wizard,
                    "evaluation_created",
                    obj(&[("generation", json!(self.generation)), ("name", v_str(&ticket.request.name))]),
                );
                SubmitOutcome::Created
            }
            Err(err) => {
                log_remote_failure("create_evaluation", &err.user_message());
                SubmitOutcome::Failed(err)
            }
        }
    }

    pub async fn submit(&mut self, remote: &dyn RemoteService, created: NaiveDate) -> SubmitOutcome {
        match self.begin_submit(created) {
            SubmitStep::Busy => SubmitOutcome::Busy,
            SubmitStep::Invalid(errors) => SubmitOutcome::Invalid(errors),
            SubmitStep::Request(ticket) => {
                let result = remote.create_evaluation(&ticket.request).await;
                self.complete_submit(ticket, result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::evaluation::draft::Criterion;
    use crate::settings::{Behavior, RecommenderId};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn ready_wizard() -> EvaluationWizard {
        let mut wizard = EvaluationWizard::new(7, "admin", Vec::new());
        let draft = wizard.draft_mut();
        draft.name = "spring".into();
        draft.from = NaiveDate::from_ymd_opt(2024, 2, 1);
        draft.to = NaiveDate::from_ymd_opt(2024, 2, 28);
        draft.set_group_count(2);
        draft.set_criteria([Criterion::Gender]);
        for pos in 1..=2 {
            draft.set_group_recommenders(pos, [RecommenderId(1)]);
            draft.set_group_behavior(pos, Some(Behavior::Mixed));
        }
        wizard
    }

    #[test]
    fn test_steps_are_linear_and_clamped() {
        let mut wizard = EvaluationWizard::new(1, "admin", Vec::new());
        assert_eq!(wizard.prev_step(), WizardStep::Define);
        assert_eq!(wizard.next_step(), WizardStep::Groups);
        assert_eq!(wizard.next_step(), WizardStep::SummaryPreview);
        assert_eq!(wizard.next_step(), WizardStep::SummaryPreview);
        assert_eq!(wizard.prev_step(), WizardStep::Groups);
    }

    #[test]
    fn test_guard_blocks_second_submit_until_success() {
        let mut wizard = ready_wizard();
        let SubmitStep::Request(ticket) = wizard.begin_submit(today()) else {
            panic!("expected request");
        };
        assert!(matches!(wizard.begin_submit(today()), SubmitStep::Busy));
        assert!(matches!(wizard.begin_summary(today()), SummaryStep::Busy));
        assert_eq!(wizard.complete_submit(ticket, Ok(())), SubmitOutcome::Created);
        assert!(!wizard.is_sending());
    }

    #[test]
    fn test_guard_cleared_after_failure_and_draft_kept() {
        let mut wizard = ready_wizard();
        let before = wizard.draft().clone();
        let SubmitStep::Request(ticket) = wizard.begin_submit(today()) else {
            panic!("expected request");
        };
        let outcome = wizard.complete_submit(ticket, Err(TransportError::Unreachable.into()));
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert!(!wizard.is_sending());
        assert_eq!(wizard.draft(), &before);
        assert!(matches!(wizard.begin_submit(today()), SubmitStep::Request(_)));
    }

    #[test]
    fn test_invalid_submit_does_not_set_guard() {
        let mut wizard = EvaluationWizard::new(1, "admin", Vec::new());
        assert!(matches!(wizard.begin_submit(today()), SubmitStep::Invalid(_)));
        assert!(!wizard.is_sending());
    }

    #[test]
    fn test_preview_cached_until_criteria_change() {
        let mut wizard = ready_wizard();
        let SummaryStep::Request(ticket) = wizard.begin_summary(today()) else {
            panic!("expected request");
        };
        assert_eq!(wizard.complete_summary(ticket, Ok(ParticipantAssignment::default())), Preview::Applied);
        assert!(matches!(wizard.begin_summary(today()), SummaryStep::Cached));

        wizard.draft_mut().toggle_criterion(Criterion::Lang);
        assert!(matches!(wizard.begin_summary(today()), SummaryStep::Request(_)));
    }

    #[test]
    fn test_preview_for_outdated_draft_is_dropped() {
        let mut wizard = ready_wizard();
        let SummaryStep::Request(ticket) = wizard.begin_summary(today()) else {
            panic!("expected request");
        };
        wizard.draft_mut().toggle_criterion(Criterion::Age);
        assert_eq!(wizard.complete_summary(ticket, Ok(ParticipantAssignment::default())), Preview::Stale);
        assert!(!wizard.is_sending());
        assert!(!wizard.draft().summary_created());
    }

    #[test]
    fn test_ticket_from_replaced_wizard_is_stale() {
        let mut old = ready_wizard();
        let SubmitStep::Request(ticket) = old.begin_submit(today()) else {
            panic!("expected request");
        };
        let mut fresh = EvaluationWizard::new(old.generation() + 1, "admin", Vec::new());
        assert_eq!(fresh.complete_submit(ticket, Ok(())), SubmitOutcome::Stale);
    }
}

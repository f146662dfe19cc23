//! Scheduling of new evaluations: the draft being edited, its validation and
//! the wizard that drives both.

pub mod draft;
pub mod validate;
pub mod wizard;

pub use draft::{Criterion, EvaluationDraft, ExistingEvaluation, GroupDraft, UserSummary};
pub use validate::{classify_overlap, Overlap, ScheduleValidator};
pub use wizard::{EvaluationWizard, Preview, SubmitOutcome, WizardStep};

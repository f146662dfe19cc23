//! Preconditions for scheduling an evaluation.
//!
//! All checks run on every call and every failure is reported, in a fixed
//! order: name, start date, end date, composition, groups, overlap with
//! already scheduled evaluations.

use chrono::NaiveDate;

use crate::evaluation::draft::{EvaluationDraft, ExistingEvaluation};
use crate::logging::log_validation;
use crate::settings::{Behavior, RecommenderId};

pub const MAX_NAME_LEN: usize = 20;

/// How a proposed range collides with a scheduled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    StartInside,
    EndInside,
    Encloses,
}

impl Overlap {
    pub fn message(&self) -> &'static str {
        match self {
            Overlap::StartInside => {
                "Please choose a start date that is disjoint from other scheduled evaluations."
            }
            Overlap::EndInside => {
                "Please choose an end date that is disjoint from other scheduled evaluations."
            }
            Overlap::Encloses => {
                "Please choose a time period that is disjoint from other scheduled evaluations."
            }
        }
    }
}

/// Ranges are inclusive on both ends. The first matching relation wins.
pub fn classify_overlap(from: NaiveDate, to: NaiveDate, existing: &ExistingEvaluation) -> Option<Overlap> {
    if from >= existing.from && from <= existing.to {
        Some(Overlap::StartInside)
    } else if to >= existing.from && to <= existing.to {
        Some(Overlap::EndInside)
    } else if from <= existing.from && to >= existing.to {
        Some(Overlap::Encloses)
    } else {
        None
    }
}

pub struct ScheduleValidator;

impl ScheduleValidator {
    /// `created` is the day the evaluation is being scheduled on; a start
    /// date on that day is accepted.
    pub fn validate(draft: &EvaluationDraft, existing: &[ExistingEvaluation], created: NaiveDate) -> Vec<String> {
        let mut errors = Vec::new();

        let name = draft.name.trim();
        if name.is_empty() {
            errors.push("Please enter a name.".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            errors.push(format!("Please choose a name with at most {} characters.", MAX_NAME_LEN));
        }

        match draft.from {
            None => errors.push("You didn't specify a start date.".to_string()),
            Some(from) if from < created => {
                errors.push("Please choose a start date that is in the future.".to_string())
            }
            Some(_) => {}
        }
        match (draft.from, draft.to) {
            (_, None) => errors.push("You didn't specify an end date.".to_string()),
            (Some(from), Some(to)) if to < from => {
                errors.push("Your evaluation ends before it starts.".to_string())
            }
            _ => {}
        }

        if draft.criteria().is_empty() {
            errors.push("Please specify group composition criteria.".to_string());
        }

        for group in draft.groups() {
            if group.recommenders.is_empty() {
                errors.push(format!(
                    "You didn't specify recommender settings for group #{}",
                    group.index
                ));
            }
            if group.behavior.is_none() {
                errors.push(format!(
                    "You didn't specify behavior settings for group #{}",
                    group.index
                ));
            }
        }

        if let (Some(from), Some(to)) = (draft.from, draft.to) {
            for scheduled in existing {
                if let Some(overlap) = classify_overlap(from, to, scheduled) {
                    let msg = overlap.message().to_string();
                    if !errors.contains(&msg) {
                        errors.push(msg);
                    }
                }
            }
        }

        log_validation(&errors);
        errors
    }

    /// Checks an edit to the header of an already scheduled evaluation.
    pub fn validate_change(name: &str, from: NaiveDate, to: NaiveDate) -> Vec<String> {
        let mut errors = Vec::new();
        let name = name.trim();
        if name.is_empty() {
            errors.push("Please enter a name.".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            errors.push(format!("Please choose a name with at most {} characters.", MAX_NAME_LEN));
        }
        if to < from {
            errors.push("Your evaluation ends before it starts.".to_string());
        }
        errors
    }

    /// Checks an edit to a group of an already scheduled evaluation.
    pub fn validate_group_change(recommenders: &[RecommenderId], behavior: Option<Behavior>) -> Vec<String> {
        let mut errors = Vec::new();
        if recommenders.is_empty() {
            errors.push("Please select at least one recommender.".to_string());
        }
        if behavior.is_none() {
            errors.push("Please select list composition.".to_string());
        }
        errors
    }
}

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::remote::{EvaluationId, EvaluationRequest, GroupSettings, ParticipantAssignment};
use crate::settings::{Behavior, RecommenderId};

/// Attribute the remote matcher balances across groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Age,
    Gender,
    Lang,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    #[serde(default)]
    pub birthyear: Option<i32>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub langs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEvaluation {
    #[serde(rename = "evaluationId", default)]
    pub id: EvaluationId,
    #[serde(default)]
    pub name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDraft {
    /// 1-based position shown to the user.
    pub index: usize,
    pub recommenders: BTreeSet<RecommenderId>,
    pub behavior: Option<Behavior>,
    pub participants: Vec<UserSummary>,
}

impl GroupDraft {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            recommenders: BTreeSet::new(),
            behavior: None,
            participants: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.recommenders.is_empty() && self.behavior.is_some()
    }

    fn to_settings(&self) -> GroupSettings {
        GroupSettings {
            index: self.index,
            recommenders: self.recommenders.iter().copied().collect(),
            behavior: self.behavior,
        }
    }
}

/// An evaluation definition that has not been submitted yet.
///
/// The composition criteria and the group list are private because changing
/// either one invalidates the cached participant preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationDraft {
    pub name: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    criteria: BTreeSet<Criterion>,
    groups: Vec<GroupDraft>,
    summary_created: bool,
    revision: u64,
}

impl Default for EvaluationDraft {
    fn default() -> Self {
        Self::with_groups(1)
    }
}

impl EvaluationDraft {
    pub fn with_groups(count: usize) -> Self {
        Self {
            name: String::new(),
            from: None,
            to: None,
            criteria: BTreeSet::new(),
            groups: (1..=count).map(GroupDraft::new).collect(),
            summary_created: false,
            revision: 0,
        }
    }

    pub fn criteria(&self) -> &BTreeSet<Criterion> {
        &self.criteria
    }

    pub fn groups(&self) -> &[GroupDraft] {
        &self.groups
    }

    pub fn summary_created(&self) -> bool {
        self.summary_created
    }

    /// Bumped on every change that invalidates the preview.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn invalidate_summary(&mut self) {
        self.summary_created = false;
        self.revision += 1;
        for group in &mut self.groups {
            group.participants.clear();
        }
    }

    pub fn set_criteria(&mut self, criteria: impl IntoIterator<Item = Criterion>) {
        self.criteria = criteria.into_iter().collect();
        self.invalidate_summary();
    }

    pub fn toggle_criterion(&mut self, criterion: Criterion) {
        if !self.criteria.remove(&criterion) {
            self.criteria.insert(criterion);
        }
        self.invalidate_summary();
    }

    /// Rebuilds the group list with `count` empty groups.
    pub fn set_group_count(&mut self, count: usize) {
        self.groups = (1..=count).map(GroupDraft::new).collect();
        self.invalidate_summary();
    }

    pub fn set_group_recommenders(&mut self, position: usize, recommenders: impl IntoIterator<Item = RecommenderId>) -> bool {
        match self.group_mut(position) {
            Some(group) => {
                group.recommenders = recommenders.into_iter().collect();
                true
            }
            None => false,
        }
    }

    pub fn set_group_behavior(&mut self, position: usize, behavior: Option<Behavior>) -> bool {
        match self.group_mut(position) {
            Some(group) => {
                group.behavior = behavior;
                true
            }
            None => false,
        }
    }

    fn group_mut(&mut self, position: usize) -> Option<&mut GroupDraft> {
        self.groups.iter_mut().find(|g| g.index == position)
    }

    pub fn is_creatable(&self) -> bool {
        !self.criteria.is_empty() && self.groups.iter().all(GroupDraft::is_complete)
    }

    /// Stores the preview and marks it valid.
    pub fn apply_summary(&mut self, assignment: &ParticipantAssignment) {
        for group in &mut self.groups {
            group.participants.clear();
        }
        for entry in &assignment.entries {
            if let Some(group) = self.groups.iter_mut().find(|g| g.index == entry.group) {
                group.participants.push(entry.user.clone());
            }
        }
        self.summary_created = true;
    }

    /// Wire form: editable group fields only, never the participant lists.
    pub fn to_request(&self, creator: &str, created: NaiveDate) -> EvaluationRequest {
        EvaluationRequest {
            name: self.name.trim().to_string(),
            from: self.from,
            to: self.to,
            created,
            creator: creator.to_string(),
            composition: self.criteria.iter().copied().collect(),
            groups: self.groups.iter().map(GroupDraft::to_settings).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Assignment;

    #[test]
    fn test_criteria_change_resets_summary() {
        let mut draft = EvaluationDraft::with_groups(2);
        draft.apply_summary(&ParticipantAssignment::default());
        assert!(draft.summary_created());
        let before = draft.revision();
        draft.toggle_criterion(Criterion::Age);
        assert!(!draft.summary_created());
        assert!(draft.revision() > before);

        draft.apply_summary(&ParticipantAssignment::default());
        draft.set_criteria([Criterion::Age]);
        assert!(!draft.summary_created());
    }

    #[test]
    fn test_creatable_requires_complete_groups_and_criteria() {
        let mut draft = EvaluationDraft::with_groups(2);
        draft.set_criteria([Criterion::Gender]);
        assert!(!draft.is_creatable());
        for pos in 1..=2 {
            draft.set_group_recommenders(pos, [RecommenderId(pos as u32)]);
            draft.set_group_behavior(pos, Some(Behavior::Mixed));
        }
        assert!(draft.is_creatable());
        draft.set_group_recommenders(2, Vec::<RecommenderId>::new());
        assert!(!draft.is_creatable());
    }

    #[test]
    fn test_request_omits_participants() {
        let mut draft = EvaluationDraft::with_groups(1);
        draft.name = "  spring ".to_string();
        draft.apply_summary(&ParticipantAssignment {
            entries: vec![Assignment { user: UserSummary { name: "bob".into(), ..Default::default() }, group: 1 }],
        });
        assert_eq!(draft.groups()[0].participants.len(), 1);

        let created = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let request = draft.to_request("admin", created);
        assert_eq!(request.name, "spring");
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire["groups"][0].get("participants").is_none());
    }
}

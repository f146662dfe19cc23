//! Remote collaborator: the backend that owns settings, the recommender
//! catalogue and scheduled evaluations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RemoteResult;
use crate::evaluation::draft::{Criterion, ExistingEvaluation, UserSummary};
use crate::session::Identity;
use crate::settings::{Behavior, RecommenderId, Settings};

mod http;
mod offline;
pub mod retry;

pub use http::HttpRemote;
pub use offline::OfflineRemote;

pub type EvaluationId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommenderFilter {
    Active,
    All,
}

impl RecommenderFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommenderFilter::Active => "active",
            RecommenderFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderSummary {
    pub id: RecommenderId,
    pub name: String,
    pub explanation: String,
    pub tag_distribution: BTreeMap<String, f64>,
}

/// Editable fields of one group as sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(rename = "numGroup")]
    pub index: usize,
    pub recommenders: Vec<RecommenderId>,
    pub behavior: Option<Behavior>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRequest {
    pub name: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub created: NaiveDate,
    pub creator: String,
    pub composition: Vec<Criterion>,
    pub groups: Vec<GroupSettings>,
}

/// Header fields of a scheduled evaluation that may be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationChange {
    #[serde(rename = "evaluationId")]
    pub evaluation_id: EvaluationId,
    pub name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub composition: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub user: UserSummary,
    /// 1-based group position.
    pub group: usize,
}

/// Preview of which user would join which group. The matching itself is
/// done by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantAssignment {
    pub entries: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupDetails {
    #[serde(rename = "numGroup")]
    pub index: usize,
    #[serde(default)]
    pub recommenders: Vec<RecommenderId>,
    #[serde(default)]
    pub behavior: Option<Behavior>,
    #[serde(default)]
    pub participants: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvaluationDetails {
    #[serde(rename = "evaluationId")]
    pub id: EvaluationId,
    pub name: String,
    #[serde(default)]
    pub creator: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub created: Option<NaiveDate>,
    #[serde(default)]
    pub composition: Vec<Criterion>,
    #[serde(default)]
    pub groups: Vec<GroupDetails>,
}

impl EvaluationDetails {
    pub fn group(&self, index: usize) -> Option<&GroupDetails> {
        self.groups.iter().find(|g| g.index == index)
    }

    pub fn summary(&self) -> ExistingEvaluation {
        ExistingEvaluation { id: self.id, name: self.name.clone(), from: self.from, to: self.to }
    }
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fails with `DomainError::BadCredentials` when the pair is unknown.
    async fn login(&self, name: &str, password: &str) -> RemoteResult<Identity>;

    async fn fetch_settings(&self, user: &str) -> RemoteResult<Settings>;
    async fn write_settings(&self, user: &str, settings: &Settings, token: &str) -> RemoteResult<()>;

    async fn fetch_recommender_list(&self, filter: RecommenderFilter) -> RemoteResult<Vec<RecommenderSummary>>;

    async fn create_evaluation(&self, request: &EvaluationRequest) -> RemoteResult<()>;
    async fn fetch_evaluation_summary(&self, request: &EvaluationRequest) -> RemoteResult<ParticipantAssignment>;
    async fn fetch_evaluation_list(&self) -> RemoteResult<Vec<ExistingEvaluation>>;
    async fn fetch_evaluation_details(&self, id: EvaluationId) -> RemoteResult<EvaluationDetails>;

    async fn change_evaluation(&self, change: &EvaluationChange) -> RemoteResult<()>;
    async fn add_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()>;
    async fn change_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()>;
    async fn delete_group(&self, id: EvaluationId, group: usize) -> RemoteResult<()>;
    async fn delete_evaluation(&self, id: EvaluationId) -> RemoteResult<()>;
    async fn move_participant(&self, id: EvaluationId, name: &str, group: usize) -> RemoteResult<()>;
    async fn delete_participant(&self, id: EvaluationId, name: &str) -> RemoteResult<()>;
}

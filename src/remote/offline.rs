//! In-process stand-in for the backend.
//!
//! Keeps users, settings, the recommender catalogue and evaluations in
//! memory. Every call is counted per operation, can be delayed by a fixed
//! latency and can be made to fail once with a scripted error.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::sleep;

use crate::error::{DomainError, RemoteError, RemoteResult, TransportError};
use crate::evaluation::draft::{Criterion, ExistingEvaluation, UserSummary};
use crate::remote::{
    Assignment, EvaluationChange, EvaluationDetails, EvaluationId, EvaluationRequest, GroupDetails, GroupSettings,
    ParticipantAssignment, RecommenderFilter, RecommenderSummary, RemoteService,
};
use crate::session::{create_token, Identity, Participation};
use crate::settings::{Behavior, RecommenderId, Settings};

struct Account {
    password: String,
    identity: Identity,
}

struct Catalogue {
    summary: RecommenderSummary,
    active: bool,
}

#[derive(Default)]
struct OfflineState {
    accounts: BTreeMap<String, Account>,
    settings: HashMap<String, Settings>,
    recommenders: Vec<Catalogue>,
    evaluations: BTreeMap<EvaluationId, EvaluationDetails>,
    next_id: EvaluationId,
}

#[derive(Default)]
pub struct OfflineRemote {
    state: Mutex<OfflineState>,
    calls: Mutex<HashMap<&'static str, u32>>,
    faults: Mutex<HashMap<&'static str, RemoteError>>,
    latency: Option<Duration>,
}

fn internal_error() -> RemoteError {
    TransportError::from_status(500, "Internal Server Error", "").into()
}

fn rejected(reason: &str) -> RemoteError {
    DomainError::Rejected(reason.to_string()).into()
}

impl OfflineRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small data set for running the driver without a backend.
    pub fn seeded() -> Self {
        let date = |m, d| NaiveDate::from_ymd_opt(2030, m, d).unwrap_or_default();
        let admin = Identity { admin: true, ..Identity::new("admin") };
        let listener = Identity { participation: Participation::Invited, ..Identity::new("listener") };
        let defaults = Settings { recommenders: vec![RecommenderId(1), RecommenderId(2)], behavior: Behavior::Mixed };
        Self::new()
            .with_user(admin, "admin")
            .with_user(listener, "listener")
            .with_settings("admin", defaults.clone())
            .with_settings("listener", defaults)
            .with_recommender(1, "Charts", true)
            .with_recommender(2, "Similar Artists", true)
            .with_recommender(3, "Tag Explorer", false)
            .with_evaluation("winter", date(1, 1), date(1, 31))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_user(mut self, identity: Identity, password: &str) -> Self {
        if let Ok(state) = self.state.get_mut() {
            let key = identity.name.to_lowercase();
            state.accounts.insert(key, Account { password: password.to_string(), identity });
        }
        self
    }

    pub fn with_settings(mut self, user: &str, settings: Settings) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.settings.insert(user.to_lowercase(), settings);
        }
        self
    }

    pub fn with_recommender(mut self, id: u32, name: &str, active: bool) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.recommenders.push(Catalogue {
                summary: RecommenderSummary {
                    id: RecommenderId(id),
                    name: name.to_string(),
                    explanation: format!("Recommends via {}.", name.to_lowercase()),
                    tag_distribution: BTreeMap::new(),
                },
                active,
            });
        }
        self
    }

    /// Adds a scheduled evaluation with one empty group.
    pub fn with_evaluation(mut self, name: &str, from: NaiveDate, to: NaiveDate) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.next_id += 1;
            let id = state.next_id;
            state.evaluations.insert(
                id,
                EvaluationDetails {
                    id,
                    name: name.to_string(),
                    creator: "admin".to_string(),
                    from,
                    to,
                    created: None,
                    composition: vec![Criterion::Age],
                    groups: vec![GroupDetails {
                        index: 1,
                        recommenders: vec![RecommenderId(1)],
                        behavior: Some(Behavior::Mixed),
                        participants: Vec::new(),
                    }],
                },
            );
        }
        self
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: RemoteError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(op, err);
        }
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(op).copied())
            .unwrap_or(0)
    }

    pub fn stored_settings(&self, user: &str) -> Option<Settings> {
        self.state.lock().ok()?.settings.get(&user.to_lowercase()).cloned()
    }

    pub fn evaluation(&self, id: EvaluationId) -> Option<EvaluationDetails> {
        self.state.lock().ok()?.evaluations.get(&id).cloned()
    }

    pub fn evaluation_count(&self) -> usize {
        self.state.lock().map(|s| s.evaluations.len()).unwrap_or(0)
    }

    async fn enter(&self, op: &'static str) -> RemoteResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        match self.faults.lock().ok().and_then(|mut faults| faults.remove(op)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn state(&self) -> RemoteResult<MutexGuard<'_, OfflineState>> {
        self.state.lock().map_err(|_| internal_error())
    }
}

impl OfflineState {
    /// Round-robin over non-admin accounts in name order.
    fn assign(&self, groups: usize) -> ParticipantAssignment {
        if groups == 0 {
            return ParticipantAssignment::default();
        }
        let entries = self
            .accounts
            .values()
            .filter(|a| !a.identity.admin)
            .enumerate()
            .map(|(i, account)| Assignment {
                user: UserSummary { name: account.identity.name.clone(), ..Default::default() },
                group: i % groups + 1,
            })
            .collect();
        ParticipantAssignment { entries }
    }

    fn evaluation_mut(&mut self, id: EvaluationId) -> RemoteResult<&mut EvaluationDetails> {
        self.evaluations
            .get_mut(&id)
            .ok_or_else(|| TransportError::from_status(404, "Not Found", "").into())
    }
}

#[async_trait]
impl RemoteService for OfflineRemote {
    async fn login(&self, name: &str, password: &str) -> RemoteResult<Identity> {
        self.enter("login").await?;
        let state = self.state()?;
        match state.accounts.get(&name.to_lowercase()) {
            Some(account) if account.password == password => Ok(account.identity.clone()),
            _ => Err(DomainError::BadCredentials.into()),
        }
    }

    async fn fetch_settings(&self, user: &str) -> RemoteResult<Settings> {
        self.enter("fetch_settings").await?;
        self.state()?
            .settings
            .get(&user.to_lowercase())
            .cloned()
            .ok_or_else(|| rejected("No options are stored for this user."))
    }

    async fn write_settings(&self, user: &str, settings: &Settings, token: &str) -> RemoteResult<()> {
        self.enter("write_settings").await?;
        let key = user.to_lowercase();
        let mut state = self.state()?;
        if let Some(account) = state.accounts.get(&key) {
            if create_token(&account.identity.name, &account.password) != token {
                return Err(DomainError::InvalidToken.into());
            }
        }
        state.settings.insert(key, settings.clone());
        Ok(())
    }

    async fn fetch_recommender_list(&self, filter: RecommenderFilter) -> RemoteResult<Vec<RecommenderSummary>> {
        self.enter("fetch_recommender_list").await?;
        let state = self.state()?;
        Ok(state
            .recommenders
            .iter()
            .filter(|r| filter == RecommenderFilter::All || r.active)
            .map(|r| r.summary.clone())
            .collect())
    }

    async fn create_evaluation(&self, request: &EvaluationRequest) -> RemoteResult<()> {
        self.enter("create_evaluation").await?;
        let (Some(from), Some(to)) = (request.from, request.to) else {
            return Err(rejected("An evaluation needs a start and an end date."));
        };
        let mut state = self.state()?;
        if state.evaluations.values().any(|e| e.name.eq_ignore_ascii_case(&request.name)) {
            return Err(DomainError::NameTaken.into());
        }
        let assignment = state.assign(request.groups.len());
        let groups = request
            .groups
            .iter()
            .map(|g| GroupDetails {
                index: g.index,
                recommenders: g.recommenders.clone(),
                behavior: g.behavior,
                participants: assignment
                    .entries
                    .iter()
                    .filter(|a| a.group == g.index)
                    .map(|a| a.user.clone())
                    .collect(),
            })
            .collect();
        state.next_id += 1;
        let id = state.next_id;
        state.evaluations.insert(
            id,
            EvaluationDetails {
                id,
                name: request.name.clone(),
                creator: request.creator.clone(),
                from,
                to,
                created: Some(request.created),
                composition: request.composition.clone(),
                groups,
            },
        );
        Ok(())
    }

    async fn fetch_evaluation_summary(&self, request: &EvaluationRequest) -> RemoteResult<ParticipantAssignment> {
        self.enter("fetch_evaluation_summary").await?;
        Ok(self.state()?.assign(request.groups.len()))
    }

    async fn fetch_evaluation_list(&self) -> RemoteResult<Vec<ExistingEvaluation>> {
        self.enter("fetch_evaluation_list").await?;
        Ok(self.state()?.evaluations.values().map(EvaluationDetails::summary).collect())
    }

    async fn fetch_evaluation_details(&self, id: EvaluationId) -> RemoteResult<EvaluationDetails> {
        self.enter("fetch_evaluation_details").await?;
        let mut state = self.state()?;
        let details = state.evaluation_mut(id)?.clone();
        Ok(details)
    }

    async fn change_evaluation(&self, change: &EvaluationChange) -> RemoteResult<()> {
        self.enter("change_evaluation").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(change.evaluation_id)?;
        evaluation.name = change.name.clone();
        evaluation.from = change.from;
        evaluation.to = change.to;
        evaluation.composition = change.composition.clone();
        Ok(())
    }

    async fn add_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()> {
        self.enter("add_group").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(id)?;
        if evaluation.group(group.index).is_some() {
            return Err(rejected("This group already exists."));
        }
        evaluation.groups.push(GroupDetails {
            index: group.index,
            recommenders: group.recommenders.clone(),
            behavior: group.behavior,
            participants: Vec::new(),
        });
        Ok(())
    }

    async fn change_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()> {
        self.enter("change_group").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(id)?;
        let target = evaluation
            .groups
            .iter_mut()
            .find(|g| g.index == group.index)
            .ok_or_else(|| rejected("No such group."))?;
        target.recommenders = group.recommenders.clone();
        target.behavior = group.behavior;
        Ok(())
    }

    async fn delete_group(&self, id: EvaluationId, group: usize) -> RemoteResult<()> {
        self.enter("delete_group").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(id)?;
        let before = evaluation.groups.len();
        evaluation.groups.retain(|g| g.index != group);
        if evaluation.groups.len() == before {
            return Err(rejected("No such group."));
        }
        Ok(())
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> RemoteResult<()> {
        self.enter("delete_evaluation").await?;
        let mut state = self.state()?;
        state
            .evaluations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| TransportError::from_status(404, "Not Found", "").into())
    }

    async fn move_participant(&self, id: EvaluationId, name: &str, group: usize) -> RemoteResult<()> {
        self.enter("move_participant").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(id)?;
        if evaluation.group(group).is_none() {
            return Err(rejected("No such group."));
        }
        let mut moved = None;
        for g in &mut evaluation.groups {
            if let Some(pos) = g.participants.iter().position(|p| p.name == name) {
                moved = Some(g.participants.remove(pos));
            }
        }
        let user = moved.ok_or_else(|| rejected("No such participant."))?;
        if let Some(target) = evaluation.groups.iter_mut().find(|g| g.index == group) {
            target.participants.push(user);
        }
        Ok(())
    }

    async fn delete_participant(&self, id: EvaluationId, name: &str) -> RemoteResult<()> {
        self.enter("delete_participant").await?;
        let mut state = self.state()?;
        let evaluation = state.evaluation_mut(id)?;
        let mut removed = false;
        for g in &mut evaluation.groups {
            let before = g.participants.len();
            g.participants.retain(|p| p.name != name);
            removed |= g.participants.len() != before;
        }
        if removed {
            Ok(())
        } else {
            Err(rejected("No such participant."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, groups: usize) -> EvaluationRequest {
        EvaluationRequest {
            name: name.to_string(),
            from: NaiveDate::from_ymd_opt(2031, 1, 1),
            to: NaiveDate::from_ymd_opt(2031, 1, 10),
            created: NaiveDate::from_ymd_opt(2030, 12, 1).unwrap(),
            creator: "admin".to_string(),
            composition: vec![Criterion::Gender],
            groups: (1..=groups)
                .map(|index| GroupSettings { index, recommenders: vec![RecommenderId(1)], behavior: Some(Behavior::Mixed) })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_login_checks_password() {
        let remote = OfflineRemote::seeded();
        assert!(remote.login("Admin", "admin").await.unwrap().is_admin());
        assert_eq!(
            remote.login("admin", "wrong").await,
            Err(RemoteError::Domain(DomainError::BadCredentials))
        );
        assert_eq!(remote.calls("login"), 2);
    }

    #[tokio::test]
    async fn test_fault_fires_once() {
        let remote = OfflineRemote::seeded();
        remote.fail_next("fetch_settings", TransportError::Unreachable.into());
        assert!(remote.fetch_settings("admin").await.is_err());
        assert!(remote.fetch_settings("admin").await.is_ok());
    }

    #[tokio::test]
    async fn test_write_settings_requires_matching_token() {
        let remote = OfflineRemote::seeded();
        let settings = Settings { recommenders: vec![RecommenderId(3)], behavior: Behavior::Dynamic };
        assert_eq!(
            remote.write_settings("admin", &settings, "Basic bogus").await,
            Err(RemoteError::Domain(DomainError::InvalidToken))
        );
        remote.write_settings("admin", &settings, &create_token("admin", "admin")).await.unwrap();
        assert_eq!(remote.stored_settings("admin"), Some(settings));
    }

    #[tokio::test]
    async fn test_active_filter_hides_inactive_recommenders() {
        let remote = OfflineRemote::seeded();
        assert_eq!(remote.fetch_recommender_list(RecommenderFilter::Active).await.unwrap().len(), 2);
        assert_eq!(remote.fetch_recommender_list(RecommenderFilter::All).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_assigns_participants_and_rejects_duplicate_name() {
        let remote = OfflineRemote::seeded();
        remote.create_evaluation(&request("spring", 2)).await.unwrap();
        let created = remote.evaluation(2).unwrap();
        assert_eq!(created.groups.len(), 2);
        assert_eq!(created.groups[0].participants[0].name, "listener");

        assert_eq!(
            remote.create_evaluation(&request("Spring", 1)).await,
            Err(RemoteError::Domain(DomainError::NameTaken))
        );
    }

    #[tokio::test]
    async fn test_group_and_participant_maintenance() {
        let remote = OfflineRemote::seeded();
        remote.create_evaluation(&request("spring", 1)).await.unwrap();
        let group = GroupSettings { index: 2, recommenders: vec![RecommenderId(2)], behavior: Some(Behavior::Weighted) };
        remote.add_group(2, &group).await.unwrap();
        assert!(remote.add_group(2, &group).await.is_err());

        remote.move_participant(2, "listener", 2).await.unwrap();
        let details = remote.evaluation(2).unwrap();
        assert!(details.group(1).unwrap().participants.is_empty());
        assert_eq!(details.group(2).unwrap().participants.len(), 1);

        remote.delete_participant(2, "listener").await.unwrap();
        assert!(remote.delete_participant(2, "listener").await.is_err());
        remote.delete_group(2, 2).await.unwrap();
        remote.delete_evaluation(2).await.unwrap();
        assert!(matches!(
            remote.fetch_evaluation_details(2).await,
            Err(RemoteError::Transport(TransportError::NotFound { .. }))
        ));
    }
}

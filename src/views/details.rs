use std::future::Future;

use chrono::NaiveDate;
use serde_json::json;

use crate::context::AppContext;
use crate::error::{ClientError, ClientResult, RemoteResult};
use crate::evaluation::{Criterion, ScheduleValidator};
use crate::guard::InFlight;
use crate::logging::{log, log_remote_failure, obj, Domain, Level};
use crate::remote::{EvaluationChange, EvaluationDetails, EvaluationId, GroupSettings};
use crate::settings::{Behavior, RecommenderId};

/// One scheduled evaluation with maintenance actions. The router builds a
/// new instance for every visit.
pub struct EvaluationDetailsView {
    generation: u64,
    id: EvaluationId,
    details: Option<EvaluationDetails>,
    sending: InFlight,
}

impl EvaluationDetailsView {
    pub async fn load(ctx: &AppContext, id: EvaluationId, generation: u64) -> ClientResult<Self> {
        let details = ctx.remote().fetch_evaluation_details(id).await?;
        Ok(Self {
            generation,
            id,
            details: Some(details),
            sending: InFlight::new(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn id(&self) -> EvaluationId {
        self.id
    }

    /// `None` once the evaluation was deleted.
    pub fn details(&self) -> Option<&EvaluationDetails> {
        self.details.as_ref()
    }

    pub fn is_sending(&self) -> bool {
        self.sending.is_set()
    }

    /// Runs one remote mutation under the in-flight guard.
    async fn send<Fut>(&self, op: &str, call: Fut) -> ClientResult<()>
    where
        Fut: Future<Output = RemoteResult<()>>,
    {
        let Some(_sending) = self.sending.try_begin() else {
            return Err(ClientError::Busy);
        };
        call.await.map_err(|err| {
            log_remote_failure(op, &err.user_message());
            ClientError::from(err)
        })?;
        log(
            Level::Info,
            Domain::Schedule,
            "evaluation_changed",
            obj(&[("op", json!(op)), ("evaluation", json!(self.id)), ("generation", json!(self.generation))]),
        );
        Ok(())
    }

    async fn reload(&mut self, ctx: &AppContext) -> ClientResult<()> {
        self.details = Some(ctx.remote().fetch_evaluation_details(self.id).await?);
        Ok(())
    }

    pub async fn change_evaluation(
        &mut self,
        ctx: &AppContext,
        name: &str,
        from: NaiveDate,
        to: NaiveDate,
        composition: Vec<Criterion>,
    ) -> ClientResult<()> {
        let errors = ScheduleValidator::validate_change(name, from, to);
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }
        let change = EvaluationChange {
            evaluation_id: self.id,
            name: name.trim().to_string(),
            from,
            to,
            composition,
        };
        self.send("change_evaluation", ctx.remote().change_evaluation(&change)).await?;
        self.reload(ctx).await
    }

    /// Appends a group after the current last one.
    pub async fn add_group(
        &mut self,
        ctx: &AppContext,
        recommenders: Vec<RecommenderId>,
        behavior: Option<Behavior>,
    ) -> ClientResult<()> {
        let errors = ScheduleValidator::validate_group_change(&recommenders, behavior);
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }
        let index = self
            .details
            .as_ref()
            .and_then(|d| d.groups.iter().map(|g| g.index).max())
            .unwrap_or(0)
            + 1;
        let group = GroupSettings { index, recommenders, behavior };
        self.send("add_group", ctx.remote().add_group(self.id, &group)).await?;
        self.reload(ctx).await
    }

    pub async fn change_group(
        &mut self,
        ctx: &AppContext,
        index: usize,
        recommenders: Vec<RecommenderId>,
        behavior: Option<Behavior>,
    ) -> ClientResult<()> {
        let errors = ScheduleValidator::validate_group_change(&recommenders, behavior);
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }
        let group = GroupSettings { index, recommenders, behavior };
        self.send("change_group", ctx.remote().change_group(self.id, &group)).await?;
        self.reload(ctx).await
    }

    pub async fn delete_group(&mut self, ctx: &AppContext, index: usize) -> ClientResult<()> {
        self.send("delete_group", ctx.remote().delete_group(self.id, index)).await?;
        self.reload(ctx).await
    }

    pub async fn delete_evaluation(&mut self, ctx: &AppContext) -> ClientResult<()> {
        self.send("delete_evaluation", ctx.remote().delete_evaluation(self.id)).await?;
        self.details = None;
        Ok(())
    }

    pub async fn move_participant(&mut self, ctx: &AppContext, name: &str, group: usize) -> ClientResult<()> {
        self.send("move_participant", ctx.remote().move_participant(self.id, name, group)).await?;
        self.reload(ctx).await
    }

    pub async fn delete_participant(&mut self, ctx: &AppContext, name: &str) -> ClientResult<()> {
        self.send("delete_participant", ctx.remote().delete_participant(self.id, name)).await?;
        self.reload(ctx).await
    }
}

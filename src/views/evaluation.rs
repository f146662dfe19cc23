use crate::context::AppContext;
use crate::error::{ClientError, ClientResult};
use crate::evaluation::{EvaluationWizard, ExistingEvaluation, Preview, SubmitOutcome, WizardStep};
use crate::logging::log_remote_failure;
use crate::remote::{EvaluationId, RecommenderFilter, RecommenderSummary};

/// Evaluation management page: the history of scheduled evaluations and
/// the wizard for a new one.
pub struct EvaluationView {
    generation: u64,
    catalogue: Vec<RecommenderSummary>,
    history: Vec<ExistingEvaluation>,
    wizard: EvaluationWizard,
    wizards_built: u64,
}

impl EvaluationView {
    pub async fn load(ctx: &AppContext, generation: u64) -> ClientResult<Self> {
        let creator = ctx.user_name().ok_or(ClientError::NoSession)?;
        let catalogue = ctx.remote().fetch_recommender_list(RecommenderFilter::All).await?;
        let history = ctx.remote().fetch_evaluation_list().await?;
        let wizard = EvaluationWizard::new(1, creator, history.clone());
        Ok(Self {
            generation,
            catalogue,
            history,
            wizard,
            wizards_built: 1,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn catalogue(&self) -> &[RecommenderSummary] {
        &self.catalogue
    }

    pub fn history(&self) -> &[ExistingEvaluation] {
        &self.history
    }

    pub fn wizard(&self) -> &EvaluationWizard {
        &self.wizard
    }

    pub fn wizard_mut(&mut self) -> &mut EvaluationWizard {
        &mut self.wizard
    }

    pub async fn next_step(&mut self, ctx: &AppContext) -> (WizardStep, Option<Preview>) {
        self.wizard.advance(ctx.remote(), ctx.today()).await
    }

    pub fn prev_step(&mut self) -> WizardStep {
        self.wizard.prev_step()
    }

    /// Submits the draft. A created evaluation replaces the wizard with a
    /// blank one and refreshes the history it validates against.
    ///
    /// The new range joins the history before the reload, so a failed
    /// reload still leaves it in the disjointness check.
    pub async fn submit(&mut self, ctx: &AppContext) -> ClientResult<SubmitOutcome> {
        let outcome = self.wizard.submit(ctx.remote(), ctx.today()).await;
        if outcome != SubmitOutcome::Created {
            return Ok(outcome);
        }
        let draft = self.wizard.draft();
        if let (Some(from), Some(to)) = (draft.from, draft.to) {
            self.history.push(ExistingEvaluation {
                id: EvaluationId::default(),
                name: draft.name.clone(),
                from,
                to,
            });
        }
        self.wizards_built += 1;
        let creator = self.wizard.creator().to_string();
        self.wizard = EvaluationWizard::new(self.wizards_built, creator, self.history.clone());

        match ctx.remote().fetch_evaluation_list().await {
            Ok(history) => {
                self.history = history;
                self.wizard.set_existing(self.history.clone());
            }
            Err(err) => log_remote_failure("fetch_evaluation_list", &err.user_message()),
        }
        Ok(SubmitOutcome::Created)
    }
}

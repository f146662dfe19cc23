use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::config::Config;
use crate::error::{DomainError, RemoteError, RemoteResult, TransportError};
use crate::evaluation::draft::{ExistingEvaluation, UserSummary};
use crate::logging::{v_str, ProfileScope};
use crate::remote::retry::{with_backoff, Backoff};
use crate::remote::{
    Assignment, EvaluationChange, EvaluationDetails, EvaluationId, EvaluationRequest, GroupSettings,
    ParticipantAssignment, RecommenderFilter, RecommenderSummary, RemoteService,
};
use crate::session::{Identity, Participation};
use crate::settings::{RecommenderId, Settings};

/// Marker the backend returns from `checkLogin` for unknown credentials.
const LOGIN_FAILED: &str = "none";
/// The backend reports the role in the password field of the login reply.
const ADMIN_ROLE: &str = "admin";

pub struct HttpRemote {
    client: Client,
    base: Url,
    backoff: Backoff,
}

impl HttpRemote {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut base = Url::parse(&cfg.service_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base,
            backoff: Backoff::from_config(cfg),
        })
    }

    /// Appends percent-encoded path segments to the service base.
    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Request(format!("{} can not carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, op: &str, request: RequestBuilder) -> RemoteResult<String> {
        let _profile = ProfileScope::with_context("remote_call", &[("op", v_str(op))]);
        let resp = request.send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if status.is_success() {
            Ok(body)
        } else {
            let reason = status.canonical_reason().unwrap_or("Error");
            Err(TransportError::from_status(status.as_u16(), reason, body.trim()).into())
        }
    }

    /// GETs are idempotent and go through the retry helper.
    async fn get_json<T: DeserializeOwned>(&self, op: &str, segments: &[&str]) -> RemoteResult<T> {
        let url = self.endpoint(segments)?;
        let body = with_backoff(&self.backoff, op, || {
            let url = url.clone();
            async move { self.send(op, self.client.get(url)).await }
        })
        .await?;
        decode(&body)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, op: &str, path: &str, body: &B) -> RemoteResult<String> {
        let url = self.endpoint(&[path])?;
        self.send(op, self.client.post(url).json(body)).await
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_builder() {
        TransportError::Request(err.to_string()).into()
    } else if err.is_decode() {
        TransportError::Decode(err.to_string()).into()
    } else {
        // timeouts, refused connections and dropped bodies all look the same
        // to the user: no usable response
        TransportError::Unreachable.into()
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> RemoteResult<T> {
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()).into())
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    name: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    lfmaccount: Option<String>,
    #[serde(default)]
    eval_participant: Option<String>,
    #[serde(default)]
    newcomer: bool,
}

impl WireUser {
    fn into_identity(self) -> Identity {
        let participation = match self.eval_participant.as_deref() {
            Some("Y") => Participation::Active,
            Some("U") => Participation::Invited,
            _ => Participation::None,
        };
        Identity {
            name: self.name.to_lowercase(),
            email: self.email.filter(|e| !e.is_empty()),
            admin: self.password.as_deref() == Some(ADMIN_ROLE),
            participation,
            newcomer: self.newcomer,
            linked_account: self.lfmaccount.filter(|a| !a.is_empty()),
        }
    }
}

#[derive(Deserialize, Debug)]
struct WireRecommender {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "EXPLANATION", default)]
    explanation: String,
    #[serde(rename = "tagDistribution", default)]
    tag_distribution: Option<std::collections::BTreeMap<String, f64>>,
}

#[derive(Serialize)]
struct WireGroup<'a> {
    #[serde(rename = "evaluationId")]
    evaluation_id: EvaluationId,
    #[serde(flatten)]
    group: &'a GroupSettings,
}

fn recommenders_from_wire(raw: HashMap<String, WireRecommender>) -> Vec<RecommenderSummary> {
    let mut list: Vec<RecommenderSummary> = raw
        .into_values()
        .map(|r| RecommenderSummary {
            id: RecommenderId(r.id),
            name: r.name,
            explanation: r.explanation,
            tag_distribution: r.tag_distribution.unwrap_or_default(),
        })
        .collect();
    list.sort_by_key(|r| r.id);
    list
}

/// The preview arrives as a map from a JSON-encoded user record to its group.
fn assignment_from_wire(raw: HashMap<String, usize>) -> RemoteResult<ParticipantAssignment> {
    let mut entries = raw
        .into_iter()
        .map(|(user, group)| -> RemoteResult<Assignment> {
            let user: UserSummary = decode(&user)?;
            Ok(Assignment { user, group })
        })
        .collect::<RemoteResult<Vec<_>>>()?;
    entries.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.user.name.cmp(&b.user.name)));
    Ok(ParticipantAssignment { entries })
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn login(&self, name: &str, password: &str) -> RemoteResult<Identity> {
        let body = self
            .post_json("login", "checkLogin", &json!({ "name": name, "password": password }))
            .await?;
        if body.trim() == LOGIN_FAILED {
            return Err(DomainError::BadCredentials.into());
        }
        let user: WireUser = decode(&body)?;
        Ok(user.into_identity())
    }

    async fn fetch_settings(&self, user: &str) -> RemoteResult<Settings> {
        let settings: Option<Settings> = self.get_json("fetch_settings", &["getOptions", "user", user]).await?;
        settings.ok_or_else(|| DomainError::Rejected("No options are stored for this user.".to_string()).into())
    }

    async fn write_settings(&self, user: &str, settings: &Settings, token: &str) -> RemoteResult<()> {
        let url = self.endpoint(&["updateOptions", "user", user])?;
        let request = self
            .client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(settings);
        self.send("write_settings", request).await.map(|_| ())
    }

    async fn fetch_recommender_list(&self, filter: RecommenderFilter) -> RemoteResult<Vec<RecommenderSummary>> {
        let raw: HashMap<String, WireRecommender> = self
            .get_json("fetch_recommender_list", &["getRecommenders", "filter", filter.as_str()])
            .await?;
        Ok(recommenders_from_wire(raw))
    }

    async fn create_evaluation(&self, request: &EvaluationRequest) -> RemoteResult<()> {
        let url = self.endpoint(&["createEvaluation"])?;
        self.send("create_evaluation", self.client.put(url).json(request)).await.map(|_| ())
    }

    async fn fetch_evaluation_summary(&self, request: &EvaluationRequest) -> RemoteResult<ParticipantAssignment> {
        let body = self.post_json("fetch_evaluation_summary", "getEvaluationSummary", request).await?;
        assignment_from_wire(decode(&body)?)
    }

    async fn fetch_evaluation_list(&self) -> RemoteResult<Vec<ExistingEvaluation>> {
        self.get_json("fetch_evaluation_list", &["getEvaluationHistory"]).await
    }

    async fn fetch_evaluation_details(&self, id: EvaluationId) -> RemoteResult<EvaluationDetails> {
        let id = id.to_string();
        self.get_json("fetch_evaluation_details", &["getEvaluation", "id", &id]).await
    }

    async fn change_evaluation(&self, change: &EvaluationChange) -> RemoteResult<()> {
        self.post_json("change_evaluation", "changeEvaluation", change).await.map(|_| ())
    }

    async fn add_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()> {
        let body = WireGroup { evaluation_id: id, group };
        self.post_json("add_group", "addGroup", &body).await.map(|_| ())
    }

    async fn change_group(&self, id: EvaluationId, group: &GroupSettings) -> RemoteResult<()> {
        let body = WireGroup { evaluation_id: id, group };
        self.post_json("change_group", "changeGroup", &body).await.map(|_| ())
    }

    async fn delete_group(&self, id: EvaluationId, group: usize) -> RemoteResult<()> {
        let body = [id.to_string(), group.to_string()];
        self.post_json("delete_group", "deleteGroup", &body).await.map(|_| ())
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> RemoteResult<()> {
        self.post_json("delete_evaluation", "deleteEvaluation", &id).await.map(|_| ())
    }

    async fn move_participant(&self, id: EvaluationId, name: &str, group: usize) -> RemoteResult<()> {
        let body = [id.to_string(), group.to_string(), name.to_string()];
        self.post_json("move_participant", "moveParticipant", &body).await.map(|_| ())
    }

    async fn delete_participant(&self, id: EvaluationId, name: &str) -> RemoteResult<()> {
        let body = [id.to_string(), name.to_string()];
        self.post_json("delete_participant", "deleteParticipant", &body).await.map(|_| ())
    }
}

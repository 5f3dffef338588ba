//! Outbound record sink backed by Grist documents.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::GristConfig;

pub const SIGNUP_TABLE: &str = "inscriptions_pilote";
pub const PILOT_GROUP_TABLE: &str = "Formulaire_Groupe_Pilote";

const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Column name to cell value.
pub type RecordFields = BTreeMap<String, String>;

/// Destination of form submissions. Returns the id of the created row.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn add_record(&self, table: &str, fields: &RecordFields) -> Result<u64, GristError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GristError {
    #[error("Grist API key or document id is not configured")]
    NotConfigured,
    #[error("Grist request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Grist answered {status}: {detail}")]
    Upstream { status: u16, detail: String },
    #[error("Grist rejected the record ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("Grist returned no row id")]
    NoRowReturned,
}

impl GristError {
    /// Connection failures, timeouts and 5xx answers are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            GristError::Transport(err) => err.is_timeout() || err.is_connect(),
            GristError::Upstream { .. } => true,
            GristError::NotConfigured | GristError::Rejected { .. } | GristError::NoRowReturned => {
                false
            }
        }
    }

    /// Message shown to the person submitting the form.
    pub fn user_message(&self, table: &str) -> String {
        match self {
            GristError::NotConfigured => {
                "Erreur de configuration serveur. Veuillez réessayer plus tard ou nous contacter."
                    .to_string()
            }
            GristError::NoRowReturned => "Échec de l'enregistrement de l'inscription (service distant). Veuillez réessayer plus tard ou nous contacter.".to_string(),
            GristError::Rejected { status: 404, detail } => format!(
                "Erreur service distant: Ressource non trouvée ({detail}). Vérifiez le nom de la table ('{table}') ou l'ID du document."
            ),
            GristError::Rejected { status: 400, detail } => {
                format!("Erreur service distant: Données invalides ({detail}).")
            }
            GristError::Rejected { status, detail } | GristError::Upstream { status, detail } => {
                format!(
                    "Erreur service distant ({status}): {detail}. Veuillez réessayer plus tard ou nous contacter."
                )
            }
            GristError::Transport(err) => format!(
                "Échec du traitement de l'inscription: {err}. Veuillez réessayer plus tard ou nous contacter."
            ),
        }
    }
}

#[derive(Serialize)]
struct AddRecordsRequest<'a> {
    records: [NewRecord<'a>; 1],
}

#[derive(Serialize)]
struct NewRecord<'a> {
    fields: &'a RecordFields,
}

#[derive(Deserialize)]
struct AddRecordsResponse {
    #[serde(default)]
    records: Vec<CreatedRecord>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    id: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// REST client adding rows to one Grist document.
#[derive(Clone)]
pub struct GristClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    doc_id: Option<String>,
}

impl GristClient {
    pub fn new(config: &GristConfig, doc_id: Option<String>) -> Result<Self, GristError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            doc_id,
        })
    }

    async fn post_once(
        &self,
        api_key: &str,
        url: &str,
        fields: &RecordFields,
    ) -> Result<u64, GristError> {
        let body = AddRecordsRequest {
            records: [NewRecord { fields }],
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&raw)
                .map(|body| body.error)
                .unwrap_or(raw);
            return Err(classify(status, detail));
        }

        let created: AddRecordsResponse = response.json().await?;
        created
            .records
            .first()
            .map(|record| record.id)
            .ok_or(GristError::NoRowReturned)
    }
}

fn classify(status: StatusCode, detail: String) -> GristError {
    if status.is_server_error() {
        GristError::Upstream {
            status: status.as_u16(),
            detail,
        }
    } else {
        GristError::Rejected {
            status: status.as_u16(),
            detail,
        }
    }
}

#[async_trait]
impl RecordSink for GristClient {
    async fn add_record(&self, table: &str, fields: &RecordFields) -> Result<u64, GristError> {
        let (Some(api_key), Some(doc_id)) = (self.api_key.as_deref(), self.doc_id.as_deref())
        else {
            return Err(GristError::NotConfigured);
        };
        let url = format!("{}/api/docs/{doc_id}/tables/{table}/records", self.base_url);

        match self.post_once(api_key, &url, fields).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(%table, error = %err, "Grist call failed, retrying once");
                tokio::time::sleep(RETRY_DELAY).await;
                self.post_once(api_key, &url, fields).await
            }
            result => result,
        }
    }
}

/// Sink keeping records in memory, used in development and tests.
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    next_id: AtomicU64,
    records: Mutex<Vec<(String, RecordFields)>>,
}

impl InMemoryRecordSink {
    pub fn records(&self) -> Vec<(String, RecordFields)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn add_record(&self, table: &str, fields: &RecordFields) -> Result<u64, GristError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((table.to_string(), fields.clone()));
        tracing::info!(%table, row_id = id, "record stored in memory");
        Ok(id)
    }
}

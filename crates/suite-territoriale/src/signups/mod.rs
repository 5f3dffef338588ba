//! Pending signups awaiting account activation.

use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::loader::{empty_string_as_none, open_path, rows, split_codes};
use crate::directory::LoadError;

/// Activation codes stay usable this many days after the signup.
pub const CODE_VALIDITY_DAYS: i64 = 15;
/// Export of the signups table, looked up next to the directory dumps by default.
pub const SIGNUPS_FILE: &str = "signups.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRecord {
    pub siret: String,
    pub first_name: String,
    pub last_name: String,
    pub job_title: Option<String>,
    pub email: String,
    pub secret_code: String,
    pub org_name: String,
    pub commune_slug: String,
    pub website_domain: Option<String>,
    #[serde(default)]
    pub rcpnt: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SignupRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.created_at > now - Duration::days(CODE_VALIDITY_DAYS)
    }
}

/// Storage of signups so the activation flow can be exercised in isolation.
pub trait SignupStore: Send + Sync {
    /// Most recent signup for `siret` still inside the validity window.
    fn latest_for(
        &self,
        siret: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SignupRecord>, SignupStoreError>;
    fn insert(&self, record: SignupRecord) -> Result<(), SignupStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignupStoreError {
    #[error("signup store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct InMemorySignupStore {
    records: Mutex<Vec<SignupRecord>>,
}

impl InMemorySignupStore {
    pub fn new(records: Vec<SignupRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads a signups export (header row, `rcpnt` as a `;`-separated list, RFC 3339 `created_at`).
pub fn load_signups(path: &Path) -> Result<InMemorySignupStore, LoadError> {
    let file = open_path(path.to_path_buf())?;
    let store = signups_from_reader(file)?;
    tracing::info!(signups = store.len(), path = %path.display(), "signups loaded");
    Ok(store)
}

pub fn signups_from_reader<R: Read>(reader: R) -> Result<InMemorySignupStore, LoadError> {
    let records = rows::<SignupRow, _>(reader, SIGNUPS_FILE)?
        .into_iter()
        .map(SignupRecord::from)
        .collect();
    Ok(InMemorySignupStore::new(records))
}

#[derive(Debug, Deserialize)]
struct SignupRow {
    siret: String,
    first_name: String,
    last_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    job_title: Option<String>,
    email: String,
    secret_code: String,
    org_name: String,
    commune_slug: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    website_domain: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rcpnt: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SignupRow> for SignupRecord {
    fn from(row: SignupRow) -> Self {
        Self {
            rcpnt: split_codes(row.rcpnt.as_deref()),
            siret: row.siret,
            first_name: row.first_name,
            last_name: row.last_name,
            job_title: row.job_title,
            email: row.email,
            secret_code: row.secret_code,
            org_name: row.org_name,
            commune_slug: row.commune_slug,
            website_domain: row.website_domain,
            created_at: row.created_at,
        }
    }
}

impl SignupStore for InMemorySignupStore {
    fn latest_for(
        &self,
        siret: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SignupRecord>, SignupStoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|record| record.siret == siret && record.is_fresh(now))
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    fn insert(&self, record: SignupRecord) -> Result<(), SignupStoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use suite_territoriale::config::{AppConfig, DirectoryConfig, GristConfig};
use suite_territoriale::directory::{load_directory, InMemoryDirectory, OrganizationDirectory};
use suite_territoriale::error::AppError;
use suite_territoriale::grist::{GristClient, RecordSink};
use suite_territoriale::signups::{load_signups, InMemorySignupStore};
use suite_territoriale::stats::OrganizationStatistics;
use suite_territoriale::telemetry::ErrorReporter;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) directory: Arc<dyn OrganizationDirectory>,
    pub(crate) statistics: Arc<dyn OrganizationStatistics>,
    pub(crate) onboarding_open: bool,
}

/// Loads the CSV dumps when a data directory is configured, otherwise starts empty.
pub(crate) fn directory_from_config(config: &AppConfig) -> Result<Arc<InMemoryDirectory>, AppError> {
    let directory = match &config.directory.data_dir {
        Some(dir) => load_directory(dir)?,
        None => {
            warn!("DIRECTORY_DATA_DIR not set, serving an empty directory");
            InMemoryDirectory::default()
        }
    };
    info!(
        organizations = directory.organization_count(),
        structures = directory.structure_count(),
        "directory ready"
    );
    Ok(Arc::new(directory))
}

/// Pending signups used by the activation form. An explicit `SIGNUPS_FILE` must exist; the
/// default `signups.csv` next to the directory dumps is optional.
pub(crate) fn signup_store_from_config(
    config: &DirectoryConfig,
) -> Result<Arc<InMemorySignupStore>, AppError> {
    let Some(path) = config.signups_path() else {
        warn!("no signups export configured, activation codes cannot be validated");
        return Ok(Arc::new(InMemorySignupStore::default()));
    };

    if config.signups_file.is_none() && !path.exists() {
        warn!(path = %path.display(), "signups export not found, activation codes cannot be validated");
        return Ok(Arc::new(InMemorySignupStore::default()));
    }

    Ok(Arc::new(load_signups(&path)?))
}

/// Grist sinks for the signup and pilot-group documents. Missing credentials are reported
/// on each submission rather than at startup.
pub(crate) fn record_sinks(
    config: &GristConfig,
) -> Result<(Arc<dyn RecordSink>, Arc<dyn RecordSink>), AppError> {
    if config.api_key.is_none() {
        warn!("GRIST_API_KEY not set, form submissions will fail");
    }
    let signup = GristClient::new(config, config.signup_doc_id.clone())?;
    let pilot = GristClient::new(config, config.pilot_doc_id.clone())?;
    Ok((Arc::new(signup), Arc::new(pilot)))
}

/// Reporter handle kept by the server so it can be flushed on shutdown.
pub(crate) struct ReporterGuard(pub(crate) Arc<dyn ErrorReporter>);

impl Drop for ReporterGuard {
    fn drop(&mut self) {
        self.0.flush();
    }
}

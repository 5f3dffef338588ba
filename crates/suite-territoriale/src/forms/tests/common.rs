use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::RateLimitConfig;
use crate::directory::{
    InMemoryDirectory, MutualizationStructure, Organization, OrganizationKind,
};
use crate::forms::{
    forms_router, ActivationService, FormLimiters, PilotGroupRequest, RegistrationService,
    SignupRequest,
};
use crate::grist::{GristError, InMemoryRecordSink, RecordFields, RecordSink};
use crate::signups::{InMemorySignupStore, SignupRecord};
use crate::telemetry::{ErrorReporter, ReportLevel};

pub(super) const COMMUNE_SIRET: &str = "21010001600013";
pub(super) const EPCI_SIRET: &str = "20004067900012";

pub(super) fn commune() -> Organization {
    Organization {
        siret: COMMUNE_SIRET.to_string(),
        siren: "210100016".to_string(),
        kind: OrganizationKind::Commune,
        name: "L'Abergement-Clémenciat".to_string(),
        slug: "l-abergement-clemenciat".to_string(),
        insee_geo: Some("01001".to_string()),
        insee_dep: Some("01".to_string()),
        insee_reg: Some("84".to_string()),
        zipcode: Some("01400".to_string()),
        population: 859,
        website_url: Some("https://www.abergement.fr".to_string()),
        website_domain: Some("abergement.fr".to_string()),
        rcpnt: vec!["1.1".to_string(), "1.2".to_string()],
        email_official: None,
        st_eligible: true,
        st_active: false,
        service_public_url: None,
    }
}

pub(super) fn epci() -> Organization {
    Organization {
        siret: EPCI_SIRET.to_string(),
        siren: "200040679".to_string(),
        kind: OrganizationKind::Epci,
        name: "CC de la Dombes".to_string(),
        slug: "cc-de-la-dombes".to_string(),
        insee_geo: None,
        insee_dep: Some("01".to_string()),
        insee_reg: Some("84".to_string()),
        zipcode: None,
        population: 39_000,
        website_url: None,
        website_domain: None,
        rcpnt: Vec::new(),
        email_official: None,
        st_eligible: true,
        st_active: false,
        service_public_url: None,
    }
}

pub(super) fn siea() -> MutualizationStructure {
    MutualizationStructure {
        id: "131".to_string(),
        name: "Syndicat intercommunal d'énergie et de e-communication de l'Ain".to_string(),
        shortname: Some("SIEA".to_string()),
        kind: "Syndicat mixte".to_string(),
        website: Some("https://www.siea.fr".to_string()),
    }
}

pub(super) fn directory() -> Arc<InMemoryDirectory> {
    let directory = InMemoryDirectory::builder()
        .organization(commune())
        .organization(epci())
        .structure(siea())
        .link(COMMUNE_SIRET, "131")
        .expect("link registered")
        .build();
    Arc::new(directory)
}

pub(super) fn signup_request() -> SignupRequest {
    SignupRequest {
        siret: Some(COMMUNE_SIRET.to_string()),
        postal_code: Some("01400".to_string()),
        name: Some("Camille Martin".to_string()),
        role: Some("Maire".to_string()),
        email: Some("maire@abergement.fr".to_string()),
        phone: Some("0474000000".to_string()),
        is_adherent: Some("no".to_string()),
        precisions: Some("Pas encore d'outils collaboratifs".to_string()),
        contact_preferences_details: None,
        cgu_accepted: Some("yes".to_string()),
        structure_id: None,
    }
}

pub(super) fn pilot_request() -> PilotGroupRequest {
    PilotGroupRequest {
        siret: Some(COMMUNE_SIRET.to_string()),
        postal_code: Some("01400".to_string()),
        name: Some("Camille Martin".to_string()),
        role: Some("Secrétaire de mairie".to_string()),
        email: Some("mairie@abergement.fr".to_string()),
        phone: Some("0474000000".to_string()),
        is_adherent: Some("yes".to_string()),
        precisions: None,
        cgu_accepted: Some("yes".to_string()),
        structure_id: Some("131".to_string()),
    }
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap()
}

pub(super) fn pending_signup(created_at: DateTime<Utc>) -> SignupRecord {
    SignupRecord {
        siret: COMMUNE_SIRET.to_string(),
        first_name: "Camille".to_string(),
        last_name: "Martin".to_string(),
        job_title: Some("Maire".to_string()),
        email: "maire@abergement.fr".to_string(),
        secret_code: "K7Q2X9".to_string(),
        org_name: "L'Abergement-Clémenciat".to_string(),
        commune_slug: "l-abergement-clemenciat".to_string(),
        website_domain: Some("abergement.fr".to_string()),
        rcpnt: vec!["1.1".to_string(), "1.2".to_string()],
        created_at,
    }
}

/// Reporter keeping captured events for assertions.
#[derive(Default)]
pub(super) struct RecordingReporter {
    pub(super) events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub(super) fn events(&self) -> Vec<String> {
        self.events.lock().expect("reporter mutex poisoned").clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture_message(&self, level: ReportLevel, message: &str, _extra: &Value) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(format!("{level:?}: {message}"));
    }

    fn capture_error(&self, error: &(dyn std::error::Error + 'static), _extra: &Value) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(format!("error: {error}"));
    }
}

/// Sink failing every call with the configured error.
pub(super) struct FailingSink(pub(super) fn() -> GristError);

#[async_trait]
impl RecordSink for FailingSink {
    async fn add_record(&self, _table: &str, _fields: &RecordFields) -> Result<u64, GristError> {
        Err((self.0)())
    }
}

pub(super) struct Harness {
    pub(super) registration: Arc<RegistrationService<InMemoryDirectory, InMemoryRecordSink>>,
    pub(super) activation: Arc<ActivationService<InMemorySignupStore>>,
    pub(super) signup_sink: Arc<InMemoryRecordSink>,
    pub(super) pilot_sink: Arc<InMemoryRecordSink>,
    pub(super) signups: Arc<InMemorySignupStore>,
    pub(super) reporter: Arc<RecordingReporter>,
}

pub(super) fn harness() -> Harness {
    let signup_sink = Arc::new(InMemoryRecordSink::default());
    let pilot_sink = Arc::new(InMemoryRecordSink::default());
    let signups = Arc::new(InMemorySignupStore::default());
    let reporter = Arc::new(RecordingReporter::default());
    let registration = Arc::new(RegistrationService::new(
        directory(),
        signup_sink.clone(),
        pilot_sink.clone(),
        reporter.clone(),
    ));
    let activation = Arc::new(ActivationService::new(signups.clone(), reporter.clone()));
    Harness {
        registration,
        activation,
        signup_sink,
        pilot_sink,
        signups,
        reporter,
    }
}

pub(super) fn limits(per_hour: u32) -> RateLimitConfig {
    let quota = NonZeroU32::new(per_hour).expect("non-zero quota");
    RateLimitConfig {
        signup_per_hour: quota,
        pilot_per_hour: quota,
        activate_per_hour: quota,
    }
}

pub(super) fn router(harness: &Harness, per_hour: u32) -> axum::Router {
    forms_router(
        harness.registration.clone(),
        harness.activation.clone(),
        FormLimiters::from_config(&limits(per_hour)),
    )
}

pub(super) fn post_json(path: &str, client: &str, body: &Value) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(serde_json::to_vec(body).expect("json body")))
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

use crate::infra::AppState;
use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use suite_territoriale::directory::{OrganizationKind, SearchFilter, DEFAULT_SEARCH_LIMIT};
use suite_territoriale::onboarding::{onboarding_page, OnboardingPage, OnboardingQuery};
use suite_territoriale::stats::{parse_refs, StatsScope, DEFAULT_REFS};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchRequest {
    #[serde(default)]
    pub(crate) q: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatsQuery {
    pub(crate) scope: Option<String>,
    pub(crate) refs: Option<String>,
    pub(crate) dep: Option<String>,
    pub(crate) format: Option<String>,
}

/// Public routes plus the form endpoints, sharing `state` through an extension.
pub(crate) fn app_router(state: AppState, forms: Router) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/communes/search", post(search_endpoint))
        .route("/api/communes/:siret", get(commune_endpoint))
        .route("/bienvenue/:siret", get(onboarding_endpoint))
        .route("/api/rcpnt/stats", get(rcpnt_stats_endpoint))
        .merge(forms)
        .layer(Extension(state))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn commune_endpoint(
    Extension(state): Extension<AppState>,
    Path(siret): Path<String>,
) -> Response {
    match state.directory.find_with_structures(siret.trim()) {
        Ok(Some(commune)) => (StatusCode::OK, Json(commune)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Organization not found" })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(%siret, error = %err, "organization lookup failed");
            internal_error()
        }
    }
}

pub(crate) async fn search_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let Some(query) = request.q.as_deref().filter(|q| !q.trim().is_empty()) else {
        return bad_request("Query parameter is required");
    };

    let filter = SearchFilter::parse(request.kind.as_deref());
    match state.directory.search(query, filter, DEFAULT_SEARCH_LIMIT) {
        Ok(hits) => (StatusCode::OK, Json(hits)).into_response(),
        Err(err) => {
            tracing::error!(%query, error = %err, "organization search failed");
            internal_error()
        }
    }
}

pub(crate) async fn onboarding_endpoint(
    Extension(state): Extension<AppState>,
    Path(siret): Path<String>,
    Query(query): Query<OnboardingQuery>,
) -> Json<OnboardingPage> {
    Json(onboarding_page(
        state.directory.as_ref(),
        &siret,
        &query,
        state.onboarding_open,
    ))
}

/// Criteria counts per scope, or the organizations of one department for the `list-*` scopes.
pub(crate) async fn rcpnt_stats_endpoint(
    Extension(state): Extension<AppState>,
    Query(query): Query<StatsQuery>,
) -> Response {
    if query.format.as_deref().unwrap_or("json") != "json" {
        return bad_request("Invalid format");
    }

    let scope = query.scope.as_deref().unwrap_or("global");
    let listed = match scope {
        "list-commune" => Some(OrganizationKind::Commune),
        "list-epci" => Some(OrganizationKind::Epci),
        _ => None,
    };

    let result = if let Some(kind) = listed {
        let Some(dep) = query.dep.as_deref().filter(|dep| !dep.trim().is_empty()) else {
            return bad_request("Department parameter (dep) is required when scope=list-*");
        };
        state
            .statistics
            .department_list(kind, dep.trim())
            .map(|entries| Json(entries).into_response())
    } else {
        let Some(scope) = StatsScope::parse(scope) else {
            return bad_request("Invalid scope");
        };
        let refs = parse_refs(query.refs.as_deref().unwrap_or(DEFAULT_REFS));
        state
            .statistics
            .criteria_stats(scope, &refs)
            .map(|stats| Json(stats).into_response())
    };

    match result {
        Ok(mut response) => {
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("public, s-maxage=3600"),
            );
            response
        }
        Err(err) => {
            tracing::error!(%scope, error = %err, "statistics query failed");
            internal_error()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::num::NonZeroU32;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use suite_territoriale::config::RateLimitConfig;
    use suite_territoriale::directory::{
        InMemoryDirectory, MutualizationStructure, Organization, OrganizationKind,
    };
    use suite_territoriale::forms::{
        forms_router, ActivationService, FormLimiters, RegistrationService,
    };
    use suite_territoriale::grist::InMemoryRecordSink;
    use suite_territoriale::signups::InMemorySignupStore;
    use suite_territoriale::telemetry::TracingReporter;
    use tower::ServiceExt;

    fn organization(siret: &str, name: &str, zipcode: &str, population: u32) -> Organization {
        Organization {
            siret: siret.to_string(),
            siren: siret[..9].to_string(),
            kind: OrganizationKind::Commune,
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            insee_geo: None,
            insee_dep: Some(zipcode[..2].to_string()),
            insee_reg: None,
            zipcode: Some(zipcode.to_string()),
            population,
            website_url: None,
            website_domain: None,
            rcpnt: Vec::new(),
            email_official: None,
            st_eligible: true,
            st_active: false,
            service_public_url: None,
        }
    }

    fn directory() -> Arc<InMemoryDirectory> {
        let directory = InMemoryDirectory::builder()
            .organization(organization("21010001600013", "Abergement", "01400", 859))
            .organization(organization("21010053000012", "Bourg en Bresse", "01000", 41_365))
            .structure(MutualizationStructure {
                id: "131".to_string(),
                name: "Syndicat intercommunal d'énergie et de e-communication de l'Ain"
                    .to_string(),
                shortname: Some("SIEA".to_string()),
                kind: "Syndicat mixte".to_string(),
                website: None,
            })
            .link("21010053000012", "131")
            .expect("link registered")
            .build();
        Arc::new(directory)
    }

    fn app(onboarding_open: bool, ready: bool) -> Router {
        let directory = directory();
        let sink = Arc::new(InMemoryRecordSink::default());
        let registration = Arc::new(RegistrationService::new(
            directory.clone(),
            sink.clone(),
            sink,
            Arc::new(TracingReporter),
        ));
        let activation = Arc::new(ActivationService::new(
            Arc::new(InMemorySignupStore::default()),
            Arc::new(TracingReporter),
        ));
        let quota = NonZeroU32::new(5).expect("non-zero");
        let limiters = FormLimiters::from_config(&RateLimitConfig {
            signup_per_hour: quota,
            pilot_per_hour: quota,
            activate_per_hour: quota,
        });

        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            directory: directory.clone(),
            statistics: directory,
            onboarding_open,
        };
        app_router(state, forms_router(registration, activation, limiters))
    }

    async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request builds")
    }

    fn search(body: Value) -> Request<Body> {
        Request::post("/api/communes/search")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn readiness_reflects_startup_state() {
        let response = app(true, false).oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json_body(response).await["status"], "initializing");

        let response = app(true, true).oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(true, true).oneshot(get("/health")).await.unwrap();
        assert_eq!(read_json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn commune_endpoint_returns_structures_or_404() {
        let response = app(true, true)
            .oneshot(get("/api/communes/21010053000012"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["name"], "Bourg en Bresse");
        assert_eq!(body["type"], "commune");
        assert_eq!(body["structures"][0]["id"], "131");

        let response = app(true, true)
            .oneshot(get("/api/communes/00000000000000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            read_json_body(response).await,
            json!({ "error": "Organization not found" })
        );
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let response = app(true, true)
            .oneshot(search(json!({ "q": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(true, true)
            .oneshot(search(json!({ "q": "bourg", "type": "commune" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let hits = read_json_body(response).await;
        assert_eq!(hits.as_array().map(Vec::len), Some(1));
        assert_eq!(hits[0]["siret"], "21010053000012");
    }

    #[tokio::test]
    async fn welcome_page_resolves_onboarding_case() {
        let response = app(true, true)
            .oneshot(get("/bienvenue/21010001600013"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["onboardingCase"], "UNIQUE_CODE_REQUEST");
        assert_eq!(body["population"], 859);
        assert_eq!(body["view"], "unique-code-request");

        let response = app(true, true)
            .oneshot(get(
                "/bienvenue/21010053000012?structureId=131&isExistingMember=true",
            ))
            .await
            .unwrap();
        let body = read_json_body(response).await;
        assert_eq!(body["onboardingCase"], "CONTACT_US");
        assert_eq!(body["isExistingMember"], true);
    }

    #[tokio::test]
    async fn closed_onboarding_shows_coming_soon_unless_previewed() {
        let response = app(false, true)
            .oneshot(get("/bienvenue/21010053000012"))
            .await
            .unwrap();
        assert_eq!(read_json_body(response).await["onboardingCase"], "COMING_SOON");

        let response = app(false, true)
            .oneshot(get("/bienvenue/21010053000012?futur=1"))
            .await
            .unwrap();
        assert_eq!(read_json_body(response).await["onboardingCase"], "OPSN_CHOICE");
    }

    #[tokio::test]
    async fn form_routes_are_mounted() {
        let response = app(true, true)
            .oneshot(get("/api/communes/signup"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn statistics_list_department_and_count_criteria() {
        let response = app(true, true)
            .oneshot(get("/api/rcpnt/stats?scope=list-commune&dep=01"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, s-maxage=3600"
        );
        let rows = read_json_body(response).await;
        assert_eq!(rows[0]["name"], "Abergement");
        assert_eq!(rows[1]["name"], "Bourg en Bresse");
        assert_eq!(rows[1]["pop"], 41_365);

        let response = app(true, true)
            .oneshot(get("/api/rcpnt/stats?refs=1.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json_body(response).await,
            json!({
                "global": [{
                    "ref": "1.1",
                    "valid": 0,
                    "total": 2,
                    "valid_pop": 0,
                    "total_pop": 42_224,
                }]
            })
        );
    }

    #[tokio::test]
    async fn statistics_reject_bad_parameters() {
        for (uri, message) in [
            (
                "/api/rcpnt/stats?scope=list-epci",
                "Department parameter (dep) is required when scope=list-*",
            ),
            ("/api/rcpnt/stats?scope=commune", "Invalid scope"),
            ("/api/rcpnt/stats?format=csv", "Invalid format"),
        ] {
            let response = app(true, true).oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(read_json_body(response).await, json!({ "error": message }));
        }
    }
}

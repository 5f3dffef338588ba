use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{post, MethodRouter},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use super::activation::ActivationRequest;
use super::registration::{PilotGroupRequest, SignupRequest};
use super::service::{
    Activation, ActivationError, ActivationService, RegistrationError, RegistrationService,
};
use crate::config::RateLimitConfig;
use crate::directory::OrganizationDirectory;
use crate::grist::RecordSink;
use crate::ratelimit::{enforce, ClientIp, ClientRateLimiter};
use crate::signups::SignupStore;

pub const SIGNUP_PATH: &str = "/api/communes/signup";
pub const PILOT_GROUP_PATH: &str = "/api/communes/groupe-pilote";
pub const ACTIVATE_PATH: &str = "/api/communes/activate";

pub const REGISTRATION_SUCCESS_MESSAGE: &str = "Inscription réussie !";
pub const INVALID_BODY_MESSAGE: &str = "Données de requête invalides.";

/// One limiter per form endpoint.
#[derive(Clone)]
pub struct FormLimiters {
    pub signup: Arc<ClientRateLimiter>,
    pub pilot: Arc<ClientRateLimiter>,
    pub activate: Arc<ClientRateLimiter>,
}

impl FormLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            signup: Arc::new(ClientRateLimiter::per_hour(config.signup_per_hour)),
            pilot: Arc::new(ClientRateLimiter::per_hour(config.pilot_per_hour)),
            activate: Arc::new(ClientRateLimiter::per_hour(config.activate_per_hour)),
        }
    }

    pub fn all(&self) -> Vec<Arc<ClientRateLimiter>> {
        vec![
            self.signup.clone(),
            self.pilot.clone(),
            self.activate.clone(),
        ]
    }
}

/// Router exposing the signup, pilot-group and activation form endpoints.
pub fn forms_router<D, S, St>(
    registration: Arc<RegistrationService<D, S>>,
    activation: Arc<ActivationService<St>>,
    limiters: FormLimiters,
) -> Router
where
    D: OrganizationDirectory + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
    St: SignupStore + ?Sized + 'static,
{
    let registration_routes = Router::new()
        .route(
            SIGNUP_PATH,
            limited(post(signup_handler::<D, S>), &limiters.signup),
        )
        .route(
            PILOT_GROUP_PATH,
            limited(post(pilot_group_handler::<D, S>), &limiters.pilot),
        )
        .with_state(registration);

    let activation_routes = Router::new()
        .route(
            ACTIVATE_PATH,
            limited(post(activate_handler::<St>), &limiters.activate),
        )
        .with_state(activation);

    registration_routes.merge(activation_routes)
}

/// Wrong methods answer 405 before the quota is touched.
fn limited<T>(route: MethodRouter<T>, limiter: &Arc<ClientRateLimiter>) -> MethodRouter<T>
where
    T: Clone + Send + Sync + 'static,
{
    route
        .fallback(method_not_allowed)
        .route_layer(from_fn_with_state(limiter.clone(), enforce))
}

pub(crate) async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(json!({
            "success": false,
            "message": format!("Méthode {method} non autorisée"),
        })),
    )
        .into_response()
}

pub(crate) async fn signup_handler<D, S>(
    State(service): State<Arc<RegistrationService<D, S>>>,
    ClientIp(client): ClientIp,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Response
where
    D: OrganizationDirectory + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_body(rejection),
    };
    match service.sign_up(request, &client, Utc::now()).await {
        Ok(row_id) => created(row_id),
        Err(err) => registration_failure(err),
    }
}

pub(crate) async fn pilot_group_handler<D, S>(
    State(service): State<Arc<RegistrationService<D, S>>>,
    ClientIp(client): ClientIp,
    body: Result<Json<PilotGroupRequest>, JsonRejection>,
) -> Response
where
    D: OrganizationDirectory + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_body(rejection),
    };
    match service.register_pilot(request, &client).await {
        Ok(row_id) => created(row_id),
        Err(err) => registration_failure(err),
    }
}

pub(crate) async fn activate_handler<St>(
    State(service): State<Arc<ActivationService<St>>>,
    body: Result<Json<ActivationRequest>, JsonRejection>,
) -> Response
where
    St: SignupStore + ?Sized + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return invalid_body(rejection),
    };
    match service.activate(&request, Utc::now()) {
        Ok(activation) => {
            let message = activation.message();
            let payload = match activation {
                Activation::CodeValidated { user, email_domain } => json!({
                    "success": true,
                    "message": message,
                    "user": user,
                    "email_domain": email_domain,
                }),
                Activation::AccountCreated { user } => json!({
                    "success": true,
                    "message": message,
                    "user": user,
                }),
            };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let status = match err {
                ActivationError::Validation(_) | ActivationError::InvalidCode => {
                    StatusCode::BAD_REQUEST
                }
                ActivationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            failure(status, err.user_message())
        }
    }
}

fn created(row_id: u64) -> Response {
    let payload = json!({
        "success": true,
        "message": REGISTRATION_SUCCESS_MESSAGE,
        "rowId": row_id,
    });
    (StatusCode::CREATED, Json(payload)).into_response()
}

fn registration_failure(err: RegistrationError) -> Response {
    let status = match err {
        RegistrationError::Validation(_) => StatusCode::BAD_REQUEST,
        RegistrationError::UnknownOrganization => StatusCode::NOT_FOUND,
        RegistrationError::Directory(_) | RegistrationError::Sink { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "registration failed");
    }
    failure(status, err.user_message())
}

fn invalid_body(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection, "form body rejected");
    failure(StatusCode::BAD_REQUEST, INVALID_BODY_MESSAGE.to_string())
}

fn failure(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "success": false,
        "message": message,
    });
    (status, Json(payload)).into_response()
}

use crate::cli::ServeArgs;
use crate::infra::{
    directory_from_config, record_sinks, signup_store_from_config, AppState, ReporterGuard,
};
use crate::routes::app_router;
use axum_prometheus::PrometheusMetricLayer;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use suite_territoriale::config::AppConfig;
use suite_territoriale::error::AppError;
use suite_territoriale::forms::{forms_router, ActivationService, FormLimiters, RegistrationService};
use suite_territoriale::ratelimit;
use suite_territoriale::telemetry::{self, ErrorReporter, TracingReporter};
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;
    let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingReporter);
    let _flush_on_exit = ReporterGuard(reporter.clone());

    let directory = directory_from_config(&config)?;
    let (signup_sink, pilot_sink) = record_sinks(&config.grist)?;
    let signups = signup_store_from_config(&config.directory)?;

    let registration = Arc::new(RegistrationService::new(
        directory.clone(),
        signup_sink,
        pilot_sink,
        reporter.clone(),
    ));
    let activation = Arc::new(ActivationService::new(signups, reporter.clone()));
    let limiters = FormLimiters::from_config(&config.rate_limits);
    ratelimit::spawn_cleanup(limiters.all());

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        directory: directory.clone(),
        statistics: directory,
        onboarding_open: config.onboarding.open,
    };

    let app = app_router(app_state, forms_router(registration, activation, limiters))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        onboarding_open = config.onboarding.open,
        "suite territoriale api ready"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    readiness_flag.store(false, Ordering::Release);
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

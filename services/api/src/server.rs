use crate::cli::ServeArgs;
use crate::infra::{build_desk, filesystem_assets, seed_desk, AppState, OutboxNotifier};
use crate::routes::with_desk_routes;
use approval_desk::config::AppConfig;
use approval_desk::error::AppError;
use approval_desk::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        assets_root: Arc::new(config.storage.root.clone()),
    };

    tokio::fs::create_dir_all(&config.storage.root).await?;
    if config.workflow.supervisor_inbox.is_none() {
        warn!("DESK_SUPERVISOR_INBOX is not set; new submissions will not be e-mailed");
    }

    let desk = build_desk(
        &config,
        filesystem_assets(&config),
        OutboxNotifier::new(config.workflow.mail_sender.clone()),
    );

    if let Some(seed) = args.seed.take() {
        let imported = seed_desk(&desk, &seed)?;
        info!(imported, seed = %seed.display(), "seeded submissions");
    }

    let app = with_desk_routes(desk)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admin = %config.roles.admin_email,
        storage = %config.storage.root.display(),
        "approval desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

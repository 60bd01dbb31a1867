//! The HTTP ingress for power status events, and a small API for inspecting the drainer.
//!
//! A UPS publisher (or a bridge from its message broker) posts each status to the topic route. How the request is
//! acknowledged depends on the configured delivery quality: at-most-once statuses are acknowledged with
//! `202 Accepted` as soon as they are validated, while at-least-once and exactly-once statuses are acknowledged
//! with the [`PassReport`](crate::gate::PassReport) once they have been handled.
use crate::error::{self, Result};
use crate::gate::ReconciliationGate;
use crate::telemetry::DrainerRootSpanBuilder;

use models::constants::{DRAINER_HEALTH_CHECK_ROUTE, DRAINER_METRICS_ROUTE};
use models::node::ClusterClient;
use models::status::PowerStatus;

use actix_web::{
    http::header,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use prometheus::{Encoder, TextEncoder};
use snafu::{ensure, ResultExt};
use tracing::{event, Level};
use tracing_actix_web::TracingLogger;
use validator::Validate;

use std::env;
use std::sync::Arc;

// Topics are hierarchical (`ups/status`), so the topic segment spans the rest of the path.
pub const STATUS_TOPIC_ROUTE: &str = "/v1/topics/{topic:.*}";
pub const GATE_STATUS_ROUTE: &str = "/v1/status";
pub const DRAINED_NODES_ROUTE: &str = "/v1/drained-nodes";

// The set of API endpoints for which `tracing::Span`s will not be recorded.
pub const NO_TELEMETRY_ENDPOINTS: &[&str] = &[DRAINER_HEALTH_CHECK_ROUTE, DRAINER_METRICS_ROUTE];

/// Settings that are applied to the status server. These settings are provided to each HTTP route
/// via actix's application data system.
#[derive(Clone)]
pub struct ServerSettings<T: ClusterClient> {
    pub gate: Arc<ReconciliationGate<T>>,
    pub server_port: u16,
}

/// Registers the drainer's routes.
pub fn configure_routes<T: 'static + ClusterClient>(cfg: &mut web::ServiceConfig) {
    cfg.route(STATUS_TOPIC_ROUTE, web::post().to(receive_status::<T>))
        .route(GATE_STATUS_ROUTE, web::get().to(gate_status::<T>))
        .route(DRAINED_NODES_ROUTE, web::get().to(drained_nodes::<T>))
        .route(DRAINER_HEALTH_CHECK_ROUTE, web::get().to(health_check))
        .route(DRAINER_METRICS_ROUTE, web::get().to(vending_metrics::<T>));
}

/// Runs the status server until it is shut down.
pub async fn run_server<T: 'static + ClusterClient>(settings: ServerSettings<T>) -> Result<()> {
    // Match the IP family of the cluster, as reported by the address of the Kubernetes service.
    let bind_address = match env::var("KUBERNETES_SERVICE_HOST") {
        Ok(k8s_service_addr) if k8s_service_addr.contains(':') => "[::]",
        _ => "0.0.0.0",
    };
    let server_addr = format!("{}:{}", bind_address, settings.server_port);
    event!(Level::INFO, %server_addr, "Starting status server.");

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::<DrainerRootSpanBuilder>::new())
            .app_data(Data::new(settings.clone()))
            .configure(configure_routes::<T>)
    })
    .bind(server_addr)
    .context(error::HttpServerSnafu)?
    .run()
    .await
    .context(error::HttpServerSnafu)
}

/// HTTP endpoint which receives a power status published to a topic.
pub(crate) async fn receive_status<T: 'static + ClusterClient>(
    settings: web::Data<ServerSettings<T>>,
    topic: web::Path<String>,
    status: web::Json<PowerStatus>,
) -> Result<HttpResponse> {
    let topic = topic.into_inner();
    let config = settings.gate.config();
    ensure!(topic == config.topic, error::UnknownTopicSnafu { topic });

    let status = status.into_inner();
    status.validate().context(error::InvalidStatusSnafu)?;

    // The pass runs in its own task so that a publisher hanging up cannot interrupt it halfway. The task is local to
    // this server worker: an unacknowledged at-most-once pass is lost if the worker stops, and passes queue behind
    // the gate without bound while earlier ones run.
    let gate = Arc::clone(&settings.gate);
    let pass = actix_web::rt::spawn(async move { gate.handle_status(status).await });

    if config.delivery_quality.acknowledges_after_handling() {
        let report = pass.await.context(error::PassInterruptedSnafu)?;
        Ok(HttpResponse::Ok().json(report))
    } else {
        Ok(HttpResponse::Accepted().finish())
    }
}

/// HTTP endpoint describing the gate's state and the last status it observed.
pub(crate) async fn gate_status<T: 'static + ClusterClient>(
    settings: web::Data<ServerSettings<T>>,
) -> impl Responder {
    HttpResponse::Ok().json(settings.gate.observation().await)
}

/// HTTP endpoint listing the nodes currently drained by the drainer.
pub(crate) async fn drained_nodes<T: 'static + ClusterClient>(
    settings: web::Data<ServerSettings<T>>,
) -> Result<HttpResponse> {
    let node_names = settings
        .gate
        .drained_nodes()
        .await
        .context(error::DrainedNodesSnafu)?;
    Ok(HttpResponse::Ok().json(node_names))
}

/// HTTP endpoint that implements a shallow health check for the HTTP service.
pub(crate) async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

pub(crate) async fn vending_metrics<T: 'static + ClusterClient>(
    settings: web::Data<ServerSettings<T>>,
) -> Result<HttpResponse> {
    let encoder = TextEncoder::new();
    let metric_families = settings.gate.metrics().gather();
    let mut buf = Vec::new();
    encoder
        .encode(&metric_families, &mut buf)
        .context(error::MetricsEncodeSnafu)?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, prometheus::TEXT_FORMAT))
        .body(buf))
}

use drainer::server::{self, ServerSettings};
use drainer::{DrainerMetrics, ReconciliationGate};
use models::{
    config::DrainConfig, constants::DRAINER_DEFAULT_PORT, node::K8SClusterClient, telemetry,
};

use dotenv::dotenv;
use snafu::ResultExt;
use tracing::{event, Level};

use std::env;
use std::fs;
use std::sync::Arc;

// By default, errors resulting in termination of the drainer are written to this file,
// which is the location kubernetes uses by default to surface termination-causing errors.
const TERMINATION_LOG: &str = "/dev/termination-log";

const DRAINER_PORT_ENV_VAR: &str = "DRAINER_PORT";

/// The module-wide result type.
type Result<T> = std::result::Result<T, drainer_error::Error>;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    let termination_log =
        env::var("TERMINATION_LOG").unwrap_or_else(|_| TERMINATION_LOG.to_string());

    if let Err(error) = run().await {
        event!(Level::ERROR, %error, "UPS node drainer failed.");
        if let Err(write_error) = fs::write(&termination_log, error.to_string()) {
            event!(Level::ERROR, %write_error, "Could not write k8s termination log.");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    telemetry::init_telemetry_from_env().context(drainer_error::TelemetryInitSnafu)?;

    let config = DrainConfig::from_env().context(drainer_error::ConfigurationSnafu)?;
    let server_port = match env::var(DRAINER_PORT_ENV_VAR) {
        Ok(port) => port
            .parse()
            .context(drainer_error::ServerPortSnafu { port })?,
        Err(_) => DRAINER_DEFAULT_PORT,
    };
    event!(
        Level::INFO,
        topic = %config.topic,
        delivery_quality = ?config.delivery_quality,
        battery_drain_threshold = config.battery_drain_threshold,
        "Loaded configuration."
    );

    let k8s_client = kube::client::Client::try_default()
        .await
        .context(drainer_error::ClientCreateSnafu)?;
    let cluster_client = K8SClusterClient::new(k8s_client);

    let metrics = DrainerMetrics::new().context(drainer_error::MetricsSnafu)?;
    let gate = ReconciliationGate::new(cluster_client, config, metrics);

    let settings = ServerSettings {
        gate: Arc::new(gate),
        server_port,
    };

    server::run_server(settings)
        .await
        .context(drainer_error::ServerSnafu)
}

pub mod drainer_error {
    use models::config::ConfigurationError;
    use models::telemetry;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("Error configuring telemetry: '{}'", source))]
        TelemetryInit {
            source: telemetry::TelemetryConfigError,
        },

        #[snafu(display("Invalid drainer configuration: '{}'", source))]
        Configuration { source: ConfigurationError },

        #[snafu(display("Invalid server port '{}': '{}'", port, source))]
        ServerPort {
            source: std::num::ParseIntError,
            port: String,
        },

        #[snafu(display("Unable to create Kubernetes client: '{}'", source))]
        ClientCreate { source: kube::Error },

        #[snafu(display("Unable to register metrics: '{}'", source))]
        Metrics { source: prometheus::Error },

        #[snafu(display("Error running status server: '{}'", source))]
        Server { source: drainer::error::Error },
    }
}

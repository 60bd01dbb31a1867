use models::node::ClusterError;

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("No power status topic named '{}'", topic))]
    UnknownTopic { topic: String },

    #[snafu(display("Invalid power status: '{}'", source))]
    InvalidStatus { source: validator::ValidationErrors },

    #[snafu(display("Unable to determine drained nodes: '{}'", source))]
    DrainedNodes { source: ClusterError },

    #[snafu(display("Status handling was interrupted: '{}'", source))]
    PassInterrupted { source: tokio::task::JoinError },

    #[snafu(display("Unable to encode metrics: '{}'", source))]
    MetricsEncode { source: prometheus::Error },

    #[snafu(display("Error running HTTP server: '{}'", source))]
    HttpServer { source: std::io::Error },
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::UnknownTopic { .. } => StatusCode::NOT_FOUND,
            Error::InvalidStatus { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

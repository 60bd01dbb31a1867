use crate::server::NO_TELEMETRY_ENDPOINTS;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use lazy_static::lazy_static;
use tracing::Span;
use tracing_actix_web::{DefaultRootSpanBuilder, RootSpanBuilder};

use std::collections::HashSet;

// tracing-actix-web has no way to leave routes out of the logs, so paths polled by probes and scrapers get an
// empty `tracing::Span` instead.
lazy_static! {
    static ref EXCLUDED_PATHS: HashSet<&'static str> =
        NO_TELEMETRY_ENDPOINTS.iter().copied().collect();
}

#[derive(Default)]
pub(crate) struct DrainerRootSpanBuilder;

impl RootSpanBuilder for DrainerRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> Span {
        if EXCLUDED_PATHS.contains(request.path()) {
            Span::none()
        } else {
            tracing_actix_web::root_span!(request)
        }
    }

    fn on_request_end<B: MessageBody>(
        span: Span,
        response: &std::result::Result<ServiceResponse<B>, actix_web::Error>,
    ) {
        DefaultRootSpanBuilder::on_request_end(span, response);
    }
}

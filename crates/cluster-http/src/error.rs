//! Maps [`cluster_controller::Error`] onto HTTP status codes (§7 of the
//! specification).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Wraps a [`cluster_controller::Error`] so it can be returned directly from
/// an axum handler.
pub struct ApiError(pub cluster_controller::Error);

impl From<cluster_controller::Error> for ApiError {
    fn from(err: cluster_controller::Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &cluster_controller::Error) -> StatusCode {
    use cluster_controller::Error as E;
    match err {
        E::Pipeline(pipeline_err) => status_for_pipeline(pipeline_err),
        E::Fsm(fsm_err) => status_for_fsm(fsm_err),
        E::NoActivePipeline => StatusCode::CONFLICT,
        E::UnknownWorker(_) => StatusCode::BAD_REQUEST,
        E::WorkerRuntimeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        E::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn status_for_pipeline(err: &cluster_pipeline::Error) -> StatusCode {
    use cluster_pipeline::Error as E;
    match err {
        E::PipelineNotFound(_) | E::NodeNotFound(_) | E::EdgeNotFound(_) | E::NodeTemplateUnknown { .. } => {
            StatusCode::NOT_FOUND
        }
        E::InvalidNode { .. } | E::NotADag { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        E::InstantiationRefused(_)
        | E::EdgeIdMismatch { .. }
        | E::PipelineIdMismatch { .. }
        | E::Frozen(_) => StatusCode::BAD_REQUEST,
    }
}

fn status_for_fsm(err: &cluster_fsm::Error) -> StatusCode {
    use cluster_fsm::Error as E;
    match err {
        E::InvalidTransition { .. } | E::AlreadyTransitioning | E::Terminal(_) => StatusCode::CONFLICT,
        E::UnknownToState { .. } | E::DuplicateTransition { .. } | E::UnknownInitialState(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

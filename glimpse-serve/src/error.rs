use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use glimpse_io::IoError;
use glimpse_models::ModelError;
use serde_json::json;

/// Failures of a single request.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("No image provided")]
    MissingImage,

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Decode(#[from] IoError),

    #[error(transparent)]
    Inference(#[from] ModelError),

    #[error("Inference task failed. {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Decode(_) | Self::Inference(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("request failed: {self}");
        } else {
            log::warn!("rejected request: {self}");
        }

        let body = json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

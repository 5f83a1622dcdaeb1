use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use glimpse_image::Image;
use glimpse_io::functional::decode_image_rgb8;
use glimpse_models::{
    device::device_label, ActionPrediction, ClassProbability, InferenceContext, ModelError,
    ModelsStatus,
};
use serde::Serialize;

use crate::error::ApiError;

/// Name of the multipart field holding the uploaded image.
pub const IMAGE_FIELD: &str = "image";

type AppState = State<Arc<InferenceContext>>;

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub caption: &'static str,
    pub action: &'static str,
    pub combined: &'static str,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_loaded: ModelsStatus,
    pub device: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub success: bool,
    pub caption: String,
}

/// Action prediction as reported to clients.
#[derive(Debug, Serialize)]
pub struct ActionBody {
    pub predicted_action: String,
    pub confidence: f32,
    pub all_predictions: Vec<ClassProbability>,
}

impl From<ActionPrediction> for ActionBody {
    fn from(prediction: ActionPrediction) -> Self {
        Self {
            predicted_action: prediction.predicted_class,
            confidence: prediction.confidence,
            all_predictions: prediction.all_predictions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub action: ActionBody,
}

#[derive(Debug, Serialize)]
pub struct CombinedResponse {
    pub success: bool,
    pub caption: String,
    pub action: ActionBody,
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Image Captioning & Action Recognition API",
        status: "running",
        endpoints: Endpoints {
            health: "/health",
            caption: "/api/caption",
            action: "/api/action",
            combined: "/api/combined",
        },
    })
}

pub async fn health(State(ctx): AppState) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        models_loaded: ctx.status(),
        device: device_label(ctx.device()),
    })
}

pub async fn caption(
    State(ctx): AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionResponse>, ApiError> {
    let bytes = read_image_field(multipart).await?;
    let caption = run_inference(ctx, bytes, |ctx, image| ctx.caption(image)).await?;
    log::info!("caption generated: {caption}");

    Ok(Json(CaptionResponse {
        success: true,
        caption,
    }))
}

pub async fn action(
    State(ctx): AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let bytes = read_image_field(multipart).await?;
    let prediction = run_inference(ctx, bytes, |ctx, image| ctx.action(image)).await?;
    log::info!(
        "action predicted: {} ({:.2}%)",
        prediction.predicted_class,
        prediction.confidence
    );

    Ok(Json(ActionResponse {
        success: true,
        action: prediction.into(),
    }))
}

pub async fn combined(
    State(ctx): AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CombinedResponse>, ApiError> {
    let bytes = read_image_field(multipart).await?;
    let prediction = run_inference(ctx, bytes, |ctx, image| ctx.combined(image)).await?;
    log::info!(
        "combined: caption {:?}, action {}",
        prediction.caption,
        prediction.action.predicted_class
    );

    Ok(Json(CombinedResponse {
        success: true,
        caption: prediction.caption,
        action: prediction.action.into(),
    }))
}

// the bytes of the first non-empty `image` field
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, ApiError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            log::debug!("not a multipart request: {rejection}");
            return Err(ApiError::MissingImage);
        }
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::MissingImage);
        }
        return Ok(bytes);
    }

    Err(ApiError::MissingImage)
}

// decode and run the models on the blocking pool
async fn run_inference<T, F>(
    ctx: Arc<InferenceContext>,
    bytes: Bytes,
    f: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&InferenceContext, &Image<u8, 3>) -> Result<T, ModelError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<T, ApiError> {
        let image = decode_image_rgb8(&bytes)?;
        log::debug!("decoded image {}", image.size());
        Ok(f(&ctx, &image)?)
    })
    .await?
}

use std::sync::Arc;

use argh::FromArgs;
use glimpse_models::{device::select_device, InferenceContext};

/// Serve image captioning and action recognition over HTTP
#[derive(Debug, FromArgs)]
struct Args {
    /// address to listen on
    #[argh(option, default = "String::from(\"0.0.0.0\")")]
    host: String,

    /// port to listen on
    #[argh(option, short = 'p', default = "5000")]
    port: u16,

    /// directory holding the model configurations, vocabulary and weights
    #[argh(option, short = 'm', default = "String::from(\"models\")")]
    model_dir: String,

    /// number of decoding steps per caption
    #[argh(option, default = "30")]
    max_caption_length: usize,

    /// largest accepted upload in megabytes
    #[argh(option, default = "16")]
    max_upload_mb: usize,

    /// run on the cpu even when cuda is available
    #[argh(switch)]
    cpu: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    let device = select_device(args.cpu);
    let ctx = InferenceContext::load(&args.model_dir, device)?
        .with_max_caption_length(args.max_caption_length);
    log::info!("✅ Models initialized");

    let app = glimpse_serve::app(Arc::new(ctx), args.max_upload_mb * 1024 * 1024);

    let addr = format!("{}:{}", args.host, args.port);
    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: http://{addr}");
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod assets; // 🖼️ Campaign asset service lookups
mod db;
mod elevenlabs_client; // 🎙️ Eleven Labs music generation
mod handlers;
mod kling_client; // 🎬 Kling image-to-video
mod luma_client; // 🎬 Luma Dream Machine image-to-video
mod media;
mod middleware;
mod models;
mod pipeline; // 🆕 Checkpointed promo video pipeline
mod providers;
mod services;
mod utils;

use models::ClipModel;
use pipeline::{PipelineResources, PipelineService};
use providers::{ClipGenerator, ClipGeneration, MusicGeneration, MusicGenerator};

// AppState holds the database connection pool and the pipeline service
pub struct AppState {
    pub db: sqlx::PgPool,
    pub service: Arc<PipelineService>,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize production-grade logging
    init_logging().expect("Failed to initialize logging");

    let work_root = std::env::var("WORK_DIR").unwrap_or_else(|_| "work".to_string());
    let output_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string());

    // Ensure scratch and output directories exist
    if let Err(e) = std::fs::create_dir_all(&work_root) {
        tracing::warn!("Failed to create work directory: {}", e);
    } else {
        tracing::info!("Work directory ready");
    }

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        tracing::warn!("Failed to create outputs directory: {}", e);
    } else {
        tracing::info!("Outputs directory ready");
    }

    if let Err(e) = utils::check_ffmpeg_available() {
        tracing::warn!("{} Video assembly will fail until it is installed.", e);
    }

    // Create the database connection pool
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool.");

    // Initialize Kling client if API key is provided
    let kling = match std::env::var("KLING_API_KEY").ok() {
        Some(api_key) if !api_key.is_empty() => {
            tracing::info!("Initializing Kling image-to-video client...");
            Some(Arc::new(kling_client::KlingClient::new(api_key)) as Arc<dyn ClipGenerator>)
        }
        _ => {
            tracing::warn!("KLING_API_KEY not found. Kling clip generation disabled.");
            None
        }
    };

    // Initialize Luma client if API key is provided
    let luma = match std::env::var("LUMA_API_KEY").ok() {
        Some(api_key) if !api_key.is_empty() => {
            tracing::info!("Initializing Luma Dream Machine client...");
            Some(Arc::new(luma_client::LumaClient::new(api_key)) as Arc<dyn ClipGenerator>)
        }
        _ => {
            tracing::warn!("LUMA_API_KEY not found. Luma clip generation disabled.");
            None
        }
    };

    let clip_client = providers::ClipClient::new(kling, luma);
    if !clip_client.has_provider(ClipModel::KlingV16)
        && !clip_client.has_provider(ClipModel::LumaRay2)
    {
        tracing::warn!("No clip provider configured. Pipelines will fail at clip generation.");
        tracing::info!("To enable clip generation, set: KLING_API_KEY and/or LUMA_API_KEY");
    }

    // Initialize Eleven Labs client if API key is provided
    let music = match std::env::var("ELEVEN_LABS_API_KEY").ok() {
        Some(api_key) if !api_key.is_empty() => {
            tracing::info!("Initializing Eleven Labs music client...");
            let generator =
                Arc::new(elevenlabs_client::ElevenLabsClient::new(api_key)) as Arc<dyn MusicGenerator>;
            Some(Arc::new(providers::MusicClient::new(generator)) as Arc<dyn MusicGeneration>)
        }
        _ => {
            tracing::warn!(
                "ELEVEN_LABS_API_KEY not found. Videos will be produced without soundtracks."
            );
            None
        }
    };

    // Asset service for campaign image lookups
    let asset_base_url = std::env::var("ASSET_SERVICE_URL").unwrap_or_else(|_| {
        tracing::warn!("ASSET_SERVICE_URL not set. Falling back to http://localhost:8080");
        "http://localhost:8080".to_string()
    });
    let asset_token = std::env::var("ASSET_SERVICE_TOKEN").ok();
    let assets = Arc::new(assets::HttpAssetResolver::new(asset_base_url, asset_token));

    let resources = PipelineResources {
        checkpoints: Arc::new(pipeline::checkpoint::PgCheckpoints::new(db_pool.clone())),
        store: Arc::new(pipeline::store::PgJobStore::new(db_pool.clone())),
        clips: Arc::new(clip_client) as Arc<dyn ClipGeneration>,
        music,
        assets,
        media: Arc::new(media::FfmpegTools::new()),
    };

    let service = Arc::new(PipelineService::new(
        resources,
        Some(db_pool.clone()),
        work_root,
        output_dir,
    ));
    tracing::info!("🎬 Pipeline service initialized");

    // Create the shared state
    let shared_state = Arc::new(AppState {
        db: db_pool,
        service,
    });

    // Build our application with all routes and shared state
    let app = Router::new()
        .merge(handlers::pipelines::pipeline_routes())
        .merge(handlers::status::status_routes())
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state.clone()));

    // Run the server with ConnectInfo so request logs carry socket addresses
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind 0.0.0.0:3000");
    tracing::info!(
        "listening on {}",
        listener.local_addr().expect("listener address")
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,promo_forge=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,promo_forge=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // Configure structured logging for production
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        // Human-readable logging for development
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // Log startup information
    tracing::info!("🎬 PromoForge starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );
    tracing::info!("Log level: {}", log_level);

    let kling_configured = std::env::var("KLING_API_KEY").is_ok();
    let luma_configured = std::env::var("LUMA_API_KEY").is_ok();
    let elevenlabs_configured = std::env::var("ELEVEN_LABS_API_KEY").is_ok();
    let db_configured = std::env::var("DATABASE_URL").is_ok();

    tracing::info!(
        kling = kling_configured,
        luma = luma_configured,
        elevenlabs = elevenlabs_configured,
        database = db_configured,
        "Service configuration"
    );

    Ok(())
}

pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::services::ingest::IngestService;
use crate::services::object_store::ObjectStore;
use crate::services::predict::PredictService;
use crate::services::shared_fs::SharedFs;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::ingest::ingest,
        api::handlers::events::storage_event,
        api::handlers::predict::predict,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::ingest::IngestRequest,
            api::handlers::ingest::IngestResponse,
            api::handlers::events::StorageEventNotification,
            api::handlers::events::StorageRecord,
            api::handlers::events::S3Entity,
            api::handlers::events::BucketRef,
            api::handlers::events::ObjectRef,
            api::handlers::events::EventAck,
            api::handlers::predict::PredictRequest,
            api::handlers::predict::PredictResponse,
            api::handlers::health::HealthResponse,
            services::ingest::MaterializeStatus,
            services::predict::TransformOutput,
        )
    ),
    tags(
        (name = "ingest", description = "Materialization of object-store content onto the shared filesystem"),
        (name = "predict", description = "Processing of materialized files"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub object_store: Arc<dyn ObjectStore>,
    pub shared_fs: Arc<SharedFs>,
    pub ingest: Arc<IngestService>,
    pub predict: Arc<PredictService>,
    pub config: AppConfig,
}

impl AppState {
    /// Wire both workers from their injected capabilities. The shared
    /// filesystem and object store are the only state either worker touches.
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        shared_fs: Arc<SharedFs>,
        config: AppConfig,
    ) -> Self {
        let ingest = Arc::new(IngestService::new(
            object_store.clone(),
            shared_fs.clone(),
            &config,
        ));
        let archive = config.enable_archive.then(|| object_store.clone());
        let predict = Arc::new(PredictService::new(shared_fs.clone(), archive));

        Self {
            object_store,
            shared_fs,
            ingest,
            predict,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/ingest", post(api::handlers::ingest::ingest))
        .route("/events/storage", post(api::handlers::events::storage_event))
        .route("/predict", post(api::handlers::predict::predict))
        .route("/health", get(api::handlers::health::health_check))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

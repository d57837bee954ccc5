use crate::app_state::SharedAppState;
use crate::error::DatacubeError;
use crate::metrics;
use crate::models;
use crate::pipeline;
use crate::validated_json::ValidatedJson;
use crate::validated_query::ValidatedQuery;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

impl IntoResponse for models::CubeResponse {
    fn into_response(self) -> Response {
        match self {
            models::CubeResponse::Links(body) => Json(body).into_response(),
            models::CubeResponse::NoData => "No item were found.".into_response(),
        }
    }
}

pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/datacube", post(create_datacube))
        .route("/.well-known/datacube-schema", get(schema))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .on_request(metrics::request_counter)
                    .on_response(metrics::record_response_metrics::<axum::body::BoxBody>),
            ),
        )
        .with_state(state)
}

async fn schema() -> &'static str {
    "Datacube assembly and delivery server. POST /datacube with a geometry, date range and \
     entity identifier to build and deliver analytical datacubes."
}

/// Handle the datacube orchestration endpoint.
///
/// Validation happens in the extractors; everything else is delegated to the pipeline.
async fn create_datacube(
    State(state): State<SharedAppState>,
    ValidatedQuery(options): ValidatedQuery<models::QueryOptions>,
    ValidatedJson(request): ValidatedJson<models::AnalyticsRequest>,
) -> Result<models::CubeResponse, DatacubeError> {
    pipeline::assemble_datacubes(&state, &request, &options).await
}

//! # API REST
//!
//! REST API for patient record summaries.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - Boundary validation of request bodies into `summary-core` requests
//! - Mapping pipeline errors to status codes and structured error bodies
//!
//! Uses `api-shared` for wire types.

#![warn(rust_2018_idioms)]

pub mod error;

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use summary_core::{
    Catalog, CatalogService, FailurePolicy, GroundedChat, Identifier, LlmClient, NonEmptyText,
    PatientSummary, QueryExecutor, SummaryConfig, SummaryRequest, SummaryService,
};
use tower_http::cors::CorsLayer;
use tracing::Instrument;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::{
    ChatReq, ChatRes, DatabaseInfo, ErrorBody, ErrorDetail, HealthRes, HealthService,
    SectionFailureDto, SectionSummaryDto, SummaryReq, SummaryRes,
};

pub use error::ApiError;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<SummaryConfig>,
    catalog: CatalogService,
    summary: Arc<SummaryService>,
    chat: Arc<GroundedChat>,
}

impl AppState {
    pub fn new(
        cfg: Arc<SummaryConfig>,
        catalog: Arc<dyn Catalog>,
        executor: Arc<dyn QueryExecutor>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            catalog: CatalogService::new(catalog, executor.clone()),
            summary: Arc::new(SummaryService::new(cfg.clone(), executor, llm.clone())),
            chat: Arc::new(GroundedChat::new(llm, cfg.llm_timeout())),
            cfg,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_databases,
        list_tables,
        list_patients,
        summarize,
        chat,
    ),
    components(schemas(
        HealthRes,
        DatabaseInfo,
        SummaryReq,
        SummaryRes,
        SectionSummaryDto,
        SectionFailureDto,
        ChatReq,
        ChatRes,
        ErrorBody,
        ErrorDetail,
    ))
)]
pub struct ApiDoc;

/// Build the router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/databases", get(list_databases))
        .route("/api/v1/databases/:database/tables", get(list_tables))
        .route("/api/v1/databases/:database/patients", get(list_patients))
        .route("/api/v1/summary", post(summarize))
        .route("/api/v1/chat", post(chat))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn request_span(route: &'static str) -> tracing::Span {
    tracing::info_span!("request", route, request_id = %uuid::Uuid::new_v4())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/api/v1/databases",
    responses(
        (status = 200, description = "Databases in the warehouse", body = DatabaseInfo),
        (status = 500, description = "Catalog failure", body = ErrorBody)
    )
)]
/// List the databases known to the catalog.
#[axum::debug_handler]
async fn list_databases(State(state): State<AppState>) -> Result<Json<DatabaseInfo>, ApiError> {
    async move {
        let databases = state.catalog.list_databases().await?;
        Ok(Json(DatabaseInfo {
            databases: databases.into_iter().map(|d| d.to_string()).collect(),
            tables: None,
            patient_ids: None,
        }))
    }
    .instrument(request_span("list_databases"))
    .await
}

#[utoipa::path(
    get,
    path = "/api/v1/databases/{database}/tables",
    params(("database" = String, Path, description = "Database name")),
    responses(
        (status = 200, description = "Tables of the database", body = DatabaseInfo),
        (status = 400, description = "Invalid database name", body = ErrorBody),
        (status = 500, description = "Catalog failure", body = ErrorBody)
    )
)]
/// List the tables of one database.
#[axum::debug_handler]
async fn list_tables(
    State(state): State<AppState>,
    AxumPath(database): AxumPath<String>,
) -> Result<Json<DatabaseInfo>, ApiError> {
    async move {
        let database = parse_identifier("database", &database)?;
        let tables = state.catalog.list_tables(&database).await?;

        let mut by_database = BTreeMap::new();
        by_database.insert(
            database.to_string(),
            tables.into_iter().map(|t| t.to_string()).collect(),
        );
        Ok(Json(DatabaseInfo {
            databases: vec![database.to_string()],
            tables: Some(by_database),
            patient_ids: None,
        }))
    }
    .instrument(request_span("list_tables"))
    .await
}

#[utoipa::path(
    get,
    path = "/api/v1/databases/{database}/patients",
    params(("database" = String, Path, description = "Database name")),
    responses(
        (status = 200, description = "Patient identifiers", body = DatabaseInfo),
        (status = 400, description = "Invalid database name", body = ErrorBody),
        (status = 500, description = "Catalog failure", body = ErrorBody)
    )
)]
/// List the patient identifiers held in the database's patient table.
#[axum::debug_handler]
async fn list_patients(
    State(state): State<AppState>,
    AxumPath(database): AxumPath<String>,
) -> Result<Json<DatabaseInfo>, ApiError> {
    async move {
        let database = parse_identifier("database", &database)?;
        let patient_ids = state.catalog.list_patients(&database).await?;
        Ok(Json(DatabaseInfo {
            databases: vec![database.to_string()],
            tables: None,
            patient_ids: Some(patient_ids),
        }))
    }
    .instrument(request_span("list_patients"))
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/summary",
    request_body = SummaryReq,
    responses(
        (status = 200, description = "Consolidated and per-table summaries", body = SummaryRes),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Pipeline failure", body = ErrorBody)
    )
)]
/// Summarise a patient's record across the requested tables.
///
/// Each table with rows for the patient gets its own summary; the summaries are then merged
/// with the caller's `prompt_template`. Tables with no rows are listed in `empty_tables`.
/// Under the `skip` policy failed tables are listed in `failed_sections`; under `abort` the
/// first failure fails the request.
#[axum::debug_handler]
async fn summarize(
    State(state): State<AppState>,
    payload: Result<Json<SummaryReq>, JsonRejection>,
) -> Result<Json<SummaryRes>, ApiError> {
    async move {
        let Json(req) = payload?;
        let request = summary_request(req)?;
        let summary = state.summary.summarize(request).await?;
        Ok(Json(summary_response(summary)))
    }
    .instrument(request_span("summary"))
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/chat",
    request_body = ChatReq,
    responses(
        (status = 200, description = "Answer grounded in the supplied context", body = ChatRes),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Model failure", body = ErrorBody)
    )
)]
/// Answer a question using only the supplied record context.
///
/// An empty context is answered with a fixed refusal whatever the question, so the question is
/// only required when there is a record to ask about.
#[axum::debug_handler]
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatReq>, JsonRejection>,
) -> Result<Json<ChatRes>, ApiError> {
    async move {
        let Json(req) = payload?;
        if !req.context.trim().is_empty() {
            NonEmptyText::new(&req.question)
                .map_err(|e| ApiError::invalid(format!("question: {e}")))?;
        }
        let model = optional_text("model", req.model.as_deref())?;
        let model = model.as_ref().unwrap_or(state.cfg.default_model());

        let response = state
            .chat
            .answer(&req.question, &req.context, model.as_str())
            .await?;
        Ok(Json(ChatRes { response }))
    }
    .instrument(request_span("chat"))
    .await
}

fn parse_identifier(field: &str, value: &str) -> Result<Identifier, ApiError> {
    Identifier::parse(value).map_err(|e| ApiError::invalid(format!("{field} {value:?}: {e}")))
}

/// Blank optional strings count as absent.
fn optional_text(field: &str, value: Option<&str>) -> Result<Option<NonEmptyText>, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => NonEmptyText::new(v)
            .map(Some)
            .map_err(|e| ApiError::invalid(format!("{field}: {e}"))),
        _ => Ok(None),
    }
}

fn summary_request(req: SummaryReq) -> Result<SummaryRequest, ApiError> {
    if req.tables.is_empty() {
        return Err(ApiError::invalid("tables must name at least one table"));
    }

    let tables = req
        .tables
        .iter()
        .map(|t| parse_identifier("table", t))
        .collect::<Result<Vec<_>, _>>()?;

    let failure_policy = match req.failure_policy.as_deref() {
        Some(p) if !p.trim().is_empty() => Some(p.parse::<FailurePolicy>()?),
        _ => None,
    };

    Ok(SummaryRequest {
        database: parse_identifier("database", &req.database)?,
        tables,
        patient_id: NonEmptyText::new(&req.patient_id)
            .map_err(|e| ApiError::invalid(format!("patient_id: {e}")))?,
        prompt_template: NonEmptyText::new(&req.prompt_template)
            .map_err(|e| ApiError::invalid(format!("prompt_template: {e}")))?,
        model: optional_text("model", req.model.as_deref())?,
        summary_model: optional_text("summary_model", req.summary_model.as_deref())?,
        failure_policy,
    })
}

fn summary_response(summary: PatientSummary) -> SummaryRes {
    SummaryRes {
        consolidated_summary: summary.consolidated_summary,
        fhir_section_summary: summary
            .sections
            .into_iter()
            .map(|s| SectionSummaryDto {
                table: s.table.to_string(),
                summary: s.summary,
            })
            .collect(),
        empty_tables: summary
            .empty_tables
            .into_iter()
            .map(|t| t.to_string())
            .collect(),
        failed_sections: summary
            .failures
            .into_iter()
            .map(|f| SectionFailureDto {
                table: f.table.to_string(),
                stage: f.stage.as_str().to_string(),
                message: f.message,
            })
            .collect(),
    }
}

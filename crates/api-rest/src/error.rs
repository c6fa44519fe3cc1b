use api_shared::{ErrorBody, ErrorDetail};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use summary_core::SummaryError;

/// Error returned by every handler.
///
/// Validation failures map to `400`; everything that happens after validation maps to `500`
/// with a stable `code` and, where known, the stage and table that failed.
#[derive(Debug)]
pub struct ApiError(pub SummaryError);

impl From<SummaryError> for ApiError {
    fn from(err: SummaryError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SummaryError::InvalidInput(rejection.body_text()))
    }
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(SummaryError::InvalidInput(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            SummaryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match &self.0 {
            SummaryError::InvalidInput(_) => "INVALID_REQUEST",
            SummaryError::Catalog(_) => "CATALOG_FAILED",
            SummaryError::Query { .. } => "QUERY_FAILED",
            err @ SummaryError::Llm { .. } if err.is_timeout() => "LLM_TIMEOUT",
            SummaryError::Llm { .. } => "LLM_FAILED",
            SummaryError::Config(_) | SummaryError::TemplateRead(_) => "INTERNAL",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.0.public_message(),
                stage: self.0.stage().map(|s| s.as_str().to_string()),
                table: self.0.table().map(|t| t.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self.0);
        } else {
            tracing::warn!("Rejected request: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use summary_core::{Identifier, LlmError, Stage, WarehouseError};

    #[test]
    fn invalid_input_is_bad_request() {
        let err = ApiError::invalid("tables must not be empty");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(err.body().error.message, "tables must not be empty");
    }

    #[test]
    fn timeout_keeps_stage_and_table() {
        let err = ApiError(SummaryError::Llm {
            stage: Stage::SectionSummary,
            table: Some(Identifier::parse("conditions").unwrap()),
            source: LlmError::Timeout {
                model: "m".into(),
                after: Duration::from_secs(30),
            },
        });

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert_eq!(body.error.code, "LLM_TIMEOUT");
        assert_eq!(body.error.stage.as_deref(), Some("section_summary"));
        assert_eq!(body.error.table.as_deref(), Some("conditions"));
    }

    #[test]
    fn collaborator_failures_are_server_errors() {
        let catalog = ApiError(SummaryError::Catalog(WarehouseError::NotFound(
            "database x".into(),
        )));
        assert_eq!(catalog.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(catalog.code(), "CATALOG_FAILED");

        let llm = ApiError(SummaryError::Llm {
            stage: Stage::Consolidation,
            table: None,
            source: LlmError::EmptyResponse,
        });
        assert_eq!(llm.code(), "LLM_FAILED");
        assert_eq!(llm.body().error.table, None);
    }
}

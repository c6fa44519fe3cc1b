//! JSON bodies of the REST API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Catalog listing. Only the fields relevant to the endpoint are populated; the others are
/// `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseInfo {
    pub databases: Vec<String>,
    /// Table names keyed by database.
    pub tables: Option<BTreeMap<String, Vec<String>>>,
    pub patient_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SummaryReq {
    pub database: String,
    pub tables: Vec<String>,
    pub patient_id: String,
    /// Consolidation prompt. `{summaries}` and `{patient_id}` are substituted when present.
    pub prompt_template: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub summary_model: Option<String>,
    /// `skip` or `abort`.
    #[serde(default)]
    pub failure_policy: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SectionSummaryDto {
    pub table: String,
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SectionFailureDto {
    pub table: String,
    pub stage: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SummaryRes {
    pub consolidated_summary: String,
    pub fhir_section_summary: Vec<SectionSummaryDto>,
    pub empty_tables: Vec<String>,
    pub failed_sections: Vec<SectionFailureDto>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatReq {
    pub question: String,
    pub context: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatRes {
    pub response: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Stable machine-readable code, e.g. `LLM_TIMEOUT`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

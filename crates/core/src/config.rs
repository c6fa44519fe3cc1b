//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the services as an
//! `Arc<SummaryConfig>`. Nothing in this crate reads process environment variables: binaries
//! hand [`SummaryConfig::from_lookup`] a closure over whatever source they use, which keeps the
//! parsing testable without mutating the environment.

use crate::constants::{
    DEFAULT_LLM_TIMEOUT, DEFAULT_MAX_CHUNKS_PER_SECTION, DEFAULT_MAX_CONCURRENT_SECTIONS,
    DEFAULT_MODEL, DEFAULT_PATIENT_COLUMN, DEFAULT_SECTION_CHAR_BUDGET, DEFAULT_SECTION_TEMPLATE,
    DEFAULT_SUMMARY_MODEL, MIN_SECTION_CHAR_BUDGET,
};
use crate::{SummaryError, SummaryResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use summary_types::{Identifier, NonEmptyText};

pub const ENV_PATIENT_COLUMN: &str = "SUMMARY_PATIENT_COLUMN";
pub const ENV_DEFAULT_MODEL: &str = "SUMMARY_DEFAULT_MODEL";
pub const ENV_DEFAULT_SUMMARY_MODEL: &str = "SUMMARY_DEFAULT_SUMMARY_MODEL";
pub const ENV_LLM_TIMEOUT_SECS: &str = "SUMMARY_LLM_TIMEOUT_SECS";
pub const ENV_SECTION_CHAR_BUDGET: &str = "SUMMARY_SECTION_CHAR_BUDGET";
pub const ENV_MAX_CHUNKS: &str = "SUMMARY_MAX_CHUNKS";
pub const ENV_MAX_CONCURRENT_SECTIONS: &str = "SUMMARY_MAX_CONCURRENT_SECTIONS";
pub const ENV_FAILURE_POLICY: &str = "SUMMARY_FAILURE_POLICY";
pub const ENV_SECTION_TEMPLATE_FILE: &str = "SUMMARY_SECTION_TEMPLATE_FILE";

/// What the pipeline does when one requested table fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure against the table and keep going with the others.
    #[default]
    Skip,
    /// Fail the whole request on the first failed table (in request order).
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(FailurePolicy::Skip),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(SummaryError::InvalidInput(format!(
                "unknown failure policy {other:?} (expected \"skip\" or \"abort\")"
            ))),
        }
    }
}

/// Model identifiers used when a request does not name its own.
#[derive(Clone, Debug)]
pub struct ModelDefaults {
    pub model: NonEmptyText,
    pub summary_model: NonEmptyText,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            model: NonEmptyText::new(DEFAULT_MODEL).expect("default model is non-empty"),
            summary_model: NonEmptyText::new(DEFAULT_SUMMARY_MODEL)
                .expect("default summary model is non-empty"),
        }
    }
}

/// Size, time and fan-out limits for one summary run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineLimits {
    pub llm_timeout: Duration,
    pub section_char_budget: usize,
    pub max_chunks_per_section: usize,
    pub max_concurrent_sections: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            section_char_budget: DEFAULT_SECTION_CHAR_BUDGET,
            max_chunks_per_section: DEFAULT_MAX_CHUNKS_PER_SECTION,
            max_concurrent_sections: DEFAULT_MAX_CONCURRENT_SECTIONS,
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct SummaryConfig {
    patient_column: Identifier,
    models: ModelDefaults,
    limits: PipelineLimits,
    failure_policy: FailurePolicy,
    section_template: String,
}

impl SummaryConfig {
    /// Create a new `SummaryConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Config`] if a limit is zero, the section budget is below
    /// [`MIN_SECTION_CHAR_BUDGET`], or the section template has no `{rows}` placeholder.
    pub fn new(
        patient_column: Identifier,
        models: ModelDefaults,
        limits: PipelineLimits,
        failure_policy: FailurePolicy,
        section_template: String,
    ) -> SummaryResult<Self> {
        if limits.llm_timeout.is_zero() {
            return Err(SummaryError::Config("LLM timeout must be positive".into()));
        }
        if limits.section_char_budget < MIN_SECTION_CHAR_BUDGET {
            return Err(SummaryError::Config(format!(
                "section char budget must be at least {MIN_SECTION_CHAR_BUDGET}"
            )));
        }
        if limits.max_chunks_per_section == 0 || limits.max_concurrent_sections == 0 {
            return Err(SummaryError::Config(
                "chunk and concurrency limits must be at least 1".into(),
            ));
        }
        if !section_template.contains("{rows}") {
            return Err(SummaryError::Config(
                "section template must contain a {rows} placeholder".into(),
            ));
        }

        Ok(Self {
            patient_column,
            models,
            limits,
            failure_policy,
            section_template,
        })
    }

    /// Resolve configuration from a key lookup (usually the process environment).
    ///
    /// Missing or blank values fall back to the defaults in [`crate::constants`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SummaryResult<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let patient_column = Identifier::parse(
            value(ENV_PATIENT_COLUMN)
                .as_deref()
                .unwrap_or(DEFAULT_PATIENT_COLUMN),
        )
        .map_err(|e| SummaryError::Config(format!("{ENV_PATIENT_COLUMN}: {e}")))?;

        let defaults = ModelDefaults::default();
        let models = ModelDefaults {
            model: model_from_env_value(value(ENV_DEFAULT_MODEL), defaults.model)?,
            summary_model: model_from_env_value(
                value(ENV_DEFAULT_SUMMARY_MODEL),
                defaults.summary_model,
            )?,
        };

        let limits = PipelineLimits {
            llm_timeout: Duration::from_secs(positive_from_env_value(
                ENV_LLM_TIMEOUT_SECS,
                value(ENV_LLM_TIMEOUT_SECS),
                DEFAULT_LLM_TIMEOUT.as_secs() as usize,
            )? as u64),
            section_char_budget: positive_from_env_value(
                ENV_SECTION_CHAR_BUDGET,
                value(ENV_SECTION_CHAR_BUDGET),
                DEFAULT_SECTION_CHAR_BUDGET,
            )?,
            max_chunks_per_section: positive_from_env_value(
                ENV_MAX_CHUNKS,
                value(ENV_MAX_CHUNKS),
                DEFAULT_MAX_CHUNKS_PER_SECTION,
            )?,
            max_concurrent_sections: positive_from_env_value(
                ENV_MAX_CONCURRENT_SECTIONS,
                value(ENV_MAX_CONCURRENT_SECTIONS),
                DEFAULT_MAX_CONCURRENT_SECTIONS,
            )?,
        };

        let failure_policy = value(ENV_FAILURE_POLICY)
            .map(|v| v.parse::<FailurePolicy>())
            .transpose()?
            .unwrap_or_default();

        let section_template =
            section_template_from_file(value(ENV_SECTION_TEMPLATE_FILE).map(PathBuf::from))?;

        Self::new(
            patient_column,
            models,
            limits,
            failure_policy,
            section_template,
        )
    }

    pub fn patient_column(&self) -> &Identifier {
        &self.patient_column
    }

    pub fn default_model(&self) -> &NonEmptyText {
        &self.models.model
    }

    pub fn default_summary_model(&self) -> &NonEmptyText {
        &self.models.summary_model
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    pub fn llm_timeout(&self) -> Duration {
        self.limits.llm_timeout
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn section_template(&self) -> &str {
        &self.section_template
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self::new(
            Identifier::parse(DEFAULT_PATIENT_COLUMN).expect("default column is valid"),
            ModelDefaults::default(),
            PipelineLimits::default(),
            FailurePolicy::default(),
            DEFAULT_SECTION_TEMPLATE.to_string(),
        )
        .expect("default configuration is valid")
    }
}

fn model_from_env_value(value: Option<String>, default: NonEmptyText) -> SummaryResult<NonEmptyText> {
    match value {
        Some(v) => NonEmptyText::new(v).map_err(|e| SummaryError::Config(e.to_string())),
        None => Ok(default),
    }
}

/// Parse a strictly positive integer, falling back to `default` when unset.
pub fn positive_from_env_value(
    name: &str,
    value: Option<String>,
    default: usize,
) -> SummaryResult<usize> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SummaryError::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

/// Load the section template from `path`, or return the built-in template when unset.
pub fn section_template_from_file(path: Option<PathBuf>) -> SummaryResult<String> {
    match path {
        Some(path) => read_template(&path),
        None => Ok(DEFAULT_SECTION_TEMPLATE.to_string()),
    }
}

fn read_template(path: &Path) -> SummaryResult<String> {
    let text = std::fs::read_to_string(path).map_err(SummaryError::TemplateRead)?;
    if text.trim().is_empty() {
        return Err(SummaryError::Config(format!(
            "section template {} is empty",
            path.display()
        )));
    }
    Ok(text)
}

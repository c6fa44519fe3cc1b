//! # Summary Core
//!
//! Business logic for summarising patient records held in structured clinical tables.
//!
//! The pipeline runs in four steps:
//! - **Table selection**: fetch the patient's rows from each requested table
//! - **Section summaries**: one LLM summary per non-empty table, within a prompt-size budget
//! - **Consolidation**: merge the section summaries into one narrative with the caller's template
//! - **Grounded chat**: answer follow-up questions from a summary, refusing when it has no answer
//!
//! **No API concerns**: HTTP routing and wire formats belong in `api-rest` and `api-shared`.
//! Catalog, query and LLM backends are reached only through the traits in [`collaborators`].

pub mod budget;
pub mod catalog;
pub mod chat;
pub mod collaborators;
pub mod config;
pub mod consolidate;
pub mod constants;
pub mod error;
pub mod extract;
pub mod prompts;
pub mod section;
pub mod selector;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::CatalogService;
pub use chat::GroundedChat;
pub use collaborators::{
    Catalog, CompletionRequest, LlmClient, LlmError, Query, QueryExecutor, ResultSet,
    WarehouseError,
};
pub use config::{FailurePolicy, SummaryConfig};
pub use error::{Stage, SummaryError, SummaryResult};
pub use section::SectionSummary;
pub use summary::{PatientSummary, SectionFailure, SummaryRequest, SummaryService};
pub use summary_types::{Identifier, NonEmptyText, TextError};

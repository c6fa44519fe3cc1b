//! Constants used throughout the summary core crate.
//!
//! Defaults for configuration plus the fixed prompt text of the pipeline.

use std::time::Duration;

/// Canonical table holding one row per patient.
pub const PATIENT_TABLE: &str = "patient";

/// Identifier column of [`PATIENT_TABLE`].
pub const PATIENT_ID_COLUMN: &str = "id";

/// Default column that scopes record tables to a patient.
pub const DEFAULT_PATIENT_COLUMN: &str = "patient_id";

/// Default model for per-table section summaries and chat.
pub const DEFAULT_MODEL: &str = "us.anthropic.claude-3-5-sonnet-20240620-v1:0";

/// Default model for consolidating section summaries.
pub const DEFAULT_SUMMARY_MODEL: &str = "us.anthropic.claude-3-sonnet-20240229-v1:0";

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Roughly 6 000 tokens at 4 chars/token.
pub const DEFAULT_SECTION_CHAR_BUDGET: usize = 24_000;

pub const MIN_SECTION_CHAR_BUDGET: usize = 512;

pub const DEFAULT_MAX_CHUNKS_PER_SECTION: usize = 8;

pub const DEFAULT_MAX_CONCURRENT_SECTIONS: usize = 4;

/// Suffix for a single row cut to fit the section budget.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Role fixed for section summaries, chunk merges and consolidation.
pub const SUMMARISER_SYSTEM_PROMPT: &str = "You are a clinical documentation assistant. \
You summarise structured patient records accurately and never add facts that are not in the \
data you are given.";

/// Role fixed for grounded chat.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a medical-record reviewer.";

/// Built-in section template. Placeholders: `{table}`, `{part}`, `{rows}`.
pub const DEFAULT_SECTION_TEMPLATE: &str = "Here are rows from the `{table}` table of a \
patient's clinical record{part}:
<rows>
{rows}
</rows>

Summarise the clinically relevant content of these rows in one short paragraph.
Use only information present in the rows. Do not speculate and do not add facts.";

/// Combines partial summaries of one oversized table. Placeholders: `{table}`, `{summaries}`.
pub const CHUNK_MERGE_TEMPLATE: &str = "The following are partial summaries of consecutive \
portions of the `{table}` table of one patient's clinical record:
<partial_summaries>
{summaries}
</partial_summaries>

Combine them into a single short summary of the whole table. Keep every clinically relevant \
fact, remove repetition, and do not add anything that is not stated above.";

/// Consolidated text when no requested table produced a section summary.
pub const NO_RECORD_DATA_SUMMARY: &str =
    "No clinical data was found for this patient in the requested tables.";

/// Answer when chat is asked about an empty record.
pub const EMPTY_CONTEXT_ANSWER: &str =
    "The medical record provided is empty, so this question cannot be answered from it.";

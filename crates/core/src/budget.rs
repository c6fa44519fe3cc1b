//! Prompt-size budgeting for section summaries.
//!
//! Rows are packed greedily, in order, into chunks whose serialized text stays within
//! `max_chars` (measured in UTF-8 bytes). A row that is larger than the budget on its own is
//! cut and marked. At most `max_chunks` chunks are produced; the remaining rows are dropped,
//! counted, and announced at the end of the last chunk, which gives up trailing rows if the
//! notice would not otherwise fit. The plan depends only on the extract and the budget.

use crate::constants::TRUNCATION_MARKER;
use crate::extract::TableExtract;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionBudget {
    pub max_chars: usize,
    pub max_chunks: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<String>,
    pub truncated_rows: usize,
    pub omitted_rows: usize,
}

pub fn plan_chunks(extract: &TableExtract, budget: &SectionBudget) -> ChunkPlan {
    let mut plan = ChunkPlan::default();
    let mut current = String::new();
    let total = extract.row_count();

    for index in 0..total {
        let mut line = extract.serialize_row(index).unwrap_or_default();
        if line.len() > budget.max_chars {
            line = truncate_line(&line, budget.max_chars);
            plan.truncated_rows += 1;
        }

        let needed = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };

        if needed > budget.max_chars {
            if plan.chunks.len() + 1 >= budget.max_chunks {
                plan.omitted_rows = total - index;
                break;
            }
            plan.chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        plan.chunks.push(current);
    }

    if plan.omitted_rows > 0 {
        if let Some(last) = plan.chunks.last_mut() {
            append_omitted_notice(last, &mut plan.omitted_rows, budget.max_chars);
        }
    }

    plan
}

/// Appends the omitted-rows notice, giving back trailing rows of `chunk` until the notice fits
/// within `max_chars`. Rows given back are added to `omitted`.
fn append_omitted_notice(chunk: &mut String, omitted: &mut usize, max_chars: usize) {
    loop {
        let notice = omitted_notice(*omitted);
        if chunk.len() + 1 + notice.len() <= max_chars {
            chunk.push('\n');
            chunk.push_str(&notice);
            return;
        }
        match chunk.rfind('\n') {
            Some(cut) => chunk.truncate(cut),
            None => {
                *omitted += 1;
                *chunk = omitted_notice(*omitted);
                return;
            }
        }
        *omitted += 1;
    }
}

fn omitted_notice(omitted: usize) -> String {
    format!("[{omitted} further rows omitted]")
}

fn truncate_line(line: &str, max_chars: usize) -> String {
    let mut end = max_chars.saturating_sub(TRUNCATION_MARKER.len()).min(line.len());
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &line[..end], TRUNCATION_MARKER)
}

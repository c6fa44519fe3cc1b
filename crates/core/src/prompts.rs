//! Prompt template rendering.

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted values are never rescanned, so record text that happens to contain `{rows}` or
/// similar cannot expand further. Braces that do not name a known placeholder are kept as-is.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let substitution = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        match substitution {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Whether `template` contains the placeholder `{name}`.
pub fn has_placeholder(template: &str, name: &str) -> bool {
    template.contains(&format!("{{{name}}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_known_placeholders() {
        let out = fill("Table {table}:\n{rows}", &[("table", "observation"), ("rows", "- a")]);
        assert_eq!(out, "Table observation:\n- a");
    }

    #[test]
    fn does_not_expand_placeholders_inside_values() {
        let out = fill("{rows} / {table}", &[("rows", "note: {table}"), ("table", "t")]);
        assert_eq!(out, "note: {table} / t");
    }

    #[test]
    fn keeps_unknown_braces() {
        let out = fill(
            "Reply as JSON {\"summary\": \"...\"} using {summaries}",
            &[("summaries", "S")],
        );
        assert_eq!(out, "Reply as JSON {\"summary\": \"...\"} using S");
    }

    #[test]
    fn handles_unclosed_brace() {
        assert_eq!(fill("open { brace", &[("x", "y")]), "open { brace");
    }

    #[test]
    fn detects_placeholders() {
        assert!(has_placeholder("a {summaries} b", "summaries"));
        assert!(!has_placeholder("a summaries b", "summaries"));
    }
}

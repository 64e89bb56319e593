//! Offline validation of JSON Lines files against the registry mappings.

use std::io::BufRead;

use serde_json::Value;
use vbd_core::{is_source_doc_value, validate_for_source, Source, SourceRegistry, Violation};

/// Problems found on one line of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReport {
    /// 1-based line number.
    pub line: usize,
    pub id: Option<String>,
    pub problems: Vec<String>,
}

/// Outcome of checking a whole file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: usize,
    pub invalid: Vec<LineReport>,
}

impl CheckSummary {
    pub fn valid(&self) -> usize {
        self.checked - self.invalid.len()
    }
}

/// Checks every non-blank line of `reader`.
///
/// With `forced` set, each line is checked against that source's mapping
/// and must carry that source's `db`. Otherwise the line's own `db` field picks the mapping, and a line whose
/// `db` names no registered source is reported as such.
pub fn check_lines<R: BufRead>(
    reader: R,
    registry: &SourceRegistry,
    forced: Option<Source>,
) -> std::io::Result<CheckSummary> {
    let mut summary = CheckSummary::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.checked += 1;

        let report = |id: Option<String>, problems: Vec<String>| LineReport {
            line: i + 1,
            id,
            problems,
        };

        let value: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                summary
                    .invalid
                    .push(report(None, vec![format!("not valid JSON: {}", e)]));
                continue;
            }
        };
        let id = value.get("id").and_then(Value::as_str).map(String::from);

        let source = forced.or_else(|| {
            Source::ALL
                .iter()
                .copied()
                .find(|s| is_source_doc_value(&value, *s))
        });
        let Some(source) = source else {
            summary
                .invalid
                .push(report(id, vec!["db does not name a known source".to_string()]));
            continue;
        };

        let violations: Vec<Violation> = validate_for_source(&value, registry.entry(source));
        if !violations.is_empty() {
            let problems = violations.iter().map(ToString::to_string).collect();
            summary.invalid.push(report(id, problems));
        }
    }

    Ok(summary)
}

//! Offline routing evaluation over a JSONL query set.

use crate::error::GatewayError;
use crate::gateway::GatewayContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryRow {
    pub query: String,
    pub expected_group: Option<String>,
    /// Tool names; a row counts as recalled when any appears in the top k.
    pub expected_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub queries: usize,
    pub group_accuracy: f64,
    pub tool_recall_at_k: f64,
    pub top_k: usize,
}

pub fn load_queries(path: &Path) -> Result<Vec<QueryRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read queries {}", path.display()))?;
    parse_queries(&content).with_context(|| format!("invalid queries {}", path.display()))
}

pub fn parse_queries(content: &str) -> Result<Vec<QueryRow>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", number + 1))
        })
        .collect()
}

pub fn evaluate(
    gateway: &GatewayContext,
    rows: &[QueryRow],
    top_k: usize,
) -> Result<EvalReport, GatewayError> {
    let mut group_hits = 0usize;
    let mut tool_hits = 0usize;

    for row in rows {
        let outcome = gateway.search(&row.query, Some(top_k), None)?;
        let routed_group = outcome.route.as_ref().map(|route| route.group_id.as_str());
        if row.expected_group.is_some() && routed_group == row.expected_group.as_deref() {
            group_hits += 1;
        }

        let found: BTreeSet<&str> = outcome.results.iter().map(|hit| hit.name.as_str()).collect();
        if row
            .expected_tools
            .iter()
            .any(|tool| found.contains(tool.as_str()))
        {
            tool_hits += 1;
        } else {
            tracing::debug!(query = %row.query, found = ?found, "expected tools missed");
        }
    }

    let total = rows.len().max(1) as f64;
    Ok(EvalReport {
        queries: rows.len(),
        group_accuracy: group_hits as f64 / total,
        tool_recall_at_k: tool_hits as f64 / total,
        top_k,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::tests::{FakeProvider, TEST_RULES};
    use crate::grouping::GroupRules;
    use std::sync::Arc;

    #[test]
    fn parses_rows_and_skips_blank_lines() {
        let rows = parse_queries(
            "{\"query\": \"make a table\", \"expected_group\": \"tables\", \"expected_tools\": [\"hwp_create_table\"]}\n\n{\"query\": \"ping\"}\n",
        )
        .expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].expected_group, None);
        assert!(rows[1].expected_tools.is_empty());
    }

    #[test]
    fn bad_line_reports_its_number() {
        let err = parse_queries("{\"query\": \"a\"}\nnot json\n").expect_err("error");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn computes_accuracy_and_recall() {
        let provider = Arc::new(FakeProvider::with_tools(&[
            ("hwp_insert_text", "Insert text"),
            ("hwp_create_table", "Create a table"),
        ]));
        let rules = GroupRules::parse(TEST_RULES).expect("rules");
        let gateway = GatewayContext::new(provider, rules, &GatewayConfig::default());
        let rows = parse_queries(concat!(
            "{\"query\": \"create a table\", \"expected_group\": \"tables\", \"expected_tools\": [\"hwp_create_table\"]}\n",
            "{\"query\": \"insert text\", \"expected_group\": \"tables\", \"expected_tools\": [\"hwp_insert_text\"]}\n",
            "{\"query\": \"unrelated words\", \"expected_group\": \"text\", \"expected_tools\": [\"hwp_insert_text\"]}\n",
            "{\"query\": \"insert text\", \"expected_group\": \"text\", \"expected_tools\": [\"hwp_delete_text\"]}\n",
        ))
        .expect("rows");

        let report = evaluate(&gateway, &rows, 3).expect("report");
        assert_eq!(report.queries, 4);
        assert_eq!(report.group_accuracy, 0.5);
        assert_eq!(report.tool_recall_at_k, 0.5);
        assert_eq!(report.top_k, 3);
    }

    #[test]
    fn empty_query_set() {
        let provider = Arc::new(FakeProvider::with_tools(&[("hwp_ping", "Ping")]));
        let rules = GroupRules::parse(TEST_RULES).expect("rules");
        let gateway = GatewayContext::new(provider, rules, &GatewayConfig::default());
        let report = evaluate(&gateway, &[], 5).expect("report");
        assert_eq!(report.queries, 0);
        assert_eq!(report.group_accuracy, 0.0);
    }
}

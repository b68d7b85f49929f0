use crate::gateway::{GatewayContext, SearchOutcome};
use crate::input::{arguments_object, optional_str, optional_usize, required_str};
use crate::tools::{gateway_error_result, input_error_result, success_result};
use serde_json::Value;

pub fn call(gateway: &GatewayContext, args: &Value) -> Value {
    let parsed = arguments_object(args).and_then(|obj| {
        Ok((
            required_str(obj, "query")?,
            optional_usize(obj, "top_k")?,
            optional_str(obj, "group")?,
        ))
    });
    let (query, top_k, group) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return input_error_result(err),
    };

    match gateway.search(query, top_k, group) {
        Ok(outcome) => success_result(render(&outcome), &outcome),
        Err(err) => gateway_error_result(&err),
    }
}

/// One line per hit, best first.
pub fn render(outcome: &SearchOutcome) -> String {
    if outcome.results.is_empty() {
        return format!("No tools match {:?}", outcome.query);
    }
    let mut lines: Vec<String> = outcome
        .results
        .iter()
        .enumerate()
        .map(|(rank, hit)| {
            format!(
                "{}. {} [{}] score={:.4} {}",
                rank + 1,
                hit.candidate.tool_id,
                hit.group,
                hit.candidate.score,
                hit.description
            )
        })
        .collect();
    if let Some(route) = &outcome.route {
        lines.push(format!("route: {} -> {}", route.group_id, route.tool_id));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::{FakeProvider, TEST_RULES};
    use crate::config::GatewayConfig;
    use crate::grouping::GroupRules;
    use crate::mcp::errors;
    use serde_json::json;
    use std::sync::Arc;

    fn gateway() -> GatewayContext {
        let provider = Arc::new(FakeProvider::with_tools(&[
            ("hwp_insert_text", "Insert text at the cursor"),
            ("hwp_create_table", "Create a table"),
        ]));
        let rules = GroupRules::parse(TEST_RULES).expect("rules");
        GatewayContext::new(provider, rules, &GatewayConfig::default())
    }

    #[test]
    fn returns_ranked_hits() {
        let result = call(&gateway(), &json!({"query": "insert text", "top_k": 1}));
        assert_eq!(result["isError"], json!(false));
        let hits = result["structuredContent"]["results"].as_array().expect("results");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], json!("hwp_insert_text"));
        assert_eq!(hits[0]["group"], json!("text"));
        assert!(hits[0]["tool_id"].as_str().is_some_and(|id| id.starts_with("hwp_insert_text:")));
        assert_eq!(result["structuredContent"]["route"]["group_id"], json!("text"));
    }

    #[test]
    fn missing_query_is_invalid_input() {
        let result = call(&gateway(), &json!({"top_k": 3}));
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["structuredContent"]["error"]["kind"], json!(errors::INVALID_INPUT));
    }

    #[test]
    fn no_match_is_an_empty_list() {
        let result = call(&gateway(), &json!({"query": "zebra migration"}));
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["structuredContent"]["results"], json!([]));
        assert!(result["structuredContent"]["route"].is_null());
    }
}

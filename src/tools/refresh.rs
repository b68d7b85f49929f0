use crate::gateway::GatewayContext;
use crate::tools::{gateway_error_result, success_result};
use serde_json::Value;

pub fn call(gateway: &GatewayContext, _args: &Value) -> Value {
    match gateway.refresh() {
        Ok(outcome) => {
            let groups: Vec<String> = outcome
                .groups
                .iter()
                .map(|(group, count)| format!("{group}={count}"))
                .collect();
            let text = format!(
                "registry generation {}: {} tools ({})",
                outcome.generation,
                outcome.count,
                groups.join(", ")
            );
            success_result(text, &outcome)
        }
        Err(err) => gateway_error_result(&err),
    }
}

use crate::gateway::GatewayContext;
use crate::input::{arguments_object, required_id};
use crate::tools::{gateway_error_result, input_error_result, success_result};
use serde_json::Value;

pub fn call(gateway: &GatewayContext, args: &Value) -> Value {
    let tool_id = match arguments_object(args).and_then(|obj| required_id(obj, "tool_id")) {
        Ok(tool_id) => tool_id,
        Err(err) => return input_error_result(err),
    };

    match gateway.describe(tool_id) {
        Ok(description) => {
            let text = serde_json::to_string_pretty(&description)
                .unwrap_or_else(|_| description.record.tool_id.clone());
            success_result(text, &description)
        }
        Err(err) => gateway_error_result(&err),
    }
}

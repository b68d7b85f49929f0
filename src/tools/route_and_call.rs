use crate::backend::CancelFlag;
use crate::gateway::GatewayContext;
use crate::input::{arguments_object, call_options, forwarded_arguments, required_str};
use crate::tools::{gateway_error_result, input_error_result};
use serde_json::{Value, json};

/// The backend's `content` and `isError` with the routing decision in
/// `structuredContent`.
pub fn call(gateway: &GatewayContext, args: &Value, cancel: Option<CancelFlag>) -> Value {
    let parsed = arguments_object(args).and_then(|obj| {
        Ok((
            required_str(obj, "query")?,
            forwarded_arguments(obj)?,
            call_options(obj)?,
        ))
    });
    let (query, arguments, options) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return input_error_result(err),
    };
    let options = options.with_cancel(cancel);

    let outcome = match gateway.route_and_call(query, &arguments, &options) {
        Ok(outcome) => outcome,
        Err(err) => return gateway_error_result(&err),
    };
    let content = outcome
        .result
        .get("content")
        .cloned()
        .unwrap_or_else(|| json!([]));
    json!({
        "content": content,
        "structuredContent": {
            "decision": outcome.decision,
            "tool_name": outcome.tool_name,
            "result": outcome.result
        },
        "isError": outcome.is_error
    })
}

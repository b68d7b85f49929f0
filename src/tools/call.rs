use crate::backend::CancelFlag;
use crate::gateway::GatewayContext;
use crate::input::{arguments_object, call_options, forwarded_arguments, required_id};
use crate::tools::{gateway_error_result, input_error_result};
use serde_json::Value;

/// Returns the backend result verbatim, including `isError: true` results.
pub fn call(gateway: &GatewayContext, args: &Value, cancel: Option<CancelFlag>) -> Value {
    let parsed = arguments_object(args).and_then(|obj| {
        Ok((
            required_id(obj, "tool_id")?,
            forwarded_arguments(obj)?,
            call_options(obj)?,
        ))
    });
    let (tool_id, arguments, options) = match parsed {
        Ok(parsed) => parsed,
        Err(err) => return input_error_result(err),
    };
    let options = options.with_cancel(cancel);

    match gateway.call(tool_id, &arguments, &options) {
        Ok(outcome) => outcome.result,
        Err(err) => gateway_error_result(&err),
    }
}

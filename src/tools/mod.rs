use crate::error::GatewayError;
use crate::input::InputError;
use crate::mcp::errors;
use serde::Serialize;
use serde_json::json;

pub mod call;
pub mod describe;
pub mod refresh;
pub mod route_and_call;
pub mod search;

pub fn error_result(
    kind: &'static str,
    message: impl Into<String>,
    source: Option<&str>,
) -> serde_json::Value {
    let message = message.into();
    let mut error = json!({
        "kind": kind,
        "message": message,
    });

    if let Some(source) = source
        && let Some(obj) = error.as_object_mut()
    {
        obj.insert("source".to_string(), json!(source));
    }

    json!({
        "content": [{"type": "text", "text": format!("Error: {message}")}],
        "structuredContent": {"error": error},
        "isError": true
    })
}

pub fn input_error_result(err: InputError) -> serde_json::Value {
    error_result(err.kind, err.message, None)
}

/// Error envelope for a gateway failure; `source` is the tool_id or query.
pub fn gateway_error_result(err: &GatewayError) -> serde_json::Value {
    let mut result = error_result(err.kind(), err.to_string(), err.subject());
    if let Some(details) = err.details()
        && let Some(error) = result
            .get_mut("structuredContent")
            .and_then(|content| content.get_mut("error"))
    {
        error["details"] = details;
    }
    result
}

/// Success envelope carrying `structured` both as JSON and as text.
pub fn success_result(text: impl Into<String>, structured: &impl Serialize) -> serde_json::Value {
    match serde_json::to_value(structured) {
        Ok(structured) => json!({
            "content": [{"type": "text", "text": text.into()}],
            "structuredContent": structured,
            "isError": false
        }),
        Err(err) => error_result(
            errors::INTERNAL_ERROR,
            format!("failed to serialize result: {err}"),
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;

    #[test]
    fn gateway_errors_carry_kind_source_and_details() {
        let err = GatewayError::from(RegistryError::NotFound {
            tool_id: "hwp_open:aaaa".into(),
            current_tool_id: Some("hwp_open:bbbb".into()),
        });
        let result = gateway_error_result(&err);
        assert_eq!(result["isError"], json!(true));
        let error = &result["structuredContent"]["error"];
        assert_eq!(error["kind"], json!(errors::NOT_FOUND));
        assert_eq!(error["source"], json!("hwp_open:aaaa"));
        assert_eq!(error["details"]["current_tool_id"], json!("hwp_open:bbbb"));
        assert!(
            result["content"][0]["text"]
                .as_str()
                .is_some_and(|text| text.starts_with("Error: "))
        );
    }

    #[test]
    fn errors_without_subject_omit_source() {
        let result = gateway_error_result(&GatewayError::NotInitialized);
        let error = &result["structuredContent"]["error"];
        assert_eq!(error["kind"], json!(errors::NOT_INITIALIZED));
        assert!(error.get("source").is_none());
        assert!(error.get("details").is_none());
    }
}

use serde_json::json;

pub const TOOL_SEARCH: &str = "tool_search";
pub const TOOL_DESCRIBE: &str = "tool_describe";
pub const TOOL_CALL: &str = "tool_call";
pub const TOOL_ROUTE_AND_CALL: &str = "route_and_call";
pub const TOOL_REGISTRY_REFRESH: &str = "tool_registry_refresh";

pub const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

pub fn tool_search_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "top_k": { "type": "integer", "minimum": 1 },
            "group": { "type": "string" }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

pub fn tool_describe_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "tool_id": { "type": "string" }
        },
        "required": ["tool_id"],
        "additionalProperties": false
    })
}

pub fn tool_call_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "tool_id": { "type": "string" },
            "arguments": { "type": "object" },
            "timeout_ms": { "type": "integer", "minimum": 1, "maximum": MAX_TIMEOUT_MS }
        },
        "required": ["tool_id"],
        "additionalProperties": false
    })
}

pub fn route_and_call_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "arguments": { "type": "object" },
            "timeout_ms": { "type": "integer", "minimum": 1, "maximum": MAX_TIMEOUT_MS }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

pub fn tool_registry_refresh_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

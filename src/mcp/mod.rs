use serde_json::json;

pub mod contracts;
pub mod errors;

pub fn tool_definitions() -> Vec<serde_json::Value> {
    vec![
        json!({
            "name": contracts::TOOL_SEARCH,
            "description": "Rank backend HWP tools against a natural-language query. Read-only.",
            "inputSchema": contracts::tool_search_schema()
        }),
        json!({
            "name": contracts::TOOL_DESCRIBE,
            "description": "Show the registry record (schemas, parameters, group) for a tool_id.",
            "inputSchema": contracts::tool_describe_schema()
        }),
        json!({
            "name": contracts::TOOL_CALL,
            "description": "Forward arguments to the backend tool identified by tool_id.",
            "inputSchema": contracts::tool_call_schema()
        }),
        json!({
            "name": contracts::TOOL_ROUTE_AND_CALL,
            "description": "Pick one backend tool for a query deterministically and call it.",
            "inputSchema": contracts::route_and_call_schema()
        }),
        json!({
            "name": contracts::TOOL_REGISTRY_REFRESH,
            "description": "Rebuild the tool registry from a fresh backend listing.",
            "inputSchema": contracts::tool_registry_refresh_schema()
        }),
    ]
}

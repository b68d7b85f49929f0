pub const INVALID_INPUT: &str = "invalid_input";
pub const DUPLICATE_TOOL_NAME: &str = "duplicate_tool_name";
pub const INVALID_DESCRIPTOR: &str = "invalid_descriptor";
pub const INVALID_RULE: &str = "invalid_rule";
pub const NOT_FOUND: &str = "not_found";
pub const NO_CANDIDATE: &str = "no_candidate";
pub const NOT_INITIALIZED: &str = "not_initialized";
pub const NOT_SUPPORTED: &str = "not_supported";
pub const BACKEND_TIMEOUT: &str = "backend_timeout";
pub const BACKEND_CANCELLED: &str = "backend_cancelled";
pub const BACKEND_ERROR: &str = "backend_error";
pub const INTERNAL_ERROR: &str = "internal_error";

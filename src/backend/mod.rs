//! Backend tool providers the gateway fronts.

use crate::capability::ControllerCapabilities;
use crate::registry::ToolDescriptor;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub mod manifest;
pub mod stdio;

pub use manifest::ManifestBackend;
pub use stdio::StdioBackend;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("backend call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("backend call was cancelled")]
    Cancelled,
    #[error("backend error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("backend transport failed: {0}")]
    Transport(String),
    #[error("backend protocol violation: {0}")]
    Protocol(String),
}

/// Shared flag a caller flips to abandon an in-flight forward.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Falls back to the backend's configured timeout when unset.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn with_cancel(self, cancel: Option<CancelFlag>) -> Self {
        Self { cancel, ..self }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Anything that can list tools and run them by name.
pub trait ToolProvider: Send + Sync {
    fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError>;

    /// Run a tool. A returned value with `isError: true` is a tool-level
    /// failure reported by the backend; `Err` means the forward itself failed.
    fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<Value, BackendError>;

    /// `None` when the backend does not declare a platform; calls are not gated.
    fn capabilities(&self) -> Option<ControllerCapabilities> {
        None
    }

    /// Short label for logs.
    fn label(&self) -> String;
}

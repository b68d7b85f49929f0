use crate::backend::BackendError;
use crate::capability::{Capability, Platform};
use crate::grouping::RuleError;
use crate::mcp::errors;
use crate::registry::RegistryError;
use crate::router::RouteError;
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("registry not built yet; call tool_registry_refresh first")]
    NotInitialized,
    #[error("{tool_id} needs {capability}, which the {platform} backend does not support")]
    NotSupported {
        tool_id: String,
        capability: Capability,
        platform: Platform,
    },
    #[error("backend rejected {subject}: {source}")]
    Backend {
        /// `tool_id` of the forwarded call, or `tools/list` during a build.
        subject: String,
        source: BackendError,
    },
    #[error("{0}")]
    InvalidInput(String),
}

impl GatewayError {
    pub fn backend(subject: impl Into<String>, source: BackendError) -> Self {
        GatewayError::Backend {
            subject: subject.into(),
            source,
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Registry(RegistryError::DuplicateToolName { .. }) => {
                errors::DUPLICATE_TOOL_NAME
            }
            GatewayError::Registry(RegistryError::InvalidDescriptor { .. }) => {
                errors::INVALID_DESCRIPTOR
            }
            GatewayError::Registry(RegistryError::NotFound { .. }) => errors::NOT_FOUND,
            GatewayError::Rules(_) => errors::INVALID_RULE,
            GatewayError::Route(RouteError::NoCandidate { .. }) => errors::NO_CANDIDATE,
            GatewayError::NotInitialized => errors::NOT_INITIALIZED,
            GatewayError::NotSupported { .. } => errors::NOT_SUPPORTED,
            GatewayError::Backend { source, .. } => match source {
                BackendError::Timeout(_) => errors::BACKEND_TIMEOUT,
                BackendError::Cancelled => errors::BACKEND_CANCELLED,
                _ => errors::BACKEND_ERROR,
            },
            GatewayError::InvalidInput(_) => errors::INVALID_INPUT,
        }
    }

    /// The `tool_id` or query the error is about, when there is one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            GatewayError::Registry(RegistryError::DuplicateToolName { name }) => Some(name),
            GatewayError::Registry(RegistryError::NotFound { tool_id, .. }) => Some(tool_id),
            GatewayError::Route(RouteError::NoCandidate { query }) => Some(query),
            GatewayError::NotSupported { tool_id, .. } => Some(tool_id),
            GatewayError::Backend { subject, .. } => Some(subject),
            _ => None,
        }
    }

    /// Extra structured context merged into the error payload.
    pub fn details(&self) -> Option<Value> {
        match self {
            GatewayError::Registry(RegistryError::NotFound {
                current_tool_id: Some(current),
                ..
            }) => Some(json!({"current_tool_id": current})),
            GatewayError::NotSupported {
                capability,
                platform,
                ..
            } => Some(json!({"capability": capability, "platform": platform})),
            GatewayError::Backend {
                source: BackendError::Rpc { code, data, .. },
                ..
            } => Some(json!({"code": code, "data": data})),
            _ => None,
        }
    }

    /// Whether the gateway could not reach `ready` because of this error.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Rules(_)
                | GatewayError::Registry(
                    RegistryError::DuplicateToolName { .. } | RegistryError::InvalidDescriptor { .. }
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kinds_distinguish_routing_from_backend_failures() {
        let no_candidate = GatewayError::from(RouteError::NoCandidate {
            query: "make coffee".into(),
        });
        assert_eq!(no_candidate.kind(), errors::NO_CANDIDATE);
        assert_eq!(no_candidate.subject(), Some("make coffee"));

        let timeout = GatewayError::backend("hwp_save:1", BackendError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.kind(), errors::BACKEND_TIMEOUT);
        assert_eq!(timeout.subject(), Some("hwp_save:1"));

        let failed = GatewayError::backend("hwp_save:1", BackendError::Transport("gone".into()));
        assert_eq!(failed.kind(), errors::BACKEND_ERROR);
        assert!(failed.to_string().contains("gone"));
    }

    #[test]
    fn stale_id_carries_current_id() {
        let err = GatewayError::from(RegistryError::NotFound {
            tool_id: "hwp_open:old".into(),
            current_tool_id: Some("hwp_open:new".into()),
        });
        assert_eq!(err.kind(), errors::NOT_FOUND);
        assert_eq!(err.details(), Some(json!({"current_tool_id": "hwp_open:new"})));
        assert!(!err.is_build_failure());
    }
}

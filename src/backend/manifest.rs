use super::{BackendError, CallOptions, ToolProvider};
use crate::capability::{ControllerCapabilities, Platform};
use crate::mcp::errors;
use crate::registry::ToolDescriptor;
use crate::tools::error_result;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Listing {
        #[serde(default)]
        platform: Option<Platform>,
        tools: Vec<ToolDescriptor>,
    },
    Bare(Vec<ToolDescriptor>),
}

struct Manifest {
    platform: Option<Platform>,
    tools: Vec<ToolDescriptor>,
}

/// Static tool listing read from a JSON file.
///
/// The file is re-read on every listing so a refresh observes edits. Calls
/// are answered in dry-run mode: the result echoes the tool and arguments.
pub struct ManifestBackend {
    path: PathBuf,
    platform: Option<Platform>,
}

impl ManifestBackend {
    /// `platform` overrides whatever the file declares.
    pub fn open(path: impl Into<PathBuf>, platform: Option<Platform>) -> Result<Self, BackendError> {
        let backend = Self {
            path: path.into(),
            platform,
        };
        backend.read()?;
        Ok(backend)
    }

    fn read(&self) -> Result<Manifest, BackendError> {
        let content = fs::read_to_string(&self.path).map_err(|err| {
            BackendError::Transport(format!("failed to read {}: {err}", self.path.display()))
        })?;
        let file: ManifestFile = serde_json::from_str(&content).map_err(|err| {
            BackendError::Protocol(format!("invalid manifest {}: {err}", self.path.display()))
        })?;
        Ok(match file {
            ManifestFile::Listing { platform, tools } => Manifest { platform, tools },
            ManifestFile::Bare(tools) => Manifest {
                platform: None,
                tools,
            },
        })
    }
}

impl ToolProvider for ManifestBackend {
    fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        Ok(self.read()?.tools)
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<Value, BackendError> {
        if options.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let manifest = self.read()?;
        if !manifest.tools.iter().any(|tool| tool.name == name) {
            return Ok(error_result(
                errors::INVALID_INPUT,
                format!("unknown tool: {name}"),
                Some(name),
            ));
        }
        Ok(json!({
            "content": [{"type": "text", "text": format!("dry run: {name}")}],
            "structuredContent": {
                "dry_run": true,
                "tool": name,
                "arguments": arguments
            },
            "isError": false
        }))
    }

    fn capabilities(&self) -> Option<ControllerCapabilities> {
        let declared = self.platform.or_else(|| self.read().ok()?.platform);
        declared.map(ControllerCapabilities::for_platform)
    }

    fn label(&self) -> String {
        format!("manifest:{}", self.path.display())
    }
}

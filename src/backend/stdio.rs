use super::{BackendError, CallOptions, ToolProvider};
use crate::capability::{ControllerCapabilities, Platform};
use crate::registry::ToolDescriptor;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const PROTOCOL_VERSION: &str = "2025-11-25";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

struct Connection {
    child: Child,
    stdin: ChildStdin,
    responses: Receiver<String>,
}

/// Child MCP server spoken to over NDJSON JSON-RPC on its stdin/stdout.
///
/// One request is in flight at a time. A reader thread pushes stdout lines
/// into a channel so every wait can observe a deadline and a cancel flag;
/// replies to abandoned requests are dropped by id.
pub struct StdioBackend {
    command: String,
    connection: Mutex<Connection>,
    next_id: AtomicU64,
    default_timeout: Duration,
    platform: Option<Platform>,
}

impl StdioBackend {
    pub fn spawn(
        command: &str,
        args: &[String],
        default_timeout: Duration,
        platform: Option<Platform>,
    ) -> Result<Self, BackendError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| BackendError::Transport(format!("failed to spawn {command}: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Transport("child stdout unavailable".into()))?;

        let (sender, responses) = mpsc::channel();
        thread::Builder::new()
            .name("backend-stdout".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if sender.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(|err| BackendError::Transport(format!("failed to start reader: {err}")))?;

        let backend = Self {
            command: command.to_string(),
            connection: Mutex::new(Connection {
                child,
                stdin,
                responses,
            }),
            next_id: AtomicU64::new(1),
            default_timeout,
            platform,
        };
        backend.handshake()?;
        Ok(backend)
    }

    fn handshake(&self) -> Result<(), BackendError> {
        let result = self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
            &CallOptions::default(),
        )?;
        tracing::info!(
            command = %self.command,
            server = result
                .get("serverInfo")
                .and_then(|info| info.get("name"))
                .and_then(|name| name.as_str())
                .unwrap_or("unknown"),
            "backend initialized"
        );
        self.notify("notifications/initialized")
    }

    fn notify(&self, method: &str) -> Result<(), BackendError> {
        let mut connection = self.lock()?;
        let message = json!({"jsonrpc": "2.0", "method": method});
        write_line(&mut connection.stdin, &message)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, BackendError> {
        self.connection
            .lock()
            .map_err(|_| BackendError::Transport("backend connection poisoned".into()))
    }

    fn request(
        &self,
        method: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value, BackendError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut connection = self.lock()?;

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        write_line(&mut connection.stdin, &message)?;

        loop {
            if options.is_cancelled() {
                let notice = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/cancelled",
                    "params": {"requestId": id, "reason": "cancelled by gateway caller"}
                });
                if let Err(err) = write_line(&mut connection.stdin, &notice) {
                    tracing::debug!(method, id, error = %err, "could not forward cancellation");
                }
                return Err(BackendError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(method, id, "backend request timed out");
                return Err(BackendError::Timeout(timeout));
            }
            let line = match connection.responses.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    let status = connection
                        .child
                        .try_wait()
                        .ok()
                        .flatten()
                        .map(|status| status.to_string())
                        .unwrap_or_else(|| "closed stdout".to_string());
                    return Err(BackendError::Transport(format!("backend exited ({status})")));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<Value>(&line) else {
                tracing::warn!(method, "ignoring non-JSON line from backend");
                continue;
            };
            if response.get("id").and_then(Value::as_u64) != Some(id) {
                // Notification, server-initiated request or a late reply.
                continue;
            }
            return parse_response(response);
        }
    }
}

fn write_line(stdin: &mut ChildStdin, message: &Value) -> Result<(), BackendError> {
    let serialized = serde_json::to_string(message)
        .map_err(|err| BackendError::Protocol(format!("failed to serialize request: {err}")))?;
    writeln!(stdin, "{serialized}")
        .and_then(|_| stdin.flush())
        .map_err(|err| BackendError::Transport(format!("failed to write to backend: {err}")))
}

fn parse_response(mut response: Value) -> Result<Value, BackendError> {
    if let Some(error) = response.get("error") {
        return Err(BackendError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            data: error.get("data").cloned(),
        });
    }
    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| BackendError::Protocol("response has neither result nor error".into()))
}

impl ToolProvider for StdioBackend {
    fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let mut result = self.request("tools/list", params, &CallOptions::default())?;
            let page = result
                .get_mut("tools")
                .map(Value::take)
                .ok_or_else(|| BackendError::Protocol("tools/list result has no tools".into()))?;
            let page: Vec<ToolDescriptor> = serde_json::from_value(page)
                .map_err(|err| BackendError::Protocol(format!("invalid tool listing: {err}")))?;
            tools.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(tools);
            }
        }
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<Value, BackendError> {
        self.request(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            options,
        )
    }

    fn capabilities(&self) -> Option<ControllerCapabilities> {
        self.platform.map(ControllerCapabilities::for_platform)
    }

    fn label(&self) -> String {
        format!("stdio:{}", self.command)
    }
}

impl Drop for StdioBackend {
    fn drop(&mut self) {
        if let Ok(connection) = self.connection.get_mut() {
            let _ = connection.child.kill();
            let _ = connection.child.wait();
        }
    }
}

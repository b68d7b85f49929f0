use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;

mod backend;
mod capability;
mod config;
mod error;
mod eval;
mod gateway;
mod grouping;
mod input;
mod mcp;
mod registry;
mod retrieval;
mod router;
mod tools;

use backend::{CancelFlag, ManifestBackend, StdioBackend, ToolProvider};
use config::{BackendKind, GatewayConfig};
use gateway::GatewayContext;
use grouping::GroupRules;

const PROTOCOL_VERSION: &str = "2025-11-25";

#[derive(Parser)]
#[command(name = "mcp-hwp-gateway")]
#[command(
    version,
    about = "Deterministic routing gateway in front of an HWP MCP tool server"
)]
struct Cli {
    /// Gateway config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Use a static JSON tool listing as the backend
    #[arg(long, global = true, conflicts_with = "backend_command")]
    manifest: Option<PathBuf>,
    /// Spawn this MCP server as the stdio backend
    #[arg(long, global = true)]
    backend_command: Option<String>,
    /// Argument passed to the backend command (repeatable)
    #[arg(long = "backend-arg", global = true, allow_hyphen_values = true)]
    backend_args: Vec<String>,
    /// Log filter, e.g. `debug` or `mcp_hwp_gateway=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SearchArgs {
    /// Natural-language query
    query: String,
    /// Number of candidates to return
    #[arg(long)]
    top_k: Option<u64>,
    /// Restrict candidates to one group
    #[arg(long)]
    group: Option<String>,
    /// Output JSON structuredContent
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct CallArgs {
    tool_id: String,
    /// Tool arguments as a JSON object
    #[arg(long)]
    arguments: Option<String>,
    /// Forward timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Output JSON structuredContent
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP stdio server
    Serve {
        /// Serve MCP over stdio (NDJSON)
        #[arg(long)]
        stdio: bool,
    },
    /// Rank backend tools against a query
    Search(SearchArgs),
    /// Show the registry record for a tool_id
    Describe {
        tool_id: String,
        /// Output JSON structuredContent
        #[arg(long)]
        json: bool,
    },
    /// Forward a call to a backend tool
    Call(CallArgs),
    /// Print the routing decision for a query without calling the backend
    Route {
        query: String,
        /// Output JSON structuredContent
        #[arg(long)]
        json: bool,
    },
    /// Build the registry and print tool counts per group
    Refresh {
        /// Output JSON structuredContent
        #[arg(long)]
        json: bool,
    },
    /// Write the registry as JSON lines
    ExportRegistry {
        #[arg(long)]
        out: PathBuf,
    },
    /// Measure routing quality against a JSONL query set
    Eval {
        #[arg(long, default_value = "demos/queries.jsonl")]
        queries: PathBuf,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let gateway = build_gateway(&cli)?;

    match cli.command {
        Commands::Serve { stdio } => {
            if stdio {
                run_stdio_server(&gateway)
            } else {
                bail!("only --stdio transport is supported")
            }
        }
        Commands::Search(args) => run_search(&gateway, args),
        Commands::Describe { tool_id, json } => {
            let result = tools::describe::call(&gateway, &json!({"tool_id": tool_id}));
            print_tool_result(result, json)
        }
        Commands::Call(args) => run_call(&gateway, args),
        Commands::Route { query, json } => run_route(&gateway, &query, json),
        Commands::Refresh { json } => {
            let result = tools::refresh::call(&gateway, &json!({}));
            print_tool_result(result, json)
        }
        Commands::ExportRegistry { out } => run_export(&gateway, out),
        Commands::Eval { queries, top_k } => run_eval(&gateway, queries, top_k),
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_gateway(cli: &Cli) -> Result<GatewayContext> {
    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(manifest) = &cli.manifest {
        config.backend.kind = BackendKind::Manifest;
        config.backend.manifest = Some(manifest.clone());
    }
    if let Some(command) = &cli.backend_command {
        config.backend.kind = BackendKind::Stdio;
        config.backend.command = Some(command.clone());
        config.backend.args = cli.backend_args.clone();
    }

    let rules = match &config.grouping.rules {
        Some(path) => GroupRules::load(path)
            .with_context(|| format!("failed to load grouping rules {}", path.display()))?,
        None => GroupRules::builtin().context("built-in grouping rules are invalid")?,
    };
    let provider = build_provider(&config)?;
    tracing::info!(
        backend = %provider.label(),
        groups = rules.labels().len(),
        default_group = rules.default_group(),
        "gateway configured"
    );
    Ok(GatewayContext::new(provider, rules, &config))
}

fn build_provider(config: &GatewayConfig) -> Result<Arc<dyn ToolProvider>> {
    let backend = &config.backend;
    match backend.kind {
        BackendKind::Manifest => {
            let Some(path) = &backend.manifest else {
                bail!("backend.manifest is required for the manifest backend");
            };
            let provider = ManifestBackend::open(path, backend.platform)
                .with_context(|| format!("failed to open manifest {}", path.display()))?;
            Ok(Arc::new(provider))
        }
        BackendKind::Stdio => {
            let Some(command) = &backend.command else {
                bail!("backend.command is required for the stdio backend (or pass --manifest)");
            };
            let provider =
                StdioBackend::spawn(command, &backend.args, backend.timeout(), backend.platform)
                    .with_context(|| format!("failed to start backend {command}"))?;
            Ok(Arc::new(provider))
        }
    }
}

fn run_search(gateway: &GatewayContext, args: SearchArgs) -> Result<()> {
    let mut map = Map::new();
    map.insert("query".to_string(), json!(args.query));
    if let Some(top_k) = args.top_k {
        map.insert("top_k".to_string(), json!(top_k));
    }
    if let Some(group) = args.group {
        map.insert("group".to_string(), json!(group));
    }
    let result = tools::search::call(gateway, &Value::Object(map));
    print_tool_result(result, args.json)
}

fn run_call(gateway: &GatewayContext, args: CallArgs) -> Result<()> {
    let mut map = Map::new();
    map.insert("tool_id".to_string(), json!(args.tool_id));
    if let Some(arguments) = &args.arguments {
        let arguments: Value =
            serde_json::from_str(arguments).context("--arguments must be valid JSON")?;
        map.insert("arguments".to_string(), arguments);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        map.insert("timeout_ms".to_string(), json!(timeout_ms));
    }
    let result = tools::call::call(gateway, &Value::Object(map), None);
    print_tool_result(result, args.json)
}

fn run_route(gateway: &GatewayContext, query: &str, json_output: bool) -> Result<()> {
    let result = match gateway.route(query) {
        Ok(decision) => {
            let text = format!(
                "{} -> {} (confidence {:.4})",
                decision.group_id, decision.tool_id, decision.confidence
            );
            tools::success_result(text, &decision)
        }
        Err(err) => tools::gateway_error_result(&err),
    };
    print_tool_result(result, json_output)
}

fn run_export(gateway: &GatewayContext, out: PathBuf) -> Result<()> {
    let snapshot = gateway.snapshot()?;
    let file =
        File::create(&out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let count = snapshot
        .export_jsonl(&mut writer)
        .and_then(|count| writer.flush().map(|_| count))
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("wrote {count} records to {}", out.display());
    Ok(())
}

fn run_eval(gateway: &GatewayContext, queries: PathBuf, top_k: usize) -> Result<()> {
    let rows = eval::load_queries(&queries)?;
    let report = eval::evaluate(gateway, &rows, top_k)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_tool_result(result: Value, json_output: bool) -> Result<()> {
    let is_error = result
        .get("isError")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);

    if is_error {
        let message = result
            .get("structuredContent")
            .and_then(|value| value.get("error"))
            .and_then(|value| value.get("message"))
            .and_then(|value| value.as_str())
            .or_else(|| {
                result
                    .get("content")
                    .and_then(|value| value.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|value| value.get("text"))
                    .and_then(|value| value.as_str())
            })
            .unwrap_or("tool error");
        eprintln!("{message}");
        process::exit(1);
    }

    if json_output {
        let structured = result
            .get("structuredContent")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let output = serde_json::to_string_pretty(&structured)?;
        println!("{output}");
        return Ok(());
    }

    let text = result
        .get("content")
        .and_then(|value| value.as_array())
        .and_then(|arr| arr.first())
        .and_then(|value| value.get("text"))
        .and_then(|value| value.as_str())
        .unwrap_or("");
    println!("{text}");
    Ok(())
}

/// Cancel flags of `tools/call` requests read but not yet answered, keyed by
/// the JSON text of the request id.
type PendingCalls = Mutex<BTreeMap<String, CancelFlag>>;

/// Requests are answered in order by one worker. The reader stays free to
/// apply `notifications/cancelled` to a call that is queued or running.
fn run_stdio_server(gateway: &GatewayContext) -> Result<()> {
    let pending = PendingCalls::default();
    let pending = &pending;
    let (sender, receiver) = mpsc::channel::<Value>();
    tracing::info!("serving MCP over stdio");

    thread::scope(|scope| {
        let worker = scope.spawn(move || serve_requests(gateway, receiver, pending));
        let read = read_requests(sender, pending);
        let served = worker
            .join()
            .unwrap_or_else(|_| Err(anyhow!("stdio worker panicked")));
        read.and(served)
    })
}

fn lock_pending(pending: &PendingCalls) -> MutexGuard<'_, BTreeMap<String, CancelFlag>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_requests(sender: mpsc::Sender<Value>, pending: &PendingCalls) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed request line");
                continue;
            }
        };

        if request.get("method").and_then(Value::as_str) == Some("notifications/cancelled") {
            cancel_request(&request, pending);
            continue;
        }
        track_request(&request, pending);
        if sender.send(request).is_err() {
            // Worker stopped on a write failure.
            break;
        }
    }
    Ok(())
}

fn track_request(request: &Value, pending: &PendingCalls) {
    if request.get("method").and_then(Value::as_str) == Some("tools/call")
        && let Some(id) = request.get("id")
    {
        lock_pending(pending).insert(id.to_string(), CancelFlag::new());
    }
}

fn cancel_request(notification: &Value, pending: &PendingCalls) {
    let Some(id) = notification
        .get("params")
        .and_then(|params| params.get("requestId"))
    else {
        return;
    };
    match lock_pending(pending).get(&id.to_string()) {
        Some(flag) => {
            tracing::info!(request_id = %id, "cancelling tools/call");
            flag.cancel();
        }
        None => tracing::debug!(request_id = %id, "cancel for unknown or finished request"),
    }
}

fn serve_requests(
    gateway: &GatewayContext,
    receiver: mpsc::Receiver<Value>,
    pending: &PendingCalls,
) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = io::BufWriter::new(stdout.lock());

    for request in receiver {
        let Some(response) = handle_request(gateway, &request, pending) else {
            continue;
        };
        let serialized =
            serde_json::to_string(&response).context("failed to serialize response")?;
        writeln!(writer, "{serialized}").context("failed to write response")?;
        writer.flush().context("failed to flush response")?;
    }
    Ok(())
}

fn handle_request(
    gateway: &GatewayContext,
    request: &Value,
    pending: &PendingCalls,
) -> Option<Value> {
    let method = request.get("method").and_then(|value| value.as_str());
    let id = request.get("id").cloned();
    match (method, id) {
        (Some("initialize"), Some(id)) => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        })),
        (Some("ping"), Some(id)) => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {}
        })),
        (Some("tools/list"), Some(id)) => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": mcp::tool_definitions()
            }
        })),
        (Some("tools/call"), Some(id)) => {
            let key = id.to_string();
            let cancel = lock_pending(pending).get(&key).cloned();
            let result = handle_tool_call(gateway, request, cancel);
            lock_pending(pending).remove(&key);
            Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result
            }))
        }
        (Some(method), Some(id)) => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": -32601,
                "message": format!("method not found: {method}")
            }
        })),
        // Notifications.
        _ => None,
    }
}

fn handle_tool_call(
    gateway: &GatewayContext,
    request: &serde_json::Value,
    cancel: Option<CancelFlag>,
) -> serde_json::Value {
    let params = request.get("params");
    let Some(params) = params.and_then(|value| value.as_object()) else {
        return tools::error_result(mcp::errors::INVALID_INPUT, "params must be an object", None);
    };

    let name = params.get("name").and_then(|value| value.as_str());
    let Some(name) = name else {
        return tools::error_result(
            mcp::errors::INVALID_INPUT,
            "params.name must be a string",
            None,
        );
    };

    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    tracing::debug!(tool = name, "tools/call");
    match name {
        mcp::contracts::TOOL_SEARCH => tools::search::call(gateway, &args),
        mcp::contracts::TOOL_DESCRIBE => tools::describe::call(gateway, &args),
        mcp::contracts::TOOL_CALL => tools::call::call(gateway, &args, cancel),
        mcp::contracts::TOOL_ROUTE_AND_CALL => {
            tools::route_and_call::call(gateway, &args, cancel)
        }
        mcp::contracts::TOOL_REGISTRY_REFRESH => tools::refresh::call(gateway, &args),
        _ => tools::error_result(
            mcp::errors::INVALID_INPUT,
            format!("unknown tool: {name}"),
            Some(name),
        ),
    }
}

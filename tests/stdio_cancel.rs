use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

const MANIFEST: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/hwp_tools.json");

fn route_and_call(id: u64, query: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": "route_and_call",
            "arguments": {"query": query, "arguments": {"text": "hello"}}
        }
    })
}

#[test]
fn stray_cancel_keeps_responses_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mcp-hwp-gateway"))
        .args(["serve", "--stdio", "--manifest", MANIFEST])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("stdin available");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout available"));

    let requests = [
        route_and_call(1, "put text in the document"),
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": {"requestId": 99, "reason": "stale"}
        }),
        route_and_call(2, "export the document as pdf"),
        serde_json::json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
    ];
    for request in &requests {
        writeln!(stdin, "{}", serde_json::to_string(request)?)?;
    }
    stdin.flush()?;
    drop(stdin);

    let mut responses = Vec::new();
    for _ in 0..3 {
        let mut line = String::new();
        stdout.read_line(&mut line)?;
        responses.push(serde_json::from_str::<serde_json::Value>(line.trim())?);
    }

    let ids: Vec<Option<i64>> = responses
        .iter()
        .map(|response| response.get("id").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(ids, [Some(1), Some(2), Some(3)]);

    let tool_name = |response: &serde_json::Value| {
        response
            .get("result")
            .and_then(|v| v.get("structuredContent"))
            .and_then(|v| v.get("tool_name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    assert_eq!(tool_name(&responses[0]).as_deref(), Some("hwp_insert_text"));
    assert_eq!(tool_name(&responses[1]).as_deref(), Some("hwp_export_pdf"));

    // Closing stdin drains the worker and ends the server cleanly.
    assert!(child.wait()?.success());
    Ok(())
}

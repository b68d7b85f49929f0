use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

const MANIFEST: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/hwp_tools.json");

fn send_request(
    stdin: &mut std::process::ChildStdin,
    stdout: &mut BufReader<std::process::ChildStdout>,
    request: serde_json::Value,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let serialized = serde_json::to_string(&request)?;
    writeln!(stdin, "{serialized}")?;
    stdin.flush()?;

    let mut line = String::new();
    stdout.read_line(&mut line)?;
    let response: serde_json::Value = serde_json::from_str(line.trim())?;
    Ok(response)
}

fn tool_call(id: u64, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

#[test]
fn route_and_call_forwards_to_the_routed_tool() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mcp-hwp-gateway"))
        .args(["serve", "--stdio", "--manifest", MANIFEST])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("stdin available");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout available"));

    let response = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(
            30,
            "route_and_call",
            serde_json::json!({
                "query": "insert text at the cursor",
                "arguments": {"text": "안녕하세요"},
                "timeout_ms": 2000
            }),
        ),
    )?;
    let result = response.get("result").expect("result present");
    assert_eq!(result.get("isError").and_then(|v| v.as_bool()), Some(false));
    let structured = result.get("structuredContent").expect("structured present");
    assert_eq!(
        structured.get("tool_name").and_then(|v| v.as_str()),
        Some("hwp_insert_text")
    );
    let decision = structured.get("decision").expect("decision present");
    assert_eq!(
        decision.get("group_id").and_then(|v| v.as_str()),
        Some("text_insertion")
    );
    assert!(decision.get("confidence").and_then(|v| v.as_f64()).is_some_and(|c| c > 0.0));
    assert_eq!(
        structured
            .get("result")
            .and_then(|v| v.get("structuredContent"))
            .and_then(|v| v.get("arguments"))
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str()),
        Some("안녕하세요")
    );

    let tool_id = decision
        .get("tool_id")
        .and_then(|v| v.as_str())
        .expect("tool_id present")
        .to_string();
    let direct = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(31, "tool_call", serde_json::json!({"tool_id": tool_id, "arguments": {"text": "x"}})),
    )?;
    let direct = direct.get("result").expect("result present");
    assert_eq!(direct.get("isError").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        direct
            .get("structuredContent")
            .and_then(|v| v.get("tool"))
            .and_then(|v| v.as_str()),
        Some("hwp_insert_text")
    );

    let _ = child.kill();
    Ok(())
}

#[test]
fn unmatched_query_reports_no_candidate() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mcp-hwp-gateway"))
        .args(["serve", "--stdio", "--manifest", MANIFEST])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("stdin available");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout available"));

    let response = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(40, "route_and_call", serde_json::json!({"query": "brew espresso"})),
    )?;
    let result = response.get("result").expect("result present");
    assert_eq!(result.get("isError").and_then(|v| v.as_bool()), Some(true));
    let error = result
        .get("structuredContent")
        .and_then(|v| v.get("error"))
        .expect("error present");
    assert_eq!(error.get("kind").and_then(|v| v.as_str()), Some("no_candidate"));
    assert_eq!(error.get("source").and_then(|v| v.as_str()), Some("brew espresso"));

    let invalid = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(41, "route_and_call", serde_json::json!({"query": "save", "timeout_ms": 0})),
    )?;
    assert_eq!(
        invalid
            .get("result")
            .and_then(|v| v.get("structuredContent"))
            .and_then(|v| v.get("error"))
            .and_then(|v| v.get("kind"))
            .and_then(|v| v.as_str()),
        Some("invalid_input")
    );

    let unknown = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(42, "hwp_insert_text", serde_json::json!({"text": "direct"})),
    )?;
    assert_eq!(
        unknown
            .get("result")
            .and_then(|v| v.get("isError"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let _ = child.kill();
    Ok(())
}

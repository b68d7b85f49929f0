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
fn search_then_describe() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mcp-hwp-gateway"))
        .args(["serve", "--stdio", "--manifest", MANIFEST])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("stdin available");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout available"));

    let search = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(
            10,
            "tool_search",
            serde_json::json!({"query": "create a table with 3 rows", "top_k": 3}),
        ),
    )?;
    let result = search.get("result").expect("result present");
    assert_eq!(result.get("isError").and_then(|v| v.as_bool()), Some(false));
    let hits = result
        .get("structuredContent")
        .and_then(|v| v.get("results"))
        .and_then(|v| v.as_array())
        .expect("results present");
    assert_eq!(hits.len(), 3);
    assert_eq!(
        hits[0].get("name").and_then(|v| v.as_str()),
        Some("hwp_create_table")
    );
    assert_eq!(
        hits[0].get("group").and_then(|v| v.as_str()),
        Some("table_chart")
    );
    let scores: Vec<f64> = hits
        .iter()
        .filter_map(|hit| hit.get("score").and_then(|v| v.as_f64()))
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));

    let tool_id = hits[0]
        .get("tool_id")
        .and_then(|v| v.as_str())
        .expect("tool_id present")
        .to_string();
    let describe = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(11, "tool_describe", serde_json::json!({"tool_id": tool_id})),
    )?;
    let record = describe
        .get("result")
        .and_then(|v| v.get("structuredContent"))
        .expect("record present");
    assert_eq!(record.get("tool_id").and_then(|v| v.as_str()), Some(tool_id.as_str()));
    assert_eq!(record.get("required_capability").and_then(|v| v.as_str()), Some("create_table"));
    let parameters: Vec<&str> = record
        .get("parameters")
        .and_then(|v| v.as_array())
        .expect("parameters present")
        .iter()
        .filter_map(|p| p.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(parameters, ["cols", "rows"]);

    let missing = send_request(
        &mut stdin,
        &mut stdout,
        tool_call(12, "tool_describe", serde_json::json!({"tool_id": "hwp_create_table:0000000000000000"})),
    )?;
    let error = missing
        .get("result")
        .and_then(|v| v.get("structuredContent"))
        .and_then(|v| v.get("error"))
        .expect("error present");
    assert_eq!(error.get("kind").and_then(|v| v.as_str()), Some("not_found"));
    assert_eq!(
        error
            .get("details")
            .and_then(|v| v.get("current_tool_id"))
            .and_then(|v| v.as_str()),
        Some(tool_id.as_str())
    );

    let _ = child.kill();
    Ok(())
}

#[test]
fn search_results_are_stable_across_processes() -> Result<(), Box<dyn std::error::Error>> {
    let mut runs = Vec::new();
    for _ in 0..2 {
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
            tool_call(1, "tool_search", serde_json::json!({"query": "insert text", "top_k": 10})),
        )?;
        runs.push(response.get("result").cloned().expect("result present"));
        let _ = child.kill();
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

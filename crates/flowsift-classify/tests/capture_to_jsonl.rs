//! Full runs: flow dump on disk, through the reader and classifier, out as JSONL

use flowsift_capture::tnetstring::{encode, Value};
use flowsift_capture::FlowReader;
use flowsift_classify::{FlowClassifier, FlowProcessor, ProcessError, RunOutcome};
use flowsift_core::CaptureError;
use flowsift_export::{JsonlExporter, JsonlExporterConfig};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

fn http_flow(host: &str, method: &str, path: &str, response: Value, websocket: Value) -> Value {
    Value::dict([
        ("version", Value::Integer(19)),
        ("type", text("http")),
        ("id", text("c1f3c1a2-0000-4000-8000-000000000000")),
        (
            "client_conn",
            Value::dict([
                ("timestamp_start", Value::Float(1700000000.5)),
                ("timestamp_end", Value::Float(1700000010.0)),
            ]),
        ),
        (
            "server_conn",
            Value::dict([
                ("timestamp_start", Value::Float(1700000000.75)),
                ("timestamp_end", Value::Float(1700000009.25)),
            ]),
        ),
        (
            "request",
            Value::dict([
                ("host", text(host)),
                ("port", Value::Integer(443)),
                ("method", bytes(method.as_bytes())),
                ("scheme", bytes(b"https")),
                ("path", bytes(path.as_bytes())),
                ("http_version", bytes(b"HTTP/1.1")),
            ]),
        ),
        ("response", response),
        ("websocket", websocket),
    ])
}

fn response(status: i64, content_type: &str, body: &[u8]) -> Value {
    Value::dict([
        ("status_code", Value::Integer(status)),
        ("reason", bytes(b"OK")),
        (
            "headers",
            Value::List(vec![
                Value::List(vec![bytes(b"Content-Type"), bytes(content_type.as_bytes())]),
                Value::List(vec![bytes(b"Cache-Control"), bytes(b"no-cache")]),
            ]),
        ),
        ("content", bytes(body)),
    ])
}

fn ws_message(from_client: bool, content: &[u8], timestamp: f64) -> Value {
    Value::List(vec![
        Value::Integer(if from_client { 1 } else { 2 }),
        Value::Bool(from_client),
        bytes(content),
        Value::Float(timestamp),
        Value::Bool(false),
        Value::Bool(false),
    ])
}

fn sample_flows() -> Vec<Value> {
    vec![
        http_flow(
            "discord.com",
            "GET",
            "/api/v9/users/@me",
            response(200, "application/json", br#"{"id":"1","username":"wumpus"}"#),
            Value::Null,
        ),
        http_flow(
            "discord.com",
            "GET",
            "/assets/4f1c.js",
            response(200, "application/json", b"{}"),
            Value::Null,
        ),
        Value::dict([("version", Value::Integer(19)), ("type", text("tcp"))]),
        http_flow(
            "gateway.discord.gg",
            "GET",
            "/?encoding=json&v=9&compress=zlib-stream",
            response(101, "text/plain", b""),
            Value::dict([(
                "messages",
                Value::List(vec![
                    ws_message(true, br#"{"op":2,"d":{"token":"t"}}"#, 1700000001.0),
                    ws_message(false, &[0x78, 0x9c, 0xde, 0xad], 1700000001.5),
                    ws_message(true, br#"{"op":1,"d":42}"#, 1700000002.0),
                ]),
            )]),
        ),
        http_flow(
            "discord.com",
            "POST",
            "/api/v9/science",
            response(204, "application/json", b""),
            Value::Null,
        ),
        http_flow(
            "discord.com",
            "GET",
            "/channels/@me",
            response(200, "text/html", b"<!doctype html>"),
            Value::Null,
        ),
        http_flow(
            "discord.com",
            "GET",
            "/api/v9/users/@me/settings",
            Value::Null,
            Value::Null,
        ),
    ]
}

const EXPECTED: [&str; 4] = [
    r#"{"type":"http","timestamp_start":1700000000.5,"timestamp_end":1700000009.25,"request":{"method":"GET","path":"/api/v9/users/@me"},"response":{"status_code":200,"data":{"id":"1","username":"wumpus"}}}"#,
    r#"{"type":"ws","timestamp":1700000001.0,"direction":"send","data":{"op":2,"d":{"token":"t"}}}"#,
    r#"{"type":"ws_compressed","timestamp":1700000001.5,"direction":"recv","compressed_data":"789cdead"}"#,
    r#"{"type":"ws","timestamp":1700000002.0,"direction":"send","data":{"op":1,"d":42}}"#,
];

fn write_dump(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn dump(flows: &[Value]) -> Vec<u8> {
    flows.iter().flat_map(encode).collect()
}

fn run(path: &Path) -> (Result<RunOutcome, ProcessError>, String) {
    let reader = FlowReader::open(path).unwrap();
    let sink = JsonlExporter::new(Vec::new(), JsonlExporterConfig::default());
    let mut processor = FlowProcessor::new(FlowClassifier::default(), sink);

    let result = processor.run(reader);
    let output = String::from_utf8(processor.into_sink().into_inner()).unwrap();
    (result, output)
}

#[test]
fn test_capture_to_jsonl() {
    let file = write_dump(&dump(&sample_flows()));
    let (result, output) = run(file.path());

    let outcome = result.unwrap();
    assert!(outcome.fault.is_none());
    assert_eq!(outcome.stats.exchanges, 6);
    assert_eq!(outcome.stats.socket_events, 3);
    assert_eq!(outcome.stats.http_events, 1);
    assert_eq!(output.lines().collect::<Vec<_>>(), EXPECTED);
}

#[test]
fn test_rerun_is_byte_identical() {
    let file = write_dump(&dump(&sample_flows()));
    let (_, first) = run(file.path());
    let (_, second) = run(file.path());
    assert_eq!(first, second);
}

#[test]
fn test_corrupt_tail_keeps_prior_output() {
    let mut data = dump(&sample_flows());
    let tail = encode(&http_flow(
        "discord.com",
        "GET",
        "/api/v9/users/2",
        response(200, "application/json", br#"{"id":"2"}"#),
        Value::Null,
    ));
    data.extend_from_slice(&tail[..tail.len() - 7]);

    let file = write_dump(&data);
    let (result, output) = run(file.path());

    let outcome = result.unwrap();
    assert!(matches!(outcome.fault, Some(CaptureError::Format { flow: 7, .. })));
    assert_eq!(output.lines().collect::<Vec<_>>(), EXPECTED);
}

#[test]
fn test_malformed_socket_text_aborts() {
    let mut flows = sample_flows();
    flows.push(http_flow(
        "gateway.discord.gg",
        "GET",
        "/?v=9",
        Value::Null,
        Value::dict([(
            "messages",
            Value::List(vec![ws_message(true, b"{\"op\":", 1700000005.0)]),
        )]),
    ));
    flows.push(http_flow(
        "discord.com",
        "GET",
        "/api/v9/users/2",
        response(200, "application/json", br#"{"id":"2"}"#),
        Value::Null,
    ));

    let file = write_dump(&dump(&flows));
    let (result, output) = run(file.path());

    assert!(matches!(result, Err(ProcessError::MalformedPayload { .. })));
    assert_eq!(output.lines().collect::<Vec<_>>(), EXPECTED);
}

#[test]
fn test_empty_capture() {
    let file = write_dump(b"");
    let (result, output) = run(file.path());
    assert_eq!(result.unwrap().stats.exchanges, 0);
    assert!(output.is_empty());
}

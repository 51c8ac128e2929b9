//! Purpose: Hold top-level CLI command dispatch for `paramflow`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `check` treats the whole input as one stream, in line order.
//! Invariants: Per-element rejections never abort the stream; malformed JSON lines do.

use std::net::SocketAddr;
use std::sync::Arc;

use bstr::ByteSlice;
use paramflow::api::{JsonRequest, RequestMetadata, StreamReducer};

use super::*;
use super::endpoint_json::{endpoint_json, error_body_json};

pub(super) fn dispatch_command(
    command: Command,
    color_mode: ColorMode,
) -> Result<i32, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "paramflow", &mut io::stdout());
            Ok(0)
        }
        Command::Version => {
            emit_version_output();
            Ok(0)
        }
        Command::Describe { endpoint } => {
            let endpoint = load_endpoint(&endpoint)?;
            emit_json(endpoint_json(&endpoint));
            Ok(0)
        }
        Command::Check { endpoint, input } => {
            let endpoint = Arc::new(load_endpoint(&endpoint)?);
            let source = input
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "stdin".to_string());
            let bytes = read_input(input.as_deref())?;
            let base = RequestMetadata::default().with_information("source", source.as_str());
            let requests = parse_jsonl(&bytes, &source, &base)?;
            let rejected = check_stream(endpoint, requests, color_mode);
            if rejected > 0 {
                Ok(to_exit_code(ErrorKind::BadInput))
            } else {
                Ok(0)
            }
        }
        Command::Serve { endpoint, run } => {
            let bind: SocketAddr = run.bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9800.")
            })?;
            let config = serve::ServeConfig {
                bind,
                endpoint: load_endpoint(&endpoint)?,
                allow_non_loopback: run.allow_non_loopback,
                max_body_bytes: run.max_body_bytes,
                channel_capacity: run.channel_capacity,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(0)
        }
    }
}

/// Splits a JSONL buffer into requests; blank lines are skipped.
/// Each request gets a copy of `base` tagged with its line number.
pub(super) fn parse_jsonl(
    bytes: &[u8],
    source: &str,
    base: &RequestMetadata,
) -> Result<Vec<JsonRequest>, Error> {
    let mut requests = Vec::new();
    for (line_no, line) in bytes.lines().enumerate() {
        let line_no = line_no + 1;
        if line.trim().is_empty() {
            continue;
        }
        let text = line.to_str().map_err(|err| {
            Error::new(ErrorKind::BadInput)
                .with_message(format!("line {line_no} is not valid UTF-8"))
                .with_source(err)
        })?;
        let request = JsonRequest::from_json_str(text).map_err(|err| {
            err.with_hint(format!(
                "Line {line_no} must hold one JSON object; fix it and re-run."
            ))
        })?;
        let mut metadata = base.clone().with_information("line", line_no.to_string());
        metadata.description = format!("{source}:{line_no}");
        requests.push(request.with_metadata(metadata));
    }
    Ok(requests)
}

/// Runs `requests` as one stream, printing a result line per element.
/// Returns the number of rejected elements.
fn check_stream(
    endpoint: Arc<Endpoint>,
    requests: Vec<JsonRequest>,
    color_mode: ColorMode,
) -> u64 {
    let mut reducer = StreamReducer::new(endpoint.clone());
    let mut rejected = 0u64;
    for (index, request) in requests.into_iter().enumerate() {
        match reducer.evaluate(request, |request| request.resolve_all()) {
            Ok(parameters) => emit_jsonl(&json!({
                "index": index,
                "ok": true,
                "parameters": parameters,
            })),
            Err(err) => {
                rejected += 1;
                emit_jsonl(&json!({
                    "index": index,
                    "ok": false,
                    "error": error_body_json(&err),
                }));
                emit_notice(&rejection_notice(&endpoint, &err), color_mode);
            }
        }
    }
    rejected
}

fn rejection_notice(endpoint: &Endpoint, err: &Error) -> Notice {
    let mut details = Map::new();
    if let Some(index) = err.index() {
        details.insert("index".to_string(), json!(index));
    }
    if let Some(parameter) = err.parameter() {
        details.insert("parameter".to_string(), json!(parameter));
    }
    Notice {
        kind: "rejected".to_string(),
        time: paramflow::notice::now_rfc3339(),
        cmd: "check".to_string(),
        endpoint: endpoint.name().to_string(),
        message: error_message(err),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_jsonl, rejection_notice};
    use paramflow::api::{
        CommunicationPattern, Endpoint, Error, ErrorKind, ParameterDescriptor, RawRequest,
        RequestMetadata,
    };
    use serde_json::json;

    #[test]
    fn parse_jsonl_skips_blank_lines_and_tags_metadata() {
        let input = b"{\"name\":\"a\"}\n\n  \n{\"name\":\"b\"}\r\n";
        let base = RequestMetadata::default().with_information("source", "requests.jsonl");
        let requests = parse_jsonl(input, "requests.jsonl", &base).expect("parse");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].body()["name"], json!("b"));
        let metadata = requests[1].metadata();
        assert_eq!(metadata.description, "requests.jsonl:4");
        assert_eq!(
            metadata.information.get("line").map(String::as_str),
            Some("4")
        );
        assert_eq!(
            metadata.information.get("source").map(String::as_str),
            Some("requests.jsonl")
        );
    }

    #[test]
    fn parse_jsonl_rejects_non_object_lines() {
        let input = b"{\"name\":\"a\"}\n[1]\n";
        let err = parse_jsonl(input, "stdin", &RequestMetadata::default()).expect_err("array line");
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert!(err.hint().is_some_and(|hint| hint.contains("Line 2")));
    }

    #[test]
    fn rejection_notice_names_parameter_and_index() {
        let endpoint = Endpoint::new(
            "search",
            CommunicationPattern::ClientStream,
            vec![ParameterDescriptor::new("limit").expect("descriptor")],
        )
        .expect("endpoint");
        let err = Error::bad_input("constant parameter 'limit' changed value")
            .with_parameter("limit")
            .with_index(2);
        let notice = rejection_notice(&endpoint, &err);
        assert_eq!(notice.endpoint, "search");
        assert_eq!(notice.details["index"], json!(2));
        assert_eq!(notice.details["parameter"], json!("limit"));
    }
}

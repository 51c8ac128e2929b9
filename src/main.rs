//! Purpose: `paramflow` CLI entry point and command dispatch bootstrap.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout formats (JSONL for streams, JSON otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod endpoint_json;
mod serve;

use endpoint_json::default_message;
use paramflow::api::{
    DEFAULT_CHANNEL_CAPACITY, Endpoint, EndpointConfig, Error, ErrorKind, to_exit_code,
};
use paramflow::notice::{Notice, notice_json};

const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

fn main() {
    let exit_code = match run() {
        Ok(exit_code) => exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

/// Returns the process exit code; errors carry the color mode to report them with.
fn run() -> Result<i32, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                return Ok(err.exit_code());
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser, Debug)]
#[command(
    name = "paramflow",
    version,
    about = "Validate request parameters across request streams",
    long_about = None,
    before_help = r#"Endpoints are described as JSON. Requests are JSON objects, one per line.

Mental model:
  - `check` runs a JSONL file through one endpoint as a single stream
  - `describe` shows the resolved endpoint (kinds, defaults, generated ids)
  - `serve` exposes the same pipeline over HTTP
"#,
    after_help = r#"EXAMPLES
  $ paramflow describe search.json
  $ printf '{"name":"a"}\n{"name":"b","limit":10}\n' | paramflow check search.json
  $ paramflow serve search.json --bind 127.0.0.1:9800

LEARN MORE
  $ paramflow <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Validate a JSONL request stream against an endpoint",
        long_about = r#"Validate JSON Lines requests against an endpoint description.

All lines form one stream: constant parameters must keep the value they first
arrive with, and single-request endpoints accept only one line. Each line yields
one JSON result on stdout. Rejections are also reported as notices on stderr."#,
        after_help = r#"EXAMPLES
  $ paramflow check search.json --input requests.jsonl
  $ jq -c '.[]' requests.json | paramflow check search.json

NOTES
  - Exit code is 0 when every line passes, 4 when any line is rejected"#
    )]
    Check {
        #[arg(help = "Endpoint description (JSON)", value_hint = ValueHint::FilePath)]
        endpoint: PathBuf,
        #[arg(
            long,
            short = 'i',
            value_name = "FILE",
            help = "Read requests from FILE instead of stdin",
            value_hint = ValueHint::FilePath
        )]
        input: Option<PathBuf>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Print the resolved endpoint as JSON",
        long_about = r#"Load an endpoint description and print it with defaults applied.

Layout:
  {"name": "search", "pattern": "client-stream",
   "parameters": [{"name": "limit", "kind": "integer", "necessity": "required",
                   "mutability": "constant", "default": 10}]}

Omitted fields default to kind "any", necessity "required", mutability
"variable" and pattern "request-response"."#,
        after_help = r#"EXAMPLES
  $ paramflow describe search.json"#
    )]
    Describe {
        #[arg(help = "Endpoint description (JSON)", value_hint = ValueHint::FilePath)]
        endpoint: PathBuf,
    },
    #[command(
        arg_required_else_help = true,
        about = "Serve the validation pipeline over HTTP",
        long_about = r#"Run an HTTP server that validates JSONL request streams.

Routes:
  GET  /healthz
  GET  /v0/endpoint
  POST /v0/validate   (JSONL body in, JSONL results out)"#,
        after_help = r#"EXAMPLES
  $ paramflow serve search.json
  $ curl --data-binary @requests.jsonl http://127.0.0.1:9800/v0/validate

NOTES
  - Loopback-only by default; use --allow-non-loopback to opt in
  - Log filtering follows RUST_LOG (default: info)"#
    )]
    Serve {
        #[arg(help = "Endpoint description (JSON)", value_hint = ValueHint::FilePath)]
        endpoint: PathBuf,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(
        about = "Print version info as JSON",
        long_about = r#"Emit version info as JSON (stable, machine-readable)."#,
        after_help = r#"EXAMPLES
  $ paramflow version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ paramflow completion bash > ~/.local/share/bash-completion/completions/paramflow
  $ paramflow completion zsh > ~/.zfunc/_paramflow"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
struct ServeRunArgs {
    #[arg(
        long,
        default_value = "127.0.0.1:9800",
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Allow non-loopback binds",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
    #[arg(
        long,
        default_value_t = DEFAULT_CHANNEL_CAPACITY,
        help = "Results buffered per stream before backpressure applies",
        help_heading = "Safety"
    )]
    channel_capacity: usize,
}

fn load_endpoint(path: &Path) -> Result<Endpoint, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message(format!(
                "failed to read endpoint description '{}'",
                path.display()
            ))
            .with_source(err)
    })?;
    EndpointConfig::from_json_str(&text)?.into_endpoint()
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>, Error> {
    match path {
        Some(path) => std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read input '{}'", path.display()))
                .with_source(err)
        }),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(buf)
        }
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => err.with_hint("Check the path and try again."),
        ErrorKind::Io => err.with_hint("I/O error. Check the path and file permissions."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("paramflow {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "paramflow",
                "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

/// Pretty on a terminal, compact otherwise.
fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    println!(
        "{}",
        json.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    );
}

/// One compact line per value, regardless of terminal.
fn emit_jsonl(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum Tone {
    Failure,
    Detail,
}

impl Tone {
    fn paint(self, label: &str, enabled: bool) -> String {
        let sgr = match self {
            Tone::Failure => "31",
            Tone::Detail => "33",
        };
        if enabled {
            format!("\u{1b}[{sgr}m{label}\u{1b}[0m")
        } else {
            label.to_string()
        }
    }
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = Tone::Detail.paint("notice:", color_mode.use_color(is_tty));
        eprintln!("{label} {} (endpoint: {})", notice.message, notice.endpoint);
        return;
    }

    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .unwrap_or(default_message(err.kind()))
        .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    std::iter::successors(err.source(), |&cause| cause.source())
        .map(ToString::to_string)
        .collect()
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(parameter) = err.parameter() {
        inner.insert("parameter".to_string(), json!(parameter));
    }
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        Tone::Failure.paint("error:", use_color),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            Tone::Detail.paint("hint:", use_color)
        ));
    }
    if let Some(parameter) = err.parameter() {
        lines.push(format!(
            "{} {parameter}",
            Tone::Detail.paint("parameter:", use_color)
        ));
    }
    if let Some(index) = err.index() {
        lines.push(format!(
            "{} {index}",
            Tone::Detail.paint("index:", use_color)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            Tone::Detail.paint("caused by:", use_color)
        ));
    }

    lines.join("\n")
}

/// First non-empty line of clap's rendering, without its `error:` label.
fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let subcommand = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace();
            tokens.find(|token| *token == "paramflow")?;
            tokens
                .next()
                .filter(|token| !token.starts_with(['-', '<', '[']))
        });
    match subcommand {
        Some(subcommand) => format!("Try `paramflow {subcommand} --help`."),
        None => "Try `paramflow --help`.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Error, ErrorKind, clap_error_summary, error_json, error_text, load_endpoint};
    use clap::{CommandFactory, Parser};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn clap_errors_are_summarized_without_label() {
        let err = Cli::try_parse_from(["paramflow", "check"]).expect_err("missing endpoint");
        let summary = clap_error_summary(&err);
        assert!(!summary.starts_with("error:"), "{summary}");
        assert!(!summary.is_empty());
    }

    #[test]
    fn color_flag_only_mentions_diagnostics() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("Colorize stderr diagnostics"));
        assert!(!help.contains("pretty JSON"));
    }

    #[test]
    fn check_accepts_input_flag() {
        let cli = Cli::try_parse_from(["paramflow", "check", "ep.json", "--input", "in.jsonl"])
            .expect("parse");
        assert!(matches!(cli.command, super::Command::Check { .. }));
    }

    #[test]
    fn error_json_carries_parameter_and_index() {
        let err = Error::bad_input("constant parameter 'limit' changed value")
            .with_parameter("limit")
            .with_index(2);
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], json!("BadInput"));
        assert_eq!(value["error"]["parameter"], json!("limit"));
        assert_eq!(value["error"]["index"], json!(2));
    }

    #[test]
    fn error_text_without_color_has_no_escapes() {
        let err = Error::new(ErrorKind::Usage).with_hint("Try again.");
        let text = error_text(&err, false);
        assert!(text.starts_with("error: usage error"));
        assert!(text.contains("hint: Try again."));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn load_endpoint_reports_missing_file_as_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_endpoint(&dir.path().join("missing.json")).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn load_endpoint_validates_description() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"name": "search", "parameters": [{{"name": "limit", "kind": "integer", "default": "ten"}}]}}"#
        )
        .expect("write");
        let err = load_endpoint(file.path()).expect_err("kind mismatch");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}

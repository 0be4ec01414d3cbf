//! Purpose: `notekeep` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout formats (table or JSON by TTY/flags).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: The store is resolved only by commands that touch it.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;
mod tls;

use notekeep::api::wire::DeletedBody;
use notekeep::api::{
    ConnectionString, DB_URL_ENV, Error, ErrorKind, NewNote, Note, NoteId, NoteStore, NotesClient,
    default_db_dir, open_store, resolve_connection, to_exit_code,
};
use notekeep::demo::{fatigue, gears};
use tls::TlsMode;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
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
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
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
    let db = DbSelector { flag: cli.db };

    command_dispatch::dispatch_command(cli.command, &db)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "notekeep",
    version,
    about = "A small notes API with a CLI client and a local document store",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Notes are short text records. The server, the CLI, and the store share one model.

Mental model:
  - `serve` exposes the notes API over HTTP(S)
  - `note` reads and writes notes, locally or against a running server
  - `demo` runs the bundled engineering calculations
"#,
    after_help = r#"EXAMPLES
  $ notekeep serve                                 # http://127.0.0.1:8000
  $ notekeep note add "Learn how to connect a frontend."
  $ notekeep note list --url http://127.0.0.1:8000
  $ notekeep --db memory: serve --seed-demo

LEARN MORE
  Store selection (first match wins):
    --db <CONN>
    NOTEKEEP_DB_URL
    ~/.notekeep/db (collection "notes")

  $ notekeep <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        value_name = "CONN",
        help = "Store connection: memory:, file:///dir?collection=name, or a directory path"
    )]
    db: Option<String>,
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

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the notes HTTP API",
        long_about = r#"Serve the notes HTTP API over HTTP, or HTTPS with --tls-* flags.

Routes: GET /, GET /notes, GET /notes/{id}, POST /notes, DELETE /notes/{id}, GET /healthz."#,
        after_help = r#"EXAMPLES
  $ notekeep serve
  $ notekeep --db memory: serve --seed-demo
  $ notekeep serve --tls-self-signed --bind 127.0.0.1:8443
  $ notekeep serve --tls-self-signed --tls-cert-out ./notekeep-cert.pem
  $ notekeep serve --cors-origin https://localhost:3000

NOTES
  - Missing notes answer 200 with {"message": "Note not found"}
  - Any origin may call the API unless --cors-origin is given
  - Set RUST_LOG (e.g. RUST_LOG=debug) to change log verbosity"#
    )]
    Serve(ServeArgs),
    #[command(
        arg_required_else_help = true,
        about = "Read and write notes",
        long_about = r#"Read and write notes in the configured store, or against a running server with --url."#,
        after_help = r#"EXAMPLES
  $ notekeep note add "buy milk"
  $ notekeep note list
  $ notekeep note get 65f1c0ffee00000000000001
  $ notekeep note delete 3 --url http://127.0.0.1:8000
  $ notekeep note list --url https://127.0.0.1:8443 --tls-ca ./notekeep-cert.pem

NOTES
  - `get` and `delete` exit 3 when the note does not exist"#
    )]
    Note {
        #[command(subcommand)]
        command: NoteCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Run the bundled engineering demos",
        long_about = r#"Run small numerical demos and print their results as JSON."#,
        after_help = r#"EXAMPLES
  $ notekeep demo gears
  $ notekeep demo gears --driver-radius 0.02 --driven-radius 0.08
  $ notekeep demo fatigue --samples 100000 --runs 5"#
    )]
    Demo {
        #[command(subcommand)]
        command: DemoCommand,
    },
    #[command(
        about = "Print version info as JSON",
        long_about = r#"Emit version info as JSON (stable, machine-readable)."#,
        after_help = r#"EXAMPLES
  $ notekeep version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ notekeep completion bash > ~/.local/share/bash-completion/completions/notekeep
  $ notekeep completion zsh > ~/.zfunc/_notekeep
  $ notekeep completion fish > ~/.config/fish/completions/notekeep.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum NoteCommand {
    #[command(about = "List all notes")]
    List {
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, help = "Emit JSON even on a terminal")]
        json: bool,
    },
    #[command(about = "Fetch one note by id")]
    Get {
        #[arg(help = "Note id (number or 24-hex object id)")]
        id: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Create a note")]
    Add {
        #[arg(help = "Note text")]
        text: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Delete a note by id")]
    Delete {
        #[arg(help = "Note id (number or 24-hex object id)")]
        id: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(
        long,
        value_name = "URL",
        help = "Talk to a running server instead of the local store",
        value_hint = ValueHint::Url
    )]
    url: Option<String>,
    #[arg(
        long = "tls-ca",
        value_name = "PATH",
        help = "Trust this PEM CA/certificate for an https --url",
        value_hint = ValueHint::FilePath,
        help_heading = "Remote TLS"
    )]
    tls_ca: Option<PathBuf>,
    #[arg(
        long = "tls-skip-verify",
        visible_alias = "tls-insecure",
        help = "Disable TLS certificate verification for --url (unsafe; dev-only)",
        help_heading = "Remote TLS"
    )]
    tls_skip_verify: bool,
}

#[derive(Subcommand)]
enum DemoCommand {
    #[command(about = "Two-gear speed and torque transfer")]
    Gears {
        #[arg(long, default_value_t = gears::DEFAULT_DRIVER_RADIUS, help = "Driver gear radius (m)")]
        driver_radius: f64,
        #[arg(long, default_value_t = gears::DEFAULT_DRIVEN_RADIUS, help = "Driven gear radius (m)")]
        driven_radius: f64,
        #[arg(long, default_value_t = gears::DEFAULT_MAX_SPEED, help = "Final driver speed (rad/s)")]
        max_speed: f64,
        #[arg(long, default_value_t = gears::DEFAULT_SAMPLES, help = "Points in the speed ramp")]
        samples: usize,
        #[arg(long, default_value_t = gears::DEFAULT_DRIVER_TORQUE, help = "Driver torque (N*m)")]
        torque: f64,
    },
    #[command(about = "Palmgren-Miner fatigue damage, loop vs vectorized")]
    Fatigue {
        #[arg(long, default_value_t = fatigue::DEFAULT_SAMPLES, help = "Stress history length")]
        samples: usize,
        #[arg(long, default_value_t = fatigue::DEFAULT_RUNS, help = "Timed runs per strategy")]
        runs: u32,
        #[arg(long, default_value_t = fatigue::DEFAULT_AMPLITUDE, help = "Stress amplitude (MPa)")]
        amplitude: f64,
        #[arg(long = "a", default_value_t = fatigue::DEFAULT_A, help = "S-N coefficient A")]
        a: f64,
        #[arg(long = "m", default_value_t = fatigue::DEFAULT_M, help = "S-N exponent m")]
        m: f64,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(
        long,
        default_value = serve::DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long = "cors-origin",
        value_name = "ORIGIN",
        help = "Allow browser requests from this origin only (repeatable)",
        help_heading = "Connection"
    )]
    cors_origin: Vec<String>,
    #[arg(long, value_name = "PATH", help = "TLS certificate path (PEM)", value_hint = ValueHint::FilePath, help_heading = "TLS")]
    tls_cert: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "TLS key path (PEM)", value_hint = ValueHint::FilePath, help_heading = "TLS")]
    tls_key: Option<PathBuf>,
    #[arg(
        long,
        help = "Generate a self-signed TLS cert for this run",
        help_heading = "TLS"
    )]
    tls_self_signed: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Write the self-signed certificate (PEM) here for clients to trust",
        value_hint = ValueHint::FilePath,
        requires = "tls_self_signed",
        help_heading = "TLS"
    )]
    tls_cert_out: Option<PathBuf>,
    #[arg(
        long,
        help = "Allow non-loopback binds",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = serve::DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
    #[arg(
        long,
        help = "Serve an in-memory store holding two sample notes (implies --db memory:)",
        help_heading = "Store"
    )]
    seed_demo: bool,
}

/// Deferred `--db` choice; resolved only when a command needs the store.
struct DbSelector {
    flag: Option<String>,
}

impl DbSelector {
    fn connection(&self) -> Result<ConnectionString, Error> {
        let env_value = std::env::var(DB_URL_ENV).ok();
        resolve_connection(self.flag.as_deref(), env_value.as_deref(), &default_db_dir())
    }

    fn open(&self) -> Result<Arc<dyn NoteStore>, Error> {
        open_store(&self.connection()?)
    }
}

fn tls_mode_from_args(args: &ServeArgs) -> Result<TlsMode, Error> {
    if args.tls_self_signed && (args.tls_cert.is_some() || args.tls_key.is_some()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--tls-self-signed cannot be combined with --tls-cert/--tls-key")
            .with_hint("Pick one TLS source."));
    }
    match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => Ok(TlsMode::Files {
            cert: cert.clone(),
            key: key.clone(),
        }),
        (None, None) if args.tls_self_signed => Ok(TlsMode::SelfSigned {
            cert_out: args.tls_cert_out.clone(),
        }),
        (None, None) => Ok(TlsMode::Off),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message("TLS requires both --tls-cert and --tls-key")
            .with_hint("Provide both paths or use --tls-self-signed.")),
    }
}

fn serve_config_from_args(
    args: ServeArgs,
    connection: ConnectionString,
) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:8000.")
    })?;
    let tls = tls_mode_from_args(&args)?;
    Ok(serve::ServeConfig {
        bind,
        connection,
        seed_demo: args.seed_demo,
        cors_allowed_origins: args.cors_origin,
        allow_non_loopback: args.allow_non_loopback,
        tls,
        max_body_bytes: args.max_body_bytes,
    })
}

fn build_serve_startup_lines(config: &serve::ServeConfig) -> Vec<String> {
    let scheme = if config.tls.is_enabled() { "https" } else { "http" };
    let mut lines = vec![
        format!("notekeep serve: {scheme}://{}/", config.bind),
        format!("  store: {}", config.connection),
    ];
    if config.seed_demo {
        lines.push("  seeded with 2 sample notes".to_string());
    }
    if let TlsMode::SelfSigned { cert_out } = &config.tls {
        match cert_out {
            Some(path) => lines.push(format!(
                "  self-signed certificate: trust it with --tls-ca {}",
                path.display()
            )),
            None => lines.push(
                "  self-signed certificate: pass --tls-cert-out PATH to share it, or use --tls-skip-verify"
                    .to_string(),
            ),
        }
    }
    lines.push("  press Ctrl-C to stop".to_string());
    lines
}

fn emit_serve_startup_guidance(config: &serve::ServeConfig) {
    for line in build_serve_startup_lines(config) {
        eprintln!("{line}");
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint(
            "Permission denied. Check directory permissions or use --db to a writable location.",
        ),
        ErrorKind::Busy => {
            err.with_hint("Collection is busy (another process holds its lock). Retry shortly.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, the server URL, and disk space."),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Data appears corrupt. Inspect or move the collection file and retry.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn note_not_found(id: &NoteId) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message(format!("note not found: {id}"))
        .with_hint("Run `notekeep note list` to see existing ids.")
}

fn emit_note_list(notes: &[Note], json: bool) {
    if json || !io::stdout().is_terminal() {
        emit_json(json!(notes));
        return;
    }
    let rows = notes
        .iter()
        .map(|note| vec![note.id.to_string(), note.text.clone()])
        .collect::<Vec<_>>();
    emit_table(&["ID", "TEXT"], &rows);
}

fn emit_deleted(note: Note) {
    emit_json(json!(DeletedBody::new(note)));
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("notekeep {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "notekeep",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    let cleaned_rows = rows
        .iter()
        .map(|row| {
            widths
                .iter_mut()
                .enumerate()
                .map(|(idx, width)| {
                    let cell = sanitize_table_cell(row.get(idx).map(String::as_str).unwrap_or(""));
                    *width = (*width).max(cell.chars().count());
                    cell
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    std::iter::once(format_table_line(&header_cells, &widths))
        .chain(cleaned_rows.iter().map(|row| format_table_line(row, &widths)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

// Last column is left unpadded.
fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if idx + 1 < widths.len() && *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
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
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `notekeep --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "notekeep") else {
        return "Try `notekeep --help`.".to_string();
    };

    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return "Try `notekeep --help`.".to_string();
    }
    format!("Try `notekeep {} --help`.", parts.join(" "))
}

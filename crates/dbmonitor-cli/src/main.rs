// crates/dbmonitor-cli/src/main.rs
// ============================================================================
// Module: DB Monitor CLI Entry Point
// Description: Command dispatcher for procedure calls and connection probes.
// Purpose: Exercise the monitor client against a configured server.
// Dependencies: clap, dbmonitor-config, dbmonitor-core, serde_json, thiserror, tokio.
// ============================================================================

//! ## Overview
//! The `dbmonitor` CLI loads `dbmonitor.toml`, builds a connection registry
//! over the HTTP transport, and runs one command: list procedures, test or
//! check a named connection, issue a single guarded call, or run bootstrap and
//! print the resulting metadata. Security posture: config and command-line
//! inputs are untrusted; credentials are never printed.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use dbmonitor_config::MonitorConfig;
use dbmonitor_core::ConnectionDescriptor;
use dbmonitor_core::ConnectionRegistry;
use dbmonitor_core::HttpTransport;
use dbmonitor_core::OnConnectionAdded;
use dbmonitor_core::ProcedureCatalog;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "dbmonitor", disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `DBMONITOR_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List catalog procedures and their accepted parameter counts.
    Procedures,
    /// Probe a connection with the short deadline; requires a success status.
    Test(ConnectionArgs),
    /// Probe server reachability with the long deadline.
    Check(ConnectionArgs),
    /// Execute a single procedure call and print the response.
    Call(CallCommand),
    /// Run connection bootstrap and print the loaded metadata.
    Bootstrap(ConnectionArgs),
}

/// Connection selection arguments.
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Name of a `[[connections]]` entry.
    #[arg(long, value_name = "NAME")]
    connection: String,
}

/// Arguments for the `call` command.
#[derive(Args, Debug)]
struct CallCommand {
    /// Name of a `[[connections]]` entry.
    #[arg(long, value_name = "NAME")]
    connection: String,
    /// Procedure name, e.g. `@Statistics`.
    procedure: String,
    /// Positional parameters; JSON when parseable, otherwise plain strings.
    #[arg(allow_hyphen_values = true)]
    parameters: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Procedures => command_procedures(),
        Commands::Test(args) => {
            let context = CommandContext::load(cli.config, &args.connection)?;
            let ok = context.registry.test_connection(&context.descriptor).await;
            report(if ok { "ok" } else { "failed" }, ok)
        }
        Commands::Check(args) => {
            let context = CommandContext::load(cli.config, &args.connection)?;
            let reachable = context.registry.check_server_connection(&context.descriptor).await;
            report(if reachable { "reachable" } else { "unreachable" }, reachable)
        }
        Commands::Call(command) => command_call(cli.config, command).await,
        Commands::Bootstrap(args) => command_bootstrap(cli.config, &args.connection).await,
    }
}

// ============================================================================
// SECTION: Command Context
// ============================================================================

/// Loaded configuration, registry, and selected connection.
struct CommandContext {
    /// Loaded configuration.
    config: MonitorConfig,
    /// Registry over the HTTP transport.
    registry: ConnectionRegistry,
    /// Selected connection descriptor.
    descriptor: ConnectionDescriptor,
}

impl CommandContext {
    /// Loads config and builds the registry for the named connection.
    fn load(path: Option<PathBuf>, connection: &str) -> CliResult<Self> {
        let config =
            MonitorConfig::load(path.as_deref()).map_err(|err| CliError::new(err.to_string()))?;
        let descriptor = select_connection(&config, connection)?;
        let settings = config.client_settings();
        let transport =
            HttpTransport::new(&settings).map_err(|err| CliError::new(err.to_string()))?;
        let events = config.logging.build_sink().map_err(|err| CliError::new(err.to_string()))?;
        let registry = ConnectionRegistry::new(Arc::new(transport), settings, events);
        Ok(Self {
            config,
            registry,
            descriptor,
        })
    }
}

/// Resolves a named connection into a descriptor.
fn select_connection(config: &MonitorConfig, name: &str) -> CliResult<ConnectionDescriptor> {
    config
        .connection(name)
        .map(dbmonitor_config::ConnectionConfig::descriptor)
        .ok_or_else(|| CliError::new(format!("unknown connection: {name}")))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `procedures` command.
fn command_procedures() -> CliResult<ExitCode> {
    for line in procedure_lines(&ProcedureCatalog::builtin()) {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error(&err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `call` command.
async fn command_call(path: Option<PathBuf>, command: CallCommand) -> CliResult<ExitCode> {
    let context = CommandContext::load(path, &command.connection)?;
    let parameters = command.parameters.iter().map(|raw| parse_parameter(raw)).collect();
    let connection = context.registry.open(&context.descriptor);
    let response = connection.execute(&command.procedure, parameters).await;
    let rendered =
        serde_json::to_string_pretty(&response).map_err(|err| CliError::new(err.to_string()))?;
    report(&rendered, response.is_success())
}

/// Executes the `bootstrap` command.
async fn command_bootstrap(path: Option<PathBuf>, connection: &str) -> CliResult<ExitCode> {
    let context = CommandContext::load(path, connection)?;
    let (sender, receiver) = oneshot::channel();
    let on_added: OnConnectionAdded = Box::new(move |connection, success| {
        let _ = sender.send((connection, success));
    });
    context.registry.add(&context.descriptor, context.config.bootstrap_commands(), Some(on_added));
    let (connection, success) =
        receiver.await.map_err(|_| CliError::new("bootstrap was abandoned".to_string()))?;
    let rendered = serde_json::to_string_pretty(&connection.metadata())
        .map_err(|err| CliError::new(err.to_string()))?;
    report(&rendered, success)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a command-line parameter as JSON, falling back to a string.
fn parse_parameter(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Formats one line per procedure: name, then accepted arities.
fn procedure_lines(catalog: &ProcedureCatalog) -> Vec<String> {
    catalog
        .procedure_names()
        .map(|name| {
            let arities = catalog
                .arities(name)
                .unwrap_or_default()
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}\t{arities}")
        })
        .collect()
}

/// Prints a result line and maps the outcome to an exit code.
fn report(message: &str, success: bool) -> CliResult<ExitCode> {
    write_stdout_line(message).map_err(|err| CliError::new(output_error(&err)))?;
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Formats an output error message.
fn output_error(error: &std::io::Error) -> String {
    format!("failed to write output: {error}")
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

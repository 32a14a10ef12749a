/*!
 * msf-mcp CLI
 *
 * Serves the operation catalog to a tool-using client over stdio, or runs one
 * operation from the command line.
 */

use clap::{Parser, Subcommand, ValueEnum};
use msf_connect::CredentialOverrides;
use msf_mcp::{
    config::{BridgeConfig, LogLevel},
    dispatcher::Dispatcher,
    error::{BridgeError, Result, EXIT_FAILURE, EXIT_SUCCESS},
    logging,
    server::Server,
};
use secrecy::SecretString;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "msf-mcp")]
#[command(version, about = "Resilient tool bridge to the Metasploit RPC service", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// RPC host (overrides MSF_RPC_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// RPC port (overrides MSF_RPC_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// RPC username (overrides MSF_RPC_USERNAME)
    #[arg(long, global = true)]
    username: Option<String>,

    /// RPC password (overrides MSF_RPC_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Use HTTPS for the RPC endpoint
    #[arg(long, global = true)]
    ssl: bool,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true, conflicts_with = "log_dir")]
    log_file: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tool catalog over stdio (default)
    Serve,

    /// Print the tool catalog as JSON
    Tools,

    /// Run one operation and print its result envelope
    Call {
        /// Operation name, e.g. list_modules
        name: String,

        /// Arguments as a JSON object
        #[arg(long, value_name = "JSON", default_value = "{}")]
        args: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

impl Cli {
    fn credential_overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone().map(SecretString::from),
            ssl: self.ssl.then_some(true),
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if let Some(ref path) = cli.log_file {
        config.log_file = Some(path.clone());
    } else if let Some(ref dir) = cli.log_dir {
        config.log_file = Some(logging::timestamped_log_path(dir)?);
    }

    if let Err(e) = logging::init_logging(&config, cli.verbose) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let dispatcher = Dispatcher::from_config(&config, &cli.credential_overrides())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let runtime = runtime()?;
            info!(
                version = msf_mcp::VERSION,
                endpoint = dispatcher.connections().target(),
                "Starting tool server"
            );
            let server = Server::new(Arc::new(dispatcher));
            runtime.block_on(server.run_stdio())?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Tools => {
            print_json(&dispatcher.catalog().tool_listing());
            Ok(EXIT_SUCCESS)
        }
        Commands::Call { name, args } => {
            let args: Value = serde_json::from_str(&args)
                .map_err(|e| BridgeError::invalid(format!("--args is not valid JSON: {e}")))?;
            let result = runtime()?.block_on(dispatcher.dispatch(&name, args));
            print_json(&result.to_value());
            Ok(if result.is_success() {
                EXIT_SUCCESS
            } else {
                EXIT_FAILURE
            })
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BridgeError::Config(format!("Failed to start async runtime: {}", e)))
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

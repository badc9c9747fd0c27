//! Mapepire Command-Line Client
//!
//! Run SQL statements and CL commands against a Mapepire database server,
//! one-shot, from a script, or interactively.

mod commands;
mod completer;
mod executor;
mod formatter;
mod repl;

use clap::Parser;
use executor::Statement;
use formatter::OutputFormat;
use mapepire_client::{Client, ClientConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted `--max-frame-kb` (1 GiB).
const MAX_FRAME_KB: i64 = 1024 * 1024;

/// Mapepire Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "mapepire")]
#[command(version, about = "Mapepire Command-Line Client")]
pub struct Args {
    /// Server host name or address
    #[arg(short = 'H', long, default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(short = 'P', long, default_value_t = mapepire_client::config::DEFAULT_PORT)]
    pub port: u16,

    /// User profile
    #[arg(short, long, env = "MAPEPIRE_USER")]
    pub user: String,

    /// Password
    #[arg(short, long, env = "MAPEPIRE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Connect with ws:// instead of wss://
    #[arg(long)]
    pub insecure: bool,

    /// Execute a single SQL statement and exit
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Execute a single CL command and exit
    #[arg(long)]
    pub cl: Option<String>,

    /// Check server and database liveness and exit
    #[arg(long)]
    pub ping: bool,

    /// Execute statements from file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Receive capacity in KiB (1 to 1048576); longer responses are truncated
    #[arg(long, default_value_t = 512, value_parser = clap::value_parser!(u32).range(1..=MAX_FRAME_KB))]
    pub max_frame_kb: u32,
}

impl Args {
    /// Build the client configuration.
    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.host, &self.user, &self.password)
            .with_port(self.port)
            .with_secure(!self.insecure)
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_max_frame_size((self.max_frame_kb as usize).saturating_mul(1024))
    }

    /// Statements requested on the command line, in execution order.
    fn one_shot_statements(&self) -> Vec<Statement> {
        let mut statements = Vec::new();
        if self.ping {
            statements.push(Statement::Ping);
        }
        if let Some(sql) = &self.command {
            statements.push(Statement::Sql(sql.clone()));
        }
        if let Some(cmd) = &self.cl {
            statements.push(Statement::Cl(cmd.clone()));
        }
        statements
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so results can be piped
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mapepire_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the selected mode. Returns `false` when any statement failed.
async fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = args.client_config();
    let statements = args.one_shot_statements();

    if !statements.is_empty() {
        // Command mode: execute the given statements and exit
        run_command_mode(&config, &statements, args.format).await
    } else if let Some(file) = &args.file {
        // Script mode: execute statements from a file
        run_script_mode(&config, file, args.format).await
    } else {
        // REPL mode: interactive shell
        repl::run(config, args.format).await?;
        Ok(true)
    }
}

/// Execute the given statements and exit.
async fn run_command_mode(
    config: &ClientConfig,
    statements: &[Statement],
    format: OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    let client = Client::new();
    executor::connect(&client, config).await?;
    let formatter = formatter::create_formatter(format);

    let mut ok = true;
    for statement in statements {
        match executor::execute_interruptible(&client, statement, &*formatter).await {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}", e);
                ok = false;
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(ok)
}

/// Execute statements from a file.
async fn run_script_mode(
    config: &ClientConfig,
    file: &Path,
    format: OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let client = Client::new();
    executor::connect(&client, config).await?;
    let formatter = formatter::create_formatter(format);

    let mut ok = true;
    for (number, line) in content.lines().enumerate() {
        let Some(statement) = Statement::parse(line) else {
            continue;
        };

        match executor::execute_interruptible(&client, &statement, &*formatter).await {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Err(e) => {
                eprintln!("Error at line {} '{}': {}", number + 1, line.trim(), e);
                ok = false;
                // The session is gone; later statements would only repeat the error.
                if !client.is_connected() {
                    break;
                }
            }
        }
    }

    if client.is_connected() {
        client.disconnect().await;
    }
    Ok(ok)
}

//! Interactive REPL implementation.

use crate::commands::{self, CommandResult};
use crate::completer::MapepireHelper;
use crate::executor::{self, Statement};
use crate::formatter::{self, OutputFormat};
use mapepire_client::{Client, ClientConfig};
use rustyline::error::ReadlineError;
use rustyline::history::{DefaultHistory, History};
use rustyline::{Config, Editor};
use std::path::PathBuf;

/// Get the history file path.
fn history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mapepire_history")
}

/// Run the interactive REPL.
pub async fn run(
    mut config: ClientConfig,
    initial_format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new();

    match executor::connect(&client, &config).await {
        Ok(()) => println!("Connected to {}", client.connection_url()),
        Err(e) => {
            println!("Warning: {}", e);
            println!("Use .connect [host] to connect.\n");
        }
    }

    let mut format = initial_format;

    // Set up rustyline
    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();

    let mut rl: Editor<MapepireHelper, DefaultHistory> = Editor::with_config(rl_config)?;
    rl.set_helper(Some(MapepireHelper::new()));

    // Load history
    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    println!("Mapepire CLI - Type .help for commands, .exit to quit\n");

    loop {
        let prompt = if client.is_connected() {
            "mapepire> "
        } else {
            "mapepire (disconnected)> "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let statement = if commands::is_command(line) {
                    match commands::handle_command(line, &client, format) {
                        CommandResult::Exit => {
                            println!("Goodbye!");
                            break;
                        }
                        CommandResult::Output(msg) => {
                            println!("{}", msg);
                            continue;
                        }
                        CommandResult::SetFormat(fmt) => {
                            format = fmt;
                            println!("Output format set to {}", format);
                            continue;
                        }
                        CommandResult::Connect(host) => {
                            if client.is_connected() {
                                client.disconnect().await;
                            }
                            if let Some(host) = host {
                                config.host = host;
                            }
                            match executor::connect(&client, &config).await {
                                Ok(()) => println!("Connected to {}", client.connection_url()),
                                Err(e) => println!("Failed to connect: {}", e),
                            }
                            continue;
                        }
                        CommandResult::Disconnect => {
                            if client.disconnect().await {
                                println!("Disconnected");
                            } else {
                                println!("{}", client.last_error());
                            }
                            continue;
                        }
                        CommandResult::ShowHistory => {
                            let history = rl.history();
                            let len = history.len();
                            let start = len.saturating_sub(20);
                            for (i, entry) in history.iter().skip(start).enumerate() {
                                println!("{:4}  {}", start + i + 1, entry);
                            }
                            continue;
                        }
                        CommandResult::Clear => {
                            // ANSI clear screen
                            print!("\x1B[2J\x1B[1;1H");
                            continue;
                        }
                        CommandResult::Execute(statement) => statement,
                    }
                } else {
                    match Statement::parse(line) {
                        Some(statement) => statement,
                        None => continue,
                    }
                };

                if !client.is_connected() {
                    println!("Not connected. Use .connect [host] to connect.");
                    continue;
                }

                let formatter = formatter::create_formatter(format);
                match executor::execute_interruptible(&client, &statement, &*formatter).await {
                    Ok(output) => {
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Err(e) => {
                        println!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&hist_path);

    if client.is_connected() {
        client.disconnect().await;
    }

    Ok(())
}

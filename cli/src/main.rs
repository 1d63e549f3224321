// keepalive-cli — drive the keep-alive lifecycle from a terminal
//
// Runs the lifecycle manager against a simulated device so command sequences
// can be exercised without a phone attached.

mod config;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use config::Config;
use keepalive_core::{logging, Command, CommandValue};
use session::{Reply, Session};

#[derive(Parser)]
#[command(name = "keepalive-cli")]
#[command(about = "Background keep-alive lifecycle manager", long_about = None)]
#[command(version)]
struct Cli {
    /// Simulated Android API level (overrides the config file)
    #[arg(long, global = true)]
    sdk: Option<u32>,

    /// Print replies as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch command tags in order
    Run {
        /// Tags such as startTask, or directives like "grant notifications"
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Read tags and directives from stdin, one per line
    Repl,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every setting
    Show,
    /// Print the config file location
    Path,
    /// Restore defaults
    Reset,
    Set { key: String, value: String },
    Get { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    logging::init(&config.logging).context("Failed to initialize logging")?;

    // The override applies to this session only and is never saved
    let mut session_config = config.clone();
    if let Some(sdk) = cli.sdk {
        session_config.simulation.sdk_int = sdk;
    }

    match cli.command {
        Commands::Run { tags } => cmd_run(&session_config, &tags, cli.json).await,
        Commands::Repl => cmd_repl(&session_config, cli.json).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

async fn cmd_run(config: &Config, tags: &[String], json: bool) -> Result<()> {
    let session = Session::new(config)?;
    for tag in tags {
        let reply = session.execute(tag).await;
        print_reply(&reply, json)?;
    }
    session.close().await
}

async fn cmd_repl(config: &Config, json: bool) -> Result<()> {
    use tokio::io::AsyncBufReadExt;

    let session = Session::new(config)?;
    if !json {
        println!("{}", "Keep-alive session".bold());
        println!(
            "  Commands:   {}",
            Command::ALL
                .iter()
                .map(|c| c.tag())
                .collect::<Vec<_>>()
                .join(", ")
                .bright_cyan()
        );
        println!(
            "  Directives: {}",
            "grant|revoke notifications|battery, answer granted|denied, destroy, quit"
                .bright_cyan()
        );
        println!();
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => {
                let reply = session.execute(line).await;
                print_reply(&reply, json)?;
            }
        }
    }

    session.close().await
}

fn print_reply(reply: &Reply, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reply)?);
        return Ok(());
    }

    let response = &reply.response;
    match (&response.value, &response.error) {
        (_, Some(error)) => println!(
            "{} {} {} {}",
            "✗".red(),
            reply.input.bold(),
            error.kind.code().bright_red(),
            error.message.dimmed()
        ),
        (Some(CommandValue::Status(status)), None) => {
            println!("{} {}", "✓".green(), reply.input.bold());
            println!("  State:        {}", status.state.to_string().bright_cyan());
            println!("  Wake lock:    {}", status.wake_lock_held);
            println!("  Notification: {}", status.notification_posted);
            if let Some(permissions) = &status.permissions {
                println!("  Notifications enabled: {}", permissions.notifications_enabled);
                println!("  Battery exempt:        {}", permissions.battery_exempt);
            }
            println!("  Uptime:       {}s", status.uptime_secs);
            println!("  Starts/stops: {}/{}", status.starts, status.stops);
        }
        (Some(CommandValue::Bool(value)), None) => println!(
            "{} {} {}",
            "✓".green(),
            reply.input.bold(),
            value.to_string().bright_yellow()
        ),
        _ => println!("{} {}", "✓".green(), reply.input.bold()),
    }
    Ok(())
}

fn cmd_config(mut config: Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<22} {}", key, value.bright_cyan());
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_file()?.display());
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("{} Configuration reset to defaults", "✓".green());
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} {} = {}", "✓".green(), key, value.bright_cyan());
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        },
    }
    Ok(())
}

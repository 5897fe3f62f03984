mod doctor;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::error;
use tracing_subscriber::EnvFilter;

use scia_agent::{Answer, Pipeline};
use scia_core::config::AppConfig;
use scia_core::event::EventBus;
use scia_core::types::{RunEvent, UnitId};

#[derive(Parser)]
#[command(name = "scia", version, about = "Supply chain intelligence agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scia.toml")]
    config: PathBuf,

    /// Print run events and each specialist's raw report
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Answer a single query and exit
    Run {
        /// The query (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Show current configuration (secrets masked)
    Config,
    /// List the specialist units
    Units,
    /// Check configuration, dataset and provider settings
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scia=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Commands that need no config
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "scia", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::Units) => {
            for unit in UnitId::ALL {
                println!("  {:<18} {}", unit.as_str(), unit.responsibility());
            }
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::load(&cli.config)?;

    match &cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
            return Ok(());
        }
        Some(Commands::Doctor) => {
            println!("scia doctor");
            println!("===========");
            if !doctor::run_doctor(&config) {
                std::process::exit(1);
            }
            return Ok(());
        }
        _ => {}
    }

    let event_bus = Arc::new(EventBus::default());
    let pipeline = Pipeline::from_config(&config, event_bus.clone())?;
    let printer = cli.trace.then(|| spawn_trace_printer(&event_bus));

    match cli.command {
        Some(Commands::Run { query }) => {
            let text = if query.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                query.join(" ")
            };
            let answer = pipeline.answer(&text).await?;
            print_answer(&answer, cli.trace);
        }
        Some(Commands::Repl) | None => run_repl(&pipeline, &config, cli.trace).await?,
        Some(Commands::Config | Commands::Doctor | Commands::Units | Commands::Completions { .. }) => {
            unreachable!("handled before pipeline setup")
        }
    }

    if let Some(handle) = printer {
        handle.abort();
    }
    Ok(())
}

async fn run_repl(pipeline: &Pipeline, config: &AppConfig, trace: bool) -> anyhow::Result<()> {
    println!("scia v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Model: {} ({}), dispatch: {}",
        config.model.model_id, config.model.provider, config.orchestration.dispatch
    );
    println!("Ask about inventory, demand or suppliers. Type quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            println!("Goodbye!");
            break;
        }

        // A failed run is reported and the loop goes on; runs share nothing.
        match pipeline.answer(input).await {
            Ok(answer) => print_answer(&answer, trace),
            Err(e) => {
                error!(error = %e, "Run failed");
                eprintln!("Error: {}", e);
            }
        }
        println!();
    }

    Ok(())
}

fn print_answer(answer: &Answer, trace: bool) {
    match answer {
        Answer::Rejected { reason } => println!("{}", reason),
        Answer::Report {
            report,
            unit_outputs,
            elapsed_ms,
            ..
        } => {
            if trace {
                println!("── Agent Trace ──");
                for (unit, output) in unit_outputs {
                    println!("## {} Report\n{}\n", unit.heading(), output);
                }
                println!("── Report ({} ms) ──", elapsed_ms);
            }
            println!("{}", report);
        }
    }
}

fn spawn_trace_printer(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                RunEvent::InputRejected { reason } => eprintln!("  [rejected] {}", reason),
                RunEvent::RunStarted { run_id } => eprintln!("  [run] {}", run_id),
                RunEvent::NodeStarted { node, .. } => eprintln!("  [node] {} ...", node),
                RunEvent::NodeFinished {
                    node, elapsed_ms, ..
                } => eprintln!("  [node] {} done ({} ms)", node, elapsed_ms),
                RunEvent::UnitsSelected { units, .. } => {
                    let names: Vec<_> = units.iter().map(|u| u.as_str()).collect();
                    eprintln!("  [route] {}", names.join(", "));
                }
                RunEvent::UnitStarted { unit, .. } => eprintln!("  [unit] {} ...", unit),
                RunEvent::UnitFinished {
                    unit, elapsed_ms, ..
                } => eprintln!("  [unit] {} done ({} ms)", unit, elapsed_ms),
                RunEvent::ToolStart { unit, name, input } => {
                    let input = input.to_string();
                    eprintln!("  [tool] {} > {} {}", unit, name, truncate(&input, 80));
                }
                RunEvent::ToolEnd {
                    unit,
                    name,
                    is_error,
                } => {
                    if is_error {
                        eprintln!("  [tool] {} > {} failed", unit, name);
                    }
                }
                RunEvent::RetryScheduled {
                    attempt,
                    backoff_secs,
                } => eprintln!("  [retry] attempt {} in {}s", attempt, backoff_secs),
                RunEvent::RunComplete { elapsed_ms, .. } => {
                    eprintln!("  [run] complete ({} ms)", elapsed_ms)
                }
                RunEvent::RunFailed { error, .. } => eprintln!("  [run] failed: {}", error),
            }
        }
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

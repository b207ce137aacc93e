//! Cinegraph CLI: ask the movie knowledge graph questions from a terminal

use anyhow::{Context, Result};
use cinegraph::{
    ChatSession, GraphRagPipeline, RagConfig, SchemaRegistry, TurnOutcome, TurnReport,
};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cinegraph", version, about = "Ask questions about movies in a knowledge graph")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "CINEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Print the Cypher query behind each answer
    #[arg(long, global = true)]
    show_query: bool,

    /// Output format
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question, in plain language
        question: String,
    },
    /// Start an interactive chat
    Shell,
    /// Print the graph schema used to ground queries
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Schema => {
            println!("{}", SchemaRegistry::movies().grounding());
            Ok(())
        }
        Commands::Ask { question } => {
            let config = load_config(cli.config.as_ref())?;
            let pipeline = Arc::new(GraphRagPipeline::from_config(&config)?);
            let mut session = ChatSession::new(pipeline.clone());
            let report = session.ask_detailed(&question).await;
            print_report(&report, cli.show_query, &cli.format)?;
            pipeline.shutdown();
            if matches!(report.outcome, TurnOutcome::Failed { .. }) {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Shell => {
            let config = load_config(cli.config.as_ref())?;
            let pipeline = Arc::new(GraphRagPipeline::from_config(&config)?);
            run_shell(pipeline.clone(), cli.show_query, &cli.format).await?;
            pipeline.shutdown();
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RagConfig> {
    let mut config = match path {
        Some(path) => RagConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => {
            info!("No --config given, using defaults");
            RagConfig::default()
        }
    };
    config.apply_env();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_report(report: &TurnReport, show_query: bool, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("{}", report.answer);
            if show_query {
                let mut table = Table::new();
                table.set_content_arrangement(ContentArrangement::Dynamic);
                table.set_header(vec!["query", "attempts", "outcome"]);
                table.add_row(vec![
                    report.query.clone().unwrap_or_else(|| "-".to_string()),
                    report.attempts.to_string(),
                    outcome_label(&report.outcome),
                ]);
                println!("\n{}", table);
            }
        }
    }
    Ok(())
}

fn outcome_label(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::Answered => "answered".to_string(),
        TurnOutcome::NoMatches => "no matches".to_string(),
        TurnOutcome::Fallback => "raw results".to_string(),
        TurnOutcome::Failed { reason } => format!("failed: {}", reason),
    }
}

async fn run_shell(
    pipeline: Arc<GraphRagPipeline>,
    mut show_query: bool,
    format: &OutputFormat,
) -> Result<()> {
    let mut session = ChatSession::new(pipeline.clone());

    println!("Cinegraph interactive shell");
    println!("Ask a question about movies, or :help for commands. :quit to exit.\n");

    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        eprint!("cinegraph> ");

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match trimmed {
            ":quit" | ":exit" | ":q" => break,
            ":help" | ":h" => {
                println!("Commands:");
                println!("  :schema   Show the graph schema");
                println!("  :query    Toggle showing the Cypher behind answers");
                println!("  :history  Show this conversation");
                println!("  :clear    Forget the conversation so far");
                println!("  :quit     Exit shell");
                println!("  <text>    Ask a question");
            }
            ":schema" => println!("{}", pipeline.schema().grounding()),
            ":query" => {
                show_query = !show_query;
                println!("Showing queries: {}", if show_query { "on" } else { "off" });
            }
            ":history" => {
                for turn in session.history() {
                    println!("[{}] Q: {}", turn.at.format("%H:%M:%S"), turn.question);
                    println!("           A: {}", turn.answer);
                }
            }
            ":clear" => {
                session.clear();
                println!("Conversation cleared.");
            }
            question => {
                let report = session.ask_detailed(question).await;
                print_report(&report, show_query, format)?;
                println!();
            }
        }
    }

    println!("Bye!");
    Ok(())
}

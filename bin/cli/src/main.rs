//! `nodeloom`: headless driver for workflows in the remote store.

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use config::CliConfig;
use error::CliError;
use nodeloom_core::{FolderId, NodeId, WorkflowId};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nodeloom")]
#[command(about = "Inspect and run node-based model workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty workflow
    Create {
        name: String,

        /// Folder to create the workflow in
        #[arg(long)]
        folder: Option<FolderId>,
    },

    /// Show a workflow's nodes and edges
    Show { workflow: WorkflowId },

    /// Print the inputs a model node would run with
    Resolve { workflow: WorkflowId, node: NodeId },

    /// Run model nodes and wait for them to finish
    Run {
        workflow: WorkflowId,

        #[arg(required = true)]
        nodes: Vec<NodeId>,

        /// Save the workflow after the runs finish
        #[arg(long)]
        save: bool,
    },

    /// Delete a workflow
    Delete { workflow: WorkflowId },
}

async fn execute(cli: Cli) -> nodeloom_core::Result<(), CliError> {
    let config = CliConfig::from_env().map_err(CliError::from)?;
    tracing::debug!("loaded configuration");

    match cli.command {
        Commands::Create { name, folder } => {
            commands::create(&config, &name, folder.as_ref()).await
        }
        Commands::Show { workflow } => commands::show(&config, &workflow).await,
        Commands::Resolve { workflow, node } => {
            commands::resolve(&config, &workflow, &node).await
        }
        Commands::Run {
            workflow,
            nodes,
            save,
        } => commands::run(&config, &workflow, &nodes, save).await,
        Commands::Delete { workflow } => commands::delete(&config, &workflow).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}

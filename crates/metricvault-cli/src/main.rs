//! mvault: inspect and maintain a metricvault store.
//!
//! ```text
//! mvault init --path data/metrics.redb
//! mvault seed-demo --days 90
//! mvault projects
//! mvault coverage --project demo-project-alpha --days 30
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mvault", about = "Code-quality metrics store", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to metricvault.toml.
    #[arg(long, global = true, default_value = "metricvault.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter metricvault.toml.
    Init {
        /// redb file the store will live in.
        #[arg(long, default_value = "metricvault.redb")]
        path: String,

        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// List projects that have stored metrics.
    Projects {
        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print stored rows for a project.
    Show {
        #[arg(long)]
        project: String,

        #[arg(long)]
        branch: Option<String>,

        /// Window in days, counted back from today.
        #[arg(long, default_value = "30")]
        days: u32,

        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check whether stored data covers a window.
    Coverage {
        #[arg(long)]
        project: String,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long, default_value = "30")]
        days: u32,

        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete a project's rows, one branch or all of them.
    Delete {
        #[arg(long)]
        project: String,

        #[arg(long)]
        branch: Option<String>,
    },
    /// Load the built-in demo projects into the store.
    SeedDemo {
        #[arg(long, default_value = "90")]
        days: u32,
    },
    /// Forget the migration marker so the next listing rebuilds the index.
    RepairIndex,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Init { path, force } => commands::init::run(&cli.config, &path, force),
        Commands::Projects { format } => commands::inspect::projects(&cli.config, &format),
        Commands::Show {
            project,
            branch,
            days,
            format,
        } => commands::inspect::show(&cli.config, &project, branch.as_deref(), days, &format),
        Commands::Coverage {
            project,
            branch,
            days,
            format,
        } => commands::inspect::coverage(&cli.config, &project, branch.as_deref(), days, &format),
        Commands::Delete { project, branch } => {
            commands::maintain::delete(&cli.config, &project, branch.as_deref())
        }
        Commands::SeedDemo { days } => commands::maintain::seed_demo(&cli.config, days),
        Commands::RepairIndex => commands::maintain::repair_index(&cli.config),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,metricvault=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

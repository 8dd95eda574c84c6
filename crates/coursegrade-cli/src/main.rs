//! coursegrade CLI: grade exercises and inspect course progress locally.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod store;

#[derive(Parser)]
#[command(name = "coursegrade", version, about = "Automated exercise grader for web courses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission against a task's test cases
    Grade {
        /// Path to the course .toml file
        #[arg(long)]
        course: PathBuf,

        /// Content ID of the task to grade
        #[arg(long)]
        task: String,

        /// Submission file or directory; files replace the task's sample code
        #[arg(long)]
        submission: Option<PathBuf>,

        /// Learner to record progress for
        #[arg(long, default_value = "local")]
        learner: String,

        /// Progress file (defaults to the configured one)
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Grade the task even if its section is still locked
        #[arg(long)]
        ignore_locks: bool,
    },

    /// Validate course TOML files
    Validate {
        /// Path to course file or directory
        #[arg(long)]
        course: PathBuf,
    },

    /// Show a learner's progress through a course
    Progress {
        /// Path to the course .toml file
        #[arg(long)]
        course: PathBuf,

        /// Learner whose progress to show
        #[arg(long, default_value = "local")]
        learner: String,

        /// Progress file (defaults to the configured one)
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example course
    Init,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coursegrade=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            course,
            task,
            submission,
            learner,
            progress,
            config,
            format,
            ignore_locks,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                course,
                task,
                submission,
                learner,
                progress,
                config,
                format,
                ignore_locks,
            })
            .await
        }
        Commands::Validate { course } => commands::validate::execute(course).map(|()| true),
        Commands::Progress {
            course,
            learner,
            progress,
            config,
        } => commands::progress::execute(course, learner, progress, config)
            .await
            .map(|()| true),
        Commands::Init => commands::init::execute().map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

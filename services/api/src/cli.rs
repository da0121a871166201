use crate::demo::{run_demo, DemoArgs};
use crate::migrate::{run_migration, MigrateArgs};
use crate::server;
use approval_desk::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Approval Desk",
    about = "Run the document approval desk or its maintenance tasks from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one document through upload, review and decision with in-memory adapters
    Demo(DemoArgs),
    /// Convert a legacy per-collaborator export into one record per submission
    Migrate(MigrateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load submissions written by `migrate --output` before accepting requests
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Migrate(args) => run_migration(args),
    }
}

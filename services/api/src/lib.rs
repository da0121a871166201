mod cli;
mod demo;
mod infra;
mod migrate;
mod routes;
mod server;

use approval_desk::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

mod cli;
mod infra;
mod routes;
mod server;

use suite_territoriale::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

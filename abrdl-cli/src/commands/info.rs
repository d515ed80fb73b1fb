use abrdl_engine::DownloadCoordinator;
use tracing::debug;

use super::print_details;
use crate::error::AppError;

pub async fn run(coordinator: &DownloadCoordinator, url: &str) -> Result<(), AppError> {
    let info = coordinator.inspect(url).await?;
    debug!(formats = info.formats.len(), "Fetched video info");

    print_details(&info.details);
    println!("Available Formats:");
    for format in &info.formats {
        println!(" - {format}");
    }
    Ok(())
}

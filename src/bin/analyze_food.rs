//! Analyze one food photo through a running proxy and print the ingredient table.
//! Run with: cargo run --release --bin analyze_food -- <image_path> [endpoint]

use anyhow::{Context, Result};
use food_lens::{
    core::config::{log_filter, Config},
    AnalysisClient, AnalysisStatus, CaptureSession, CaptureSource, IngredientTable, ResultsView,
};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(config.log_level())))
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(image_path) = args.get(1) else {
        eprintln!("Usage: analyze_food <image_path> [endpoint]");
        std::process::exit(2);
    };
    let endpoint = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| config.analyze_endpoint().to_string());

    let path = Path::new(image_path);
    if !path.exists() {
        eprintln!("Image not found: {}", image_path);
        std::process::exit(1);
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", image_path))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!("Loaded {} ({} bytes)", image_path, bytes.len());

    let client = AnalysisClient::new(endpoint)?;
    let mut session = CaptureSession::new(config.compression_target_bytes());

    let captured = session
        .capture_image(CaptureSource::file(bytes, file_name))
        .await
        .context("Failed to process image")?;
    info!(
        "Prepared data URL of {} chars (compressed: {})",
        captured.data_url.len(),
        captured.compressed
    );

    info!("Sending to {}", client.endpoint());
    let status = session.analyze(&client).await?;
    if let AnalysisStatus::Succeeded(result) = status {
        info!("Model returned {} ingredients", result.ingredients.len());
    }

    match session.view() {
        ResultsView::Table(table) => print_table(table),
        ResultsView::NoFoodRecognized => println!("No food recognized in this photo. Try another shot."),
        ResultsView::Failed { message } => {
            eprintln!("Analysis failed: {}", message);
            std::process::exit(1);
        }
        ResultsView::Hidden | ResultsView::Loading => {}
    }

    Ok(())
}

fn print_table(table: &IngredientTable) {
    println!("\n=== Ingredients ===");
    println!("{:<20} {:>10} {:>10} {:>10}", "Name", "Weight(g)", "kcal", "kcal/g");
    for row in table.rows() {
        println!(
            "{:<20} {:>10.0} {:>10.0} {:>10.2}",
            row.name, row.weight, row.calories, row.calories_per_gram
        );
    }
    println!("{}", "-".repeat(53));
    println!("{:<20} {:>10} {:>10.0}", "Total", "", table.total_calories());
}

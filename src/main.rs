use clap::{Parser, Subcommand};
use tracing::{error, info};

use parcel_etl::config::{Config, ConfigLayers};
use parcel_etl::logging;
use parcel_etl::pipeline;

#[derive(Parser)]
#[command(name = "parcel_etl")]
#[command(about = "Assembles deed, taxroll, and census extracts into a modeling-ready transaction table")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full assembly pipeline
    Run {
        /// Configuration sources: JSON file paths and key=value overrides
        #[arg(required = true)]
        config: Vec<String>,
    },
    /// Print the resolved configuration and exit
    ShowConfig {
        /// Configuration sources: JSON file paths and key=value overrides
        #[arg(required = true)]
        config: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let layers = ConfigLayers::from_args(&config)?;
            let config = Config::resolve(&layers)?;
            logging::init_logging(&config.logging_level);
            layers.log_all();

            println!("🔄 Running assembly pipeline...");
            match pipeline::run(&config) {
                Ok(summary) => {
                    println!("\n📊 Pipeline Results:");
                    print_stage("Deeds", &summary.deeds);
                    println!(
                        "   (day-zero dates normalized: {}, conflicted keys dropped: {})",
                        summary.day_zero_normalized, summary.conflicted_keys
                    );
                    print_stage("Neighborhoods", &summary.neighborhoods);
                    println!(
                        "   (zero-area tracts dropped: {})",
                        summary.zero_area_tracts
                    );
                    print_stage("Parcels", &summary.parcels);
                    print_stage("Census", &summary.census);
                    println!(
                        "   Assembled: {} (join misses: {})",
                        summary.assembled, summary.join_dropped
                    );
                    println!(
                        "   Training: {}   Holdout: {}",
                        summary.training_rows, summary.holdout_rows
                    );
                    println!(
                        "   Columns standardized: {}",
                        summary.columns_standardized
                    );
                    println!("   Output file: {}", config.out_db.display());
                    info!("pipeline completed");
                }
                Err(e) => {
                    error!("pipeline failed: {e}");
                    println!("❌ Pipeline failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::ShowConfig { config } => {
            let layers = ConfigLayers::from_args(&config)?;
            let resolved = Config::resolve(&layers)?;
            logging::init_logging(&resolved.logging_level);
            layers.log_all();
        }
    }
    Ok(())
}

fn print_stage(stage: &str, counts: &parcel_etl::pipeline::StageCounts) {
    println!(
        "   {stage}: accepted {}, rejected {}",
        counts.accepted, counts.rejected
    );
    for (reason, count) in &counts.reasons {
        println!("      - {reason}: {count}");
    }
}

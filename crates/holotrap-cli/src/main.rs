//! HoloTrap command-line interface.
//!
//! Compute phase-only holograms from TOML job files:
//! ```sh
//! holotrap-cli run job.toml
//! holotrap-cli batch job.toml targets/
//! holotrap-cli reconstruct output/hologram.png
//! holotrap-cli validate job.toml
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use holotrap_core::PhaseRetrievalEngine;

#[derive(Parser)]
#[command(name = "holotrap-cli")]
#[command(about = "HoloTrap: phase-only hologram computation for optical traps")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a hologram for the job's target image.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compute holograms for every PNG target in a directory, in parallel.
    Batch {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Directory of target images.
        targets: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Reconstruct a stored hologram from its companion field file.
    Reconstruct {
        /// Hologram bitmap; the `.npy` field next to it is loaded.
        hologram: PathBuf,
        /// Propagation distance in mm.
        #[arg(long, default_value_t = 50.0)]
        distance: f64,
        /// Wavelength in mm.
        #[arg(long, default_value_t = 532e-6)]
        wavelength: f64,
        /// Preview image path (default: reconstruction.png next to the hologram).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the retrieval.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("HoloTrap Phase Retrieval");
            println!("========================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let engine = PhaseRetrievalEngine::new(runner::create_backend(&job.retrieval.backend));
            let result = runner::run_job(&job, &engine, &job.target.image)?;

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            runner::write_outputs(&result, &job, &engine, &out_dir)?;

            println!("Hologram complete.");
            Ok(())
        }
        Commands::Batch { config, targets, output } => {
            let job = config::load_config(&config)?;
            let engine = PhaseRetrievalEngine::new(runner::create_backend(&job.retrieval.backend));
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            let count = runner::run_batch(&job, &engine, &targets, &out_dir)?;
            log::info!("batch of {} targets written under {}", count, out_dir.display());
            println!("Batch complete: {} holograms.", count);
            Ok(())
        }
        Commands::Reconstruct { hologram, distance, wavelength, output } => {
            let params = config::ReconstructionConfig { distance, wavelength };
            let output = output.unwrap_or_else(|| hologram.with_file_name("reconstruction.png"));
            let engine = PhaseRetrievalEngine::new(runner::create_backend("auto"));
            runner::reconstruct_stored(&engine, &hologram, &params, &output)
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {:?}, max_iterations={}, criterion={:?}",
                job.retrieval.algorithm, job.retrieval.max_iterations, job.retrieval.criterion
            );
            Ok(())
        }
    }
}

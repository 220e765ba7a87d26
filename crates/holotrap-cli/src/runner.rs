//! Job runner: ties together target loading, retrieval, and artifact output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;

use holotrap_compute::ComputeBackend;
use holotrap_core::encoder::{gen_hologram, rotate_clockwise};
use holotrap_core::reconstruct::preview;
use holotrap_core::storage::{
    companion_field_path, load_field, load_hologram_image, load_phase, save_field,
    save_hologram_image,
};
use holotrap_core::{MetricsSeries, PhaseInit, PhaseRetrievalEngine, RunOutcome, TargetField};

use crate::config::{InitConfig, JobConfig, OutputConfig, ReconstructionConfig};

/// Result of one retrieval run, ready to be written out.
pub struct HologramOutput {
    pub outcome: RunOutcome,
    pub metrics: MetricsSeries,
}

/// Run the job's retrieval on a single target image.
pub fn run_job(job: &JobConfig, engine: &PhaseRetrievalEngine, image: &Path) -> Result<HologramOutput> {
    let pixels = load_hologram_image(image)
        .with_context(|| format!("loading target {}", image.display()))?;
    let target = TargetField::from_grayscale(&pixels)?;
    let (h, w) = target.shape();
    println!(
        "  Target '{}': {}x{}, {} signal pixels",
        image.display(),
        h,
        w,
        target.signal_count(holotrap_core::SignalMask::Positive)
    );

    let init = resolve_init(&job.retrieval.init)?;
    let params = job.retrieval.run_params();
    let mut metrics = MetricsSeries::new();
    let outcome = engine.run(&target, &params, &init, &mut metrics)?;

    match metrics.last() {
        Some(last) => println!(
            "  {} iterations ({}): uniformity={:.4}, efficiency={:.4}, rmse={:.4e}, ssim={:.4}",
            outcome.iterations,
            if outcome.converged() { "converged" } else { "max iterations" },
            last.uniformity,
            last.efficiency,
            last.rmse,
            last.ssim
        ),
        None => println!("  No iterations run"),
    }

    Ok(HologramOutput { outcome, metrics })
}

/// Run every image in `dir` as an independent job, in parallel.
///
/// Each target gets its own output sub-directory named after the image stem.
pub fn run_batch(job: &JobConfig, engine: &PhaseRetrievalEngine, dir: &Path, out_dir: &Path) -> Result<usize> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();
    images.sort();
    if images.is_empty() {
        anyhow::bail!("No .png targets found in {}", dir.display());
    }
    println!("Batch: {} targets", images.len());

    images.par_iter().try_for_each(|image| -> Result<()> {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".into());
        let result = run_job(job, engine, image)?;
        write_outputs(&result, job, engine, &out_dir.join(stem))
    })?;

    Ok(images.len())
}

fn resolve_init(init: &InitConfig) -> Result<PhaseInit> {
    Ok(match init {
        InitConfig::Random { seed } => PhaseInit::Random { seed: *seed },
        InitConfig::InverseFft => PhaseInit::InverseFft,
        InitConfig::File { path } => PhaseInit::Custom(
            load_phase(path).with_context(|| format!("loading initial phase {}", path.display()))?,
        ),
    })
}

/// Write the hologram bitmap, raw field, and the optional extras.
pub fn write_outputs(
    result: &HologramOutput,
    job: &JobConfig,
    engine: &PhaseRetrievalEngine,
    out_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let output: &OutputConfig = &job.output;

    let bitmap = gen_hologram(&result.outcome.phase);
    let image_path = out_dir.join("hologram.png");
    save_hologram_image(&image_path, &bitmap)?;
    save_field(&companion_field_path(&image_path), &result.outcome.field)?;
    println!("Hologram written to: {}", image_path.display());

    if output.rotate_for_display {
        let display_path = out_dir.join("hologram_display.png");
        save_hologram_image(&display_path, &rotate_clockwise(&bitmap))?;
    }

    if output.save_reconstruction {
        write_reconstruction(
            engine,
            &result.outcome.field,
            &job.reconstruction,
            &out_dir.join("reconstruction.png"),
        )?;
    }

    if output.save_metrics_csv {
        write_metrics_csv(&result.metrics, &out_dir.join("metrics.csv"), job)?;
    }

    if output.save_json {
        write_metrics_json(&result.metrics, &out_dir.join("metrics.json"))?;
    }

    Ok(())
}

/// Reload the field stored next to `hologram` and write its reconstruction.
pub fn reconstruct_stored(
    engine: &PhaseRetrievalEngine,
    hologram: &Path,
    params: &ReconstructionConfig,
    output: &Path,
) -> Result<()> {
    let field_path = companion_field_path(hologram);
    let field = load_field(&field_path)
        .with_context(|| format!("loading field {}", field_path.display()))?;
    write_reconstruction(engine, &field, params, output)
}

fn write_reconstruction(
    engine: &PhaseRetrievalEngine,
    field: &holotrap_core::ComplexField,
    params: &ReconstructionConfig,
    path: &Path,
) -> Result<()> {
    let image = preview(engine.propagator(), field, params.distance, params.wavelength)?;
    save_hologram_image(path, &image)?;
    println!(
        "Reconstruction (d={} mm, λ={:.1} nm) written to: {}",
        params.distance,
        params.wavelength * 1e6,
        path.display()
    );
    Ok(())
}

/// Write the metric history to a CSV file, one row per iteration.
pub fn write_metrics_csv(metrics: &MetricsSeries, path: &Path, job: &JobConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# holotrap phase retrieval metrics")?;
    writeln!(
        file,
        "# algorithm={:?}, max_iterations={}, criterion={:?}",
        job.retrieval.algorithm, job.retrieval.max_iterations, job.retrieval.criterion
    )?;
    writeln!(file, "#")?;
    writeln!(file, "iteration,uniformity,efficiency,rmse,ssim")?;

    for i in 0..metrics.len() {
        writeln!(
            file,
            "{},{:.6e},{:.6e},{:.6e},{:.6e}",
            i + 1,
            metrics.uniformity[i],
            metrics.efficiency[i],
            metrics.rmse[i],
            metrics.ssim[i]
        )?;
    }

    println!("Metrics written to: {}", path.display());
    Ok(())
}

/// Write the metric history to a JSON file.
pub fn write_metrics_json(metrics: &MetricsSeries, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // NaN is not representable in JSON; serde_json writes it as null.
    let json = serde_json::to_string_pretty(metrics)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Metrics (JSON) written to: {}", path.display());
    Ok(())
}

/// Create a compute backend based on the user's preference string.
///
/// - `"cpu"`: always use CPU.
/// - `"auto"` (default): the best available backend, currently the CPU.
pub fn create_backend(preference: &str) -> Arc<dyn ComputeBackend> {
    let backend = holotrap_compute::CpuBackend::new();
    match preference {
        "cpu" => println!("Backend: CPU"),
        _ => println!("Backend: {} (auto-detected)", backend.device_info().name),
    }
    Arc::new(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetrievalConfig, TargetConfig};
    use ndarray::Array2;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("holotrap-cli-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job(image: PathBuf, directory: &Path) -> JobConfig {
        JobConfig {
            target: TargetConfig { image },
            retrieval: RetrievalConfig {
                max_iterations: 4,
                init: InitConfig::Random { seed: Some(3) },
                ..Default::default()
            },
            reconstruction: ReconstructionConfig::default(),
            output: OutputConfig {
                directory: directory.display().to_string(),
                save_json: true,
                rotate_for_display: true,
                ..Default::default()
            },
        }
    }

    fn spot_image(path: &Path) {
        let mut img = Array2::<u8>::zeros((8, 12));
        img[[2, 3]] = 255;
        img[[5, 8]] = 255;
        save_hologram_image(path, &img).unwrap();
    }

    #[test]
    fn test_run_writes_all_artifacts() {
        let dir = scratch_dir("run");
        let target = dir.join("spots.png");
        spot_image(&target);
        let out = dir.join("out");
        let job = job(target.clone(), &out);
        let engine = PhaseRetrievalEngine::new(create_backend("cpu"));

        let result = run_job(&job, &engine, &target).unwrap();
        assert_eq!(result.outcome.phase.dim(), (8, 12));
        write_outputs(&result, &job, &engine, &out).unwrap();

        for name in [
            "hologram.png",
            "hologram.npy",
            "hologram_display.png",
            "reconstruction.png",
            "metrics.csv",
            "metrics.json",
        ] {
            assert!(out.join(name).exists(), "missing {}", name);
        }
        assert_eq!(load_hologram_image(&out.join("hologram_display.png")).unwrap().dim(), (12, 8));

        let csv = std::fs::read_to_string(out.join("metrics.csv")).unwrap();
        let rows = csv.lines().filter(|l| !l.starts_with('#')).count();
        assert_eq!(rows, 1 + result.metrics.len());

        reconstruct_stored(
            &engine,
            &out.join("hologram.png"),
            &ReconstructionConfig::default(),
            &dir.join("again.png"),
        )
        .unwrap();
        assert_eq!(load_hologram_image(&dir.join("again.png")).unwrap().dim(), (8, 12));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_batch_runs_each_target() {
        let dir = scratch_dir("batch");
        let targets = dir.join("targets");
        std::fs::create_dir_all(&targets).unwrap();
        spot_image(&targets.join("a.png"));
        spot_image(&targets.join("b.png"));
        std::fs::write(targets.join("notes.txt"), "ignored").unwrap();
        let out = dir.join("out");
        let job = job(targets.join("a.png"), &out);
        let engine = PhaseRetrievalEngine::new(create_backend("auto"));

        assert_eq!(run_batch(&job, &engine, &targets, &out).unwrap(), 2);
        assert!(out.join("a").join("hologram.npy").exists());
        assert!(out.join("b").join("metrics.csv").exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_init_file_is_reported() {
        let err = resolve_init(&InitConfig::File { path: "/nonexistent/phase.npy".into() }).unwrap_err();
        assert!(err.to_string().contains("phase.npy"));
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use redwatch_core::{build_dataset, MatchResult, OnnxFaceEngine, RedList, Recognizer, Refresh};
use redwatch_hw::{frame, Camera};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "redwatch", about = "Face recognition with red-list alerts")]
struct Cli {
    /// TOML config file (default: $REDWATCH_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate pictures and write `<name>.annotated.png` next to them
    Annotate {
        /// Input images (jpg, png)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Write annotated images here instead of next to the inputs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Match tolerance in [0.0, 1.0]; lower is stricter
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// Annotate webcam frames until Ctrl-C
    Webcam {
        /// V4L2 device (e.g. /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
        /// File that always holds the latest annotated frame
        #[arg(short, long, default_value = "webcam.png")]
        output: PathBuf,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
        /// Match tolerance in [0.0, 1.0]; lower is stricter
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// Rebuild the encoding store from the dataset directory
    Rebuild {
        /// Dataset root: one sub-directory of photos per person
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// List video capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration resolved");

    match cli.command {
        Commands::Annotate {
            inputs,
            output_dir,
            tolerance,
        } => {
            let tolerance = tolerance.unwrap_or(config.tolerance);
            run_annotate(&config, &inputs, output_dir.as_deref(), tolerance)?;
        }
        Commands::Webcam {
            device,
            output,
            max_frames,
            tolerance,
        } => {
            let device = device.unwrap_or_else(|| config.camera_device.clone());
            let tolerance = tolerance.unwrap_or(config.tolerance);
            run_webcam(config, device, output, max_frames, tolerance).await?;
        }
        Commands::Rebuild { dataset } => {
            let dataset = dataset.unwrap_or_else(|| config.dataset_dir.clone());
            run_rebuild(&config, &dataset)?;
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn open_recognizer(config: &Config) -> Result<(Recognizer<OnnxFaceEngine>, RedList)> {
    let engine = OnnxFaceEngine::load(&config.model_dir).context("loading face models")?;
    let recognizer = Recognizer::open(engine, &config.encodings_path, Refresh::OnChange)
        .with_context(|| format!("opening encoding store {}", config.encodings_path.display()))?;
    let red_list = RedList::load(&config.red_list_path)?;
    tracing::info!(
        store = %recognizer.store_path().display(),
        identities = recognizer.store().identities().len(),
        red_listed = red_list.len(),
        "recognizer ready"
    );
    Ok((recognizer, red_list))
}

fn run_annotate(config: &Config, inputs: &[PathBuf], output_dir: Option<&Path>, tolerance: f32) -> Result<()> {
    let (mut recognizer, red_list) = open_recognizer(config)?;

    for input in inputs {
        let mut image = image::open(input)
            .with_context(|| format!("decoding {}", input.display()))?
            .to_rgb8();
        let results = recognizer
            .annotate(&mut image, tolerance, &red_list)
            .with_context(|| format!("recognizing faces in {}", input.display()))?;

        let output = annotated_path(input, output_dir);
        image
            .save(&output)
            .with_context(|| format!("writing {}", output.display()))?;

        println!("{} -> {}", input.display(), output.display());
        print_results(&results);
    }

    Ok(())
}

async fn run_webcam(
    config: Config,
    device: String,
    output: PathBuf,
    max_frames: Option<u64>,
    tolerance: f32,
) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));

    let watcher = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping capture");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    let capture = tokio::task::spawn_blocking(move || -> Result<u64> {
        let (mut recognizer, red_list) = open_recognizer(&config)?;
        let camera = Camera::open(&device, config.frame_width, config.frame_height)?;
        println!("Watching {device}; latest frame -> {} (Ctrl-C to stop)", output.display());

        let mut annotated = 0u64;
        camera.stream(&cancel, |captured| -> Result<ControlFlow<()>> {
            let mut image = frame::resize_to_width(captured.image, config.max_width);
            let results = recognizer.annotate(&mut image, tolerance, &red_list)?;
            for r in results.iter().filter(|r| r.red_listed) {
                tracing::warn!(name = %r.name, seq = captured.sequence, "red-listed face in frame");
            }
            tracing::debug!(
                seq = captured.sequence,
                faces = results.len(),
                latency_ms = captured.timestamp.elapsed().as_millis() as u64,
                "frame annotated"
            );
            image
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;

            annotated += 1;
            match max_frames {
                Some(max) if annotated >= max => Ok(ControlFlow::Break(())),
                _ => Ok(ControlFlow::Continue(())),
            }
        })
    });

    let result = capture.await;
    watcher.abort();
    let frames = result.context("capture thread panicked")??;
    println!("Stopped after {frames} frames");
    Ok(())
}

fn run_rebuild(config: &Config, dataset: &Path) -> Result<()> {
    let mut engine = OnnxFaceEngine::load(&config.model_dir).context("loading face models")?;
    let (store, report) = build_dataset(&mut engine, dataset)?;
    if store.is_empty() {
        bail!("no faces found under {}; encoding store left unchanged", dataset.display());
    }
    store.save(&config.encodings_path)?;

    println!(
        "Encoded {} photos of {} people into {} ({} without a face, {} unreadable)",
        report.encoded,
        report.identities,
        config.encodings_path.display(),
        report.no_face,
        report.unreadable,
    );
    Ok(())
}

fn annotated_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().map_or_else(|| "image".into(), |s| s.to_string_lossy());
    let file_name = format!("{stem}.annotated.png");
    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

fn print_results(results: &[MatchResult]) {
    if results.is_empty() {
        println!("  no faces");
    }
    for r in results {
        let loc = r.location;
        let flag = if r.red_listed { "  [RED LIST]" } else { "" };
        println!(
            "  {:<20} top={} right={} bottom={} left={}{flag}",
            r.name, loc.top, loc.right, loc.bottom, loc.left
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_path_next_to_input() {
        assert_eq!(
            annotated_path(Path::new("/photos/team.jpg"), None),
            PathBuf::from("/photos/team.annotated.png")
        );
    }

    #[test]
    fn test_annotated_path_in_output_dir() {
        assert_eq!(
            annotated_path(Path::new("/photos/team.jpg"), Some(Path::new("/out"))),
            PathBuf::from("/out/team.annotated.png")
        );
    }

    #[test]
    fn test_cli_parses_webcam_flags() {
        let cli = Cli::try_parse_from(["redwatch", "webcam", "--max-frames", "10", "-t", "0.4"]).unwrap();
        match cli.command {
            Commands::Webcam { max_frames, tolerance, output, .. } => {
                assert_eq!(max_frames, Some(10));
                assert_eq!(tolerance, Some(0.4));
                assert_eq!(output, PathBuf::from("webcam.png"));
            }
            _ => panic!("expected webcam subcommand"),
        }
    }

    #[test]
    fn test_cli_annotate_requires_input() {
        assert!(Cli::try_parse_from(["redwatch", "annotate"]).is_err());
    }
}

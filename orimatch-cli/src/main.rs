use clap::{Parser, Subcommand};
use orimatch::io::{load_bgr_source, load_gray_source};
use orimatch::template::xml::{read_class_files, write_class_file};
use orimatch::{Detector, DetectorConfig, SourceImage};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "OriMatch CLI: train template classes and detect them")]
struct Cli {
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
    /// Load images as BGR color instead of grayscale.
    #[arg(long)]
    color: bool,
    /// Per-level spread/neighborhood sizes, finest level first.
    #[arg(long, value_delimiter = ',', default_values_t = [5usize, 8])]
    neighborhoods: Vec<usize>,
    /// Per-level feature quotas, finest level first.
    #[arg(long, value_delimiter = ',', default_values_t = [128usize, 64])]
    max_features: Vec<usize>,
    /// Minimum gradient magnitude for a pixel to carry an orientation.
    #[arg(long, default_value_t = 30)]
    min_magnitude: i32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a template class from images and write it to an XML file.
    Train {
        /// Class label stored in the XML document.
        #[arg(long)]
        label: String,
        /// Output XML path.
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        /// Template source images (one pyramid per image).
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Detect trained classes in an image and print matches as JSON.
    Detect {
        /// Template class XML files.
        #[arg(long, required = true, value_name = "FILE")]
        templates: Vec<PathBuf>,
        /// Minimum matching percentage.
        #[arg(long, default_value_t = 80.0)]
        min_score: f32,
        /// Group near-duplicate detections before printing.
        #[arg(long)]
        group: bool,
        /// Rectangle-nearness threshold used when grouping.
        #[arg(long, default_value_t = 0.2)]
        group_threshold: f32,
        /// Drop groups with fewer members than this.
        #[arg(long, default_value_t = 1)]
        min_neighbors: usize,
        /// Query image.
        image: PathBuf,
    },
}

#[derive(Serialize)]
struct MatchJson<'a> {
    class: &'a str,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    neighbors: Option<usize>,
}

fn load_source(path: &PathBuf, color: bool) -> Result<SourceImage, Box<dyn std::error::Error>> {
    let source = if color {
        load_bgr_source(path)?
    } else {
        load_gray_source(path)?
    };
    Ok(source)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .init();
    }

    let cfg = DetectorConfig {
        neighborhood_per_level: cli.neighborhoods.clone(),
        max_features_per_level: cli.max_features.clone(),
        min_magnitude: cli.min_magnitude,
        ..DetectorConfig::default()
    };

    match cli.command {
        Command::Train { label, out, images } => {
            let mut detector = Detector::new(cfg)?;
            let mut sources = Vec::with_capacity(images.len());
            for path in &images {
                sources.push(load_source(path, cli.color)?);
            }
            let idx = detector.add_class(&label, &sources)?;
            let pyramids = detector.classes()[idx].pyramids();
            write_class_file(&out, &label, pyramids)?;
            eprintln!(
                "wrote {} pyramid(s) for class {label:?} to {}",
                pyramids.len(),
                out.display()
            );
        }
        Command::Detect {
            templates,
            min_score,
            group,
            group_threshold,
            min_neighbors,
            image,
        } => {
            let mut detector = Detector::new(cfg)?;
            for (label, pyramids) in read_class_files(&templates)? {
                detector.add_pyramids(&label, pyramids)?;
            }

            let source = load_source(&image, cli.color)?;
            let matches = detector.detect(&source, min_score)?;

            let rows: Vec<MatchJson<'_>> = if group {
                detector
                    .group_matches(&matches, group_threshold, min_neighbors)
                    .iter()
                    .map(|g| {
                        let m = &g.representative;
                        let rect = detector.bounding_rect(m);
                        MatchJson {
                            class: detector.classes()[m.handle.class].label(),
                            x: rect.x,
                            y: rect.y,
                            width: rect.width,
                            height: rect.height,
                            score: m.score,
                            neighbors: Some(g.neighbors),
                        }
                    })
                    .collect::<Vec<_>>()
            } else {
                matches
                    .iter()
                    .map(|m| {
                        let rect = detector.bounding_rect(m);
                        MatchJson {
                            class: detector.classes()[m.handle.class].label(),
                            x: rect.x,
                            y: rect.y,
                            width: rect.width,
                            height: rect.height,
                            score: m.score,
                            neighbors: None,
                        }
                    })
                    .collect()
            };

            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

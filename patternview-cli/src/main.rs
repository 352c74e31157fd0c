//! patternview command-line interface.
//!
//! Inspects, synthesizes, processes and analyzes antenna patterns through
//! the same data model an interactive viewer uses.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::info;
use patternview_algorithms::{
    AnalysisError, AnalysisKind, AnalysisOutput, AnalysisRequest, NearField, NearFieldSurface,
    SweParams,
};
use patternview_core::synthetic::SyntheticPattern;
use patternview_core::{
    Component, CoordinateFormat, NormalizationReference, Pattern, PatternError, PatternValue,
    Polarization, Transform,
};
use patternview_io::{load_pattern, save_pattern, LoadError, PatternFormat, SaveError};
use patternview_model::{AnalysisEvent, ModelConfig, ModelError, PatternDataModel};
use thiserror::Error;

const GHZ: f64 = 1e9;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("save error: {0}")]
    Save(#[from] SaveError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Analysis(AnalysisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Antenna pattern inspection and processing.
#[derive(Parser)]
#[command(name = "patternview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show axes, basis and provenance of a pattern file
    Info {
        /// Input pattern file
        input: PathBuf,
    },

    /// Write a synthetic Gaussian-beam pattern
    Synth {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Frequencies in GHz
        #[arg(short, long, value_delimiter = ',', required = true)]
        frequencies: Vec<f64>,

        /// Cut angles (phi) in degrees
        #[arg(short, long, value_delimiter = ',', default_value = "0,90")]
        cuts: Vec<f64>,

        /// First theta sample (deg)
        #[arg(long, default_value = "-180.0", allow_hyphen_values = true)]
        theta_start: f64,

        /// Last theta sample (deg)
        #[arg(long, default_value = "180.0")]
        theta_stop: f64,

        /// Theta step (deg)
        #[arg(long, default_value = "5.0")]
        theta_step: f64,

        /// Storage basis: theta, phi, x, y, rhcp, lhcp
        #[arg(long, default_value = "theta", value_parser = parse_polarization)]
        basis: Polarization,

        /// Radiated co-polarization
        #[arg(long, default_value = "x", value_parser = parse_polarization)]
        excitation: Polarization,

        /// Half-power beamwidth (deg)
        #[arg(long, default_value = "40.0")]
        beamwidth: f64,

        /// Cross-polar level relative to co-polar (dB)
        #[arg(long, default_value = "-30.0", allow_hyphen_values = true)]
        cross_polar_db: f64,

        /// Phase center position x,y,z in meters
        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        phase_center: Option<[f64; 3]>,
    },

    /// Apply processing transforms and write the result
    Process {
        /// Input pattern file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Translate the phase center by x,y,z meters
        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        translate: Option<[f64; 3]>,

        /// Convert to polarization basis
        #[arg(long, value_parser = parse_polarization)]
        polarization: Option<Polarization>,

        /// Shift the theta origin (deg)
        #[arg(long, allow_hyphen_values = true)]
        rotate_theta: Option<f64>,

        /// Shift the phi origin (deg)
        #[arg(long, allow_hyphen_values = true)]
        rotate_phi: Option<f64>,

        /// Re-sample in the central or sided cut layout
        #[arg(long, value_parser = parse_coordinate_format)]
        coordinate_format: Option<CoordinateFormat>,

        /// Apply MARS for an antenna of this radius (m)
        #[arg(long)]
        mars: Option<f64>,

        /// Multiply every sample by this factor
        #[arg(long, allow_hyphen_values = true)]
        scale: Option<f64>,

        /// Normalize to peak, boresight or mean
        #[arg(long, value_parser = parse_normalization)]
        normalize: Option<NormalizationReference>,
    },

    /// Run an analysis on a worker thread and print the result
    Analyze {
        /// Input pattern file
        input: PathBuf,

        /// phase-center, directivity, axial-ratio, spherical-wave-expansion or near-field
        #[arg(short, long, value_parser = parse_kind)]
        kind: AnalysisKind,

        /// Frequency in GHz (phase center, spherical expansion)
        #[arg(short, long)]
        frequency: Option<f64>,

        /// Theta limit for the phase center fit (deg)
        #[arg(long, default_value = "30.0")]
        theta_limit: f64,

        /// Highest spherical mode degree
        #[arg(long)]
        nmax: Option<usize>,

        /// Highest spherical mode order
        #[arg(long)]
        mmax: Option<usize>,

        /// Near-field surface
        #[arg(long, default_value = "sphere", value_parser = ["sphere", "plane"])]
        surface: String,

        /// Sphere radius or plane distance (m)
        #[arg(long, default_value = "1.0")]
        distance: f64,

        /// Plane half width along x and y (m)
        #[arg(long, default_value = "0.5")]
        extent: f64,

        /// Near-field samples along the two surface axes
        #[arg(long, value_delimiter = ',', default_value = "37,73")]
        points: Vec<usize>,

        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_vector(s: &str) -> std::result::Result<[f64; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected x,y,z, got {} values", parts.len())),
    }
}

fn parse_polarization(s: &str) -> std::result::Result<Polarization, String> {
    Polarization::from_name(s).ok_or_else(|| {
        let names: Vec<&str> = Polarization::ALL.iter().map(|p| p.name()).collect();
        format!("unknown polarization {s:?}; expected one of {}", names.join(", "))
    })
}

fn parse_normalization(s: &str) -> std::result::Result<NormalizationReference, String> {
    NormalizationReference::from_name(s)
        .ok_or_else(|| format!("unknown reference {s:?}; expected peak, boresight or mean"))
}

fn parse_coordinate_format(s: &str) -> std::result::Result<CoordinateFormat, String> {
    CoordinateFormat::from_name(s)
        .ok_or_else(|| format!("unknown coordinate format {s:?}; expected central or sided"))
}

fn parse_kind(s: &str) -> std::result::Result<AnalysisKind, String> {
    AnalysisKind::from_name(s).ok_or_else(|| format!("unknown analysis {s:?}"))
}

fn near_field_surface(
    shape: &str,
    distance: f64,
    extent: f64,
    points: &[usize],
) -> Result<NearFieldSurface> {
    let [u, v] = points else {
        return Err(CliError::Usage(format!(
            "--points expects two counts, got {}",
            points.len()
        )));
    };
    Ok(match shape {
        "plane" => NearFieldSurface::Plane {
            distance,
            x_extent: extent,
            y_extent: extent,
            x_points: *u,
            y_points: *v,
        },
        _ => NearFieldSurface::Sphere {
            radius: distance,
            theta_points: *u,
            phi_points: *v,
        },
    })
}

fn output_format(path: &Path) -> Result<PatternFormat> {
    PatternFormat::from_path(path).ok_or_else(|| {
        CliError::Usage(format!(
            "{}: cannot infer the output format from the extension",
            path.display()
        ))
    })
}

fn print_info(path: &Path, pattern: &Pattern) {
    let (nf, nc, na) = pattern.shape();
    let freqs: Vec<String> = pattern
        .frequencies()
        .iter()
        .map(|f| format!("{:.4}", f / GHZ))
        .collect();
    let cuts: Vec<String> = pattern.cuts().iter().map(|c| format!("{}", c)).collect();
    let angles = pattern.angles();

    println!("File: {}", path.display());
    println!("Shape: {} frequencies x {} cuts x {} angles", nf, nc, na);
    println!("Frequencies (GHz): {}", freqs.join(", "));
    println!("Cuts (deg): {}", cuts.join(", "));
    if let (Some(first), Some(last)) = (angles.first(), angles.last()) {
        println!("Theta (deg): {} to {} ({:?})", first, last, pattern.coordinate_format());
    }
    println!("Basis: {}", pattern.polarization());
    println!("Unit: {:?}", pattern.unit());
    if let Some(label) = pattern.source_label() {
        println!("Source: {}", label);
    }
    let history: Vec<String> = pattern.history().map(ToString::to_string).collect();
    if !history.is_empty() {
        println!("History (newest first):");
        for step in history {
            println!("  {}", step);
        }
    }
}

fn print_near_field(field: &NearField) {
    let (surface, u_label) = match field.surface {
        NearFieldSurface::Sphere { radius, .. } => (format!("sphere r = {} m", radius), "Theta"),
        NearFieldSurface::Plane { distance, .. } => (format!("plane z = {} m", distance), "X (m)"),
    };
    println!(
        "Near field at {:.4} GHz on {}: nmax {}, {} x {} samples",
        field.frequency / GHZ,
        surface,
        field.nmax,
        field.u.len(),
        field.v.len()
    );
    println!("{:<10} | {:<14} | {:<14}", u_label, "Max |Co| (V/m)", "Max |Cr| (V/m)");
    println!("{:-<44}", "");
    for (iu, u) in field.u.iter().enumerate() {
        let peak = |component| {
            (0..field.v.len())
                .filter_map(|iv| field.value(component, iu, iv))
                .map(|v| v.norm())
                .fold(0.0, f64::max)
        };
        println!(
            "{:<10.3} | {:<14.4e} | {:<14.4e}",
            u,
            peak(Component::Co),
            peak(Component::Cross)
        );
    }
}

fn print_analysis(output: &AnalysisOutput) {
    match output {
        AnalysisOutput::PhaseCenter(pc) => {
            println!("Phase center at {:.4} GHz", pc.frequency / GHZ);
            println!(
                "  position (mm): {:.3}, {:.3}, {:.3}",
                pc.position[0] * 1e3,
                pc.position[1] * 1e3,
                pc.position[2] * 1e3
            );
            println!("  rms residual: {:.3} deg over {} samples", pc.rms_residual_deg, pc.samples);
        }
        AnalysisOutput::Directivity(rows) => {
            println!(
                "{:<12} | {:<12} | {:<10} | {:<10}",
                "Freq (GHz)", "D (dBi)", "Theta", "Phi"
            );
            println!("{:-<52}", "");
            for row in rows {
                println!(
                    "{:<12.4} | {:<12.2} | {:<10.1} | {:<10.1}",
                    row.frequency / GHZ,
                    row.directivity_dbi,
                    row.peak_theta_deg,
                    row.peak_phi_deg
                );
            }
        }
        AnalysisOutput::AxialRatio(rows) => {
            println!(
                "{:<12} | {:<14} | {:<10} | {:<10}",
                "Freq (GHz)", "Boresight (dB)", "Min (dB)", "Max (dB)"
            );
            println!("{:-<54}", "");
            for row in rows {
                println!(
                    "{:<12.4} | {:<14.2} | {:<10.2} | {:<10.2}",
                    row.frequency / GHZ,
                    row.boresight_db,
                    row.min_db,
                    row.max_db
                );
            }
        }
        AnalysisOutput::SphericalWaves(swe) => {
            let total = swe.total_power();
            println!(
                "Spherical modes at {:.4} GHz: nmax {}, mmax {}, {} coefficients",
                swe.frequency / GHZ,
                swe.nmax,
                swe.mmax,
                swe.coefficients.len()
            );
            println!("{:<6} | {:<12}", "n", "Power (%)");
            println!("{:-<21}", "");
            for (i, power) in swe.power_by_degree.iter().enumerate() {
                let share = if total > 0.0 { power / total * 100.0 } else { 0.0 };
                println!("{:<6} | {:<12.4}", i + 1, share);
            }
        }
        AnalysisOutput::NearField(field) => print_near_field(field),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input } => {
            let pattern = load_pattern(&input)?;
            print_info(&input, &pattern);
        }

        Commands::Synth {
            output,
            frequencies,
            cuts,
            theta_start,
            theta_stop,
            theta_step,
            basis,
            excitation,
            beamwidth,
            cross_polar_db,
            phase_center,
        } => {
            let pattern = SyntheticPattern::new(frequencies.iter().map(|f| f * GHZ).collect(), cuts)
                .with_theta_grid(theta_start, theta_stop, theta_step)
                .with_basis(basis)
                .with_excitation(excitation)
                .with_beamwidth(beamwidth)
                .with_cross_polar_db(cross_polar_db)
                .with_phase_center(phase_center.unwrap_or([0.0; 3]))
                .try_build()?;
            save_pattern(&output, output_format(&output)?, &pattern)?;
            let (nf, nc, na) = pattern.shape();
            println!(
                "Wrote {} ({} frequencies x {} cuts x {} angles)",
                output.display(),
                nf,
                nc,
                na
            );
        }

        Commands::Process {
            input,
            output,
            translate,
            polarization,
            rotate_theta,
            rotate_phi,
            coordinate_format,
            mars,
            scale,
            normalize,
        } => {
            let format = output_format(&output)?;
            let mut transforms = Vec::new();
            if let Some(offset) = translate {
                transforms.push(Transform::TranslatePhaseCenter { offset });
            }
            if let Some(polarization) = polarization {
                transforms.push(Transform::ConvertPolarization { polarization });
            }
            if rotate_theta.is_some() || rotate_phi.is_some() {
                transforms.push(Transform::Rotate {
                    theta_offset_deg: rotate_theta.unwrap_or(0.0),
                    phi_offset_deg: rotate_phi.unwrap_or(0.0),
                });
            }
            if let Some(target) = coordinate_format {
                transforms.push(Transform::ConvertCoordinateFormat { target });
            }
            if let Some(max_radial_extent) = mars {
                transforms.push(Transform::Mars { max_radial_extent });
            }
            if let Some(factor) = scale {
                transforms.push(Transform::ScaleAmplitude { factor });
            }
            if let Some(reference) = normalize {
                transforms.push(Transform::Normalize { reference });
            }
            if transforms.is_empty() {
                return Err(CliError::Usage("no transform requested".to_string()));
            }

            let start = Instant::now();
            let mut model = PatternDataModel::new(ModelConfig::default().with_worker_threads(1))?;
            let label = input.display().to_string();
            model.set_pattern(PatternValue::new(load_pattern(&input)?), Some(&label));
            for transform in &transforms {
                info!("applying {}", transform);
                model.apply_transform(transform)?;
            }

            let Some(result) = model.pattern() else {
                return Err(CliError::Model(ModelError::NoPattern));
            };
            save_pattern(&output, format, result)?;
            println!(
                "Applied {} transforms in {:.2}s, wrote {}",
                transforms.len(),
                start.elapsed().as_secs_f64(),
                output.display()
            );
        }

        Commands::Analyze {
            input,
            kind,
            frequency,
            theta_limit,
            nmax,
            mmax,
            surface,
            distance,
            extent,
            points,
            threads,
            json,
        } => {
            let pattern = load_pattern(&input)?;
            let frequency_hz = frequency.map(|f| f * GHZ);
            let request = match kind {
                AnalysisKind::PhaseCenter => AnalysisRequest::PhaseCenter {
                    frequency: frequency_hz
                        .or_else(|| pattern.frequencies().first().copied())
                        .ok_or_else(|| CliError::Usage("pattern has no frequencies".to_string()))?,
                    theta_limit_deg: theta_limit,
                },
                AnalysisKind::Directivity => AnalysisRequest::Directivity,
                AnalysisKind::AxialRatio => AnalysisRequest::AxialRatio,
                AnalysisKind::SphericalWaveExpansion => {
                    AnalysisRequest::SphericalWaveExpansion(SweParams {
                        frequency: frequency_hz,
                        nmax,
                        mmax,
                    })
                }
                AnalysisKind::NearField => AnalysisRequest::NearField {
                    surface: near_field_surface(&surface, distance, extent, &points)?,
                    params: SweParams {
                        frequency: frequency_hz,
                        nmax,
                        mmax,
                    },
                },
            };

            let mut model =
                PatternDataModel::new(ModelConfig::default().with_worker_threads(threads))?;
            let outcome: Rc<RefCell<Option<AnalysisEvent>>> = Rc::default();
            let slot = Rc::clone(&outcome);
            model.subscribe_fn(move |_, notification, _| {
                if let Some(event) = &notification.analysis {
                    *slot.borrow_mut() = Some(event.clone());
                }
            });
            let label = input.display().to_string();
            model.set_pattern(PatternValue::new(pattern), Some(&label));

            let start = Instant::now();
            let job = model.request_analysis(request)?;
            info!("started {} ({})", job, kind);
            while !model.wait_for_analysis(Duration::from_millis(200)) {
                if let Some(job) = model.analysis_job() {
                    eprint!("\r{}: {:5.1}%", kind, job.progress() * 100.0);
                }
            }
            eprintln!("\r{}: done in {:.2}s", kind, start.elapsed().as_secs_f64());

            let event = outcome.borrow_mut().take();
            match event {
                Some(AnalysisEvent::Completed { output, .. }) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(output.as_ref())?);
                    } else {
                        print_analysis(&output);
                    }
                }
                Some(AnalysisEvent::Failed { error, .. }) => return Err(CliError::Analysis(error)),
                Some(AnalysisEvent::Cancelled { .. }) | None => {
                    return Err(CliError::Analysis(AnalysisError::Cancelled));
                }
            }
        }
    }

    Ok(())
}

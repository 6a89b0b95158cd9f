use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use plotters::prelude::*;
use pqrst_lib::{
    config::{PipelineConfig, RPeakMethod},
    io::{leads as lead_io, patient as patient_io, text as text_io},
    plot::{figure_from_waveform, Figure, PlotBackend, Series},
    signal::{Events, Fiducials, MERGED_LABEL},
    study::{run_pipeline, EcgStudy, PatientRecord},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "pqrst",
    version,
    about = "ECG conditioning, fiducial detection, measurements and diagnostic flags"
)]
struct Cli {
    /// Pipeline configuration (TOML); defaults apply to anything left out
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Sampling rate of the input recording (Hz)
    #[arg(long, global = true, default_value_t = 500)]
    fs: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    #[value(name = "local-maxima")]
    LocalMaxima,
    #[value(name = "pan-tompkins")]
    PanTompkins,
}

impl From<Method> for RPeakMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::LocalMaxima => RPeakMethod::LocalMaxima,
            Method::PanTompkins => RPeakMethod::PanTompkins,
        }
    }
}

#[derive(Args)]
struct InputArgs {
    /// Lead table (CSV with a header row) or a single-lead `.txt` series
    #[arg(long)]
    input: PathBuf,
    /// Append the averaged "Merged" lead
    #[arg(long)]
    merge: bool,
}

#[derive(Args)]
struct DetectArgs {
    /// Newline-delimited R-peak indices used for every lead
    #[arg(long)]
    r_peaks: Option<PathBuf>,
    /// Built-in R-peak detector
    #[arg(long)]
    method: Option<Method>,
}

#[derive(Subcommand)]
enum Commands {
    /// Condition every lead and print the treated waveforms as JSON
    Condition {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Condition and detect fiducials; prints one fiducial map per lead
    Detect {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Full pipeline on one lead: measurements, rhythm and diagnostic flags
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long, default_value = MERGED_LABEL)]
        lead: String,
        /// Patient record (JSON)
        #[arg(long)]
        patient: Option<PathBuf>,
    },
    /// Render one annotated lead to a PNG via plotters, or dump the figure
    /// model when `--out` ends in `.json`
    Plot {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        detect: DetectArgs,
        #[arg(long, default_value = MERGED_LABEL)]
        lead: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 4000)]
        max_points: usize,
        /// Leave out the raw lead drawn under the conditioned one
        #[arg(long)]
        no_raw: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Condition { input } => {
            let cfg = load_config(cli.config.as_deref(), None)?;
            cmd_condition(&input, cli.fs, &cfg)?
        }
        Commands::Detect { input, detect } => {
            let cfg = load_config(cli.config.as_deref(), detect.method)?;
            cmd_detect(&input, &detect, cli.fs, &cfg)?
        }
        Commands::Analyze {
            input,
            detect,
            lead,
            patient,
        } => {
            let cfg = load_config(cli.config.as_deref(), detect.method)?;
            cmd_analyze(&input, &detect, &lead, patient.as_deref(), cli.fs, &cfg)?
        }
        Commands::Plot {
            input,
            detect,
            lead,
            out,
            max_points,
            no_raw,
        } => {
            let cfg = load_config(cli.config.as_deref(), detect.method)?;
            let opts = PlotOptions {
                out: &out,
                max_points,
                raw: !no_raw,
            };
            cmd_plot(&input, &detect, &lead, &opts, cli.fs, &cfg)?
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>, method: Option<Method>) -> Result<PipelineConfig> {
    let mut cfg = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(method) = method {
        cfg.detection.r_peak_method = method.into();
    }
    cfg.validate()?;
    info!(
        "r-peak method {:?}, band {}..{} Hz",
        cfg.detection.r_peak_method, cfg.conditioning.low_cutoff_hz, cfg.conditioning.high_cutoff_hz
    );
    Ok(cfg)
}

fn load_study(input: &Path, fs: u32, patient: Option<&Path>) -> Result<EcgStudy> {
    let is_text = input
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    let leads = if is_text {
        vec![text_io::read_single_lead(input, fs)?]
    } else {
        lead_io::read_lead_table(input, fs)?
    };
    info!("loaded {} lead(s) from {}", leads.len(), input.display());
    let patient = match patient {
        Some(path) => patient_io::read_patient(path)?,
        None => PatientRecord::default(),
    };
    Ok(EcgStudy::new(patient, leads)?)
}

fn load_r_peaks(detect: &DetectArgs) -> Result<Option<Events>> {
    detect
        .r_peaks
        .as_deref()
        .map(text_io::read_event_indices)
        .transpose()
}

/// Merging is implied when the requested lead is the merged composite.
fn wants_merge(input: &InputArgs, lead: &str) -> bool {
    input.merge || lead.eq_ignore_ascii_case(MERGED_LABEL)
}

fn cmd_condition(input: &InputArgs, fs: u32, cfg: &PipelineConfig) -> Result<()> {
    let mut study = load_study(&input.input, fs, None)?;
    study.condition(cfg, input.merge)?;
    println!("{}", serde_json::to_string(study.conditioned())?);
    Ok(())
}

#[derive(Serialize)]
struct LeadFiducials<'a> {
    label: &'a str,
    sampling_rate: u32,
    fiducials: Option<&'a Fiducials>,
}

fn cmd_detect(input: &InputArgs, detect: &DetectArgs, fs: u32, cfg: &PipelineConfig) -> Result<()> {
    let mut study = load_study(&input.input, fs, None)?;
    let external = load_r_peaks(detect)?;
    study.condition(cfg, input.merge)?;
    study.detect(external.as_ref(), cfg)?;
    let out: Vec<LeadFiducials> = study
        .conditioned()
        .iter()
        .map(|lead| LeadFiducials {
            label: lead.label(),
            sampling_rate: lead.sampling_rate(),
            fiducials: lead.fiducials(),
        })
        .collect();
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_analyze(
    input: &InputArgs,
    detect: &DetectArgs,
    lead: &str,
    patient: Option<&Path>,
    fs: u32,
    cfg: &PipelineConfig,
) -> Result<()> {
    let mut study = load_study(&input.input, fs, patient)?;
    let external = load_r_peaks(detect)?;
    let report = run_pipeline(
        &mut study,
        lead,
        external.as_ref(),
        cfg,
        wants_merge(input, lead),
    )
    .with_context(|| format!("analysing lead `{lead}`"))?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

struct PlotOptions<'a> {
    out: &'a Path,
    max_points: usize,
    raw: bool,
}

fn cmd_plot(
    input: &InputArgs,
    detect: &DetectArgs,
    lead: &str,
    opts: &PlotOptions,
    fs: u32,
    cfg: &PipelineConfig,
) -> Result<()> {
    let mut study = load_study(&input.input, fs, None)?;
    let external = load_r_peaks(detect)?;
    study.condition(cfg, wants_merge(input, lead))?;
    study.detect(external.as_ref(), cfg)?;
    let raw = if opts.raw { study.raw_lead(lead) } else { None };
    let fig = figure_from_waveform(study.lead(lead)?, raw, opts.max_points);
    let out = opts.out;
    let as_json = out
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if as_json {
        std::fs::write(out, serde_json::to_string(&fig)?)
            .with_context(|| format!("failed to write {}", out.display()))?;
    } else {
        PngBackend::new(out).draw(&fig)?;
    }
    info!("wrote {}", out.display());
    Ok(())
}

struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: (1200, 480),
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let (x_min, mut x_max, y_min, mut y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
        if x_max <= x_min {
            x_max = x_min + 1.0;
        }
        if y_max <= y_min {
            y_max = y_min + 1.0;
        }
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "ECG".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    let stroke =
                        RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32);
                    let points = line.points.iter().map(|p| (p[0], p[1]));
                    match line.style.dash {
                        Some([on, off]) => {
                            chart.draw_series(DashedLineSeries::new(
                                points,
                                on.round().max(1.0) as u32,
                                off.round().max(1.0) as u32,
                                stroke,
                            ))?;
                        }
                        None => {
                            chart.draw_series(LineSeries::new(points, stroke))?;
                        }
                    }
                }
                Series::Scatter(scatter) => {
                    let (r, g, b) = scatter.color.rgb();
                    let style = RGBColor(r, g, b).filled();
                    chart
                        .draw_series(
                            scatter
                                .points
                                .iter()
                                .map(|p| Circle::new((p[0], p[1]), scatter.radius, style)),
                        )?
                        .label(scatter.name.as_str())
                        .legend(move |(x, y)| Circle::new((x, y), 3, style));
                }
            }
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}

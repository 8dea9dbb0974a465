use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "lbreport", version, about = "Post-process LBIBCell run output")]
struct Cli {
    /// JSON settings file; every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert solver output to cached grids, optionally plot frames and a GIF.
    Solver(SolverArgs),
    /// Render mesh snapshots to frames, optionally assemble a GIF.
    Cell(CellArgs),
    /// Assemble a directory, glob or %0Nd template of images into an animation.
    Gif(GifArgs),
    /// Write the x-averaged profile of one solver grid as JSON.
    Profile(ProfileArgs),
}

#[derive(Parser, Debug)]
struct SolverArgs {
    /// Run output directory.
    #[arg(short = 'i', long = "input-dir")]
    input_dir: PathBuf,

    /// Redraw frames that already exist.
    #[arg(long)]
    force: bool,

    /// Plot one frame per timestep.
    #[arg(long)]
    png: bool,

    /// Assemble the plotted frames into an animation.
    #[arg(long)]
    gif: bool,
}

#[derive(Parser, Debug)]
struct CellArgs {
    /// Run output directory.
    #[arg(short = 'i', long = "input-dir")]
    input_dir: PathBuf,

    /// Redraw frames that already exist.
    #[arg(long)]
    force: bool,

    /// Plot one frame per snapshot.
    #[arg(long)]
    png: bool,

    /// Assemble the plotted frames into an animation.
    #[arg(long)]
    gif: bool,

    /// Draw cells in one color instead of by cell type.
    #[arg(long)]
    no_cell_type: bool,

    /// Screenshot width in pixels.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Screenshot height in pixels.
    #[arg(long, requires = "width")]
    height: Option<u32>,
}

#[derive(Parser, Debug)]
struct GifArgs {
    /// Directory of PNGs, a glob like 'solver/Cells_*.png' or a template like 'out/%06d.png'.
    #[arg(short = 'i', long = "input-files")]
    input_files: String,

    /// Frames per second.
    #[arg(short = 'f', long)]
    fps: Option<u32>,

    /// Output animation path.
    #[arg(short = 'o', long)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct ProfileArgs {
    /// Solver record file (.txt) or cached grid (.npy).
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output JSON path; printed to stdout when omitted.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Invariant violations get the whole chain; everything else is one line.
fn report(e: &anyhow::Error) {
    let invariant = e
        .chain()
        .filter_map(|c| c.downcast_ref::<lbreport::ReportError>())
        .any(lbreport::ReportError::is_invariant_violation);
    if invariant {
        eprintln!("error: {e:?}");
    } else {
        eprintln!("error: {e:#}");
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.cmd {
        Command::Solver(args) => cmd_solver(config, args),
        Command::Cell(args) => cmd_cell(config, args),
        Command::Gif(args) => cmd_gif(&config, args),
        Command::Profile(args) => cmd_profile(&config, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<lbreport::ReportConfig> {
    match path {
        Some(p) => lbreport::ReportConfig::from_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(lbreport::ReportConfig::default()),
    }
}

fn cmd_solver(config: lbreport::ReportConfig, args: SolverArgs) -> anyhow::Result<()> {
    let processor = lbreport::RunProcessor::new(config)?;
    let summary = processor.process_solver(
        &args.input_dir,
        lbreport::RunOptions {
            force: args.force,
            render: args.png,
            assemble: args.gif,
        },
    )?;
    log_summary(&summary);
    Ok(())
}

fn cmd_cell(mut config: lbreport::ReportConfig, args: CellArgs) -> anyhow::Result<()> {
    if let (Some(w), Some(h)) = (args.width, args.height) {
        config.mesh.window_size = Some([w, h]);
    }
    let mut backend = lbreport::PyVistaBackend::new(config.mesh.python.clone());
    let processor = lbreport::RunProcessor::new(config)?;
    let summary = processor.process_mesh(
        &args.input_dir,
        &mut backend,
        !args.no_cell_type,
        lbreport::RunOptions {
            force: args.force,
            render: args.png,
            assemble: args.gif,
        },
    )?;
    log_summary(&summary);
    Ok(())
}

fn cmd_gif(config: &lbreport::ReportConfig, args: GifArgs) -> anyhow::Result<()> {
    let fps = args.fps.unwrap_or(config.fps);
    let assembler = lbreport::create_assembler(config.assembler);
    assembler
        .assemble(
            &lbreport::FrameSet::pattern(args.input_files),
            fps,
            &args.output,
        )
        .with_context(|| format!("assemble '{}'", args.output.display()))?;
    eprintln!("wrote {}", args.output.display());
    Ok(())
}

fn cmd_profile(config: &lbreport::ReportConfig, args: ProfileArgs) -> anyhow::Result<()> {
    let codec = lbreport::GridCodec::new(config.cache_policy);
    let profile = lbreport::profile::load_profile(&codec, &args.input)?;
    match args.output {
        Some(out) => {
            lbreport::profile::write_profile(&profile, &out)?;
            eprintln!("wrote {}", out.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&profile).context("encode profile JSON")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn log_summary(summary: &lbreport::RunSummary) {
    tracing::info!(
        frames = summary.frames,
        converted = summary.converted,
        cache_hits = summary.cache_hits,
        rendered = summary.rendered,
        skipped = summary.skipped,
        gaps = summary.gaps.len(),
        "run complete"
    );
    match &summary.animation {
        Some(lbreport::AssembleOutcome::Written { path }) => {
            eprintln!("wrote {}", path.display());
        }
        Some(lbreport::AssembleOutcome::Skipped { reason }) => {
            eprintln!("animation skipped: {reason}");
        }
        None => {}
    }
}

//! Run orchestration: `Discover -> Convert (+ range scan) -> Render -> Assemble -> Done`.
//!
//! Stages run strictly in order and a failing stage aborts the run. The only exceptions are
//! expected gaps at the tail of a still-growing run (skipped with a warning) and best-effort
//! assembly (downgraded to a logged skip).

use std::path::{Path, PathBuf};

use crate::{
    assemble::{Assembler, FrameSet, create_assembler},
    codec::{DecodeOutcome, GridCodec},
    config::ReportConfig,
    discover::{Discovery, RawFrame, RunKind, discover},
    foundation::{
        error::{ReportError, ReportResult},
        fs::ensure_dir,
    },
    grid::Grid,
    range::{NormalizationRange, RangeTracker},
    render::{
        RenderOutcome, RenderPolicy,
        grid::render_cached_grid,
        mesh::{MeshBackend, render_mesh_frame, resolve_mesh_source},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Convert,
    RangeScan,
    Render,
    Assemble,
    Done,
}

/// Which optional stages run, and whether existing frames are redrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOptions {
    pub force: bool,
    pub render: bool,
    pub assemble: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            render: true,
            assemble: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssembleOutcome {
    Written { path: PathBuf },
    Skipped { reason: String },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunSummary {
    pub kind: RunKind,
    pub dir: PathBuf,
    pub stages: Vec<Stage>,
    pub frames: usize,
    pub converted: usize,
    pub cache_hits: usize,
    pub rendered: usize,
    pub skipped: usize,
    /// Timesteps left out because their source was not written yet.
    pub gaps: Vec<PathBuf>,
    pub range: Option<NormalizationRange>,
    pub animation: Option<AssembleOutcome>,
}

impl RunSummary {
    fn new(discovery: &Discovery) -> Self {
        Self {
            kind: discovery.kind,
            dir: discovery.dir.clone(),
            stages: vec![Stage::Discover],
            frames: discovery.len(),
            converted: 0,
            cache_hits: 0,
            rendered: 0,
            skipped: 0,
            gaps: Vec::new(),
            range: None,
            animation: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(?stage, "entering stage");
        self.stages.push(stage);
    }
}

/// Result of the single conversion pass. The tracker comes back to the caller rather than
/// living on the processor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConvertSummary {
    pub tracker: RangeTracker,
    pub converted: usize,
    pub cache_hits: usize,
}

pub struct RunProcessor {
    config: ReportConfig,
    codec: GridCodec,
    assembler: Box<dyn Assembler>,
}

impl std::fmt::Debug for RunProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunProcessor")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .field("assembler", &self.assembler.name())
            .finish()
    }
}

impl RunProcessor {
    pub fn new(config: ReportConfig) -> ReportResult<Self> {
        config.validate()?;
        Ok(Self {
            codec: GridCodec::new(config.cache_policy),
            assembler: create_assembler(config.assembler),
            config,
        })
    }

    pub fn with_assembler(mut self, assembler: Box<dyn Assembler>) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Convert every solver record file of `dir`, then optionally render and assemble.
    #[tracing::instrument(skip_all, fields(dir = %dir.display()))]
    pub fn process_solver(&self, dir: &Path, opts: RunOptions) -> ReportResult<RunSummary> {
        let discovery = discover(dir, RunKind::Solver, self.config.many_files_threshold)?;
        let mut summary = RunSummary::new(&discovery);

        summary.enter(Stage::Convert);
        let converted = self.convert(&discovery.frames)?;
        summary.converted = converted.converted;
        summary.cache_hits = converted.cache_hits;

        summary.enter(Stage::RangeScan);
        let range = self.normalization_range(converted.tracker)?;
        summary.range = Some(range);

        let solver = &self.config.solver;
        let frames_dir = dir.join(&solver.frames_dir);
        if opts.render {
            summary.enter(Stage::Render);
            ensure_dir(&frames_dir)?;
            let policy = RenderPolicy::new(opts.force);
            let frame_opts = solver.frame_opts();
            self.render_frames(
                &discovery.frames,
                &frames_dir,
                &mut summary,
                |f| GridCodec::cached_path(&f.path).is_file(),
                |f, dest| {
                    render_cached_grid(
                        &GridCodec::cached_path(&f.path),
                        f.timestep,
                        &range,
                        dest,
                        policy,
                        &frame_opts,
                    )
                },
            )?;
        }

        if opts.assemble {
            summary.enter(Stage::Assemble);
            let out = dir.join(&solver.animation);
            summary.animation = Some(self.assemble(&discovery.frames, &frames_dir, &out)?);
        }

        summary.enter(Stage::Done);
        Ok(summary)
    }

    /// Render every mesh snapshot of `dir` through `backend`, then optionally assemble.
    ///
    /// An unavailable backend is a warning: the render stage is skipped and frames already on
    /// disk can still be assembled.
    #[tracing::instrument(skip_all, fields(dir = %dir.display(), backend = backend.name()))]
    pub fn process_mesh(
        &self,
        dir: &Path,
        backend: &mut dyn MeshBackend,
        show_category: bool,
        opts: RunOptions,
    ) -> ReportResult<RunSummary> {
        let discovery = discover(dir, RunKind::Mesh, self.config.many_files_threshold)?;
        let mut summary = RunSummary::new(&discovery);

        let mesh = &self.config.mesh;
        let frames_dir = dir.join(&mesh.frames_dir);
        if opts.render {
            if backend.is_available() {
                summary.enter(Stage::Render);
                ensure_dir(&frames_dir)?;
                let policy = RenderPolicy::new(opts.force);
                let style = mesh.style();
                self.render_frames(
                    &discovery.frames,
                    &frames_dir,
                    &mut summary,
                    |f| resolve_mesh_source(&f.path).is_ok_and(|p| p.is_file()),
                    |f, dest| {
                        render_mesh_frame(
                            &mut *backend,
                            &f.path,
                            f.timestep,
                            dest,
                            show_category,
                            policy,
                            &style,
                        )
                    },
                )?;
            } else {
                tracing::warn!(
                    backend = backend.name(),
                    "mesh rendering backend is unavailable; skipping frame rendering"
                );
            }
        }

        if opts.assemble {
            summary.enter(Stage::Assemble);
            let out = frames_dir.join(&mesh.animation);
            summary.animation = Some(self.assemble(&discovery.frames, &frames_dir, &out)?);
        }

        summary.enter(Stage::Done);
        Ok(summary)
    }

    /// Decode every raw file in one pass, feeding each grid to a fresh tracker.
    pub fn convert(&self, frames: &[RawFrame]) -> ReportResult<ConvertSummary> {
        let mut out = ConvertSummary::default();
        let mut scratch = Grid::default();

        let n = frames.len();
        for (i, frame) in frames.iter().enumerate() {
            match self.codec.decode_into(&frame.path, &mut scratch)? {
                DecodeOutcome::CacheHit => out.cache_hits += 1,
                DecodeOutcome::Converted => {
                    out.converted += 1;
                    tracing::info!("[{}/{}] converted {}", i + 1, n, frame.path.display());
                }
            }
            out.tracker.observe(&scratch);
        }
        Ok(out)
    }

    fn normalization_range(&self, tracker: RangeTracker) -> ReportResult<NormalizationRange> {
        if let Some(range) = self.config.solver.explicit_range()? {
            tracing::info!(vmin = range.vmin, vmax = range.vmax, "using configured range");
            return Ok(range);
        }
        let range = tracker.finalize()?;
        tracing::warn!(
            vmin = range.vmin,
            vmax = range.vmax,
            shift = range.shift,
            "displayed range is shifted by {} for the log color scale",
            range.shift
        );
        Ok(range)
    }

    /// Render frames in timestep order. A missing source after the last frame whose source
    /// exists is an expected gap; anywhere else it is fatal.
    fn render_frames(
        &self,
        frames: &[RawFrame],
        frames_dir: &Path,
        summary: &mut RunSummary,
        source_present: impl Fn(&RawFrame) -> bool,
        mut render: impl FnMut(&RawFrame, &Path) -> ReportResult<RenderOutcome>,
    ) -> ReportResult<()> {
        let last_present = frames.iter().rposition(&source_present);
        let n = frames.len();
        for (i, frame) in frames.iter().enumerate() {
            let dest = frame.frame_path(frames_dir);
            tracing::info!("[{}/{}] plotting {}", i + 1, n, dest.display());
            match render(frame, &dest) {
                Ok(RenderOutcome::Rendered) => summary.rendered += 1,
                Ok(RenderOutcome::Skipped) => summary.skipped += 1,
                Err(ReportError::SourceMissing { path, timestep })
                    if is_expected_gap(i, last_present) =>
                {
                    tracing::warn!(
                        path = %path.display(),
                        ?timestep,
                        "source not written yet; skipping frame"
                    );
                    summary.gaps.push(path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Assemble the frames present on disk, in timestep order.
    fn assemble(
        &self,
        frames: &[RawFrame],
        frames_dir: &Path,
        out: &Path,
    ) -> ReportResult<AssembleOutcome> {
        let files: Vec<PathBuf> = frames
            .iter()
            .map(|f| f.frame_path(frames_dir))
            .filter(|p| p.is_file())
            .collect();

        let result = if files.is_empty() {
            Err(ReportError::no_output(frames_dir, "rendered frames (*.png)"))
        } else {
            self.assembler
                .assemble(&FrameSet::Files(files), self.config.fps, out)
        };

        match result {
            Ok(()) => {
                tracing::info!(out = %out.display(), "animation written");
                Ok(AssembleOutcome::Written {
                    path: out.to_path_buf(),
                })
            }
            Err(e) if self.config.assemble_best_effort => {
                tracing::warn!(
                    assembler = self.assembler.name(),
                    error = %e,
                    "animation assembly failed; frames are kept"
                );
                Ok(AssembleOutcome::Skipped {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn is_expected_gap(index: usize, last_present: Option<usize>) -> bool {
    last_present.is_some_and(|lp| index > lp)
}

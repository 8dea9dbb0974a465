//! Run settings, loadable from a JSON file. Every field has a default.

use std::path::{Path, PathBuf};

use crate::{
    assemble::AssemblerKind,
    codec::CachePolicy,
    discover::MANY_FILES_THRESHOLD,
    foundation::error::{ReportError, ReportResult},
    range::NormalizationRange,
    render::{
        grid::GridFrameOpts,
        mesh::{DEFAULT_CAMERA, DEFAULT_CATEGORY_ATTRIBUTE, MeshStyle},
    },
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub fps: u32,
    pub many_files_threshold: usize,
    pub cache_policy: CachePolicy,
    pub assembler: AssemblerKind,
    /// Log and continue when the animation cannot be assembled.
    pub assemble_best_effort: bool,
    pub solver: SolverConfig,
    pub mesh: MeshConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            many_files_threshold: MANY_FILES_THRESHOLD,
            cache_policy: CachePolicy::default(),
            assembler: AssemblerKind::default(),
            assemble_best_effort: true,
            solver: SolverConfig::default(),
            mesh: MeshConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Frame directory, relative to the run directory.
    pub frames_dir: PathBuf,
    /// Animation file, relative to the run directory.
    pub animation: PathBuf,
    pub pixels_per_cell: u32,
    pub colorbar: bool,
    /// Fixed `[vmin, vmax]`; replaces the scanned range and its log shift.
    pub range: Option<[f64; 2]>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("solver"),
            animation: PathBuf::from("solver.gif"),
            pixels_per_cell: 1,
            colorbar: true,
            range: None,
        }
    }
}

impl SolverConfig {
    pub fn frame_opts(&self) -> GridFrameOpts {
        GridFrameOpts {
            pixels_per_cell: self.pixels_per_cell,
            colorbar: self.colorbar,
            ..GridFrameOpts::default()
        }
    }

    pub fn explicit_range(&self) -> ReportResult<Option<NormalizationRange>> {
        self.range
            .map(|[vmin, vmax]| NormalizationRange::explicit(vmin, vmax))
            .transpose()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshConfig {
    /// Frame directory, relative to the run directory.
    pub frames_dir: PathBuf,
    /// Animation file, relative to the frame directory.
    pub animation: PathBuf,
    pub camera: [[f64; 3]; 3],
    pub show_edges: bool,
    pub category_attribute: String,
    /// Interpreter that runs the mesh helper.
    pub python: String,
    pub window_size: Option<[u32; 2]>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("vtk_cell"),
            animation: PathBuf::from("Cells.gif"),
            camera: DEFAULT_CAMERA,
            show_edges: true,
            category_attribute: DEFAULT_CATEGORY_ATTRIBUTE.to_string(),
            python: "python3".to_string(),
            window_size: None,
        }
    }
}

impl MeshConfig {
    pub fn style(&self) -> MeshStyle {
        MeshStyle {
            camera: self.camera,
            show_edges: self.show_edges,
            category_attribute: self.category_attribute.clone(),
            window_size: self.window_size,
        }
    }
}

impl ReportConfig {
    pub fn from_path(path: &Path) -> ReportResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| crate::foundation::fs::open_error(path, e))?;
        let cfg: Self = serde_json::from_slice(&bytes).map_err(|e| {
            ReportError::validation(format!("invalid config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReportResult<()> {
        if self.fps == 0 {
            return Err(ReportError::validation("fps must be non-zero"));
        }
        if self.solver.pixels_per_cell == 0 {
            return Err(ReportError::validation("solver.pixels_per_cell must be >= 1"));
        }
        self.solver.explicit_range()?;
        for (name, p) in [
            ("solver.frames_dir", &self.solver.frames_dir),
            ("solver.animation", &self.solver.animation),
            ("mesh.frames_dir", &self.mesh.frames_dir),
            ("mesh.animation", &self.mesh.animation),
        ] {
            if p.as_os_str().is_empty() {
                return Err(ReportError::validation(format!("{name} must not be empty")));
            }
        }
        if self.mesh.category_attribute.trim().is_empty() {
            return Err(ReportError::validation(
                "mesh.category_attribute must not be empty",
            ));
        }
        if let Some([w, h]) = self.mesh.window_size
            && (w == 0 || h == 0)
        {
            return Err(ReportError::validation(
                "mesh.window_size must be non-zero",
            ));
        }
        Ok(())
    }
}

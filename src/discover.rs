//! Listing a run directory into an ordered frame index.

use std::path::{Path, PathBuf};

use crate::foundation::{
    core::Timestep,
    error::{ReportError, ReportResult},
};

/// Solver log written next to the record files; never a record file itself.
pub const SOLVER_LOG_NAME: &str = "log.txt";

/// Above this many inputs the run is announced as long-running.
pub const MANY_FILES_THRESHOLD: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Tab-separated solver record files (`*.txt`).
    Solver,
    /// Mesh snapshots (`*.vtm` containers or `*.vtp` surfaces).
    Mesh,
}

impl RunKind {
    pub fn matches(self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        match self {
            Self::Solver => {
                ext == "txt" && path.file_name().and_then(|n| n.to_str()) != Some(SOLVER_LOG_NAME)
            }
            Self::Mesh => ext == "vtm" || ext == "vtp",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Solver => "solver record files (*.txt)",
            Self::Mesh => "mesh snapshots (*.vtm, *.vtp)",
        }
    }
}

/// One discovered input, before any conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// `None` when the file name carries no trailing number.
    pub timestep: Option<Timestep>,
    pub path: PathBuf,
}

impl RawFrame {
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Image path for this frame inside `frames_dir`.
    pub fn frame_path(&self, frames_dir: &Path) -> PathBuf {
        frames_dir.join(format!("{}.png", self.stem()))
    }
}

#[derive(Clone, Debug)]
pub struct Discovery {
    pub kind: RunKind,
    pub dir: PathBuf,
    /// Ordered by timestep, then file name.
    pub frames: Vec<RawFrame>,
}

impl Discovery {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// List the files of kind `kind` directly inside `dir`. Only reads; creates nothing.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), kind = ?kind))]
pub fn discover(dir: &Path, kind: RunKind, many_files_threshold: usize) -> ReportResult<Discovery> {
    if !dir.is_dir() {
        return Err(ReportError::not_found(dir));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ReportError::io(dir, e))?;
    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReportError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() || !kind.matches(&path) {
            continue;
        }
        frames.push(RawFrame {
            timestep: Timestep::from_path(&path),
            path,
        });
    }

    if frames.is_empty() {
        return Err(ReportError::no_output(dir, kind.describe()));
    }

    frames.sort_by(|a, b| {
        let ka = a.timestep.map_or(u64::MAX, |t| t.0);
        let kb = b.timestep.map_or(u64::MAX, |t| t.0);
        ka.cmp(&kb).then_with(|| a.path.cmp(&b.path))
    });

    if is_many_files(frames.len(), many_files_threshold) {
        tracing::warn!(
            files = frames.len(),
            "many files to process; this may take a while"
        );
    }
    tracing::info!(files = frames.len(), "discovered {}", kind.describe());

    Ok(Discovery {
        kind,
        dir: dir.to_path_buf(),
        frames,
    })
}

/// The long-run notice fires strictly above the threshold.
fn is_many_files(count: usize, threshold: usize) -> bool {
    count > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"0\t0\t0\t0\t0\t1.0\n").unwrap();
    }

    #[test]
    fn solver_discovery_orders_by_timestep_and_skips_log() {
        let tmp = tempfile::tempdir().unwrap();
        for n in ["Cells_100.txt", "Cells_20.txt", "log.txt", "Cells_3.txt", "notes.md"] {
            touch(tmp.path(), n);
        }
        std::fs::create_dir(tmp.path().join("solver.txt")).unwrap();

        let found = discover(tmp.path(), RunKind::Solver, MANY_FILES_THRESHOLD).unwrap();
        let steps: Vec<_> = found.frames.iter().map(|f| f.timestep).collect();
        assert_eq!(
            steps,
            vec![Some(Timestep(3)), Some(Timestep(20)), Some(Timestep(100))]
        );
    }

    #[test]
    fn mesh_discovery_accepts_containers_and_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        for n in ["Cells_2.vtm", "Cells_1.vtp", "Cells_3.txt"] {
            touch(tmp.path(), n);
        }
        let found = discover(tmp.path(), RunKind::Mesh, MANY_FILES_THRESHOLD).unwrap();
        let stems: Vec<_> = found.frames.iter().map(RawFrame::stem).collect();
        assert_eq!(stems, ["Cells_1", "Cells_2"]);
    }

    #[test]
    fn unnumbered_files_sort_last() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "final.txt");
        touch(tmp.path(), "Cells_7.txt");
        let found = discover(tmp.path(), RunKind::Solver, MANY_FILES_THRESHOLD).unwrap();
        assert_eq!(found.frames[1].timestep, None);
        assert_eq!(found.frames[1].stem(), "final");
    }

    #[test]
    fn empty_directory_is_no_output_and_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "log.txt");
        let err = discover(tmp.path(), RunKind::Solver, MANY_FILES_THRESHOLD).unwrap_err();
        assert!(matches!(err, ReportError::NoOutputFound { .. }));
        let entries = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn many_files_notice_starts_above_threshold() {
        assert!(!is_many_files(MANY_FILES_THRESHOLD, MANY_FILES_THRESHOLD));
        assert!(is_many_files(MANY_FILES_THRESHOLD + 1, MANY_FILES_THRESHOLD));

        let tmp = tempfile::tempdir().unwrap();
        for step in 0..MANY_FILES_THRESHOLD {
            touch(tmp.path(), &format!("Cells_{step}.txt"));
        }
        let found = discover(tmp.path(), RunKind::Solver, MANY_FILES_THRESHOLD).unwrap();
        assert!(!is_many_files(found.len(), MANY_FILES_THRESHOLD));

        touch(tmp.path(), "Cells_999.txt");
        let found = discover(tmp.path(), RunKind::Solver, MANY_FILES_THRESHOLD).unwrap();
        assert!(is_many_files(found.len(), MANY_FILES_THRESHOLD));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover(&tmp.path().join("nope"), RunKind::Mesh, 30).unwrap_err();
        assert!(matches!(err, ReportError::NotFound { .. }));
    }

    #[test]
    fn frame_path_uses_the_stem() {
        let f = RawFrame {
            timestep: Some(Timestep(5)),
            path: PathBuf::from("run/Cells_5.vtm"),
        };
        assert_eq!(
            f.frame_path(Path::new("run/vtk_cell")),
            PathBuf::from("run/vtk_cell/Cells_5.png")
        );
    }
}

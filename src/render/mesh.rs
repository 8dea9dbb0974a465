//! Mesh snapshots to still frames through an external 3-D visualization collaborator.
//!
//! This module only resolves which file to hand over and how it should be styled; the
//! geometry itself is drawn by a [`MeshBackend`].

use std::{
    cell::OnceCell,
    io::Write as _,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{
    foundation::{
        core::Timestep,
        error::{ReportError, ReportResult},
        fs::{persist, temp_sibling},
        process::{check_output, command_succeeds},
    },
    render::{RenderOutcome, RenderPolicy},
};

/// Camera `[position, focal point, view up]` framing a 300 x 1000 lattice.
pub const DEFAULT_CAMERA: [[f64; 3]; 3] = [
    [125.0, 505.0, 2200.0],
    [125.0, 505.0, 0.0],
    [0.0, 1.0, 0.0],
];

pub const DEFAULT_CATEGORY_ATTRIBUTE: &str = "cell_type";

/// Exit status the helper script uses when `pyvista` cannot be imported.
const HELPER_UNAVAILABLE_EXIT: i32 = 3;

const PYVISTA_HELPER: &str = r#"
import json
import sys

try:
    import pyvista as pv
except ImportError as exc:
    sys.stderr.write(f"pyvista is not importable: {exc}\n")
    sys.exit(3)

opts = json.load(sys.stdin)
mesh = pv.read(opts["mesh"])
kwargs = dict(
    cpos=opts["cpos"],
    show_edges=opts["show_edges"],
    color=True,
    off_screen=opts["off_screen"],
    screenshot=opts["screenshot"],
)
if opts.get("scalars"):
    kwargs["scalars"] = opts["scalars"]
if opts.get("window_size"):
    kwargs["window_size"] = opts["window_size"]
mesh.plot(**kwargs)
"#;

/// Options handed to the collaborator for one frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MeshPlotOptions {
    pub cpos: [[f64; 3]; 3],
    pub show_edges: bool,
    /// Categorical attribute to color by; `None` draws a single color.
    pub scalars: Option<String>,
    pub off_screen: bool,
    pub screenshot: PathBuf,
    pub window_size: Option<[u32; 2]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshStyle {
    pub camera: [[f64; 3]; 3],
    pub show_edges: bool,
    pub category_attribute: String,
    pub window_size: Option<[u32; 2]>,
}

impl Default for MeshStyle {
    fn default() -> Self {
        Self {
            camera: DEFAULT_CAMERA,
            show_edges: true,
            category_attribute: DEFAULT_CATEGORY_ATTRIBUTE.to_string(),
            window_size: None,
        }
    }
}

impl MeshStyle {
    pub fn plot_options(&self, show_category: bool, screenshot: &Path) -> MeshPlotOptions {
        MeshPlotOptions {
            cpos: self.camera,
            show_edges: self.show_edges,
            scalars: show_category.then(|| self.category_attribute.clone()),
            off_screen: true,
            screenshot: screenshot.to_path_buf(),
            window_size: self.window_size,
        }
    }
}

/// "Load a mesh and screenshot it" capability. It may be missing at runtime.
pub trait MeshBackend {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Draw `mesh` and write the screenshot to `opts.screenshot`.
    fn render(&mut self, mesh: &Path, opts: &MeshPlotOptions) -> ReportResult<()>;
}

/// Backend that pipes the plot options as JSON into a Python helper built on `pyvista`.
#[derive(Debug)]
pub struct PyVistaBackend {
    python: String,
    available: OnceCell<bool>,
}

impl PyVistaBackend {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            available: OnceCell::new(),
        }
    }
}

impl MeshBackend for PyVistaBackend {
    fn name(&self) -> &str {
        "pyvista"
    }

    fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| command_succeeds(&self.python, &["-c", "import pyvista"]))
    }

    fn render(&mut self, mesh: &Path, opts: &MeshPlotOptions) -> ReportResult<()> {
        #[derive(serde::Serialize)]
        struct Payload<'a> {
            mesh: &'a Path,
            #[serde(flatten)]
            opts: &'a MeshPlotOptions,
        }
        let payload = serde_json::to_vec(&Payload { mesh, opts })
            .map_err(|e| ReportError::validation(format!("encode mesh plot options: {e}")))?;

        let mut child = Command::new(&self.python)
            .args(["-c", PYVISTA_HELPER])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReportError::unavailable(format!(
                    "failed to spawn '{}' for mesh rendering: {e}",
                    self.python
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A write failure means the helper already exited; its status says why.
            let _ = stdin.write_all(&payload);
        }
        let output = child.wait_with_output().map_err(|e| {
            ReportError::collaborator(format!("failed to wait for mesh helper: {e}"))
        })?;

        if output.status.code() == Some(HELPER_UNAVAILABLE_EXIT) {
            return Err(ReportError::unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        check_output("pyvista mesh helper", &output)
    }
}

/// Locate the surface file for a snapshot: `<dir>/<stem>.vtm` resolves to
/// `<dir>/<stem>/<stem>_0.vtp`, a `.vtp` is used as is.
pub fn resolve_mesh_source(snapshot: &Path) -> ReportResult<PathBuf> {
    let ext = snapshot.extension().and_then(|e| e.to_str());
    match ext {
        Some("vtm") => {
            let stem = snapshot
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    ReportError::validation(format!(
                        "mesh container '{}' has no usable file stem",
                        snapshot.display()
                    ))
                })?;
            let dir = snapshot.parent().unwrap_or_else(|| Path::new(""));
            Ok(dir.join(stem).join(format!("{stem}_0.vtp")))
        }
        Some("vtp") => Ok(snapshot.to_path_buf()),
        _ => Err(ReportError::validation(format!(
            "'{}' is not a .vtm or .vtp mesh snapshot",
            snapshot.display()
        ))),
    }
}

/// Render one mesh snapshot to `dest` unless it already exists and `policy` does not force.
///
/// The collaborator writes into a temp file next to `dest`, which is renamed into place only
/// after it succeeds.
pub fn render_mesh_frame(
    backend: &mut dyn MeshBackend,
    snapshot: &Path,
    timestep: Option<Timestep>,
    dest: &Path,
    show_category: bool,
    policy: RenderPolicy,
    style: &MeshStyle,
) -> ReportResult<RenderOutcome> {
    if policy.should_skip(dest) {
        return Ok(RenderOutcome::Skipped);
    }
    let source = resolve_mesh_source(snapshot)?;
    if !source.is_file() {
        return Err(ReportError::source_missing(source, timestep));
    }

    let tmp = temp_sibling(dest, ".png")?;
    let opts = style.plot_options(show_category, tmp.path());
    backend.render(&source, &opts)?;

    let written = std::fs::metadata(tmp.path()).map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(ReportError::collaborator(format!(
            "{} produced no image for '{}'",
            backend.name(),
            source.display()
        )));
    }
    persist(tmp, dest)?;
    Ok(RenderOutcome::Rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend {
        calls: Vec<(PathBuf, MeshPlotOptions)>,
        write: bool,
    }

    impl MeshBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn render(&mut self, mesh: &Path, opts: &MeshPlotOptions) -> ReportResult<()> {
            self.calls.push((mesh.to_path_buf(), opts.clone()));
            if self.write {
                std::fs::write(&opts.screenshot, b"\x89PNG").unwrap();
            }
            Ok(())
        }
    }

    fn stub(write: bool) -> StubBackend {
        StubBackend {
            calls: Vec::new(),
            write,
        }
    }

    #[test]
    fn vtm_resolves_to_first_block_surface() {
        assert_eq!(
            resolve_mesh_source(Path::new("run/Cells_100.vtm")).unwrap(),
            PathBuf::from("run/Cells_100/Cells_100_0.vtp")
        );
        assert_eq!(
            resolve_mesh_source(Path::new("run/Cells_100.vtp")).unwrap(),
            PathBuf::from("run/Cells_100.vtp")
        );
        assert!(resolve_mesh_source(Path::new("run/Cells_100.txt")).is_err());
    }

    #[test]
    fn category_toggle_controls_scalars() {
        let style = MeshStyle::default();
        let on = style.plot_options(true, Path::new("a.png"));
        let off = style.plot_options(false, Path::new("a.png"));
        assert_eq!(on.scalars.as_deref(), Some("cell_type"));
        assert_eq!(off.scalars, None);
        assert!(on.off_screen && on.show_edges);
        assert_eq!(on.cpos, DEFAULT_CAMERA);
    }

    #[test]
    fn renders_through_temp_file_into_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = tmp.path().join("Cells_5.vtm");
        std::fs::write(&snapshot, b"").unwrap();
        std::fs::create_dir(tmp.path().join("Cells_5")).unwrap();
        std::fs::write(tmp.path().join("Cells_5").join("Cells_5_0.vtp"), b"").unwrap();

        let dest = tmp.path().join("Cells_5.png");
        let mut backend = stub(true);
        let outcome = render_mesh_frame(
            &mut backend,
            &snapshot,
            Some(Timestep(5)),
            &dest,
            true,
            RenderPolicy::default(),
            &MeshStyle::default(),
        )
        .unwrap();

        assert_eq!(outcome, RenderOutcome::Rendered);
        assert_eq!(std::fs::read(&dest).unwrap(), b"\x89PNG");
        let (mesh, opts) = &backend.calls[0];
        assert!(mesh.ends_with("Cells_5/Cells_5_0.vtp"));
        assert_ne!(opts.screenshot, dest);
        assert!(!opts.screenshot.exists());
    }

    #[test]
    fn missing_surface_is_source_missing_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = tmp.path().join("Cells_9.vtm");
        std::fs::write(&snapshot, b"").unwrap();
        let dest = tmp.path().join("Cells_9.png");

        let mut backend = stub(true);
        let err = render_mesh_frame(
            &mut backend,
            &snapshot,
            Some(Timestep(9)),
            &dest,
            true,
            RenderPolicy::default(),
            &MeshStyle::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::SourceMissing { .. }));
        assert!(!dest.exists());
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn empty_screenshot_is_a_collaborator_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = tmp.path().join("Cells_1.vtp");
        std::fs::write(&snapshot, b"").unwrap();
        let dest = tmp.path().join("Cells_1.png");

        let err = render_mesh_frame(
            &mut stub(false),
            &snapshot,
            None,
            &dest,
            false,
            RenderPolicy::default(),
            &MeshStyle::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::Collaborator(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn plot_options_serialize_with_collaborator_keys() {
        let opts = MeshStyle::default().plot_options(true, Path::new("out.png"));
        let v = serde_json::to_value(&opts).unwrap();
        for key in ["cpos", "show_edges", "scalars", "off_screen", "screenshot"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}

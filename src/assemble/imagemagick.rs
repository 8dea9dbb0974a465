use std::{
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    assemble::{Assembler, FrameSet, validate_fps},
    foundation::{
        error::{ReportError, ReportResult},
        fs::{ensure_dir, parent_dir, persist, temp_sibling},
        process::{check_output, command_succeeds},
    },
};

/// Assembles frames with ImageMagick's `convert`, looping forever.
#[derive(Clone, Debug)]
pub struct ImageMagickAssembler {
    program: String,
}

impl Default for ImageMagickAssembler {
    fn default() -> Self {
        Self::new("convert")
    }
}

impl ImageMagickAssembler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Inter-frame delay in hundredths of a second, as `convert -delay` expects.
pub fn frame_delay(fps: u32) -> String {
    format!("{:.2}", 100.0 / f64::from(fps))
}

impl Assembler for ImageMagickAssembler {
    fn name(&self) -> &str {
        "imagemagick"
    }

    fn is_available(&self) -> bool {
        command_succeeds(&self.program, &["-version"])
    }

    #[tracing::instrument(skip_all, fields(out = %out.display(), fps = fps))]
    fn assemble(&self, frames: &FrameSet, fps: u32, out: &Path) -> ReportResult<()> {
        validate_fps(fps)?;
        let files = frames.resolve()?;
        ensure_dir(&parent_dir(out))?;

        // `convert` picks the output format from the extension, so the temp file keeps it.
        let suffix = out
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let tmp = temp_sibling(out, &suffix)?;

        tracing::info!(frames = files.len(), "assembling animation with {}", self.program);
        let output = Command::new(&self.program)
            .args(["-delay", &frame_delay(fps), "-loop", "0"])
            .args(&files)
            .arg(tmp.path())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ReportError::unavailable(format!(
                    "failed to spawn '{}' (is ImageMagick installed and on PATH?): {e}",
                    self.program
                ))
            })?;
        check_output(&self.program, &output)?;
        persist(tmp, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_hundredths_per_frame() {
        assert_eq!(frame_delay(24), "4.17");
        assert_eq!(frame_delay(10), "10.00");
        assert_eq!(frame_delay(1), "100.00");
    }

    #[test]
    fn missing_program_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let frame = tmp.path().join("Cells_0.png");
        std::fs::write(&frame, b"").unwrap();
        let asm = ImageMagickAssembler::new("lbreport-no-such-convert");
        assert!(!asm.is_available());

        let out = tmp.path().join("out.gif");
        let err = asm
            .assemble(&FrameSet::Files(vec![frame]), 24, &out)
            .unwrap_err();
        assert!(matches!(err, ReportError::Unavailable(_)));
        assert!(!out.exists());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let asm = ImageMagickAssembler::default();
        let err = asm
            .assemble(&FrameSet::Files(vec!["a.png".into()]), 0, Path::new("x.gif"))
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }
}

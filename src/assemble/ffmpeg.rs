use std::{
    io::Write as _,
    path::{Path, PathBuf},
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

/// Streams decoded frames as raw RGBA8 into the system `ffmpeg`.
///
/// The output container follows the destination extension; `.mp4` targets yuv420p H.264 for
/// maximum player compatibility.
#[derive(Clone, Debug)]
pub struct FfmpegAssembler {
    program: String,
    /// Color transparent frame pixels are composited over.
    bg_rgba: [u8; 4],
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

impl FfmpegAssembler {
    pub fn new(program: impl Into<String>, bg_rgba: [u8; 4]) -> Self {
        Self {
            program: program.into(),
            bg_rgba,
        }
    }

    fn command(&self, width: u32, height: u32, fps: u32, out: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
        ]);
        if is_mp4(out) {
            cmd.args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        cmd.arg(out);
        cmd
    }
}

fn is_mp4(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

fn decode_frame(path: &Path) -> ReportResult<image::RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| ReportError::collaborator(format!("decode frame '{}': {e}", path.display())))
}

/// Size every frame must share, taken from the first one.
fn frame_dimensions(first: &image::RgbaImage, out: &Path) -> ReportResult<(u32, u32)> {
    let (w, h) = first.dimensions();
    if w == 0 || h == 0 {
        return Err(ReportError::validation("frame width/height must be non-zero"));
    }
    if is_mp4(out) && (!w.is_multiple_of(2) || !h.is_multiple_of(2)) {
        return Err(ReportError::validation(format!(
            "frame size {w}x{h} must be even (required for yuv420p mp4 output)"
        )));
    }
    Ok((w, h))
}

impl Assembler for FfmpegAssembler {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_succeeds(&self.program, &["-version"])
    }

    #[tracing::instrument(skip_all, fields(out = %out.display(), fps = fps))]
    fn assemble(&self, frames: &FrameSet, fps: u32, out: &Path) -> ReportResult<()> {
        validate_fps(fps)?;
        let files: Vec<PathBuf> = frames.resolve()?;
        let first = decode_frame(&files[0])?;
        let (width, height) = frame_dimensions(&first, out)?;
        ensure_dir(&parent_dir(out))?;

        let suffix = out
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let tmp = temp_sibling(out, &suffix)?;

        tracing::info!(frames = files.len(), width, height, "assembling animation with ffmpeg");
        let mut child = self
            .command(width, height, fps, tmp.path())
            .spawn()
            .map_err(|e| {
                ReportError::unavailable(format!(
                    "failed to spawn '{}' (is it installed and on PATH?): {e}",
                    self.program
                ))
            })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReportError::collaborator("failed to open ffmpeg stdin"))?;

        let mut scratch = vec![0u8; first.as_raw().len()];
        let mut pending = Some(first);
        let mut streamed = Ok(());
        for (i, path) in files.iter().enumerate() {
            let frame = match pending.take().map_or_else(|| decode_frame(path), Ok) {
                Ok(frame) => frame,
                Err(e) => {
                    streamed = Err(e);
                    break;
                }
            };
            if frame.dimensions() != (width, height) {
                let (w, h) = frame.dimensions();
                streamed = Err(ReportError::validation(format!(
                    "frame size mismatch in '{}': got {w}x{h}, expected {width}x{height}",
                    path.display()
                )));
                break;
            }
            flatten_to_opaque_rgba8(&mut scratch, frame.as_raw(), self.bg_rgba)?;
            if let Err(e) = stdin.write_all(&scratch) {
                streamed = Err(ReportError::collaborator(format!(
                    "failed to write frame {i} to ffmpeg stdin: {e}"
                )));
                break;
            }
        }
        drop(stdin);

        let output = child.wait_with_output().map_err(|e| {
            ReportError::collaborator(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        streamed?;
        check_output("ffmpeg", &output)?;
        persist(tmp, out)
    }
}

/// Composite straight-alpha RGBA8 `src` over `bg_rgba` into opaque `dst`.
fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg_rgba: [u8; 4]) -> ReportResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReportError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg = [
        u16::from(bg_rgba[0]),
        u16::from(bg_rgba[1]),
        u16::from(bg_rgba[2]),
    ];

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let fg = mul_div255(u16::from(s[c]), a);
            d[c] = (fg + mul_div255(bg[c], inv)).min(255) as u8;
        }
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}

//! Still frames to one animation file through an external image-sequence tool.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use crate::foundation::error::{ReportError, ReportResult};

pub mod ffmpeg;
pub mod imagemagick;

pub use ffmpeg::FfmpegAssembler;
pub use imagemagick::ImageMagickAssembler;

/// Frames to assemble, in playback order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameSet {
    /// Explicit ordered list, used as is.
    Files(Vec<PathBuf>),
    /// A glob (`run/solver/Cells_*.png`), a printf template (`frames/%06d.png`) or a directory
    /// (all `*.png` in it). Matches are sorted in natural order.
    Pattern(String),
}

impl FrameSet {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    /// Expand into the ordered frame paths. An empty result is `NoOutputFound`.
    pub fn resolve(&self) -> ReportResult<Vec<PathBuf>> {
        match self {
            Self::Files(files) => {
                if files.is_empty() {
                    return Err(ReportError::validation("frame list is empty"));
                }
                Ok(files.clone())
            }
            Self::Pattern(pattern) => {
                let (dir, glob_pattern) = classify_pattern(pattern)?;
                let mut files = glob_files(&glob_pattern)?;
                if files.is_empty() {
                    return Err(ReportError::no_output(
                        &dir,
                        format!("frames matching '{pattern}'"),
                    ));
                }
                files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
                Ok(files)
            }
        }
    }
}

/// Map a frame pattern to `(directory, glob)`.
fn classify_pattern(pattern: &str) -> ReportResult<(PathBuf, String)> {
    let path = Path::new(pattern);
    if path.is_dir() {
        let glob = path.join("*.png").to_string_lossy().into_owned();
        return Ok((path.to_path_buf(), glob));
    }

    let glob = if let Some(glob) = printf_to_glob(pattern) {
        glob
    } else if pattern.contains(['*', '?', '[']) {
        pattern.to_string()
    } else {
        return Err(ReportError::validation(format!(
            "frames must be a file list, a glob, a %0Nd template or a directory; got '{pattern}'"
        )));
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, glob))
}

/// Translate the first `%d` / `%0Nd` conversion into a digit glob.
fn printf_to_glob(pattern: &str) -> Option<String> {
    let start = pattern.find('%')?;
    let rest = &pattern[start + 1..];
    let spec_len = rest.find('d')?;
    let flags = &rest[..spec_len];
    if !flags.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let width: usize = flags.trim_start_matches('0').parse().unwrap_or(0);
    let digits = if width == 0 {
        "[0-9]*".to_string()
    } else {
        "[0-9]".repeat(width)
    };
    Some(format!(
        "{}{}{}",
        glob::Pattern::escape(&pattern[..start]),
        digits,
        glob::Pattern::escape(&rest[spec_len + 1..])
    ))
}

/// Hidden entries (such as interrupted `.lbreport-*` temp frames) never match a wildcard.
fn glob_files(pattern: &str) -> ReportResult<Vec<PathBuf>> {
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    };
    let paths = glob::glob_with(pattern, options)
        .map_err(|e| ReportError::validation(format!("invalid frame pattern '{pattern}': {e}")))?;
    let mut out = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let p = e.path().to_path_buf();
            ReportError::io(&p, e.into_error())
        })?;
        if path.is_file() {
            out.push(path);
        }
    }
    Ok(out)
}

/// Compare strings treating runs of ASCII digits as numbers (`Cells_9` < `Cells_10`).
/// Numerically equal names fall back to byte order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    digit_aware_cmp(a.as_bytes(), b.as_bytes()).then_with(|| a.cmp(b))
}

fn digit_aware_cmp(mut a: &[u8], mut b: &[u8]) -> Ordering {
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let da = a.iter().take_while(|c| c.is_ascii_digit()).count();
                let db = b.iter().take_while(|c| c.is_ascii_digit()).count();
                let na = trim_zeros(&a[..da]);
                let nb = trim_zeros(&b[..db]);
                let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = &a[da..];
                b = &b[db..];
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(cb);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let nz = digits.iter().position(|&c| c != b'0').unwrap_or(digits.len());
    &digits[nz..]
}

/// Swappable "frames + rate -> animation file" capability.
pub trait Assembler {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn assemble(&self, frames: &FrameSet, fps: u32, out: &Path) -> ReportResult<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblerKind {
    #[default]
    Imagemagick,
    Ffmpeg,
}

pub fn create_assembler(kind: AssemblerKind) -> Box<dyn Assembler> {
    match kind {
        AssemblerKind::Imagemagick => Box::new(ImageMagickAssembler::default()),
        AssemblerKind::Ffmpeg => Box::new(FfmpegAssembler::default()),
    }
}

pub(crate) fn validate_fps(fps: u32) -> ReportResult<()> {
    if fps == 0 {
        return Err(ReportError::validation("fps must be non-zero"));
    }
    Ok(())
}

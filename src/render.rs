use std::{io::Cursor, path::Path};

use anyhow::Context as _;

use crate::foundation::error::ReportResult;

pub mod grid;
pub mod mesh;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    /// Destination already existed and `force` was off; the file was left untouched.
    Skipped,
}

/// Whether an existing destination image is rendered again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderPolicy {
    pub force: bool,
}

impl RenderPolicy {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn should_skip(&self, dest: &Path) -> bool {
        !self.force && dest.exists()
    }
}

pub(crate) fn encode_png(img: &image::RgbaImage) -> ReportResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

//! The x-averaged profile of one grid, for quick 1-D fits along y.

use std::path::{Path, PathBuf};

use crate::{
    codec::{GridCodec, SIDECAR_EXTENSION, load_sidecar},
    foundation::{
        error::{ReportError, ReportResult},
        fs::write_atomic,
    },
    grid::Grid,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Profile {
    pub source: PathBuf,
    pub size_x: usize,
    pub size_y: usize,
    /// `profile[y]` is the mean over x of row `y`.
    pub profile: Vec<f64>,
}

impl Profile {
    pub fn from_grid(source: &Path, grid: &Grid) -> Self {
        let shape = grid.shape();
        Self {
            source: source.to_path_buf(),
            size_x: shape.size_x,
            size_y: shape.size_y,
            profile: grid.x_mean_profile(),
        }
    }
}

/// Load `input` (a raw record file, through the sidecar cache, or a sidecar directly) and
/// reduce it to its x-averaged profile.
pub fn load_profile(codec: &GridCodec, input: &Path) -> ReportResult<Profile> {
    if !input.is_file() {
        return Err(ReportError::not_found(input));
    }
    let is_sidecar = input
        .extension()
        .is_some_and(|e| e == SIDECAR_EXTENSION);
    let grid = if is_sidecar {
        load_sidecar(input)?
    } else {
        codec.decode(input)?
    };
    Ok(Profile::from_grid(input, &grid))
}

/// Write `profile` as pretty JSON to `out`.
pub fn write_profile(profile: &Profile, out: &Path) -> ReportResult<()> {
    let bytes = serde_json::to_vec_pretty(profile)
        .map_err(|e| ReportError::validation(format!("encode profile: {e}")))?;
    write_atomic(out, &bytes)
}

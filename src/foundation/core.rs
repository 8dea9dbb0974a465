use std::path::Path;

/// Simulation timestep parsed from the trailing digits of an artifact's file stem
/// (`Cells_100.txt` -> `Timestep(100)`).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Timestep(pub u64);

impl Timestep {
    /// Parse the trailing run of ASCII digits of `stem`.
    ///
    /// Returns `None` when the stem does not end in a digit.
    pub fn from_stem(stem: &str) -> Option<Self> {
        let digits_start = stem
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        stem[digits_start..].parse::<u64>().ok().map(Self)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(Self::from_stem)
    }
}

/// Extent of a dense 2-D grid, indexed `[0, size_x) x [0, size_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GridShape {
    pub size_x: usize,
    pub size_y: usize,
}

impl GridShape {
    /// Largest cell count a decoded grid may hold (2 GiB of `f64`).
    pub const MAX_CELLS: usize = 1 << 28;

    pub fn new(size_x: usize, size_y: usize) -> Self {
        Self { size_x, size_y }
    }

    /// Shape whose cell count fits in `MAX_CELLS`, or `None`.
    pub fn checked(size_x: usize, size_y: usize) -> Option<Self> {
        size_x
            .checked_mul(size_y)
            .filter(|&n| n <= Self::MAX_CELLS)
            .map(|_| Self { size_x, size_y })
    }

    /// Number of cells.
    pub fn len(self) -> usize {
        self.size_x * self.size_y
    }

    pub fn is_empty(self) -> bool {
        self.size_x == 0 || self.size_y == 0
    }

    pub fn contains(self, x: usize, y: usize) -> bool {
        x < self.size_x && y < self.size_y
    }

    /// Row-major (x-major) offset of `(x, y)`; callers check `contains` first.
    pub fn offset(self, x: usize, y: usize) -> usize {
        x * self.size_y + y
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} X {}", self.size_x, self.size_y)
    }
}

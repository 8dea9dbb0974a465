//! Raw solver record files to dense grids, memoized as `.npy` sidecars.
//!
//! A record line is `x\ty\t<3 ignored fields>\tvalue`. The simulation writes records in raster
//! order, so the last line carries the largest coordinates and fixes the grid extent.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::{
    foundation::{
        core::GridShape,
        error::{ReportError, ReportResult},
        fs::{open_error, read_last_line, write_atomic},
    },
    grid::Grid,
};

/// Extension of the binary sidecar written next to each raw file.
pub const SIDECAR_EXTENSION: &str = "npy";

/// Zero-based index of the scalar value inside a record.
pub const VALUE_FIELD: usize = 5;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// How a sidecar's validity is decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Presence alone marks the sidecar valid; delete it to force a reconversion.
    #[default]
    Exists,
    /// A sidecar older than its raw file is stale and gets rewritten.
    Mtime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    CacheHit,
    Converted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Record {
    x: usize,
    y: usize,
    value: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GridCodec {
    policy: CachePolicy,
}

impl GridCodec {
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Sidecar path for `raw`: same directory and basename, `.npy` extension.
    pub fn cached_path(raw: &Path) -> PathBuf {
        raw.with_extension(SIDECAR_EXTENSION)
    }

    /// Infer `(size_x, size_y)` from the last record of `raw` without decoding the file.
    pub fn grid_shape(raw: &Path) -> ReportResult<GridShape> {
        let last = read_last_line(raw)?
            .ok_or_else(|| ReportError::malformed(raw, None, "file is empty"))?;
        let (x, y) = parse_coords(&last, raw, None)?;
        let shape = x
            .checked_add(1)
            .zip(y.checked_add(1))
            .and_then(|(sx, sy)| GridShape::checked(sx, sy))
            .ok_or_else(|| ReportError::malformed(raw, None, "grid extent overflows"))?;
        tracing::debug!(raw = %raw.display(), %shape, "LB grid");
        Ok(shape)
    }

    pub fn is_cached(&self, raw: &Path) -> bool {
        let sidecar = Self::cached_path(raw);
        let Ok(meta) = std::fs::metadata(&sidecar) else {
            return false;
        };
        match self.policy {
            CachePolicy::Exists => true,
            CachePolicy::Mtime => {
                let raw_mtime = std::fs::metadata(raw).and_then(|m| m.modified());
                match (meta.modified(), raw_mtime) {
                    (Ok(cached), Ok(source)) => cached >= source,
                    _ => true,
                }
            }
        }
    }

    /// Decode `raw` into a freshly allocated grid, via the sidecar when it is valid.
    pub fn decode(&self, raw: &Path) -> ReportResult<Grid> {
        let mut grid = Grid::default();
        self.decode_into(raw, &mut grid)?;
        Ok(grid)
    }

    /// Decode `raw` into `scratch`, reshaping it as needed.
    ///
    /// Conversion is all-or-nothing: a malformed line aborts before the sidecar is written.
    #[tracing::instrument(level = "debug", skip_all, fields(raw = %raw.display()))]
    pub fn decode_into(&self, raw: &Path, scratch: &mut Grid) -> ReportResult<DecodeOutcome> {
        let sidecar = Self::cached_path(raw);
        if self.is_cached(raw) {
            *scratch = load_sidecar(&sidecar)?;
            tracing::debug!(sidecar = %sidecar.display(), "cache hit");
            return Ok(DecodeOutcome::CacheHit);
        }

        let shape = Self::grid_shape(raw)?;
        scratch.reset(shape);
        scatter_records(raw, scratch)?;
        store_sidecar(&sidecar, scratch)?;
        Ok(DecodeOutcome::Converted)
    }
}

fn scatter_records(raw: &Path, grid: &mut Grid) -> ReportResult<()> {
    let f = File::open(raw).map_err(|e| open_error(raw, e))?;
    for (idx, line) in BufReader::new(f).lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ReportError::malformed(raw, Some(lineno), "line is not valid UTF-8")
            } else {
                ReportError::io(raw, e)
            }
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let rec = parse_record(&line, raw, lineno)?;
        grid.set(rec.x, rec.y, rec.value).map_err(|_| {
            ReportError::invariant(format!(
                "'{}' line {lineno}: record ({}, {}) lies outside the {} grid inferred from the last line",
                raw.display(),
                rec.x,
                rec.y,
                grid.shape()
            ))
        })?;
    }
    Ok(())
}

fn parse_coords(line: &str, path: &Path, lineno: Option<usize>) -> ReportResult<(usize, usize)> {
    let mut fields = line.trim_end_matches('\r').split('\t');
    let (Some(xs), Some(ys)) = (fields.next(), fields.next()) else {
        return Err(ReportError::malformed(
            path,
            lineno,
            format!("expected at least 2 tab-separated fields, got '{line}'"),
        ));
    };
    let coord = |s: &str, axis: &str| {
        s.trim().parse::<usize>().map_err(|_| {
            ReportError::malformed(
                path,
                lineno,
                format!("expected a non-negative integer {axis} coordinate, got '{s}'"),
            )
        })
    };
    Ok((coord(xs, "x")?, coord(ys, "y")?))
}

fn parse_record(line: &str, path: &Path, lineno: usize) -> ReportResult<Record> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
    if fields.len() <= VALUE_FIELD {
        return Err(ReportError::malformed(
            path,
            Some(lineno),
            format!(
                "expected at least {} tab-separated fields, got {}",
                VALUE_FIELD + 1,
                fields.len()
            ),
        ));
    }
    let (x, y) = parse_coords(line, path, Some(lineno))?;
    let raw_value = fields[VALUE_FIELD].trim();
    let value = raw_value.parse::<f64>().map_err(|_| {
        ReportError::malformed(
            path,
            Some(lineno),
            format!("expected a floating-point value, got '{raw_value}'"),
        )
    })?;
    Ok(Record { x, y, value })
}

/// Write `grid` as a NumPy v1.0 `.npy` file (`<f8`, C order).
pub fn store_sidecar(path: &Path, grid: &Grid) -> ReportResult<()> {
    write_atomic(path, &encode_npy(grid))
}

pub fn load_sidecar(path: &Path) -> ReportResult<Grid> {
    let bytes = std::fs::read(path).map_err(|e| open_error(path, e))?;
    decode_npy(path, &bytes)
}

fn encode_npy(grid: &Grid) -> Vec<u8> {
    let shape = grid.shape();
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        shape.size_x, shape.size_y
    );
    // magic + version + u16 header length + dict + '\n', padded to the alignment
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    let header_len = dict.len() + pad + 1;

    let mut out = Vec::with_capacity(unpadded + pad + grid.values().len() * 8);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat_n(b' ', pad));
    out.push(b'\n');
    for v in grid.values() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_npy(path: &Path, bytes: &[u8]) -> ReportResult<Grid> {
    let bad = |reason: &str| ReportError::cache(path, reason.to_string());

    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) {
        return Err(bad("not a .npy file"));
    }
    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 if bytes.len() >= 12 => (
            12,
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        ),
        _ => return Err(bad("unsupported .npy version")),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| bad("truncated or non-text .npy header"))?;

    if header_field(header, "descr") != Some("'<f8'") {
        return Err(bad("expected little-endian float64 data ('<f8')"));
    }
    if header_field(header, "fortran_order") != Some("False") {
        return Err(bad("expected C-ordered data"));
    }
    let dims: Vec<usize> = header_shape(header).ok_or_else(|| bad("unreadable shape"))?;
    let [size_x, size_y] = dims[..] else {
        return Err(bad("expected a 2-D array"));
    };
    let shape = GridShape::checked(size_x, size_y)
        .ok_or_else(|| bad("grid extent overflows"))?;

    let data = &bytes[data_start..];
    if data.len() != shape.len() * 8 {
        return Err(ReportError::cache(
            path,
            format!(
                "expected {} bytes of data for shape {shape}, found {}",
                shape.len() * 8,
                data.len()
            ),
        ));
    }
    let values = data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    Grid::from_vec(shape, values)
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let rest = &header[header.find(&needle)? + needle.len()..];
    let end = rest.find(',').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn header_shape(header: &str) -> Option<Vec<usize>> {
    let rest = &header[header.find("'shape':")? + "'shape':".len()..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    rest.get(open + 1..close)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

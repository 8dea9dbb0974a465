//! Solver grids to still frames under a frozen logarithmic color scale.

use std::path::Path;

use crate::{
    codec::load_sidecar,
    colormap::coolwarm,
    foundation::{
        core::{GridShape, Timestep},
        error::{ReportError, ReportResult},
        fs::write_atomic,
    },
    grid::Grid,
    range::NormalizationRange,
    render::{RenderOutcome, RenderPolicy, encode_png},
};

/// The colorbar is 1/20 of the plot height wide.
const COLORBAR_ASPECT: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridFrameOpts {
    /// Edge length of one grid cell in pixels.
    pub pixels_per_cell: u32,
    /// Append a vertical color scale on the right of the plot.
    pub colorbar: bool,
    /// Straight-alpha RGBA8 for the gap between plot and colorbar.
    pub background: [u8; 4],
}

impl Default for GridFrameOpts {
    fn default() -> Self {
        Self {
            pixels_per_cell: 1,
            colorbar: true,
            background: [255, 255, 255, 255],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameLayout {
    plot_w: u32,
    plot_h: u32,
    pad: u32,
    bar_w: u32,
}

impl FrameLayout {
    fn new(shape: GridShape, opts: &GridFrameOpts) -> ReportResult<Self> {
        if shape.is_empty() {
            return Err(ReportError::validation(format!(
                "cannot render an empty {shape} grid"
            )));
        }
        if opts.pixels_per_cell == 0 {
            return Err(ReportError::validation("pixels_per_cell must be >= 1"));
        }
        let side = |cells: usize| {
            u32::try_from(cells)
                .ok()
                .and_then(|c| c.checked_mul(opts.pixels_per_cell))
                .ok_or_else(|| {
                    ReportError::validation(format!(
                        "{shape} grid at {} px per cell exceeds image limits",
                        opts.pixels_per_cell
                    ))
                })
        };
        let plot_w = side(shape.size_x)?;
        let plot_h = side(shape.size_y)?;
        let (pad, bar_w) = if opts.colorbar {
            let bar_w = (plot_h / COLORBAR_ASPECT).max(1);
            ((bar_w / 2).max(1), bar_w)
        } else {
            (0, 0)
        };
        Ok(Self {
            plot_w,
            plot_h,
            pad,
            bar_w,
        })
    }

    fn width(&self) -> u32 {
        self.plot_w + self.pad + self.bar_w
    }
}

/// Rasterize `grid` with x to the right and y upwards, so the plot keeps the grid's
/// `size_x : size_y` proportions.
pub fn rasterize_grid(
    grid: &Grid,
    range: &NormalizationRange,
    opts: &GridFrameOpts,
) -> ReportResult<image::RgbaImage> {
    let shape = grid.shape();
    let layout = FrameLayout::new(shape, opts)?;
    let ppc = opts.pixels_per_cell;
    let values = grid.values();

    let mut img = image::RgbaImage::from_pixel(
        layout.width(),
        layout.plot_h,
        image::Rgba(opts.background),
    );

    for py in 0..layout.plot_h {
        let y = ((layout.plot_h - 1 - py) / ppc) as usize;
        for px in 0..layout.plot_w {
            let x = (px / ppc) as usize;
            let v = values[shape.offset(x, y)];
            img.put_pixel(px, py, image::Rgba(coolwarm(range.normalize(v))));
        }

        if layout.bar_w > 0 {
            let t = if layout.plot_h > 1 {
                f64::from(layout.plot_h - 1 - py) / f64::from(layout.plot_h - 1)
            } else {
                0.0
            };
            let color = image::Rgba(coolwarm(t));
            for px in layout.plot_w + layout.pad..layout.width() {
                img.put_pixel(px, py, color);
            }
        }
    }

    Ok(img)
}

/// Render `grid` to `dest` as PNG unless `dest` already exists and `policy` does not force.
pub fn render_grid_frame(
    grid: &Grid,
    range: &NormalizationRange,
    dest: &Path,
    policy: RenderPolicy,
    opts: &GridFrameOpts,
) -> ReportResult<RenderOutcome> {
    if policy.should_skip(dest) {
        return Ok(RenderOutcome::Skipped);
    }
    let img = rasterize_grid(grid, range, opts)?;
    write_atomic(dest, &encode_png(&img)?)?;
    Ok(RenderOutcome::Rendered)
}

/// Render the grid cached at `sidecar`. A missing sidecar is a `SourceMissing` error and no
/// destination file is created.
#[tracing::instrument(level = "debug", skip_all, fields(sidecar = %sidecar.display()))]
pub fn render_cached_grid(
    sidecar: &Path,
    timestep: Option<Timestep>,
    range: &NormalizationRange,
    dest: &Path,
    policy: RenderPolicy,
    opts: &GridFrameOpts,
) -> ReportResult<RenderOutcome> {
    if policy.should_skip(dest) {
        return Ok(RenderOutcome::Skipped);
    }
    if !sidecar.is_file() {
        return Err(ReportError::source_missing(sidecar, timestep));
    }
    let grid = load_sidecar(sidecar)?;
    render_grid_frame(&grid, range, dest, policy, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size_x: usize, size_y: usize) -> Grid {
        let shape = GridShape::new(size_x, size_y);
        let values = (0..shape.len()).map(|i| 1.0 + i as f64).collect();
        Grid::from_vec(shape, values).unwrap()
    }

    #[test]
    fn plot_keeps_grid_aspect_ratio() {
        let grid = ramp(3, 10);
        let range = NormalizationRange::explicit(1.0, 30.0).unwrap();
        let opts = GridFrameOpts {
            pixels_per_cell: 2,
            colorbar: false,
            ..GridFrameOpts::default()
        };
        let img = rasterize_grid(&grid, &range, &opts).unwrap();
        assert_eq!(img.dimensions(), (6, 20));
    }

    #[test]
    fn colorbar_is_appended_on_the_right() {
        let grid = ramp(10, 40);
        let range = NormalizationRange::explicit(1.0, 400.0).unwrap();
        let img = rasterize_grid(&grid, &range, &GridFrameOpts::default()).unwrap();
        // bar width 40 / 20 = 2, pad 1
        assert_eq!(img.dimensions(), (13, 40));
        assert_eq!(img.get_pixel(10, 0).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(12, 0).0, coolwarm(1.0));
        assert_eq!(img.get_pixel(12, 39).0, coolwarm(0.0));
    }

    #[test]
    fn origin_is_lower_left() {
        let shape = GridShape::new(2, 2);
        let mut grid = Grid::zeros(shape);
        grid.set(0, 0, 1.0).unwrap();
        grid.set(1, 1, 100.0).unwrap();
        grid.set(0, 1, 10.0).unwrap();
        grid.set(1, 0, 10.0).unwrap();
        let range = NormalizationRange::explicit(1.0, 100.0).unwrap();
        let opts = GridFrameOpts {
            colorbar: false,
            ..GridFrameOpts::default()
        };
        let img = rasterize_grid(&grid, &range, &opts).unwrap();
        assert_eq!(img.get_pixel(0, 1).0, coolwarm(0.0));
        assert_eq!(img.get_pixel(1, 0).0, coolwarm(1.0));
    }

    #[test]
    fn flat_range_renders_one_color() {
        let grid = Grid::zeros(GridShape::new(4, 3));
        let mut tracker = crate::range::RangeTracker::new();
        tracker.observe(&grid);
        let range = tracker.finalize().unwrap();
        assert!(range.is_flat());

        let opts = GridFrameOpts {
            colorbar: false,
            ..GridFrameOpts::default()
        };
        let img = rasterize_grid(&grid, &range, &opts).unwrap();
        let first = *img.get_pixel(0, 0);
        assert!(img.pixels().all(|p| *p == first));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let range = NormalizationRange::explicit(1.0, 2.0).unwrap();
        assert!(rasterize_grid(&Grid::default(), &range, &GridFrameOpts::default()).is_err());
    }

    #[test]
    fn missing_sidecar_creates_no_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("Cells_4.png");
        let range = NormalizationRange::explicit(1.0, 2.0).unwrap();
        let err = render_cached_grid(
            &tmp.path().join("Cells_4.npy"),
            Some(Timestep(4)),
            &range,
            &dest,
            RenderPolicy::default(),
            &GridFrameOpts::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::SourceMissing { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn rendered_png_decodes_to_the_same_pixels() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("Cells_1.png");
        let grid = ramp(5, 4);
        let range = NormalizationRange::explicit(1.0, 20.0).unwrap();
        let opts = GridFrameOpts::default();
        let outcome =
            render_grid_frame(&grid, &range, &dest, RenderPolicy::default(), &opts).unwrap();
        assert_eq!(outcome, RenderOutcome::Rendered);

        let decoded = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(decoded, rasterize_grid(&grid, &range, &opts).unwrap());
    }
}

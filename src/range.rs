use crate::{
    foundation::error::{ReportError, ReportResult},
    grid::Grid,
};

/// Shift added to both bounds (and to every rendered cell) so zero-valued data stays inside the
/// domain of the logarithmic color scale.
pub const LOG_SHIFT: f64 = 1e-10;

/// Color normalization bounds shared by every frame of a run.
///
/// `shift` is added to cell values before they are mapped, so the displayed numeric range is
/// the stored data range plus `shift`. The stored grids are never altered.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizationRange {
    pub vmin: f64,
    pub vmax: f64,
    pub shift: f64,
}

impl NormalizationRange {
    /// A caller-supplied range; no shift is applied to it or to the data.
    pub fn explicit(vmin: f64, vmax: f64) -> ReportResult<Self> {
        if !vmin.is_finite() || !vmax.is_finite() {
            return Err(ReportError::validation(format!(
                "normalization range must be finite, got [{vmin}, {vmax}]"
            )));
        }
        if vmin > vmax {
            return Err(ReportError::validation(format!(
                "normalization range must have vmin <= vmax, got [{vmin}, {vmax}]"
            )));
        }
        Ok(Self {
            vmin,
            vmax,
            shift: 0.0,
        })
    }

    /// A single-value range renders every cell with one flat color.
    pub fn is_flat(&self) -> bool {
        self.vmin == self.vmax
    }

    /// Map a stored cell value to `[0, 1]` on a logarithmic scale.
    ///
    /// Values at or below zero (after the shift) and flat ranges map to `0.0`.
    pub fn normalize(&self, value: f64) -> f64 {
        let lo = self.vmin.max(f64::MIN_POSITIVE).ln();
        let hi = self.vmax.max(f64::MIN_POSITIVE).ln();
        let span = hi - lo;
        if span <= 0.0 || !span.is_finite() {
            return 0.0;
        }
        let v = value + self.shift;
        if v.is_nan() || v <= 0.0 {
            return 0.0;
        }
        ((v.ln() - lo) / span).clamp(0.0, 1.0)
    }
}

/// Running `[min, max]` over every grid of a run.
///
/// A plain value: the conversion loop owns one, feeds it grids and hands it back, so range
/// computation can be driven (and tested) without any pipeline state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RangeTracker {
    bounds: Option<(f64, f64)>,
    observed: usize,
}

impl RangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the bounds to cover `grid`. Idempotent: re-observing a grid changes nothing.
    pub fn observe(&mut self, grid: &Grid) {
        self.observed += 1;
        if let Some((lo, hi)) = grid.min_max() {
            self.widen(lo, hi);
        }
    }

    fn widen(&mut self, lo: f64, hi: f64) {
        self.bounds = Some(match self.bounds {
            None => (lo, hi),
            Some((cur_lo, cur_hi)) => (cur_lo.min(lo), cur_hi.max(hi)),
        });
    }

    /// Combine two trackers; the result does not depend on the order of either.
    pub fn merge(mut self, other: Self) -> Self {
        if let Some((lo, hi)) = other.bounds {
            self.widen(lo, hi);
        }
        self.observed += other.observed;
        self
    }

    /// Unshifted `(min, max)` seen so far.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    pub fn grids_observed(&self) -> usize {
        self.observed
    }

    /// Freeze the bounds for rendering, shifted by [`LOG_SHIFT`].
    pub fn finalize(self) -> ReportResult<NormalizationRange> {
        let (vmin, vmax) = self.bounds.ok_or_else(|| {
            ReportError::validation("cannot finalize a normalization range before observing data")
        })?;
        Ok(NormalizationRange {
            vmin: vmin + LOG_SHIFT,
            vmax: vmax + LOG_SHIFT,
            shift: LOG_SHIFT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::GridShape;

    fn grid(values: &[f64]) -> Grid {
        Grid::from_vec(GridShape::new(1, values.len()), values.to_vec()).unwrap()
    }

    #[test]
    fn finalize_bounds_cover_every_observed_cell() {
        let grids = [grid(&[0.5, 2.0, 0.1]), grid(&[3.0, 0.2]), grid(&[1.0])];
        let mut t = RangeTracker::new();
        for g in &grids {
            t.observe(g);
        }
        let r = t.finalize().unwrap();
        for g in &grids {
            let (lo, hi) = g.min_max().unwrap();
            assert!(r.vmin <= lo + LOG_SHIFT);
            assert!(r.vmax >= hi);
        }
        assert_eq!(t.bounds(), Some((0.1, 3.0)));
        assert_eq!(t.grids_observed(), 3);
    }

    #[test]
    fn seeded_from_first_grid_not_from_zero() {
        let mut t = RangeTracker::new();
        t.observe(&grid(&[5.0, 7.0]));
        assert_eq!(t.bounds(), Some((5.0, 7.0)));
    }

    #[test]
    fn order_independent() {
        let a = grid(&[0.3, 9.0]);
        let b = grid(&[-2.0, 4.0]);

        let mut ab = RangeTracker::new();
        ab.observe(&a);
        ab.observe(&b);
        let mut ba = RangeTracker::new();
        ba.observe(&b);
        ba.observe(&a);
        assert_eq!(ab.finalize().unwrap(), ba.finalize().unwrap());

        let mut ta = RangeTracker::new();
        ta.observe(&a);
        let mut tb = RangeTracker::new();
        tb.observe(&b);
        assert_eq!(ta.merge(tb).bounds(), tb.merge(ta).bounds());
    }

    #[test]
    fn observe_is_idempotent() {
        let g = grid(&[1.0, 2.0]);
        let mut once = RangeTracker::new();
        once.observe(&g);
        let mut twice = once;
        twice.observe(&g);
        assert_eq!(once.bounds(), twice.bounds());
    }

    #[test]
    fn all_zero_grids_give_a_flat_range() {
        let mut t = RangeTracker::new();
        t.observe(&grid(&[0.0, 0.0]));
        t.observe(&grid(&[0.0]));
        let r = t.finalize().unwrap();
        assert_eq!(r.vmin, r.vmax);
        assert!(r.is_flat());
        assert_eq!(r.normalize(0.0), 0.0);
    }

    #[test]
    fn finalize_without_data_is_an_error() {
        assert!(RangeTracker::new().finalize().is_err());
    }

    #[test]
    fn normalize_is_logarithmic() {
        let r = NormalizationRange::explicit(1.0, 100.0).unwrap();
        assert_eq!(r.normalize(1.0), 0.0);
        assert!((r.normalize(10.0) - 0.5).abs() < 1e-12);
        assert_eq!(r.normalize(100.0), 1.0);
        assert_eq!(r.normalize(1e6), 1.0);
        assert_eq!(r.normalize(-3.0), 0.0);
        assert_eq!(r.normalize(f64::NAN), 0.0);
    }

    #[test]
    fn explicit_range_is_validated() {
        assert!(NormalizationRange::explicit(2.0, 1.0).is_err());
        assert!(NormalizationRange::explicit(f64::NAN, 1.0).is_err());
        assert_eq!(NormalizationRange::explicit(1.0, 2.0).unwrap().shift, 0.0);
    }
}

use crate::foundation::{
    core::GridShape,
    error::{ReportError, ReportResult},
};

/// Dense 2-D scalar field of shape `(size_x, size_y)`, stored x-major (the layout of a C-order
/// `(size_x, size_y)` array).
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    shape: GridShape,
    data: Vec<f64>,
}

impl Grid {
    pub fn zeros(shape: GridShape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn from_vec(shape: GridShape, data: Vec<f64>) -> ReportResult<Self> {
        if data.len() != shape.len() {
            return Err(ReportError::invariant(format!(
                "grid data has {} values, shape {shape} needs {}",
                data.len(),
                shape.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        self.shape
            .contains(x, y)
            .then(|| self.data[self.shape.offset(x, y)])
    }

    /// Scatter-write one cell. Out-of-bounds coordinates are an invariant violation, never
    /// clipped.
    pub fn set(&mut self, x: usize, y: usize, value: f64) -> ReportResult<()> {
        if !self.shape.contains(x, y) {
            return Err(ReportError::invariant(format!(
                "scatter write at ({x}, {y}) outside grid {}",
                self.shape
            )));
        }
        let i = self.shape.offset(x, y);
        self.data[i] = value;
        Ok(())
    }

    /// Zero every cell, reallocating when `shape` differs from the current one. Lets a
    /// scratch grid be reused across a run.
    pub fn reset(&mut self, shape: GridShape) {
        if shape == self.shape {
            self.data.fill(0.0);
        } else {
            self.shape = shape;
            self.data.clear();
            self.data.resize(shape.len(), 0.0);
        }
    }

    /// Smallest and largest value, ignoring NaN. `None` for an empty grid.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Mean over x for every y: the 1-D profile along the y axis.
    pub fn x_mean_profile(&self) -> Vec<f64> {
        let GridShape { size_x, size_y } = self.shape;
        if size_x == 0 {
            return vec![0.0; size_y];
        }
        let mut out = vec![0.0; size_y];
        for row in self.data.chunks_exact(size_y.max(1)) {
            for (acc, v) in out.iter_mut().zip(row) {
                *acc += v;
            }
        }
        let n = size_x as f64;
        out.iter_mut().for_each(|v| *v /= n);
        out
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::zeros(GridShape::new(0, 0))
    }
}

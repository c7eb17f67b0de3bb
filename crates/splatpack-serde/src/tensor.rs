use thiserror::Error;

#[derive(Debug, Error)]
#[error("shape {shape:?} needs {expected} values, got {len}")]
pub struct ShapeError {
    pub shape: Vec<usize>,
    pub expected: usize,
    pub len: usize,
}

/// A dense row-major numeric array.
///
/// Every source dtype is widened to `f64` on load, which holds any f32 or
/// i32 value exactly. Axis 0 is the record axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TensorData {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(ShapeError {
                shape,
                expected,
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn from_f32(shape: Vec<usize>, data: &[f32]) -> Result<Self, ShapeError> {
        Self::new(shape, data.iter().map(|&v| v as f64).collect())
    }

    /// Size of the record axis. A scalar counts as a single record.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of values per record.
    pub fn row_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn last_dim(&self) -> Option<usize> {
        self.shape.last().copied()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.row_width();
        &self.data[index * width..(index + 1) * width]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows()).map(|i| self.row(i))
    }

    /// Gather the given records, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut shape = self.shape.clone();
        if let Some(rows) = shape.first_mut() {
            *rows = indices.len();
        }
        let data = indices
            .iter()
            .flat_map(|&i| self.row(i).iter().copied())
            .collect();
        Self { shape, data }
    }

    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, ShapeError> {
        Self::new(shape, self.data)
    }

    /// Largest finite value, `None` for an empty or all-NaN array.
    pub fn max(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }

    pub fn to_i32_vec(&self) -> Vec<i32> {
        self.data.iter().map(|&v| v as i32).collect()
    }
}

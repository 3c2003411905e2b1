use std::ops::Index;

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    /// Row-major / C-ordered matrix data.
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl AsRef<Matrix> for Matrix {
    fn as_ref(&self) -> &Matrix {
        self
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        self.get(index.0, index.1)
            .expect("index should be in bounds")
    }
}

impl Matrix {
    /// Row-major/ C order data
    pub fn try_new(data: Vec<f64>, ncols: usize) -> Result<Self, String> {
        if ncols == 0 || data.len() % ncols != 0 {
            return Err(format!(
                "Matrix data length {} is not divisible by ncols {}",
                data.len(),
                ncols
            ));
        }
        let nrows = data.len() / ncols;
        Ok(Self { data, nrows, ncols })
    }

    pub fn identity(ndim: usize) -> Self {
        let mut data = vec![0.0; ndim * ndim];
        for i in 0..ndim {
            data[i * ndim + i] = 1.0;
        }
        Self {
            data,
            nrows: ndim,
            ncols: ndim,
        }
    }

    /// 2x2 rotation acting on `[y, x]` coordinates.
    ///
    /// Positive angles (radians) rotate from +X towards +Y.
    pub fn rotation_yx(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        #[rustfmt::skip]
        let data = vec![
            c, s,
            -s, c,
        ];
        Self {
            data,
            nrows: 2,
            ncols: 2,
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut data = vec![0.0; self.data.len()];
        for r in 0..self.nrows {
            for c in 0..self.ncols {
                data[c * self.nrows + r] = self[(r, c)];
            }
        }
        Matrix {
            data,
            nrows: self.ncols,
            ncols: self.nrows,
        }
    }

    pub fn matmul_into(&self, coord: &[f64], buf: &mut [f64]) {
        buf.fill(0.0);
        for (idx, d) in self.data.iter().enumerate() {
            let r = idx / self.ncols;
            let c = idx % self.ncols;
            buf[r] += d * coord[c];
        }
    }

    /// Matrix product `self * other`.
    pub fn compose(&self, other: &Matrix) -> Result<Matrix, String> {
        if self.ncols != other.nrows {
            return Err(format!(
                "Matrix: cannot multiply {}x{} by {}x{}",
                self.nrows, self.ncols, other.nrows, other.ncols
            ));
        }
        let mut data = vec![0.0; self.nrows * other.ncols];
        for r in 0..self.nrows {
            for c in 0..other.ncols {
                data[r * other.ncols + c] = (0..self.ncols)
                    .map(|k| self[(r, k)] * other[(k, c)])
                    .sum();
            }
        }
        Ok(Matrix {
            data,
            nrows: self.nrows,
            ncols: other.ncols,
        })
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&f64> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        self.data.get(row * self.ncols + col)
    }

    fn get_submat(
        &self,
        row: usize,
        col: usize,
        skipped_rows: &[usize],
        skipped_cols: &[usize],
    ) -> Option<&f64> {
        let actual_row = rectify_idx(row, skipped_rows);
        let actual_col = rectify_idx(col, skipped_cols);
        self.get(actual_row, actual_col)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn determinant(&self) -> Result<f64, String> {
        if self.nrows() != self.ncols() {
            return Err("Matrix: determinant only defined for square matrices".to_string());
        }
        if self.nrows() == 0 {
            return Ok(1.0);
        }
        let mut skip_rows = Vec::with_capacity(self.nrows());
        let mut skip_cols = Vec::with_capacity(self.ncols());
        Ok(self.determinant_skipping(&mut skip_rows, &mut skip_cols))
    }

    fn determinant_skipping(
        &self,
        skipped_rows: &mut Vec<usize>,
        skipped_cols: &mut Vec<usize>,
    ) -> f64 {
        let n = self.nrows() - skipped_cols.len();

        if n == 0 {
            return 1.0;
        } else if n == 1 {
            return *self.get_submat(0, 0, skipped_rows, skipped_cols).unwrap();
        } else if n == 2 {
            return self.get_submat(0, 0, skipped_rows, skipped_cols).unwrap()
                * self.get_submat(1, 1, skipped_rows, skipped_cols).unwrap()
                - self.get_submat(0, 1, skipped_rows, skipped_cols).unwrap()
                    * self.get_submat(1, 0, skipped_rows, skipped_cols).unwrap();
        }

        // Laplace expansion along first non-skipped row
        let first_row = rectify_idx(0, skipped_rows);
        skipped_rows.push(first_row);
        skipped_rows.sort_unstable();
        let mut det = 0.0;
        let mut rel_col = 0;
        for c in 0..self.ncols() {
            if skipped_cols.contains(&c) {
                continue;
            }
            skipped_cols.push(c);
            skipped_cols.sort_unstable();
            let sign = if rel_col % 2 == 0 { 1.0 } else { -1.0 };
            det += sign
                * self.get(first_row, c).unwrap()
                * self.determinant_skipping(skipped_rows, skipped_cols);
            skipped_cols.retain(|s| *s != c);
            rel_col += 1;
        }
        skipped_rows.retain(|s| *s != first_row);
        det
    }

    /// Inverse by the adjugate; fails for non-square or singular matrices.
    pub fn inverse(&self) -> Result<Matrix, String> {
        let det = self.determinant()?;
        if det.abs() < EPSILON {
            return Err("Matrix: cannot invert a singular matrix".to_string());
        }
        let n = self.nrows;
        let mut data = vec![0.0; n * n];
        for r in 0..n {
            for c in 0..n {
                let sign = if (r + c) % 2 == 0 { 1.0 } else { -1.0 };
                let minor = self.determinant_skipping(&mut vec![r], &mut vec![c]);
                // adjugate is the transposed cofactor matrix
                data[c * n + r] = sign * minor / det;
            }
        }
        Ok(Matrix {
            data,
            nrows: n,
            ncols: n,
        })
    }
}

/// Converts a submatrix index into the corresponding full matrix index.
///
/// `skipped` must be sorted.
fn rectify_idx(mut idx: usize, skipped: &[usize]) -> usize {
    for &s in skipped.iter() {
        if s <= idx {
            idx += 1;
        } else {
            break;
        }
    }
    idx
}

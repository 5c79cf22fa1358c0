//! Sparse least squares.
//!
//! This module provides a compressed sparse row matrix, a builder that turns
//! weighted least-squares rows into normal equations, and a conjugate
//! gradient solver for the resulting symmetric positive semi-definite
//! systems.

use nalgebra::DVector;

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the slice of row `i` in `col_idx`/`values`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries at the same position are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({}, {}) out of bounds", row, col);
            if last == Some((row, col)) {
                if let Some(acc) = values.last_mut() {
                    *acc += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                last = Some((row, col));
            }
        }

        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `y = A * x`, writing into an existing vector.
    pub fn mul_vec_into(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");
        assert_eq!(y.len(), self.rows, "Output dimension mismatch");

        for i in 0..self.rows {
            let range = self.row_ptr[i]..self.row_ptr[i + 1];
            y[i] = self.col_idx[range.clone()]
                .iter()
                .zip(&self.values[range])
                .map(|(&c, &v)| v * x[c])
                .sum();
        }
    }

    /// `A * x`.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.rows);
        self.mul_vec_into(x, &mut y);
        y
    }
}

/// Accumulates weighted least-squares rows into normal equations.
///
/// Minimizing `Σ wᵢ (aᵢ·x − bᵢ)²` is equivalent to solving
/// `(Σ wᵢ aᵢ aᵢᵀ) x = Σ wᵢ bᵢ aᵢ`, which is what [`NormalEquations::finish`]
/// produces. Rows are given sparsely as `(column, coefficient)` pairs;
/// repeated columns within a row are allowed.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    n: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: DVector<f64>,
    rows: usize,
}

impl NormalEquations {
    /// Start a system over `n` unknowns.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            triplets: Vec::new(),
            rhs: DVector::zeros(n),
            rows: 0,
        }
    }

    /// Number of unknowns.
    #[inline]
    pub fn num_unknowns(&self) -> usize {
        self.n
    }

    /// Number of rows added so far.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Add the row `weight · (Σ coeff·x[col] − rhs)²`.
    pub fn add_row(&mut self, coeffs: &[(usize, f64)], rhs: f64, weight: f64) {
        if weight == 0.0 || coeffs.is_empty() {
            return;
        }
        self.rows += 1;
        for &(ci, vi) in coeffs {
            for &(cj, vj) in coeffs {
                self.triplets.push((ci, cj, weight * vi * vj));
            }
            self.rhs[ci] += weight * rhs * vi;
        }
    }

    /// Build the system matrix and right-hand side.
    pub fn finish(self) -> (CsrMatrix, DVector<f64>) {
        let matrix = CsrMatrix::from_triplets(self.n, self.n, self.triplets);
        (matrix, self.rhs)
    }
}

/// Result of a conjugate gradient run.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    /// Final iterate (the best available if the solve did not converge).
    pub solution: DVector<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Residual norm relative to the reference norm.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// Solve `A x = b` with the Conjugate Gradient method.
///
/// `A` must be symmetric positive semi-definite and the system consistent.
/// Starting from `x0`, CG only moves within the range of `A`, so for a
/// singular system the result is the solution closest to the initial guess.
///
/// Convergence is declared when `‖b − A x‖ ≤ tolerance · max(‖b‖, ‖b − A x0‖)`.
/// Running out of iterations is not an error: the last iterate is returned
/// with `converged == false`.
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> CgOutcome {
    let n = b.len();
    assert_eq!(a.nrows(), n, "Matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "Matrix must be square");

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let mut ap = DVector::zeros(n);
    a.mul_vec_into(&x, &mut ap);
    let mut r = b - &ap;

    let reference = b.norm().max(r.norm());
    if reference < 1e-15 {
        return CgOutcome {
            solution: x,
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let mut r_norm_sq = r.dot(&r);
    if r_norm_sq.sqrt() / reference <= tolerance {
        return CgOutcome {
            solution: x,
            iterations: 0,
            residual: r_norm_sq.sqrt() / reference,
            converged: true,
        };
    }

    let mut p = r.clone();

    for iter in 0..max_iter {
        a.mul_vec_into(&p, &mut ap);

        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            // Search direction fell into the null space
            break;
        }
        let alpha = r_norm_sq / p_ap;

        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        let new_r_norm_sq = r.dot(&r);
        let residual = new_r_norm_sq.sqrt() / reference;
        if residual <= tolerance {
            return CgOutcome {
                solution: x,
                iterations: iter + 1,
                residual,
                converged: true,
            };
        }

        let beta = new_r_norm_sq / r_norm_sq;
        // p = r + beta * p
        p.axpy(1.0, &r, beta);
        r_norm_sq = new_r_norm_sq;
    }

    // Report the true residual of the iterate we hand back
    a.mul_vec_into(&x, &mut ap);
    let residual = (b - &ap).norm() / reference;
    CgOutcome {
        solution: x,
        iterations: max_iter,
        residual,
        converged: residual <= tolerance,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_csr_from_triplets() {
        // [ 4  1 ]
        // [ 1  3 ]
        let triplets = vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)];
        let a = CsrMatrix::from_triplets(2, 2, triplets);

        assert_eq!(a.nrows(), 2);
        assert_eq!(a.ncols(), 2);
        assert_eq!(a.nnz(), 4);
    }

    #[test]
    fn test_csr_sums_duplicates_and_skips_empty_rows() {
        let triplets = vec![(2, 2, 1.0), (0, 0, 2.0), (0, 0, 2.0), (2, 0, 5.0)];
        let a = CsrMatrix::from_triplets(3, 3, triplets);
        assert_eq!(a.nnz(), 3);

        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_relative_eq!(y[0], 4.0);
        assert_relative_eq!(y[1], 0.0);
        assert_relative_eq!(y[2], 6.0);
    }

    #[test]
    fn test_normal_equations_difference_row() {
        // (x0 - x1)^2 + (x0 - 1)^2 + (x1 - 3)^2 → x0 = 5/3, x1 = 7/3
        let mut ne = NormalEquations::new(2);
        ne.add_row(&[(0, 1.0), (1, -1.0)], 0.0, 1.0);
        ne.add_row(&[(0, 1.0)], 1.0, 1.0);
        ne.add_row(&[(1, 1.0)], 3.0, 1.0);
        assert_eq!(ne.num_rows(), 3);

        let (a, b) = ne.finish();
        let out = conjugate_gradient(&a, &b, None, 50, 1e-12);
        assert!(out.converged);
        assert_relative_eq!(out.solution[0], 5.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(out.solution[1], 7.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_weight_rows_are_ignored() {
        let mut ne = NormalEquations::new(1);
        ne.add_row(&[(0, 1.0)], 2.0, 0.0);
        assert_eq!(ne.num_rows(), 0);
        let (a, _) = ne.finish();
        assert_eq!(a.nnz(), 0);
    }

    #[test]
    fn test_cg_simple() {
        // Solution: x = 1/11, y = 7/11
        let triplets = vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)];
        let a = CsrMatrix::from_triplets(2, 2, triplets);
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let out = conjugate_gradient(&a, &b, None, 100, 1e-10);
        assert!(out.converged);
        assert_relative_eq!(out.solution[0], 1.0 / 11.0, epsilon = 1e-8);
        assert_relative_eq!(out.solution[1], 7.0 / 11.0, epsilon = 1e-8);
    }

    #[test]
    fn test_cg_singular_system_keeps_null_space_component() {
        // (x0 - x1)^2 only: any x0 == x1 is optimal, CG lands on the mean
        let mut ne = NormalEquations::new(2);
        ne.add_row(&[(0, 1.0), (1, -1.0)], 0.0, 1.0);
        let (a, b) = ne.finish();

        let x0 = DVector::from_vec(vec![0.2, 0.8]);
        let out = conjugate_gradient(&a, &b, Some(&x0), 10, 1e-12);
        assert!(out.converged);
        assert_relative_eq!(out.solution[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(out.solution[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_cg_reports_non_convergence() {
        let triplets = vec![
            (0, 0, 10.0),
            (0, 1, 1.0),
            (1, 0, 1.0),
            (1, 1, 10.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 10.0),
        ];
        let a = CsrMatrix::from_triplets(3, 3, triplets);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        let out = conjugate_gradient(&a, &b, None, 1, 1e-14);
        assert!(!out.converged);
        assert_eq!(out.iterations, 1);
        assert!(out.residual > 0.0);

        // Given enough iterations the same system converges
        let out = conjugate_gradient(&a, &b, None, 10, 1e-12);
        assert!(out.converged);
        let residual = a.mul_vec(&out.solution) - b;
        assert!(residual.norm() < 1e-9);
    }
}

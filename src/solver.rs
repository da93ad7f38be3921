use log::debug;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::time::Instant;

use crate::error::{FilterError, Result};
use crate::field::Field;

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// A pivot is singular when its magnitude is at or below
    /// `pivot_tolerance` times the largest entry of its row
    pub pivot_tolerance: f64,
    pub use_pivoting: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            pivot_tolerance: 1e-12,
            use_pivoting: true,
        }
    }
}

/// Solver statistics
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub row_swaps: usize,
    pub smallest_pivot: f64,
    pub solve_time: f64,
}

/// Gaussian elimination over any [`Field`]
#[derive(Debug, Clone)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve Ax = b by forward elimination and back substitution.
    ///
    /// With pivoting enabled, concrete values use scaled partial pivoting.
    /// Symbolic values keep the diagonal pivot and only exchange rows when it
    /// is zero; their magnitude is that of the expression's sample value, so
    /// identically-zero pivots are still caught.
    pub fn solve<T: Field>(
        &self,
        matrix: &DMatrix<T>,
        rhs: &DVector<T>,
    ) -> Result<(DVector<T>, SolverStats)> {
        let start_time = Instant::now();

        if matrix.nrows() != matrix.ncols() {
            return Err(FilterError::InvalidArgument(format!(
                "matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.nrows() != rhs.len() {
            return Err(FilterError::InvalidArgument(format!(
                "matrix has {} rows but right-hand side has {} entries",
                matrix.nrows(),
                rhs.len()
            )));
        }

        let n = matrix.nrows();
        let mut a = matrix.clone();
        let mut b = rhs.clone();

        // Largest entry of each row; a pivot is judged against its own row
        let mut row_scale: Vec<f64> = (0..n)
            .map(|row| {
                (0..n)
                    .map(|col| a[(row, col)].magnitude())
                    .filter(|m| m.is_finite())
                    .fold(0.0f64, f64::max)
            })
            .collect();
        let tolerance = self.config.pivot_tolerance;
        let relative = |magnitude: f64, scale: f64| {
            if scale > 0.0 {
                magnitude / scale
            } else {
                0.0
            }
        };

        let mut row_swaps = 0;
        let mut smallest_pivot = f64::INFINITY;

        for k in 0..n {
            let pivot_row = if !self.config.use_pivoting {
                k
            } else if T::PARTIAL_PIVOTING {
                let mut best = k;
                let mut best_ratio = relative(a[(k, k)].magnitude(), row_scale[k]);
                for row in (k + 1)..n {
                    let ratio = relative(a[(row, k)].magnitude(), row_scale[row]);
                    if ratio > best_ratio {
                        best = row;
                        best_ratio = ratio;
                    }
                }
                best
            } else {
                (k..n)
                    .find(|&row| relative(a[(row, k)].magnitude(), row_scale[row]) > tolerance)
                    .unwrap_or(k)
            };

            let pivot_magnitude = a[(pivot_row, k)].magnitude();
            if !(relative(pivot_magnitude, row_scale[pivot_row]) > tolerance) {
                return Err(FilterError::SingularSystem(format!(
                    "no usable pivot in column {} (|pivot| = {:.3e}, row scale {:.3e})",
                    k, pivot_magnitude, row_scale[pivot_row]
                )));
            }
            smallest_pivot = smallest_pivot.min(pivot_magnitude);

            if pivot_row != k {
                debug!("column {}: swapping rows {} and {}", k, k, pivot_row);
                a.swap_rows(k, pivot_row);
                b.swap_rows(k, pivot_row);
                row_scale.swap(k, pivot_row);
                row_swaps += 1;
            }

            let inverse = a[(k, k)].invert().ok_or_else(|| {
                FilterError::SingularSystem(format!("pivot in column {} is zero", k))
            })?;

            for row in (k + 1)..n {
                let factor = a[(row, k)].clone() * inverse.clone();
                if factor.magnitude() == 0.0 {
                    continue;
                }
                for col in k..n {
                    let update = factor.clone() * a[(k, col)].clone();
                    a[(row, col)] = a[(row, col)].clone() - update;
                }
                let update = factor * b[k].clone();
                b[row] = b[row].clone() - update;
            }
        }

        let mut x = DVector::from_element(n, T::zero());
        for row in (0..n).rev() {
            let mut acc = b[row].clone();
            for col in (row + 1)..n {
                acc = acc - a[(row, col)].clone() * x[col].clone();
            }
            let inverse = a[(row, row)].invert().ok_or_else(|| {
                FilterError::SingularSystem(format!("pivot in column {} is zero", row))
            })?;
            x[row] = acc * inverse;
        }

        Ok((
            x,
            SolverStats {
                row_swaps,
                smallest_pivot: if n == 0 { 0.0 } else { smallest_pivot },
                solve_time: start_time.elapsed().as_secs_f64(),
            },
        ))
    }
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// ||Ax - b|| for a concrete system
pub fn residual_norm(matrix: &DMatrix<Complex64>, x: &DVector<Complex64>, rhs: &DVector<Complex64>) -> f64 {
    (matrix * x - rhs).norm()
}

// Copyright (c) Microsoft Corporation.

/// Provides the square integer matrix used as round operands and the workload that multiplies them.
///
/// Nothing in here touches shared state. Callers hand in the operands they captured for the round.
use std::error::Error;
use std::fmt;

/// Represents errors that can occur while building or multiplying matrices.
///
/// # Variants
///
/// * `EmptyMatrix` - A matrix of dimension zero was requested.
/// * `NotSquare` - Rows handed to `Matrix::from_rows` do not form an n×n grid.
/// * `DimensionMismatch` - The two operands of a multiplication have different dimensions.
/// * `Allocation` - Storage for an n×n matrix could not be reserved.
/// * `Overflow` - A cell of the product does not fit in an `i64`.
/// * `ChecksumOverflow` - The sum of all cells does not fit in an `i64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    EmptyMatrix,
    NotSquare { row: usize, len: usize, expected: usize },
    DimensionMismatch { left: usize, right: usize },
    Allocation { dimension: usize },
    Overflow { row: usize, col: usize },
    ChecksumOverflow,
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadError::EmptyMatrix => write!(f, "matrix dimension must be at least 1"),
            WorkloadError::NotSquare { row, len, expected } => write!(
                f,
                "row {row} has {len} cells, expected {expected} for a square matrix"
            ),
            WorkloadError::DimensionMismatch { left, right } => write!(
                f,
                "cannot multiply a {left}x{left} matrix by a {right}x{right} matrix"
            ),
            WorkloadError::Allocation { dimension } => write!(
                f,
                "failed to allocate storage for a {dimension}x{dimension} matrix"
            ),
            WorkloadError::Overflow { row, col } => {
                write!(f, "product cell ({row}, {col}) overflows i64")
            }
            WorkloadError::ChecksumOverflow => write!(f, "checksum overflows i64"),
        }
    }
}

impl Error for WorkloadError {}

/// A dense n×n matrix of `i64` cells stored row-major.
///
/// Matrices are never mutated once built. A new round gets brand-new operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    dimension: usize,
    cells: Vec<i64>,
}

impl Matrix {
    /// Builds an n×n matrix with every cell set to `value`.
    ///
    /// Storage is reserved fallibly so that a dimension too large for the machine surfaces as
    /// `WorkloadError::Allocation` instead of aborting the process mid-round.
    pub fn filled(dimension: usize, value: i64) -> Result<Matrix, WorkloadError> {
        if dimension == 0 {
            return Err(WorkloadError::EmptyMatrix);
        }

        let len = dimension
            .checked_mul(dimension)
            .ok_or(WorkloadError::Allocation { dimension })?;

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| WorkloadError::Allocation { dimension })?;
        cells.resize(len, value);

        Ok(Matrix { dimension, cells })
    }

    /// Builds a matrix from explicit rows. Every row must be as long as there are rows.
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Matrix, WorkloadError> {
        let dimension = rows.len();
        if dimension == 0 {
            return Err(WorkloadError::EmptyMatrix);
        }

        let mut cells = Vec::with_capacity(dimension * dimension);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != dimension {
                return Err(WorkloadError::NotSquare {
                    row,
                    len: values.len(),
                    expected: dimension,
                });
            }
            cells.extend(values);
        }

        Ok(Matrix { dimension, cells })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the cell at row `i`, column `j`.
    ///
    /// Panics when either index is out of bounds, like slice indexing.
    pub fn get(&self, i: usize, j: usize) -> i64 {
        assert!(
            i < self.dimension && j < self.dimension,
            "index ({i}, {j}) out of bounds for a {n}x{n} matrix",
            n = self.dimension
        );
        self.cells[i * self.dimension + j]
    }

    pub fn row(&self, i: usize) -> &[i64] {
        let start = i * self.dimension;
        &self.cells[start..start + self.dimension]
    }

    /// Sum of all cells, reported alongside each completed multiplication.
    pub fn checksum(&self) -> Result<i64, WorkloadError> {
        self.cells
            .iter()
            .try_fold(0i64, |acc, &v| acc.checked_add(v))
            .ok_or(WorkloadError::ChecksumOverflow)
    }
}

/// Multiplies two square matrices of the same dimension with the plain triple loop.
///
/// `C[i][j] = Σₖ A[i][k]·B[k][j]`. The cost is O(n³) on purpose: it is what makes rounds
/// take longer as the dimension grows. A cell that does not fit in an `i64` is an error, never a
/// wrapped value.
pub fn multiply(left: &Matrix, right: &Matrix) -> Result<Matrix, WorkloadError> {
    if left.dimension != right.dimension {
        return Err(WorkloadError::DimensionMismatch {
            left: left.dimension,
            right: right.dimension,
        });
    }

    let n = left.dimension;
    let mut product = Matrix::filled(n, 0)?;

    for i in 0..n {
        let left_row = left.row(i);
        for j in 0..n {
            let mut sum: i64 = 0;
            for (k, a) in left_row.iter().enumerate() {
                sum = a
                    .checked_mul(right.cells[k * n + j])
                    .and_then(|term| sum.checked_add(term))
                    .ok_or(WorkloadError::Overflow { row: i, col: j })?;
            }
            product.cells[i * n + j] = sum;
        }
    }

    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_ones_by_ones() {
        let a = Matrix::from_rows(vec![vec![1, 1], vec![1, 1]]).unwrap();
        let b = Matrix::from_rows(vec![vec![1, 1], vec![1, 1]]).unwrap();

        let c = multiply(&a, &b).unwrap();

        assert_eq!(c, Matrix::from_rows(vec![vec![2, 2], vec![2, 2]]).unwrap());
    }

    #[test]
    fn test_multiply_matches_definition() {
        let a = Matrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]).unwrap();
        let b = Matrix::from_rows(vec![vec![9, 8, 7], vec![6, 5, 4], vec![3, 2, -1]]).unwrap();

        let c = multiply(&a, &b).unwrap();

        for i in 0..3 {
            for j in 0..3 {
                let expected: i64 = (0..3).map(|k| a.get(i, k) * b.get(k, j)).sum();
                assert_eq!(c.get(i, j), expected, "cell ({i}, {j})");
            }
        }
        assert_eq!(c.row(0), &[30, 24, 12]);
    }

    #[test]
    fn test_ones_times_twos_is_two_n_everywhere() {
        for n in [1, 2, 10, 17] {
            let a = Matrix::filled(n, 1).unwrap();
            let b = Matrix::filled(n, 2).unwrap();

            let c = multiply(&a, &b).unwrap();

            assert_eq!(c.dimension(), n);
            for i in 0..n {
                assert!(c.row(i).iter().all(|&v| v == 2 * n as i64));
            }
            assert_eq!(c.checksum(), Ok((n * n * 2 * n) as i64));
        }
    }

    #[test]
    fn test_multiply_rejects_mismatched_dimensions() {
        let a = Matrix::filled(10, 1).unwrap();
        let b = Matrix::filled(20, 2).unwrap();

        assert_eq!(
            multiply(&a, &b),
            Err(WorkloadError::DimensionMismatch {
                left: 10,
                right: 20
            })
        );
    }

    #[test]
    fn test_constructors_reject_bad_shapes() {
        assert_eq!(Matrix::filled(0, 1), Err(WorkloadError::EmptyMatrix));
        assert_eq!(Matrix::from_rows(vec![]), Err(WorkloadError::EmptyMatrix));
        assert_eq!(
            Matrix::from_rows(vec![vec![1, 2], vec![3]]),
            Err(WorkloadError::NotSquare {
                row: 1,
                len: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn test_multiply_reports_overflowing_cell() {
        let a = Matrix::filled(2, 4_000_000_000).unwrap();
        let b = Matrix::filled(2, 4_000_000_000).unwrap();

        assert_eq!(
            multiply(&a, &b),
            Err(WorkloadError::Overflow { row: 0, col: 0 })
        );
    }

    #[test]
    fn test_multiply_reports_overflowing_sum() {
        // each term fits, the sum of the two does not
        let a = Matrix::filled(2, i64::MAX / 2 + 1).unwrap();
        let b = Matrix::filled(2, 1).unwrap();

        assert_eq!(
            multiply(&a, &b),
            Err(WorkloadError::Overflow { row: 0, col: 0 })
        );
    }

    #[test]
    fn test_multiply_handles_large_values_that_fit() {
        let a = Matrix::filled(2, 1_000_000_000).unwrap();
        let b = Matrix::filled(2, -3_000_000_000).unwrap();

        let c = multiply(&a, &b).unwrap();

        assert_eq!(c.get(1, 1), -6_000_000_000_000_000_000);
        assert_eq!(c.checksum(), Err(WorkloadError::ChecksumOverflow));
    }

    #[test]
    fn test_filled_reports_overflowing_dimension() {
        assert_eq!(
            Matrix::filled(usize::MAX, 1),
            Err(WorkloadError::Allocation {
                dimension: usize::MAX
            })
        );
    }
}

// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

mod matrix;

pub use matrix::ProjectionMatrix;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rand_distr::{Distribution, StandardNormal};
use simd::Floating;
use thiserror::Error;

/// Draws per row before a degenerate row is reported as an error.
pub const MAX_ATTEMPTS: usize = 16;

pub trait Element: Floating {
    /// Default tolerance for checking orthonormality of a generated matrix.
    const TOLERANCE: Self;
    /// A row whose norm shrinks below this fraction of its drawn norm during
    /// orthogonalization is drawn again.
    const DEGENERACY_RATIO: Self;

    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl Element for f32 {
    const TOLERANCE: Self = 2e-5;
    const DEGENERACY_RATIO: Self = 1e-3;

    #[inline]
    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        StandardNormal.sample(rng)
    }
}

impl Element for f64 {
    const TOLERANCE: Self = 1e-10;
    const DEGENERACY_RATIO: Self = 1e-6;

    #[inline]
    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        StandardNormal.sample(rng)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error(
        "invalid dimensions: source {src_dim}, destination {dst_dim} (expected 1 <= destination <= source)"
    )]
    InvalidDimensions { src_dim: usize, dst_dim: usize },
    #[error("row {row} is still degenerate after {attempts} draws")]
    Degenerate { row: usize, attempts: usize },
}

/// Generates a `dst_dim × src_dim` random projection matrix.
///
/// Entries are drawn from the standard normal distribution, row by row. With
/// `orthonormal`, every row is orthogonalized against the previous rows with
/// modified Gram-Schmidt, run twice, and scaled to unit norm, so the rows form
/// an orthonormal basis of a `dst_dim`-dimensional subspace. A row that almost
/// lies in the span of the previous rows is drawn again, at most
/// [`MAX_ATTEMPTS`] times. Without `orthonormal`, the rows are returned as
/// drawn.
///
/// Dimensions are checked before any value is drawn from `rng`.
pub fn generate<T: Element, R: Rng + ?Sized>(
    rng: &mut R,
    src_dim: usize,
    dst_dim: usize,
    orthonormal: bool,
) -> Result<ProjectionMatrix<T>, ProjectionError> {
    if src_dim == 0 || dst_dim == 0 || dst_dim > src_dim {
        return Err(ProjectionError::InvalidDimensions { src_dim, dst_dim });
    }
    let mut data = Vec::with_capacity(dst_dim * src_dim);
    if !orthonormal {
        data.extend((0..dst_dim * src_dim).map(|_| T::sample(rng)));
        return Ok(ProjectionMatrix::new(src_dim, dst_dim, false, data));
    }
    let mut row = vec![T::ZERO; src_dim];
    for i in 0..dst_dim {
        let mut attempts = 0;
        loop {
            if attempts == MAX_ATTEMPTS {
                log::error!("Row {i} of a {dst_dim}x{src_dim} projection stayed degenerate.");
                return Err(ProjectionError::Degenerate { row: i, attempts });
            }
            attempts += 1;
            for x in row.iter_mut() {
                *x = T::sample(rng);
            }
            if orthonormalize(&data, &mut row) {
                break;
            }
            log::debug!(
                "Row {i} of a {dst_dim}x{src_dim} projection is degenerate, drawing again."
            );
        }
        data.extend_from_slice(&row);
    }
    Ok(ProjectionMatrix::new(src_dim, dst_dim, true, data))
}

/// Makes `row` orthogonal to every row of `basis` and scales it to unit norm.
///
/// Returns `false`, leaving `row` unnormalized, if too little of it is left
/// after orthogonalization.
fn orthonormalize<T: Element>(basis: &[T], row: &mut [T]) -> bool {
    let drawn = T::scalar_sqrt(T::reduce_sum_of_xy(row, row));
    // a single pass loses orthogonality when `row` is close to the span
    for _ in 0..2 {
        for prev in basis.chunks_exact(row.len()) {
            let coefficient = T::reduce_sum_of_xy(row, prev);
            T::vector_sub_scaled_inplace(row, prev, coefficient);
        }
    }
    let norm = T::scalar_sqrt(T::reduce_sum_of_xy(row, row));
    if norm > T::scalar_mul(T::DEGENERACY_RATIO, drawn) {
        T::vector_mul_scalar_inplace(row, T::scalar_div(T::ONE, norm));
        true
    } else {
        false
    }
}

pub fn seeded_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// A fixed random `n × n` orthogonal matrix.
///
/// The source is seeded with a constant, so the result only depends on `n`.
pub fn random_orthogonal_matrix<T: Element>(
    n: usize,
) -> Result<ProjectionMatrix<T>, ProjectionError> {
    let mut rng = ChaCha12Rng::from_seed([7; 32]);
    generate(&mut rng, n, n, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal<T: Element>(matrix: &ProjectionMatrix<T>, eps: T) {
        for i in 0..matrix.dst_dim() {
            let v = T::reduce_sum_of_xy(matrix.row(i), matrix.row(i));
            assert!(
                T::scalar_abs(T::scalar_sub(v, T::ONE)) <= eps,
                "row {i}: expected norm 1, got {v}"
            );
            for k in i + 1..matrix.dst_dim() {
                let v = T::reduce_sum_of_xy(matrix.row(i), matrix.row(k));
                assert!(
                    T::scalar_abs(v) <= eps,
                    "rows {i} and {k}: expected product 0, got {v}"
                );
            }
        }
    }

    #[test]
    fn invalid_dimensions() {
        let mut rng = seeded_rng(1);
        for (src_dim, dst_dim) in [(0, 0), (0, 1), (4, 0), (4, 5), (1, 2)] {
            let before = rng.clone();
            assert_eq!(
                generate::<f32, _>(&mut rng, src_dim, dst_dim, true),
                Err(ProjectionError::InvalidDimensions { src_dim, dst_dim })
            );
            assert_eq!(
                generate::<f64, _>(&mut rng, src_dim, dst_dim, false),
                Err(ProjectionError::InvalidDimensions { src_dim, dst_dim })
            );
            assert_eq!(rng, before, "entropy consumed for {src_dim}x{dst_dim}");
        }
    }

    #[test]
    fn single_unit_row() {
        let mut rng = seeded_rng(2);
        for _ in 0..64 {
            let matrix = generate::<f32, _>(&mut rng, 1, 1, true).unwrap();
            assert_eq!(matrix.as_slice().len(), 1);
            assert!((matrix.row(0)[0].abs() - 1.0).abs() <= f32::TOLERANCE);
            let matrix = generate::<f64, _>(&mut rng, 1, 1, true).unwrap();
            assert!((matrix.row(0)[0].abs() - 1.0).abs() <= f64::TOLERANCE);
        }
    }

    #[test]
    fn orthonormal_8x3() {
        let mut rng = seeded_rng(3);
        let first = generate::<f32, _>(&mut rng, 8, 3, true).unwrap();
        let second = generate::<f32, _>(&mut rng, 8, 3, true).unwrap();
        assert_eq!((first.src_dim(), first.dst_dim()), (8, 3));
        assert!(first.is_orthonormal());
        assert_ne!(first, second);
        assert_orthonormal(&first, f32::TOLERANCE);
        assert_orthonormal(&second, f32::TOLERANCE);
    }

    #[test]
    fn orthonormal_full_rank() {
        let mut rng = seeded_rng(4);
        for n in [2, 3, 16, 31, 64, 128] {
            assert_orthonormal(&generate::<f32, _>(&mut rng, n, n, true).unwrap(), 2e-5);
            assert_orthonormal(&generate::<f64, _>(&mut rng, n, n, true).unwrap(), 1e-10);
        }
    }

    #[test]
    fn raw_rows_are_returned_as_drawn() {
        let mut rng = seeded_rng(5);
        let matrix = generate::<f32, _>(&mut rng, 24, 6, false).unwrap();
        assert!(!matrix.is_orthonormal());
        assert_eq!(matrix.as_slice().len(), 24 * 6);
        assert!(matrix.as_slice().iter().all(|x| x.is_finite()));
        let mut replay = seeded_rng(5);
        let drawn = (0..24 * 6)
            .map(|_| f32::sample(&mut replay))
            .collect::<Vec<_>>();
        assert_eq!(matrix.as_slice(), drawn.as_slice());
    }

    #[test]
    fn same_seed_same_matrix() {
        let a = generate::<f64, _>(&mut seeded_rng(6), 40, 12, true).unwrap();
        let b = generate::<f64, _>(&mut seeded_rng(6), 40, 12, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            random_orthogonal_matrix::<f32>(3).unwrap(),
            random_orthogonal_matrix::<f32>(3).unwrap()
        );
        assert_eq!(
            random_orthogonal_matrix::<f32>(0),
            Err(ProjectionError::InvalidDimensions {
                src_dim: 0,
                dst_dim: 0
            })
        );
    }

    #[test]
    fn degenerate_row_is_drawn_again() {
        let mut basis = vec![0.0f64; 3];
        basis[0] = 1.0;
        let mut row = vec![1.0f64, 0.0, 0.0];
        assert!(!orthonormalize(&basis, &mut row));
        let mut row = vec![0.0f64; 3];
        assert!(!orthonormalize(&[], &mut row));
        let mut row = vec![f64::NAN, 1.0, 1.0];
        assert!(!orthonormalize(&[], &mut row));
        let mut row = vec![3.0f64, 4.0, 0.0];
        assert!(orthonormalize(&[], &mut row));
        for (x, y) in row.iter().zip([0.6, 0.8, 0.0]) {
            assert!((x - y).abs() < 1e-15, "{row:?}");
        }
    }

    struct Constant(u64);

    impl rand::RngCore for Constant {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }
        fn next_u64(&mut self) -> u64 {
            self.0
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for chunk in dst.chunks_mut(8) {
                chunk.copy_from_slice(&self.0.to_le_bytes()[..chunk.len()]);
            }
        }
    }

    #[test]
    fn degenerate_after_max_attempts() {
        // every draw repeats the first row
        let mut rng = Constant(0xc000_0000_0000_0001);
        assert_eq!(
            generate::<f64, _>(&mut rng, 4, 2, true),
            Err(ProjectionError::Degenerate {
                row: 1,
                attempts: MAX_ATTEMPTS
            })
        );
        assert!(matches!(
            generate::<f32, _>(&mut rng, 8, 3, true),
            Err(ProjectionError::Degenerate { row: 1, .. })
        ));
        let single = generate::<f32, _>(&mut rng, 4, 1, true).unwrap();
        for &x in single.as_slice() {
            assert!((x - 0.5).abs() < 1e-6, "{single:?}");
        }
        let raw = generate::<f64, _>(&mut rng, 3, 2, false).unwrap();
        assert!(raw.as_slice().windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn matches_qr_decomposition() {
        use nalgebra::DMatrix;
        for (src_dim, dst_dim) in [(16, 5), (33, 33), (100, 40)] {
            let raw = generate::<f64, _>(&mut seeded_rng(7), src_dim, dst_dim, false).unwrap();
            let ortho = generate::<f64, _>(&mut seeded_rng(7), src_dim, dst_dim, true).unwrap();
            let qr = DMatrix::from_row_slice(dst_dim, src_dim, raw.as_slice())
                .transpose()
                .qr();
            let (q, r) = (qr.q(), qr.r());
            for j in 0..dst_dim {
                let sign = r[(j, j)].signum();
                for k in 0..src_dim {
                    let expected = q[(k, j)] * sign;
                    let actual = ortho.row(j)[k];
                    assert!(
                        (expected - actual).abs() < 1e-9,
                        "{src_dim}x{dst_dim} row {j} column {k}: {expected} vs {actual}"
                    );
                }
            }
        }
    }

    #[test]
    fn concurrent_generation() {
        let parallelism = std::thread::available_parallelism()
            .map(|x| x.get())
            .unwrap_or(1)
            .min(8);
        std::thread::scope(|scope| {
            let mut threads = vec![];
            for remainder in 0..parallelism {
                threads.push(scope.spawn(move || {
                    let mut rng = seeded_rng(remainder as u64);
                    for n in (1..=96).filter(|x| x % parallelism == remainder) {
                        let matrix = generate::<f32, _>(&mut rng, n, n.div_ceil(2), true).unwrap();
                        assert_orthonormal(&matrix, f32::TOLERANCE);
                    }
                }));
            }
            for thread in threads {
                thread.join().unwrap();
            }
        });
    }
}

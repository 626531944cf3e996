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

use crate::options::SweepOptions;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use random_projection::{Element, ProjectionMatrix, generate, seeded_rng};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error(
        "expected norm 1, got {value} for row {row} (src_dim = {src_dim}, dst_dim = {dst_dim}, type: {precision})"
    )]
    Norm {
        row: usize,
        value: f64,
        src_dim: usize,
        dst_dim: usize,
        precision: &'static str,
    },
    #[error(
        "expected product 0, got {value} for rows {row} and {other} (src_dim = {src_dim}, dst_dim = {dst_dim}, type: {precision})"
    )]
    Product {
        row: usize,
        other: usize,
        value: f64,
        src_dim: usize,
        dst_dim: usize,
        precision: &'static str,
    },
}

/// Checks `|<row_i, row_i> - 1| <= eps` and `|<row_i, row_k>| <= eps` for
/// every pair of rows, returning the first violation.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn check_orthonormal<T: Element>(matrix: &ProjectionMatrix<T>, eps: T) -> Result<(), Violation> {
    let (src_dim, dst_dim) = (matrix.src_dim(), matrix.dst_dim());
    for i in 0..dst_dim {
        let v = T::reduce_sum_of_xy(matrix.row(i), matrix.row(i));
        // written so that NaN fails
        if !(T::scalar_abs(T::scalar_sub(v, T::ONE)) <= eps) {
            return Err(Violation::Norm {
                row: i,
                value: T::scalar_to_f64(v),
                src_dim,
                dst_dim,
                precision: T::NAME,
            });
        }
        for k in i + 1..dst_dim {
            let v = T::reduce_sum_of_xy(matrix.row(i), matrix.row(k));
            if !(T::scalar_abs(v) <= eps) {
                return Err(Violation::Product {
                    row: i,
                    other: k,
                    value: T::scalar_to_f64(v),
                    src_dim,
                    dst_dim,
                    precision: T::NAME,
                });
            }
        }
    }
    Ok(())
}

/// Generates `repetitions` orthonormal matrices and checks each of them.
pub fn run_case<T: Element, R: Rng + ?Sized>(
    rng: &mut R,
    src_dim: usize,
    dst_dim: usize,
    repetitions: u32,
    eps: T,
) -> bool {
    for _ in 0..repetitions {
        let matrix = match generate::<T, R>(rng, src_dim, dst_dim, true) {
            Ok(matrix) => matrix,
            Err(e) => {
                log::error!("{e} (type: {})", T::NAME);
                return false;
            }
        };
        if let Err(violation) = check_orthonormal(&matrix, eps) {
            log::error!("{violation}");
            return false;
        }
    }
    true
}

pub fn dimension_pairs(options: &SweepOptions) -> Vec<(usize, usize)> {
    let step = |dim: u32| {
        if dim < options.fine_limit {
            1
        } else {
            options.coarse_step
        }
    };
    let mut pairs = Vec::new();
    let mut src_dim = options.min_dim;
    while src_dim <= options.max_dim {
        let mut dst_dim = 1;
        while dst_dim < src_dim {
            pairs.push((src_dim as usize, dst_dim as usize));
            dst_dim += step(src_dim);
        }
        if options.include_square {
            pairs.push((src_dim as usize, src_dim as usize));
        }
        src_dim += step(src_dim);
    }
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub tests: usize,
    pub failed: usize,
}

/// Runs every dimension pair in both precisions.
///
/// Failures are counted, not fatal. Worker `t` takes every `threads`-th pair
/// starting at `t` and draws from its own source, seeded with `seed + t`.
pub fn run(options: &SweepOptions) -> Report {
    let pairs = dimension_pairs(options);
    let threads = options.threads.max(1) as usize;
    log::info!(
        "Checking {} dimension pairs on {threads} threads.",
        pairs.len()
    );
    let failed = std::thread::scope(|scope| {
        let workers = (0..threads)
            .map(|t| {
                let pairs = &pairs;
                scope.spawn(move || {
                    let mut rng = match options.seed {
                        Some(seed) => seeded_rng(seed.wrapping_add(t as u64)),
                        None => ChaCha12Rng::from_rng(&mut rand::rng()),
                    };
                    let mut failed = 0_usize;
                    for &(src_dim, dst_dim) in pairs.iter().skip(t).step_by(threads) {
                        let (repetitions, f32_eps, f64_eps) =
                            (options.repetitions, options.f32_tolerance, options.f64_tolerance);
                        if !run_case::<f32, _>(&mut rng, src_dim, dst_dim, repetitions, f32_eps) {
                            failed += 1;
                        }
                        if !run_case::<f64, _>(&mut rng, src_dim, dst_dim, repetitions, f64_eps) {
                            failed += 1;
                        }
                    }
                    failed
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .sum::<usize>()
    });
    let report = Report {
        tests: 2 * pairs.len(),
        failed,
    };
    log::info!(
        "{} (sub) tests performed {} failed",
        report.tests,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pairs() {
        let pairs = dimension_pairs(&SweepOptions::default());
        assert_eq!(pairs.len(), 595);
        assert_eq!(pairs.first(), Some(&(2, 1)));
        assert_eq!(pairs.last(), Some(&(128, 121)));
        assert!(pairs.iter().all(|&(s, d)| 1 <= d && d < s && s <= 128));
        assert!(pairs.contains(&(31, 30)));
        assert!(pairs.contains(&(32, 25)));
        assert!(!pairs.contains(&(32, 26)));
        assert!(!pairs.iter().any(|&(s, _)| s == 33));
    }

    #[test]
    fn square_pairs() {
        let options = SweepOptions {
            max_dim: 4,
            include_square: true,
            ..Default::default()
        };
        assert_eq!(
            dimension_pairs(&options),
            vec![
                (1, 1),
                (2, 1),
                (2, 2),
                (3, 1),
                (3, 2),
                (3, 3),
                (4, 1),
                (4, 2),
                (4, 3),
                (4, 4)
            ]
        );
    }

    #[test]
    fn raw_matrix_is_rejected() {
        let mut rng = seeded_rng(21);
        let matrix = generate::<f32, _>(&mut rng, 16, 4, false).unwrap();
        match check_orthonormal(&matrix, 2e-5) {
            Err(Violation::Norm {
                row: 0,
                src_dim: 16,
                dst_dim: 4,
                precision: "f32",
                ..
            }) => (),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn violation_messages() {
        let violation = Violation::Product {
            row: 1,
            other: 2,
            value: 0.5,
            src_dim: 8,
            dst_dim: 3,
            precision: "f64",
        };
        assert_eq!(
            violation.to_string(),
            "expected product 0, got 0.5 for rows 1 and 2 (src_dim = 8, dst_dim = 3, type: f64)"
        );
    }

    #[test]
    fn repeated_8x3() {
        let mut rng = seeded_rng(22);
        assert!(run_case::<f32, _>(&mut rng, 8, 3, 2, 2e-5));
        let a = generate::<f32, _>(&mut rng, 8, 3, true).unwrap();
        let b = generate::<f32, _>(&mut rng, 8, 3, true).unwrap();
        assert_ne!(a, b);
        assert_eq!(check_orthonormal(&a, 2e-5), Ok(()));
        assert_eq!(check_orthonormal(&b, 2e-5), Ok(()));
    }

    #[test]
    fn invalid_case_fails() {
        let mut rng = seeded_rng(23);
        assert!(!run_case::<f64, _>(&mut rng, 3, 4, 1, 1e-10));
    }

    #[test]
    fn full_sweep() {
        let options = SweepOptions {
            threads: 4,
            seed: Some(24),
            ..Default::default()
        };
        assert_eq!(run(&options), Report {
            tests: 1190,
            failed: 0
        });
    }

    #[test]
    fn stress_grid() {
        let options = SweepOptions {
            min_dim: 32,
            max_dim: 128,
            fine_limit: 32,
            include_square: true,
            threads: 2,
            ..Default::default()
        };
        let report = run(&options);
        assert_eq!(report.tests, 2 * dimension_pairs(&options).len());
        assert_eq!(report.failed, 0);
    }
}

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

use serde::ser::{Serialize, SerializeStruct, Serializer};
use simd::Floating;
use std::slice::ChunksExact;

/// `dst_dim` rows of `src_dim` elements, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMatrix<T> {
    src_dim: usize,
    dst_dim: usize,
    orthonormal: bool,
    data: Vec<T>,
}

impl<T: Floating> ProjectionMatrix<T> {
    pub(crate) fn new(src_dim: usize, dst_dim: usize, orthonormal: bool, data: Vec<T>) -> Self {
        assert!(src_dim != 0 && data.len() == src_dim * dst_dim);
        Self {
            src_dim,
            dst_dim,
            orthonormal,
            data,
        }
    }

    pub fn src_dim(&self) -> usize {
        self.src_dim
    }

    pub fn dst_dim(&self) -> usize {
        self.dst_dim
    }

    /// Whether the rows were orthonormalized when generated.
    pub fn is_orthonormal(&self) -> bool {
        self.orthonormal
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.src_dim..][..self.src_dim]
    }

    pub fn rows(&self) -> ChunksExact<'_, T> {
        self.data.chunks_exact(self.src_dim)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Projects `vector` onto the rows.
    ///
    /// A vector shorter than `src_dim` is treated as if padded with zeros.
    pub fn project(&self, vector: &[T]) -> Vec<T> {
        let mut result = vec![T::ZERO; self.dst_dim];
        self.project_into(vector, &mut result);
        result
    }

    pub fn project_into(&self, vector: &[T], result: &mut [T]) {
        assert!(
            vector.len() <= self.src_dim,
            "vector has {} dimensions, projection accepts at most {}",
            vector.len(),
            self.src_dim
        );
        assert!(result.len() == self.dst_dim);
        let n = vector.len();
        for (x, row) in result.iter_mut().zip(self.rows()) {
            *x = T::reduce_sum_of_xy(&row[..n], vector);
        }
    }
}

struct Rows<'a, T>(&'a ProjectionMatrix<T>);

impl<T: Floating + Serialize> Serialize for Rows<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows())
    }
}

impl<T: Floating + Serialize> Serialize for ProjectionMatrix<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ProjectionMatrix", 4)?;
        state.serialize_field("src_dim", &self.src_dim)?;
        state.serialize_field("dst_dim", &self.dst_dim)?;
        state.serialize_field("orthonormal", &self.orthonormal)?;
        state.serialize_field("rows", &Rows(self))?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use crate::{generate, seeded_rng};

    #[test]
    fn project_preserves_norm_of_full_rank() {
        let matrix = generate::<f64, _>(&mut seeded_rng(11), 20, 20, true).unwrap();
        let vector = (0..20).map(|i| i as f64 - 7.5).collect::<Vec<_>>();
        let projected = matrix.project(&vector);
        let before = vector.iter().map(|x| x * x).sum::<f64>();
        let after = projected.iter().map(|x| x * x).sum::<f64>();
        assert!((before - after).abs() < 1e-9 * before);
    }

    #[test]
    fn project_rows_onto_themselves() {
        let matrix = generate::<f32, _>(&mut seeded_rng(12), 32, 4, true).unwrap();
        for i in 0..4 {
            let projected = matrix.project(matrix.row(i));
            for (k, x) in projected.iter().enumerate() {
                let expected = if i == k { 1.0 } else { 0.0 };
                assert!((x - expected).abs() < 2e-5, "{i} {k}: {x}");
            }
        }
    }

    #[test]
    fn project_shorter_vector() {
        let matrix = generate::<f64, _>(&mut seeded_rng(13), 10, 3, true).unwrap();
        let short = [1.0, -2.0, 0.5];
        let mut padded = vec![0.0; 10];
        padded[..3].copy_from_slice(&short);
        let projected = matrix.project(&short);
        assert_eq!(projected.len(), 3);
        for (x, y) in projected.iter().zip(matrix.project(&padded)) {
            assert!((x - y).abs() < 1e-12, "{x} vs {y}");
        }
    }

    #[test]
    #[should_panic]
    fn project_longer_vector() {
        let matrix = generate::<f32, _>(&mut seeded_rng(14), 4, 2, false).unwrap();
        matrix.project(&[0.0; 5]);
    }

    #[test]
    fn rows_and_row_agree() {
        let matrix = generate::<f32, _>(&mut seeded_rng(15), 9, 5, false).unwrap();
        assert_eq!(matrix.rows().len(), 5);
        for (i, row) in matrix.rows().enumerate() {
            assert_eq!(row, matrix.row(i));
            assert_eq!(row, &matrix.as_slice()[i * 9..(i + 1) * 9]);
        }
    }
}

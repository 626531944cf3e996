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

use crate::Floating;

impl Floating for f32 {
    const ZERO: Self = 0.0f32;
    const ONE: Self = 1.0f32;
    const NAME: &'static str = "f32";

    #[inline(always)]
    fn scalar_add(lhs: Self, rhs: Self) -> Self {
        lhs + rhs
    }

    #[inline(always)]
    fn scalar_sub(lhs: Self, rhs: Self) -> Self {
        lhs - rhs
    }

    #[inline(always)]
    fn scalar_mul(lhs: Self, rhs: Self) -> Self {
        lhs * rhs
    }

    #[inline(always)]
    fn scalar_div(lhs: Self, rhs: Self) -> Self {
        lhs / rhs
    }

    #[inline(always)]
    fn scalar_abs(this: Self) -> Self {
        this.abs()
    }

    #[inline(always)]
    fn scalar_sqrt(this: Self) -> Self {
        this.sqrt()
    }

    #[inline(always)]
    fn scalar_to_f64(this: Self) -> f64 {
        this as f64
    }

    #[inline(always)]
    fn reduce_sum_of_xy(lhs: &[f32], rhs: &[f32]) -> f32 {
        reduce_sum_of_xy::reduce_sum_of_xy(lhs, rhs)
    }

    #[inline(always)]
    fn vector_mul_scalar_inplace(lhs: &mut [f32], rhs: f32) {
        vector_mul_scalar_inplace::vector_mul_scalar_inplace(lhs, rhs);
    }

    #[inline(always)]
    fn vector_sub_scaled_inplace(lhs: &mut [f32], rhs: &[f32], scale: f32) {
        vector_sub_scaled_inplace::vector_sub_scaled_inplace(lhs, rhs, scale);
    }
}

mod reduce_sum_of_xy {
    #[inline]
    #[cfg(target_arch = "x86_64")]
    #[crate::target_cpu(enable = "v4")]
    fn reduce_sum_of_xy_v4(lhs: &[f32], rhs: &[f32]) -> f32 {
        assert!(lhs.len() == rhs.len());
        use core::arch::x86_64::*;
        let mut n = lhs.len();
        let mut a = lhs.as_ptr();
        let mut b = rhs.as_ptr();
        let mut sum = _mm512_setzero_ps();
        while n >= 16 {
            let x = unsafe { _mm512_loadu_ps(a) };
            let y = unsafe { _mm512_loadu_ps(b) };
            sum = _mm512_fmadd_ps(x, y, sum);
            (n, a, b) = unsafe { (n - 16, a.add(16), b.add(16)) };
        }
        if n > 0 {
            let mask = _bzhi_u32(0xffff, n as u32) as u16;
            let x = unsafe { _mm512_maskz_loadu_ps(mask, a) };
            let y = unsafe { _mm512_maskz_loadu_ps(mask, b) };
            sum = _mm512_fmadd_ps(x, y, sum);
        }
        _mm512_reduce_add_ps(sum)
    }

    #[cfg(all(target_arch = "x86_64", test))]
    #[test]
    fn reduce_sum_of_xy_v4_test() {
        use rand::Rng;
        const EPSILON: f32 = 0.004;
        if !crate::is_cpu_detected!("v4") {
            println!("test {} ... skipped (v4)", module_path!());
            return;
        }
        let mut rng = rand::rng();
        for _ in 0..if cfg!(not(miri)) { 256 } else { 1 } {
            let n = 4016;
            let lhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            let rhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            for z in 3984..4016 {
                let lhs = &lhs[..z];
                let rhs = &rhs[..z];
                let specialized = unsafe { reduce_sum_of_xy_v4(lhs, rhs) };
                let fallback = fallback(lhs, rhs);
                assert!(
                    (specialized - fallback).abs() < EPSILON,
                    "specialized = {specialized}, fallback = {fallback}."
                );
            }
        }
    }

    #[inline]
    #[cfg(target_arch = "x86_64")]
    #[crate::target_cpu(enable = "v3")]
    fn reduce_sum_of_xy_v3(lhs: &[f32], rhs: &[f32]) -> f32 {
        use crate::emulate::emulate_mm256_reduce_add_ps;
        assert!(lhs.len() == rhs.len());
        use core::arch::x86_64::*;
        let mut n = lhs.len();
        let mut a = lhs.as_ptr();
        let mut b = rhs.as_ptr();
        let mut sum = _mm256_setzero_ps();
        while n >= 8 {
            let x = unsafe { _mm256_loadu_ps(a) };
            let y = unsafe { _mm256_loadu_ps(b) };
            sum = _mm256_fmadd_ps(x, y, sum);
            (n, a, b) = unsafe { (n - 8, a.add(8), b.add(8)) };
        }
        let mut sum = emulate_mm256_reduce_add_ps(sum);
        while n > 0 {
            let (x, y) = unsafe { (a.read(), b.read()) };
            sum += x * y;
            (n, a, b) = unsafe { (n - 1, a.add(1), b.add(1)) };
        }
        sum
    }

    #[cfg(all(target_arch = "x86_64", test))]
    #[test]
    fn reduce_sum_of_xy_v3_test() {
        use rand::Rng;
        const EPSILON: f32 = 0.004;
        if !crate::is_cpu_detected!("v3") {
            println!("test {} ... skipped (v3)", module_path!());
            return;
        }
        let mut rng = rand::rng();
        for _ in 0..if cfg!(not(miri)) { 256 } else { 1 } {
            let n = 4016;
            let lhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            let rhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            for z in 3984..4016 {
                let lhs = &lhs[..z];
                let rhs = &rhs[..z];
                let specialized = unsafe { reduce_sum_of_xy_v3(lhs, rhs) };
                let fallback = fallback(lhs, rhs);
                assert!(
                    (specialized - fallback).abs() < EPSILON,
                    "specialized = {specialized}, fallback = {fallback}."
                );
            }
        }
    }

    #[inline]
    #[cfg(target_arch = "x86_64")]
    #[crate::target_cpu(enable = "v2")]
    #[target_feature(enable = "fma")]
    fn reduce_sum_of_xy_v2_fma(lhs: &[f32], rhs: &[f32]) -> f32 {
        use crate::emulate::emulate_mm_reduce_add_ps;
        assert!(lhs.len() == rhs.len());
        use core::arch::x86_64::*;
        let mut n = lhs.len();
        let mut a = lhs.as_ptr();
        let mut b = rhs.as_ptr();
        let mut sum = _mm_setzero_ps();
        while n >= 4 {
            let x = unsafe { _mm_loadu_ps(a) };
            let y = unsafe { _mm_loadu_ps(b) };
            sum = _mm_fmadd_ps(x, y, sum);
            (n, a, b) = unsafe { (n - 4, a.add(4), b.add(4)) };
        }
        let mut sum = emulate_mm_reduce_add_ps(sum);
        while n > 0 {
            let (x, y) = unsafe { (a.read(), b.read()) };
            sum += x * y;
            (n, a, b) = unsafe { (n - 1, a.add(1), b.add(1)) };
        }
        sum
    }

    #[cfg(all(target_arch = "x86_64", test))]
    #[test]
    fn reduce_sum_of_xy_v2_fma_test() {
        use rand::Rng;
        const EPSILON: f32 = 0.004;
        if !crate::is_cpu_detected!("v2") || !crate::is_feature_detected!("fma") {
            println!("test {} ... skipped (v2:fma)", module_path!());
            return;
        }
        let mut rng = rand::rng();
        for _ in 0..if cfg!(not(miri)) { 256 } else { 1 } {
            let n = 4016;
            let lhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            let rhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            for z in 3984..4016 {
                let lhs = &lhs[..z];
                let rhs = &rhs[..z];
                let specialized = unsafe { reduce_sum_of_xy_v2_fma(lhs, rhs) };
                let fallback = fallback(lhs, rhs);
                assert!(
                    (specialized - fallback).abs() < EPSILON,
                    "specialized = {specialized}, fallback = {fallback}."
                );
            }
        }
    }

    #[inline]
    #[cfg(target_arch = "aarch64")]
    #[crate::target_cpu(enable = "a2")]
    fn reduce_sum_of_xy_a2(lhs: &[f32], rhs: &[f32]) -> f32 {
        assert!(lhs.len() == rhs.len());
        use core::arch::aarch64::*;
        let mut n = lhs.len();
        let mut a = lhs.as_ptr();
        let mut b = rhs.as_ptr();
        let mut sum = vdupq_n_f32(0.0);
        while n >= 4 {
            let x = unsafe { vld1q_f32(a) };
            let y = unsafe { vld1q_f32(b) };
            sum = vfmaq_f32(sum, x, y);
            (n, a, b) = unsafe { (n - 4, a.add(4), b.add(4)) };
        }
        let mut sum = vaddvq_f32(sum);
        while n > 0 {
            let (x, y) = unsafe { (a.read(), b.read()) };
            sum += x * y;
            (n, a, b) = unsafe { (n - 1, a.add(1), b.add(1)) };
        }
        sum
    }

    #[cfg(all(target_arch = "aarch64", test))]
    #[test]
    #[cfg_attr(miri, ignore)]
    fn reduce_sum_of_xy_a2_test() {
        use rand::Rng;
        const EPSILON: f32 = 0.004;
        if !crate::is_cpu_detected!("a2") {
            println!("test {} ... skipped (a2)", module_path!());
            return;
        }
        let mut rng = rand::rng();
        for _ in 0..if cfg!(not(miri)) { 256 } else { 1 } {
            let n = 4016;
            let lhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            let rhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<_>>();
            for z in 3984..4016 {
                let lhs = &lhs[..z];
                let rhs = &rhs[..z];
                let specialized = unsafe { reduce_sum_of_xy_a2(lhs, rhs) };
                let fallback = fallback(lhs, rhs);
                assert!(
                    (specialized - fallback).abs() < EPSILON,
                    "specialized = {specialized}, fallback = {fallback}."
                );
            }
        }
    }

    #[crate::multiversion(@"v4", @"v3", @"v2:fma", @"a2")]
    pub fn reduce_sum_of_xy(lhs: &[f32], rhs: &[f32]) -> f32 {
        assert!(lhs.len() == rhs.len());
        let n = lhs.len();
        let mut sum = 0.0f32;
        for i in 0..n {
            sum += lhs[i] * rhs[i];
        }
        sum
    }

    #[test]
    fn reduce_sum_of_xy_small_test() {
        // every tail length of every kernel
        let lhs = (0..64).map(|i| (i % 7) as f32 - 3.0).collect::<Vec<_>>();
        let rhs = (0..64).map(|i| (i % 5) as f32 * 0.5).collect::<Vec<_>>();
        for z in 0..=64 {
            let expected = fallback(&lhs[..z], &rhs[..z]);
            assert_eq!(reduce_sum_of_xy(&lhs[..z], &rhs[..z]), expected, "n = {z}");
        }
    }

    #[test]
    fn reduce_sum_of_xy_commutative_test() {
        use rand::Rng;
        let mut rng = rand::rng();
        for n in [1, 3, 8, 17, 64, 127, 128, 1000] {
            let lhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<f32>>();
            let rhs = (0..n)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect::<Vec<f32>>();
            let ab = reduce_sum_of_xy(&lhs, &rhs);
            let ba = reduce_sum_of_xy(&rhs, &lhs);
            assert_eq!(ab.to_bits(), ba.to_bits(), "n = {n}");
        }
    }

    #[test]
    fn reduce_sum_of_xy_nan_test() {
        let lhs = [1.0f32, f32::NAN, 3.0, 4.0, 5.0];
        let rhs = [1.0f32; 5];
        assert!(reduce_sum_of_xy(&lhs, &rhs).is_nan());
        assert_eq!(reduce_sum_of_xy(&[], &[]), 0.0);
    }

    #[test]
    #[should_panic]
    fn reduce_sum_of_xy_length_mismatch_test() {
        reduce_sum_of_xy(&[1.0, 2.0], &[1.0]);
    }
}

mod vector_mul_scalar_inplace {
    #[crate::multiversion("v4", "v3", "v2", "a2")]
    pub fn vector_mul_scalar_inplace(lhs: &mut [f32], rhs: f32) {
        let n = lhs.len();
        for i in 0..n {
            lhs[i] *= rhs;
        }
    }

    #[test]
    fn vector_mul_scalar_inplace_test() {
        let mut this = (0..23).map(|i| i as f32 - 11.0).collect::<Vec<_>>();
        vector_mul_scalar_inplace(&mut this, 0.25);
        for i in 0..23 {
            assert_eq!(this[i], (i as f32 - 11.0) * 0.25);
        }
        let mut empty: [f32; 0] = [];
        vector_mul_scalar_inplace(&mut empty, 2.0);
    }
}

mod vector_sub_scaled_inplace {
    #[crate::multiversion("v4", "v3", "v2", "a2")]
    pub fn vector_sub_scaled_inplace(lhs: &mut [f32], rhs: &[f32], scale: f32) {
        assert!(lhs.len() == rhs.len());
        let n = lhs.len();
        for i in 0..n {
            lhs[i] -= scale * rhs[i];
        }
    }

    #[test]
    fn vector_sub_scaled_inplace_test() {
        let mut lhs = (0..37).map(|i| i as f32).collect::<Vec<_>>();
        let rhs = (0..37).map(|i| (i % 3) as f32).collect::<Vec<_>>();
        vector_sub_scaled_inplace(&mut lhs, &rhs, 2.0);
        for i in 0..37 {
            assert_eq!(lhs[i], i as f32 - 2.0 * (i % 3) as f32);
        }
    }
}

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

// Horizontal sums of SSE and AVX accumulators. The upper half is folded onto
// the lower half until one lane is left.

#[inline]
#[cfg(target_arch = "x86_64")]
#[crate::target_cpu(enable = "v2")]
pub fn emulate_mm_reduce_add_ps(x: core::arch::x86_64::__m128) -> f32 {
    use core::arch::x86_64::*;
    let x = _mm_add_ps(x, _mm_movehl_ps(x, x));
    let x = _mm_add_ss(x, _mm_shuffle_ps::<0b01>(x, x));
    _mm_cvtss_f32(x)
}

#[inline]
#[cfg(target_arch = "x86_64")]
#[crate::target_cpu(enable = "v3")]
pub fn emulate_mm256_reduce_add_ps(x: core::arch::x86_64::__m256) -> f32 {
    use core::arch::x86_64::*;
    let x = _mm_add_ps(_mm256_castps256_ps128(x), _mm256_extractf128_ps::<1>(x));
    let x = _mm_add_ps(x, _mm_movehl_ps(x, x));
    let x = _mm_add_ss(x, _mm_shuffle_ps::<0b01>(x, x));
    _mm_cvtss_f32(x)
}

#[inline]
#[cfg(target_arch = "x86_64")]
#[crate::target_cpu(enable = "v2")]
pub fn emulate_mm_reduce_add_pd(x: core::arch::x86_64::__m128d) -> f64 {
    use core::arch::x86_64::*;
    let x = _mm_add_sd(x, _mm_unpackhi_pd(x, x));
    _mm_cvtsd_f64(x)
}

#[inline]
#[cfg(target_arch = "x86_64")]
#[crate::target_cpu(enable = "v3")]
pub fn emulate_mm256_reduce_add_pd(x: core::arch::x86_64::__m256d) -> f64 {
    use core::arch::x86_64::*;
    let x = _mm_add_pd(_mm256_castpd256_pd128(x), _mm256_extractf128_pd::<1>(x));
    let x = _mm_add_sd(x, _mm_unpackhi_pd(x, x));
    _mm_cvtsd_f64(x)
}

#[cfg(all(target_arch = "x86_64", test))]
#[test]
fn emulate_reduce_add_test() {
    use core::arch::x86_64::*;
    if !crate::is_cpu_detected!("v3") {
        println!("test {} ... skipped (v3)", module_path!());
        return;
    }
    let xs = [1.0f32, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0];
    let ys = [1.0f64, 2.0, 4.0, 8.0];
    unsafe {
        assert_eq!(emulate_mm_reduce_add_ps(_mm_loadu_ps(xs.as_ptr())), 15.0);
        assert_eq!(emulate_mm256_reduce_add_ps(_mm256_loadu_ps(xs.as_ptr())), 255.0);
        assert_eq!(emulate_mm_reduce_add_pd(_mm_loadu_pd(ys.as_ptr())), 3.0);
        assert_eq!(emulate_mm256_reduce_add_pd(_mm256_loadu_pd(ys.as_ptr())), 15.0);
    }
}

//! Exact-match scan over unordered leaf keys.
//!
//! Leaf slots are not sorted, so a lookup compares every key against the target. The scan
//! loads a vector of keys, compares all lanes with the broadcast target at once, turns the
//! lane results into a bitmask and bit-scans the lowest match. Keys which don't fill a whole
//! vector are compared one by one.
//!
//! On `x86_64` 32- and 64-bit integer keys use `std::arch` intrinsics, picked at runtime:
//!
//! | key width | AVX2    | fallback        |
//! |-----------|---------|-----------------|
//! | 32 bit    | 8 lanes | SSE2, 4 lanes   |
//! | 64 bit    | 4 lanes | SSE4.1, 2 lanes |
//!
//! All other keys (and other architectures) go through [`find_exact_portable`], which runs the
//! same mask/bit-scan loop over `LANES`-sized chunks and is left to the autovectorizer.

use std::fmt::Debug;

/// Width of the vector register the portable scan is sized for.
const VECTOR_BYTES: usize = 32;

/// Fixed-width key which can be compared lane-wise.
pub trait LaneKey: Copy + Ord + Debug + Send + Sync + 'static {
    /// Keys compared per vector step.
    const LANES: usize;

    /// Index of the first key equal to `target`.
    fn find_exact(keys: &[Self], target: Self) -> Option<usize>;
}

/// Lane-parameterized exact-match scan which doesn't depend on target features.
#[inline]
pub fn find_exact_portable<T, const LANES: usize>(keys: &[T], target: T) -> Option<usize>
where
    T: Copy + PartialEq,
{
    debug_assert!(LANES > 0 && LANES <= 64, "Lane mask must fit into u64");
    let chunks = keys.chunks_exact(LANES);
    let tail = chunks.remainder();
    for (chunk_idx, chunk) in chunks.enumerate() {
        let mut mask: u64 = 0;
        for (lane, key) in chunk.iter().enumerate() {
            mask |= ((*key == target) as u64) << lane;
        }
        if mask != 0 {
            return Some(chunk_idx * LANES + mask.trailing_zeros() as usize);
        }
    }

    let base = keys.len() - tail.len();
    tail.iter().position(|key| *key == target).map(|i| base + i)
}

#[inline]
fn find_exact_u32(keys: &[u32], target: u32) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability checked above
            return unsafe { x86::find_exact_u32_avx2(keys, target) };
        }
        // SAFETY: SSE2 is part of x86_64 baseline
        return unsafe { x86::find_exact_u32_sse2(keys, target) };
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        find_exact_portable::<u32, { VECTOR_BYTES / 4 }>(keys, target)
    }
}

#[inline]
fn find_exact_u64(keys: &[u64], target: u64) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability checked above
            return unsafe { x86::find_exact_u64_avx2(keys, target) };
        }
        if is_x86_feature_detected!("sse4.1") {
            // SAFETY: SSE4.1 availability checked above
            return unsafe { x86::find_exact_u64_sse41(keys, target) };
        }
        return find_exact_portable::<u64, { VECTOR_BYTES / 8 }>(keys, target);
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        find_exact_portable::<u64, { VECTOR_BYTES / 8 }>(keys, target)
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::{
        __m128i, __m256i, _mm256_cmpeq_epi32, _mm256_cmpeq_epi64, _mm256_loadu_si256,
        _mm256_movemask_epi8, _mm256_set1_epi32, _mm256_set1_epi64x, _mm_cmpeq_epi32,
        _mm_cmpeq_epi64, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi32, _mm_set1_epi64x,
    };

    #[inline]
    fn tail_position<T: PartialEq>(keys: &[T], from: usize, target: T) -> Option<usize> {
        keys[from..]
            .iter()
            .position(|key| *key == target)
            .map(|i| from + i)
    }

    /// # Safety
    /// CPU must support AVX2.
    #[target_feature(enable = "avx2")]
    pub unsafe fn find_exact_u32_avx2(keys: &[u32], target: u32) -> Option<usize> {
        const LANES: usize = 8;
        let broadcast = _mm256_set1_epi32(target as i32);
        let rounded = keys.len() / LANES * LANES;
        let mut i = 0;
        while i < rounded {
            let vec = _mm256_loadu_si256(keys.as_ptr().add(i) as *const __m256i);
            // 4 mask bits per 32-bit lane
            let mask = _mm256_movemask_epi8(_mm256_cmpeq_epi32(vec, broadcast)) as u32;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize / 4);
            }
            i += LANES;
        }
        tail_position(keys, rounded, target)
    }

    /// # Safety
    /// Only intrinsics from x86_64 baseline(SSE2) are used.
    #[inline]
    pub unsafe fn find_exact_u32_sse2(keys: &[u32], target: u32) -> Option<usize> {
        const LANES: usize = 4;
        let broadcast = _mm_set1_epi32(target as i32);
        let rounded = keys.len() / LANES * LANES;
        let mut i = 0;
        while i < rounded {
            let vec = _mm_loadu_si128(keys.as_ptr().add(i) as *const __m128i);
            let mask = _mm_movemask_epi8(_mm_cmpeq_epi32(vec, broadcast)) as u32;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize / 4);
            }
            i += LANES;
        }
        tail_position(keys, rounded, target)
    }

    /// # Safety
    /// CPU must support AVX2.
    #[target_feature(enable = "avx2")]
    pub unsafe fn find_exact_u64_avx2(keys: &[u64], target: u64) -> Option<usize> {
        const LANES: usize = 4;
        let broadcast = _mm256_set1_epi64x(target as i64);
        let rounded = keys.len() / LANES * LANES;
        let mut i = 0;
        while i < rounded {
            let vec = _mm256_loadu_si256(keys.as_ptr().add(i) as *const __m256i);
            // 8 mask bits per 64-bit lane
            let mask = _mm256_movemask_epi8(_mm256_cmpeq_epi64(vec, broadcast)) as u32;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize / 8);
            }
            i += LANES;
        }
        tail_position(keys, rounded, target)
    }

    /// # Safety
    /// CPU must support SSE4.1.
    #[target_feature(enable = "sse4.1")]
    pub unsafe fn find_exact_u64_sse41(keys: &[u64], target: u64) -> Option<usize> {
        const LANES: usize = 2;
        let broadcast = _mm_set1_epi64x(target as i64);
        let rounded = keys.len() / LANES * LANES;
        let mut i = 0;
        while i < rounded {
            let vec = _mm_loadu_si128(keys.as_ptr().add(i) as *const __m128i);
            let mask = _mm_movemask_epi8(_mm_cmpeq_epi64(vec, broadcast)) as u32;
            if mask != 0 {
                return Some(i + mask.trailing_zeros() as usize / 8);
            }
            i += LANES;
        }
        tail_position(keys, rounded, target)
    }
}

impl LaneKey for u32 {
    const LANES: usize = VECTOR_BYTES / 4;

    #[inline]
    fn find_exact(keys: &[Self], target: Self) -> Option<usize> {
        find_exact_u32(keys, target)
    }
}

impl LaneKey for i32 {
    const LANES: usize = VECTOR_BYTES / 4;

    #[inline]
    fn find_exact(keys: &[Self], target: Self) -> Option<usize> {
        // SAFETY: i32 and u32 have identical size and alignment, equality is bitwise
        let keys = unsafe { std::slice::from_raw_parts(keys.as_ptr() as *const u32, keys.len()) };
        find_exact_u32(keys, target as u32)
    }
}

impl LaneKey for u64 {
    const LANES: usize = VECTOR_BYTES / 8;

    #[inline]
    fn find_exact(keys: &[Self], target: Self) -> Option<usize> {
        find_exact_u64(keys, target)
    }
}

impl LaneKey for i64 {
    const LANES: usize = VECTOR_BYTES / 8;

    #[inline]
    fn find_exact(keys: &[Self], target: Self) -> Option<usize> {
        // SAFETY: i64 and u64 have identical size and alignment, equality is bitwise
        let keys = unsafe { std::slice::from_raw_parts(keys.as_ptr() as *const u64, keys.len()) };
        find_exact_u64(keys, target as u64)
    }
}

macro_rules! portable_lane_key {
    ($($ty:ty),*) => {
        $(
            impl LaneKey for $ty {
                const LANES: usize = VECTOR_BYTES / std::mem::size_of::<$ty>();

                #[inline]
                fn find_exact(keys: &[Self], target: Self) -> Option<usize> {
                    find_exact_portable::<$ty, { VECTOR_BYTES / std::mem::size_of::<$ty>() }>(
                        keys, target,
                    )
                }
            }
        )*
    };
}

portable_lane_key!(u8, i8, u16, i16, u128, i128, usize, isize);

//! Separable two-dimensional DWT driver.
//!
//! Each decomposition level applies the 1D transform to every row, leaving
//! `[L | H]` in place, then to every column of that result, producing the
//! quadrant layout
//!
//! ```text
//! ┌─────┬─────┐
//! │  LL │  LH │
//! ├─────┼─────┤
//! │  HL │  HH │
//! └─────┴─────┘
//! ```
//!
//! with LL spanning `⌈h/2⌉ × ⌈w/2⌉`. Level ℓ+1 decomposes the LL output of
//! level ℓ. The row pass completes before the column pass, and a level is
//! fully materialized before the next begins; rows (and columns) within one
//! pass are independent, so callers may parallelize them as long as the
//! serial result is reproduced.

use crate::dwt::{Dwt53, Dwt97};
use crate::error::{CodecError, ParameterReason};
use crate::extension::BoundaryExtension;
use crate::numeric::low_len;

/// Subband identity within one decomposition level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubbandKind {
    /// Coarse approximation.
    Ll,
    /// Horizontal detail (top-right quadrant).
    Lh,
    /// Vertical detail (bottom-left quadrant).
    Hl,
    /// Diagonal detail.
    Hh,
}

impl SubbandKind {
    /// Detail bands of one level in coefficient-serialization order.
    pub const DETAIL: [SubbandKind; 3] = [SubbandKind::Lh, SubbandKind::Hl, SubbandKind::Hh];
}

/// One level of a 2D wavelet decomposition.
///
/// `width`/`height` are the dimensions of the buffer this level decomposed;
/// the detail bands follow the halving rule (`ll_width = ⌈width/2⌉`). Only
/// the deepest level of a pyramid retains its `ll` band; outer levels carry
/// `None` there because their approximation was consumed by the next level.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionLevel<T> {
    /// 1-based level index; 1 is the finest (first) decomposition.
    pub level: u8,
    pub width: usize,
    pub height: usize,
    pub ll_width: usize,
    pub ll_height: usize,
    pub ll: Option<Vec<T>>,
    pub lh: Vec<T>,
    pub hl: Vec<T>,
    pub hh: Vec<T>,
}

impl<T> DecompositionLevel<T> {
    /// (width, height) of a band at this level.
    pub fn band_dims(&self, kind: SubbandKind) -> (usize, usize) {
        let high_w = self.width - self.ll_width;
        let high_h = self.height - self.ll_height;
        match kind {
            SubbandKind::Ll => (self.ll_width, self.ll_height),
            SubbandKind::Lh => (high_w, self.ll_height),
            SubbandKind::Hl => (self.ll_width, high_h),
            SubbandKind::Hh => (high_w, high_h),
        }
    }

    fn dims_are_consistent(&self) -> bool {
        let expect = |k| {
            let (w, h) = self.band_dims(k);
            w * h
        };
        self.ll_width == low_len(self.width)
            && self.ll_height == low_len(self.height)
            && self.lh.len() == expect(SubbandKind::Lh)
            && self.hl.len() == expect(SubbandKind::Hl)
            && self.hh.len() == expect(SubbandKind::Hh)
            && self
                .ll
                .as_ref()
                .map_or(true, |ll| ll.len() == expect(SubbandKind::Ll))
    }
}

/// Per-level buffer dimensions for an `levels`-deep pyramid over a
/// `width × height` tile. Entry ℓ-1 holds the dimensions decomposed by
/// level ℓ. Fails when a level would decompose a dimension below 2.
pub fn level_sizes(
    width: usize,
    height: usize,
    levels: u8,
) -> Result<Vec<(usize, usize)>, CodecError> {
    if width == 0 || height == 0 {
        return Err(CodecError::parameter(ParameterReason::ZeroDimension));
    }
    let mut sizes = Vec::with_capacity(levels as usize);
    let (mut w, mut h) = (width, height);
    for _ in 0..levels {
        if w < 2 || h < 2 {
            return Err(CodecError::parameter(
                ParameterReason::TooManyDecompositionLevels(levels),
            ));
        }
        sizes.push((w, h));
        w = low_len(w);
        h = low_len(h);
    }
    Ok(sizes)
}

/// Row-then-column sweep of one forward level; output is the quadrant grid.
fn forward_sweep<T, F>(data: &[T], w: usize, h: usize, forward: &F) -> Result<Vec<T>, CodecError>
where
    T: Copy + Default,
    F: Fn(&[T]) -> Result<(Vec<T>, Vec<T>), CodecError>,
{
    let mut grid = vec![T::default(); w * h];
    for y in 0..h {
        let (low, high) = forward(&data[y * w..(y + 1) * w])?;
        grid[y * w..y * w + low.len()].copy_from_slice(&low);
        grid[y * w + low.len()..(y + 1) * w].copy_from_slice(&high);
    }
    let mut column = vec![T::default(); h];
    for x in 0..w {
        for y in 0..h {
            column[y] = grid[y * w + x];
        }
        let (low, high) = forward(&column)?;
        for (y, v) in low.iter().enumerate() {
            grid[y * w + x] = *v;
        }
        for (y, v) in high.iter().enumerate() {
            grid[(low.len() + y) * w + x] = *v;
        }
    }
    Ok(grid)
}

/// Column-then-row sweep of one inverse level over the quadrant grid.
fn inverse_sweep<T, F>(
    grid: &[T],
    w: usize,
    h: usize,
    ll_w: usize,
    ll_h: usize,
    inverse: &F,
) -> Result<Vec<T>, CodecError>
where
    T: Copy + Default,
    F: Fn(&[T], &[T]) -> Result<Vec<T>, CodecError>,
{
    let mut merged = vec![T::default(); w * h];
    let mut low = vec![T::default(); ll_h.max(ll_w)];
    let mut high = vec![T::default(); (h - ll_h).max(w - ll_w)];
    for x in 0..w {
        low.truncate(0);
        high.truncate(0);
        for y in 0..ll_h {
            low.push(grid[y * w + x]);
        }
        for y in ll_h..h {
            high.push(grid[y * w + x]);
        }
        let column = inverse(&low, &high)?;
        for (y, v) in column.iter().enumerate() {
            merged[y * w + x] = *v;
        }
    }
    let mut out = vec![T::default(); w * h];
    for y in 0..h {
        let row = &merged[y * w..(y + 1) * w];
        let restored = inverse(&row[..ll_w], &row[ll_w..])?;
        out[y * w..(y + 1) * w].copy_from_slice(&restored);
    }
    Ok(out)
}

fn extract_level<T: Copy + Default>(
    grid: &[T],
    w: usize,
    h: usize,
    level: u8,
) -> (DecompositionLevel<T>, Vec<T>) {
    let ll_w = low_len(w);
    let ll_h = low_len(h);
    let mut ll = Vec::with_capacity(ll_w * ll_h);
    let mut lh = Vec::with_capacity((w - ll_w) * ll_h);
    let mut hl = Vec::with_capacity(ll_w * (h - ll_h));
    let mut hh = Vec::with_capacity((w - ll_w) * (h - ll_h));
    for y in 0..h {
        for x in 0..w {
            let v = grid[y * w + x];
            match (y < ll_h, x < ll_w) {
                (true, true) => ll.push(v),
                (true, false) => lh.push(v),
                (false, true) => hl.push(v),
                (false, false) => hh.push(v),
            }
        }
    }
    let level = DecompositionLevel {
        level,
        width: w,
        height: h,
        ll_width: ll_w,
        ll_height: ll_h,
        ll: None,
        lh,
        hl,
        hh,
    };
    (level, ll)
}

fn merge_level<T: Copy + Default>(level: &DecompositionLevel<T>, ll: &[T]) -> Vec<T> {
    let (w, h) = (level.width, level.height);
    let (ll_w, ll_h) = (level.ll_width, level.ll_height);
    let mut grid = vec![T::default(); w * h];
    let high_w = w - ll_w;
    for y in 0..h {
        for x in 0..w {
            let v = match (y < ll_h, x < ll_w) {
                (true, true) => ll[y * ll_w + x],
                (true, false) => level.lh[y * high_w + (x - ll_w)],
                (false, true) => level.hl[(y - ll_h) * ll_w + x],
                (false, false) => level.hh[(y - ll_h) * high_w + (x - ll_w)],
            };
            grid[y * w + x] = v;
        }
    }
    grid
}

fn forward_pyramid<T, F>(
    data: &[T],
    width: usize,
    height: usize,
    levels: u8,
    forward: &F,
) -> Result<Vec<DecompositionLevel<T>>, CodecError>
where
    T: Copy + Default,
    F: Fn(&[T]) -> Result<(Vec<T>, Vec<T>), CodecError>,
{
    if data.len() != width * height {
        return Err(CodecError::parameter(ParameterReason::SampleCountMismatch));
    }
    let sizes = level_sizes(width, height, levels)?;
    let mut pyramid = Vec::with_capacity(levels as usize);
    let mut current = data.to_vec();
    for (index, &(w, h)) in sizes.iter().enumerate() {
        let grid = forward_sweep(&current, w, h, forward)?;
        let (level, ll) = extract_level(&grid, w, h, index as u8 + 1);
        log::debug!(
            "dwt level {}: {}x{} -> ll {}x{}",
            level.level,
            w,
            h,
            level.ll_width,
            level.ll_height
        );
        pyramid.push(level);
        current = ll;
    }
    if let Some(deepest) = pyramid.last_mut() {
        deepest.ll = Some(current);
    }
    Ok(pyramid)
}

fn inverse_pyramid<T, F>(
    pyramid: &[DecompositionLevel<T>],
    inverse: &F,
) -> Result<Vec<T>, CodecError>
where
    T: Copy + Default,
    F: Fn(&[T], &[T]) -> Result<Vec<T>, CodecError>,
{
    let deepest = pyramid
        .last()
        .ok_or(CodecError::parameter(ParameterReason::ZeroDimension))?;
    for level in pyramid {
        if !level.dims_are_consistent() {
            return Err(CodecError::parameter(
                ParameterReason::ComponentLengthMismatch,
            ));
        }
    }
    let mut current = deepest
        .ll
        .clone()
        .ok_or(CodecError::parameter(
            ParameterReason::ComponentLengthMismatch,
        ))?;
    for level in pyramid.iter().rev() {
        if current.len() != level.ll_width * level.ll_height {
            return Err(CodecError::parameter(
                ParameterReason::ComponentLengthMismatch,
            ));
        }
        let grid = merge_level(level, &current);
        current = inverse_sweep(
            &grid,
            level.width,
            level.height,
            level.ll_width,
            level.ll_height,
            inverse,
        )?;
    }
    Ok(current)
}

/// Separable 2D transform entry points.
pub struct Dwt2d;

impl Dwt2d {
    /// N-level reversible 5/3 decomposition. `levels == 0` yields an empty
    /// pyramid (the caller skips the transform stage).
    pub fn forward_53(
        data: &[i32],
        width: usize,
        height: usize,
        levels: u8,
        boundary: BoundaryExtension,
    ) -> Result<Vec<DecompositionLevel<i32>>, CodecError> {
        forward_pyramid(data, width, height, levels, &|row: &[i32]| {
            Dwt53::forward(row, boundary)
        })
    }

    /// Reconstruct from a 5/3 pyramid; bit-exact against [`Self::forward_53`].
    pub fn inverse_53(
        pyramid: &[DecompositionLevel<i32>],
        boundary: BoundaryExtension,
    ) -> Result<Vec<i32>, CodecError> {
        inverse_pyramid(pyramid, &|low: &[i32], high: &[i32]| {
            Dwt53::inverse(low, high, boundary)
        })
    }

    /// N-level irreversible 9/7 decomposition.
    pub fn forward_97(
        data: &[f64],
        width: usize,
        height: usize,
        levels: u8,
        boundary: BoundaryExtension,
    ) -> Result<Vec<DecompositionLevel<f64>>, CodecError> {
        forward_pyramid(data, width, height, levels, &|row: &[f64]| {
            Dwt97::forward(row, boundary)
        })
    }

    /// Reconstruct from a 9/7 pyramid within floating rounding.
    pub fn inverse_97(
        pyramid: &[DecompositionLevel<f64>],
        boundary: BoundaryExtension,
    ) -> Result<Vec<f64>, CodecError> {
        inverse_pyramid(pyramid, &|low: &[f64], high: &[f64]| {
            Dwt97::inverse(low, high, boundary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Vec<i32> {
        (0..w * h).map(|i| (i * 7 % 256) as i32 - 100).collect()
    }

    #[test]
    fn subband_dimensions_follow_the_halving_rule() {
        let data = ramp(8, 8);
        let pyramid = Dwt2d::forward_53(&data, 8, 8, 1, BoundaryExtension::Symmetric).unwrap();
        assert_eq!(pyramid.len(), 1);
        let level = &pyramid[0];
        assert_eq!((level.ll_width, level.ll_height), (4, 4));
        assert_eq!(level.band_dims(SubbandKind::Lh), (4, 4));
        assert_eq!(level.ll_width + level.band_dims(SubbandKind::Lh).0, 8);
        assert_eq!(level.ll.as_ref().unwrap().len(), 16);
    }

    #[test]
    fn odd_dimensions_split_consistently() {
        let data = ramp(5, 7);
        let pyramid = Dwt2d::forward_53(&data, 5, 7, 1, BoundaryExtension::Symmetric).unwrap();
        let level = &pyramid[0];
        assert_eq!((level.ll_width, level.ll_height), (3, 4));
        assert_eq!(level.band_dims(SubbandKind::Lh), (2, 4));
        assert_eq!(level.band_dims(SubbandKind::Hl), (3, 3));
        assert_eq!(level.band_dims(SubbandKind::Hh), (2, 3));
    }

    #[test]
    fn multi_level_53_roundtrip_is_exact() {
        for (w, h, levels) in [(8, 8, 3), (5, 7, 2), (16, 4, 2), (2, 2, 1)] {
            let data = ramp(w, h);
            let pyramid =
                Dwt2d::forward_53(&data, w, h, levels, BoundaryExtension::Symmetric).unwrap();
            assert_eq!(pyramid.len(), levels as usize);
            // Only the deepest level keeps its approximation.
            for level in &pyramid[..pyramid.len() - 1] {
                assert!(level.ll.is_none());
            }
            let back = Dwt2d::inverse_53(&pyramid, BoundaryExtension::Symmetric).unwrap();
            assert_eq!(back, data, "{w}x{h} levels {levels}");
        }
    }

    #[test]
    fn uniform_tile_has_empty_detail_bands() {
        let data = vec![128i32; 64];
        let pyramid = Dwt2d::forward_53(&data, 8, 8, 1, BoundaryExtension::Symmetric).unwrap();
        let level = &pyramid[0];
        assert!(level.lh.iter().all(|&v| v == 0));
        assert!(level.hl.iter().all(|&v| v == 0));
        assert!(level.hh.iter().all(|&v| v == 0));
        assert!(level.ll.as_ref().unwrap().iter().all(|&v| v == 128));
    }

    #[test]
    fn roundtrip_97_within_tolerance() {
        let data: Vec<f64> = (0..48).map(|i| ((i * 13) % 97) as f64 - 48.0).collect();
        let pyramid = Dwt2d::forward_97(&data, 8, 6, 2, BoundaryExtension::Symmetric).unwrap();
        let back = Dwt2d::inverse_97(&pyramid, BoundaryExtension::Symmetric).unwrap();
        let peak = data.iter().cloned().fold(1.0f64, f64::max);
        for (a, b) in data.iter().zip(back.iter()) {
            assert!((a - b).abs() / peak <= 1e-9);
        }
    }

    #[test]
    fn too_many_levels_is_rejected() {
        let data = ramp(8, 8);
        // 8 -> 4 -> 2 -> 1; a fourth level would decompose a 1-wide buffer.
        let err = Dwt2d::forward_53(&data, 8, 8, 4, BoundaryExtension::Symmetric).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidParameter {
                reason: ParameterReason::TooManyDecompositionLevels(4)
            }
        ));
        assert!(Dwt2d::forward_53(&data, 8, 8, 3, BoundaryExtension::Symmetric).is_ok());
    }

    #[test]
    fn zero_levels_yields_empty_pyramid() {
        let data = ramp(4, 4);
        let pyramid = Dwt2d::forward_53(&data, 4, 4, 0, BoundaryExtension::Symmetric).unwrap();
        assert!(pyramid.is_empty());
    }

    #[test]
    fn inverse_rejects_missing_approximation() {
        let data = ramp(8, 8);
        let mut pyramid =
            Dwt2d::forward_53(&data, 8, 8, 1, BoundaryExtension::Symmetric).unwrap();
        pyramid[0].ll = None;
        assert!(Dwt2d::inverse_53(&pyramid, BoundaryExtension::Symmetric).is_err());
    }

    #[test]
    fn level_sizes_walks_the_pyramid() {
        let sizes = level_sizes(8, 6, 2).unwrap();
        assert_eq!(sizes, vec![(8, 6), (4, 3)]);
        assert!(level_sizes(3, 3, 3).is_err());
    }
}

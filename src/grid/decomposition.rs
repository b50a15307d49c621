//! Horizontal domain decomposition
//!
//! The horizontal grid is split into rectangular patches, each owning a
//! block of columns plus a one-cell halo of ghost columns it may read.
//! Workers get a ghosted copy of the fields they read (`acquire_ghosted`),
//! compute values for owned points only and write them back with
//! `release_owned`. Patches are processed in parallel with rayon.

use super::array::{Array2, Array3};
use crate::error::ConfigError;

/// A rectangular block of owned columns with its ghost halo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub id: usize,
    /// First owned index and number of owned points in x
    pub xs: usize,
    pub xm: usize,
    pub ys: usize,
    pub ym: usize,
    /// Same for the ghosted range (clipped at the domain boundary)
    pub gxs: usize,
    pub gxm: usize,
    pub gys: usize,
    pub gym: usize,
}

impl Patch {
    #[inline]
    pub fn owns(&self, i: usize, j: usize) -> bool {
        i >= self.xs && i < self.xs + self.xm && j >= self.ys && j < self.ys + self.ym
    }

    #[inline]
    pub fn contains_ghosted(&self, i: usize, j: usize) -> bool {
        i >= self.gxs && i < self.gxs + self.gxm && j >= self.gys && j < self.gys + self.gym
    }

    /// Owned points in storage order
    pub fn owned_points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.ys..self.ys + self.ym).flat_map(move |j| (self.xs..self.xs + self.xm).map(move |i| (i, j)))
    }

    pub fn n_owned(&self) -> usize {
        self.xm * self.ym
    }
}

/// Split of an `mx` by `my` grid into patches
#[derive(Debug, Clone)]
pub struct Decomposition {
    mx: usize,
    my: usize,
    stencil_width: usize,
    patches: Vec<Patch>,
}

/// Split `n` points into `parts` nearly equal contiguous ranges
fn ownership_ranges(n: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = n / parts;
    let extra = n % parts;
    let mut start = 0;
    (0..parts)
        .map(|p| {
            let len = base + usize::from(p < extra);
            let range = (start, len);
            start += len;
            range
        })
        .collect()
}

impl Decomposition {
    /// Split the grid into `px` by `py` patches with a halo of `stencil_width`
    ///
    /// Only a stencil width of 1 is supported. Patch counts larger than the
    /// grid are reduced so that every patch owns at least one point.
    pub fn new(mx: usize, my: usize, px: usize, py: usize, stencil_width: usize) -> Result<Self, ConfigError> {
        if stencil_width != 1 {
            return Err(ConfigError::StencilWidth(stencil_width));
        }
        if mx == 0 || my == 0 {
            return Err(ConfigError::invalid("grid", format!("empty grid {}x{}", mx, my)));
        }
        if px == 0 || py == 0 {
            return Err(ConfigError::invalid("stress_balance.partitions", "must be non-zero"));
        }
        let px = px.min(mx);
        let py = py.min(my);

        let x_ranges = ownership_ranges(mx, px);
        let y_ranges = ownership_ranges(my, py);

        let mut patches = Vec::with_capacity(px * py);
        for &(ys, ym) in &y_ranges {
            for &(xs, xm) in &x_ranges {
                let gxs = xs.saturating_sub(stencil_width);
                let gxe = (xs + xm + stencil_width).min(mx);
                let gys = ys.saturating_sub(stencil_width);
                let gye = (ys + ym + stencil_width).min(my);
                patches.push(Patch {
                    id: patches.len(),
                    xs,
                    xm,
                    ys,
                    ym,
                    gxs,
                    gxm: gxe - gxs,
                    gys,
                    gym: gye - gys,
                });
            }
        }

        Ok(Self {
            mx,
            my,
            stencil_width,
            patches,
        })
    }

    /// Single patch covering the whole grid
    pub fn serial(mx: usize, my: usize) -> Result<Self, ConfigError> {
        Self::new(mx, my, 1, 1, 1)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn stencil_width(&self) -> usize {
        self.stencil_width
    }

    /// Same patch layout on a grid of a different size
    pub fn resized(&self, mx: usize, my: usize) -> Result<Self, ConfigError> {
        let px = self.patches.iter().filter(|p| p.ys == 0).count();
        let py = self.patches.len() / px.max(1);
        Self::new(mx, my, px, py, self.stencil_width)
    }
}

/// Ghosted copy of part of a 2D field
#[derive(Debug, Clone)]
pub struct LocalArray2<T> {
    gxs: usize,
    gxm: usize,
    gys: usize,
    gym: usize,
    data: Vec<T>,
}

impl<T> LocalArray2<T> {
    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(
            i >= self.gxs && i < self.gxs + self.gxm && j >= self.gys && j < self.gys + self.gym,
            "({}, {}) outside the ghosted range",
            i,
            j
        );
        (j - self.gys) * self.gxm + (i - self.gxs)
    }

    /// Value at global index `(i, j)`
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.offset(i, j)]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        let idx = self.offset(i, j);
        &mut self.data[idx]
    }
}

impl<T: Clone> LocalArray2<T> {
    /// Work array covering the ghosted range of `patch`
    pub fn filled(patch: &Patch, value: T) -> Self {
        Self {
            gxs: patch.gxs,
            gxm: patch.gxm,
            gys: patch.gys,
            gym: patch.gym,
            data: vec![value; patch.gxm * patch.gym],
        }
    }
}

/// Ghosted copy of part of a 3D field; global indices are used throughout
#[derive(Debug, Clone)]
pub struct LocalArray3<T> {
    gxs: usize,
    gxm: usize,
    gys: usize,
    gym: usize,
    mz: usize,
    data: Vec<T>,
}

impl<T> LocalArray3<T> {
    #[inline]
    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(
            i >= self.gxs && i < self.gxs + self.gxm && j >= self.gys && j < self.gys + self.gym && k < self.mz,
            "({}, {}, {}) outside the ghosted range",
            i,
            j,
            k
        );
        ((j - self.gys) * self.gxm + (i - self.gxs)) * self.mz + k
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.offset(i, j, k)]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        let idx = self.offset(i, j, k);
        &mut self.data[idx]
    }

    pub fn column(&self, i: usize, j: usize) -> &[T] {
        let start = self.offset(i, j, 0);
        &self.data[start..start + self.mz]
    }

    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut [T] {
        let start = self.offset(i, j, 0);
        &mut self.data[start..start + self.mz]
    }
}

impl<T: Clone> LocalArray3<T> {
    /// Work array covering the ghosted range of `patch`
    pub fn filled(patch: &Patch, mz: usize, value: T) -> Self {
        Self {
            gxs: patch.gxs,
            gxm: patch.gxm,
            gys: patch.gys,
            gym: patch.gym,
            mz,
            data: vec![value; patch.gxm * patch.gym * mz],
        }
    }
}

impl<T: Clone> Array2<T> {
    /// Copy the ghosted range of `patch` into a local array
    pub fn acquire_ghosted(&self, patch: &Patch) -> LocalArray2<T> {
        let mut data = Vec::with_capacity(patch.gxm * patch.gym);
        for j in patch.gys..patch.gys + patch.gym {
            for i in patch.gxs..patch.gxs + patch.gxm {
                data.push(self.get(i, j).clone());
            }
        }
        LocalArray2 {
            gxs: patch.gxs,
            gxm: patch.gxm,
            gys: patch.gys,
            gym: patch.gym,
            data,
        }
    }

    /// Write the owned values of `local` back into the global array
    pub fn release_owned(&mut self, patch: &Patch, local: &LocalArray2<T>) {
        for (i, j) in patch.owned_points() {
            *self.get_mut(i, j) = local.get(i, j).clone();
        }
    }
}

impl<T: Clone> Array3<T> {
    /// Copy the ghosted range of `patch` into a local array
    pub fn acquire_ghosted(&self, patch: &Patch) -> LocalArray3<T> {
        let mut data = Vec::with_capacity(patch.gxm * patch.gym * self.mz());
        for j in patch.gys..patch.gys + patch.gym {
            for i in patch.gxs..patch.gxs + patch.gxm {
                data.extend_from_slice(self.column(i, j));
            }
        }
        LocalArray3 {
            gxs: patch.gxs,
            gxm: patch.gxm,
            gys: patch.gys,
            gym: patch.gym,
            mz: self.mz(),
            data,
        }
    }

    /// Write the owned columns of `local` back into the global array
    ///
    /// Ghost values in `local` are discarded.
    pub fn release_owned(&mut self, patch: &Patch, local: &LocalArray3<T>) {
        debug_assert_eq!(local.mz, self.mz());
        for (i, j) in patch.owned_points() {
            self.column_mut(i, j).clone_from_slice(local.column(i, j));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patches_cover_grid_exactly_once() {
        let d = Decomposition::new(7, 5, 3, 2, 1).unwrap();
        assert_eq!(d.patches().len(), 6);
        for j in 0..5 {
            for i in 0..7 {
                let owners = d.patches().iter().filter(|p| p.owns(i, j)).count();
                assert_eq!(owners, 1, "point ({}, {})", i, j);
            }
        }
        let total: usize = d.patches().iter().map(|p| p.n_owned()).sum();
        assert_eq!(total, 35);
    }

    #[test]
    fn test_ghost_halo_is_clipped() {
        let d = Decomposition::new(6, 6, 2, 1, 1).unwrap();
        let left = &d.patches()[0];
        assert_eq!((left.xs, left.xm), (0, 3));
        assert_eq!((left.gxs, left.gxm), (0, 4));
        let right = &d.patches()[1];
        assert_eq!((right.gxs, right.gxm), (2, 4));
        assert!(right.contains_ghosted(2, 0));
        assert!(!right.owns(2, 0));
    }

    #[test]
    fn test_wide_stencil_rejected() {
        assert!(matches!(
            Decomposition::new(10, 10, 1, 1, 2),
            Err(ConfigError::StencilWidth(2))
        ));
    }

    #[test]
    fn test_too_many_patches_are_reduced() {
        let d = Decomposition::new(2, 3, 4, 1, 1).unwrap();
        assert_eq!(d.patches().len(), 2);
        assert!(d.patches().iter().all(|p| p.n_owned() > 0));
    }

    #[test]
    fn test_acquire_release_round_trip_touches_owned_only() {
        let d = Decomposition::new(4, 4, 2, 2, 1).unwrap();
        let source = Array3::from_fn(4, 4, 2, |i, j, k| (i + 10 * j + 100 * k) as f64);
        let mut target = Array3::filled(4, 4, 2, -1.0);

        let patch = &d.patches()[3];
        let mut local = source.acquire_ghosted(patch);
        assert_eq!(*local.get(1, 1, 1), source[(1, 1, 1)]);
        *local.get_mut(2, 2, 0) += 0.5;
        target.release_owned(patch, &local);

        assert_eq!(target[(2, 2, 0)], source[(2, 2, 0)] + 0.5);
        assert_eq!(target[(3, 3, 1)], source[(3, 3, 1)]);
        // ghost column (1, 1) was read but not written
        assert_eq!(target[(1, 1, 0)], -1.0);
    }
}

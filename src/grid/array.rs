//! Owned 2D and 3D arrays on a structured horizontal grid
//!
//! In 3D the vertical index is fastest, so every column `(i, j)` is a
//! contiguous slice.

/// 2D array indexed by `(i, j)`
#[derive(Debug, Clone, PartialEq)]
pub struct Array2<T> {
    mx: usize,
    my: usize,
    data: Vec<T>,
}

impl<T: Clone> Array2<T> {
    /// Create an array filled with `value`
    pub fn filled(mx: usize, my: usize, value: T) -> Self {
        Self {
            mx,
            my,
            data: vec![value; mx * my],
        }
    }

    /// Create an array by evaluating `f(i, j)` at every point
    pub fn from_fn<F: FnMut(usize, usize) -> T>(mx: usize, my: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(mx * my);
        for j in 0..my {
            for i in 0..mx {
                data.push(f(i, j));
            }
        }
        Self { mx, my, data }
    }

    /// Fill every entry with `value`
    pub fn set_all(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value.clone());
    }
}

impl<T> Array2<T> {
    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.mx && j < self.my, "({}, {}) outside {}x{}", i, j, self.mx, self.my);
        j * self.mx + i
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.index(i, j)]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        let idx = self.index(i, j);
        &mut self.data[idx]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T> std::ops::Index<(usize, usize)> for Array2<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        self.get(i, j)
    }
}

impl<T> std::ops::IndexMut<(usize, usize)> for Array2<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        self.get_mut(i, j)
    }
}

/// 3D array indexed by `(i, j, k)`; columns are contiguous
#[derive(Debug, Clone, PartialEq)]
pub struct Array3<T> {
    mx: usize,
    my: usize,
    mz: usize,
    data: Vec<T>,
}

impl<T: Clone> Array3<T> {
    /// Create an array filled with `value`
    pub fn filled(mx: usize, my: usize, mz: usize, value: T) -> Self {
        Self {
            mx,
            my,
            mz,
            data: vec![value; mx * my * mz],
        }
    }

    /// Create an array by evaluating `f(i, j, k)` at every point
    pub fn from_fn<F: FnMut(usize, usize, usize) -> T>(
        mx: usize,
        my: usize,
        mz: usize,
        mut f: F,
    ) -> Self {
        let mut data = Vec::with_capacity(mx * my * mz);
        for j in 0..my {
            for i in 0..mx {
                for k in 0..mz {
                    data.push(f(i, j, k));
                }
            }
        }
        Self { mx, my, mz, data }
    }

    /// Set every level of column `(i, j)` to `value`
    pub fn set_column(&mut self, i: usize, j: usize, value: T) {
        self.column_mut(i, j).iter_mut().for_each(|x| *x = value.clone());
    }

    /// Fill every entry with `value`
    pub fn set_all(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value.clone());
    }
}

impl<T> Array3<T> {
    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn mz(&self) -> usize {
        self.mz
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of node `(i, j, k)`
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(
            i < self.mx && j < self.my && k < self.mz,
            "({}, {}, {}) outside {}x{}x{}",
            i, j, k, self.mx, self.my, self.mz
        );
        (j * self.mx + i) * self.mz + k
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.index(i, j, k)]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        let idx = self.index(i, j, k);
        &mut self.data[idx]
    }

    /// Column `(i, j)` as a slice of length `mz`
    pub fn column(&self, i: usize, j: usize) -> &[T] {
        let start = self.index(i, j, 0);
        &self.data[start..start + self.mz]
    }

    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut [T] {
        let start = self.index(i, j, 0);
        let mz = self.mz;
        &mut self.data[start..start + mz]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T> std::ops::Index<(usize, usize, usize)> for Array3<T> {
    type Output = T;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &T {
        self.get(i, j, k)
    }
}

impl<T> std::ops::IndexMut<(usize, usize, usize)> for Array3<T> {
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut T {
        self.get_mut(i, j, k)
    }
}

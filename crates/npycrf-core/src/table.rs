//! Dense numeric tables backing the lattice dynamic programs.
//!
//! Each table is one flat `Vec<T>` addressed through row-major strides.
//! Tables only grow. Growing reallocates and zero-initialises, so callers
//! re-initialise the rows they are about to read before every sentence.

use std::ops::{Index, IndexMut};

/// An `N`-dimensional grid with O(1) random access.
///
/// Not `Clone`: the lattice owns its tables and hands out references only.
#[derive(Debug)]
pub struct DenseTable<T, const N: usize> {
    shape: [usize; N],
    strides: [usize; N],
    data: Vec<T>,
}

pub type Table2<T> = DenseTable<T, 2>;
pub type Table3<T> = DenseTable<T, 3>;
pub type Table4<T> = DenseTable<T, 4>;

impl<T: Copy + Default, const N: usize> DenseTable<T, N> {
    pub fn new(shape: [usize; N]) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            strides: strides_of(&shape),
            data: vec![T::default(); len],
        }
    }

    pub fn shape(&self) -> [usize; N] {
        self.shape
    }

    /// Grow every axis to at least `shape`. A no-op when capacity already suffices.
    pub fn grow(&mut self, shape: [usize; N]) {
        let mut target = self.shape;
        for (axis, extent) in target.iter_mut().enumerate() {
            *extent = (*extent).max(shape[axis]);
        }
        if target != self.shape {
            *self = Self::new(target);
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Fill rows `0..rows` of the leading axis only.
    pub fn fill_rows(&mut self, value: T, rows: usize) {
        assert!(
            rows <= self.shape[0],
            "fill_rows({rows}) beyond leading extent {}",
            self.shape[0]
        );
        let end = rows * self.strides[0];
        self.data[..end].fill(value);
    }

    #[inline]
    fn offset(&self, index: [usize; N]) -> usize {
        let mut offset = 0;
        for axis in 0..N {
            assert!(
                index[axis] < self.shape[axis],
                "index {index:?} out of bounds for shape {:?}",
                self.shape
            );
            offset += index[axis] * self.strides[axis];
        }
        offset
    }
}

fn strides_of<const N: usize>(shape: &[usize; N]) -> [usize; N] {
    let mut strides = [1usize; N];
    for axis in (0..N.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

impl<T: Copy + Default, const N: usize> Index<[usize; N]> for DenseTable<T, N> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; N]) -> &T {
        &self.data[self.offset(index)]
    }
}

impl<T: Copy + Default, const N: usize> IndexMut<[usize; N]> for DenseTable<T, N> {
    #[inline]
    fn index_mut(&mut self, index: [usize; N]) -> &mut T {
        let offset = self.offset(index);
        &mut self.data[offset]
    }
}

//! Normalising point indices.
//!
//! Most model mutations were designed around a single index and later extended to batches.
//! Callers may hand over a scalar, a set, a list or an array;
//! [PointIndex] collapses a one-element input back to the scalar form
//! so that both call styles reach the model unchanged.
use std::collections::{BTreeSet, HashSet};

use smallvec::SmallVec;

use crate::{EditError, EditResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointIndex {
    Single(usize),
    Many(SmallVec<[usize; 4]>),
}

impl PointIndex {
    /// Normalise any finite sequence of indices, preserving the given order.
    ///
    /// Fails on empty input, so that accidental empty-index operations are visible.
    pub fn normalize<I: IntoIterator<Item = usize>>(indices: I) -> EditResult<Self> {
        let mut collected: SmallVec<[usize; 4]> = indices.into_iter().collect();
        match collected.len() {
            0 => Err(EditError::InvalidIndex("no index given".into())),
            1 => Ok(Self::Single(collected.remove(0))),
            _ => Ok(Self::Many(collected)),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        match self {
            Self::Single(idx) => std::slice::from_ref(idx),
            Self::Many(idxs) => idxs.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn single(&self) -> Option<usize> {
        match self {
            Self::Single(idx) => Some(*idx),
            Self::Many(_) => None,
        }
    }

    pub fn max(&self) -> usize {
        self.as_slice().iter().copied().max().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.as_slice().iter().copied()
    }
}

impl From<usize> for PointIndex {
    fn from(value: usize) -> Self {
        Self::Single(value)
    }
}

/// Anything that can be normalised into a [PointIndex].
pub trait IntoPointIndex {
    fn into_point_index(self) -> EditResult<PointIndex>;
}

impl IntoPointIndex for PointIndex {
    fn into_point_index(self) -> EditResult<PointIndex> {
        Ok(self)
    }
}

impl IntoPointIndex for &PointIndex {
    fn into_point_index(self) -> EditResult<PointIndex> {
        Ok(self.clone())
    }
}

impl IntoPointIndex for usize {
    fn into_point_index(self) -> EditResult<PointIndex> {
        Ok(PointIndex::Single(self))
    }
}

impl IntoPointIndex for &[usize] {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self.iter().copied())
    }
}

impl<const N: usize> IntoPointIndex for [usize; N] {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self)
    }
}

impl IntoPointIndex for Vec<usize> {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self)
    }
}

impl IntoPointIndex for &Vec<usize> {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self.iter().copied())
    }
}

impl IntoPointIndex for BTreeSet<usize> {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self)
    }
}

impl IntoPointIndex for &BTreeSet<usize> {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self.iter().copied())
    }
}

impl IntoPointIndex for HashSet<usize> {
    fn into_point_index(self) -> EditResult<PointIndex> {
        PointIndex::normalize(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use super::*;

    #[test]
    fn singletons_collapse_to_scalar() {
        assert_eq!(7usize.into_point_index().unwrap(), PointIndex::Single(7));
        assert_eq!(vec![7usize].into_point_index().unwrap(), PointIndex::Single(7));
        assert_eq!([7usize].into_point_index().unwrap(), PointIndex::Single(7));
        assert_eq!(
            BTreeSet::from([7usize]).into_point_index().unwrap(),
            PointIndex::Single(7)
        );
        assert_eq!(
            HashSet::from([7usize]).into_point_index().unwrap(),
            PointIndex::Single(7)
        );
        let slice: &[usize] = &[7];
        assert_eq!(slice.into_point_index().unwrap(), PointIndex::Single(7));
    }

    #[test]
    fn sequences_keep_order() {
        let idx = vec![4usize, 1, 3].into_point_index().unwrap();
        assert_eq!(idx.as_slice(), &[4, 1, 3]);
        assert_eq!(idx.single(), None);
        assert_eq!(idx.max(), 4);

        let idx = [2usize, 0].into_point_index().unwrap();
        assert_eq!(idx.as_slice(), &[2, 0]);
    }

    #[test]
    fn sets_yield_all_members() {
        let idx = HashSet::from([5usize, 9, 2]).into_point_index().unwrap();
        let got: BTreeSet<_> = idx.iter().collect();
        assert_eq!(got, BTreeSet::from([2usize, 5, 9]));
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn empty_is_invalid() {
        let err = Vec::<usize>::new().into_point_index().unwrap_err();
        assert!(matches!(err, EditError::InvalidIndex(_)));
        assert!(BTreeSet::<usize>::new().into_point_index().is_err());
    }
}

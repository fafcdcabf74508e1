use crate::error::ConstraintError;
use crate::la::{IndexMap, NestedVector};
use nalgebra::{DVector, DVectorView, RealField, Scalar};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// The storage kind of a [`DistVector`]: a single contiguous vector or a
/// nested (block) vector of independently indexed sub-vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Plain,
    Nest,
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorKind::Plain => write!(f, "plain"),
            VectorKind::Nest => write!(f, "nest"),
        }
    }
}

/// A globally indexed vector partitioned according to an [`IndexMap`].
///
/// Local storage holds the owned entries followed by ghost entries. All
/// mutation during assembly goes through a scoped [`LocalForm`] view, and
/// ghost contributions are folded onto their owners by
/// [`GlobalVector::scatter_reverse_add`]. In a multi-process backend both of
/// these are synchronization points that every participating process must
/// reach; this crate runs one process per partition, so the one-rank case of
/// the protocol is executed, with the same zero → accumulate → reverse
/// scatter → commit structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVector<T: Scalar> {
    values: DVector<T>,
    index_map: Arc<IndexMap>,
}

impl<T: RealField + Copy> GlobalVector<T> {
    /// A zero-initialized vector sized to the given index map
    /// (owned + ghost blocks, `block_size` scalar entries each).
    pub fn zeros(index_map: Arc<IndexMap>) -> Self {
        let len = index_map.local_size() * index_map.block_size();
        Self {
            values: DVector::zeros(len),
            index_map,
        }
    }

    pub fn index_map(&self) -> &Arc<IndexMap> {
        &self.index_map
    }

    /// Total number of locally stored scalar entries, owned and ghost.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_zero(&mut self) {
        self.values.fill(T::zero());
    }

    /// A view of the locally owned scalar entries.
    pub fn owned(&self) -> DVectorView<'_, T> {
        let owned_len = self.index_map.owned_size() * self.index_map.block_size();
        self.values.rows(0, owned_len)
    }

    /// The locally stored value of the global scalar dof, if the dof is
    /// stored on this process.
    pub fn get_global(&self, global_dof: usize) -> Option<T> {
        let bs = self.index_map.block_size();
        let local_block = self.index_map.global_to_local(global_dof / bs)?;
        Some(self.values[local_block * bs + global_dof % bs])
    }

    /// Acquire a scoped read-write view of the local entries.
    ///
    /// The view is committed back to the vector when the guard is dropped,
    /// on every exit path including errors. Mutating ghost entries leaves the
    /// vector unsynchronized until [`GlobalVector::scatter_reverse_add`] is
    /// called.
    pub fn local_form(&mut self) -> LocalForm<'_, T> {
        LocalForm { vector: self }
    }

    /// Fold ghost contributions onto the owning entries and zero the ghost
    /// slots.
    ///
    /// This is the reverse scatter-add that a distributed backend performs as
    /// a collective operation after accumulation: values accumulated into a
    /// ghost slot are added exactly once onto the entry of the dof's owner,
    /// and the ghost slot is zeroed. Ghost dofs whose owner is not resolvable
    /// locally belong to another partition and are left untouched.
    pub fn scatter_reverse_add(&mut self) {
        let bs = self.index_map.block_size();
        let owned = self.index_map.owned_size();
        for ghost_idx in 0..self.index_map.num_ghosts() {
            let ghost_block = owned + ghost_idx;
            let global = self.index_map.ghosts()[ghost_idx];
            let Some(owner_block) = self.index_map.global_to_local(global) else {
                continue;
            };
            if !self.index_map.is_owned_local(owner_block) {
                continue;
            }
            for c in 0..bs {
                let contribution = self.values[ghost_block * bs + c];
                self.values[owner_block * bs + c] += contribution;
                self.values[ghost_block * bs + c] = T::zero();
            }
        }
    }
}

/// A scoped read-write view of a [`GlobalVector`]'s local entries.
///
/// Dereferences to the underlying dense vector. Dropping the guard commits
/// the view back to the distributed vector; in a multi-process backend this
/// is where the halo exchange would be triggered.
pub struct LocalForm<'a, T: Scalar> {
    vector: &'a mut GlobalVector<T>,
}

impl<'a, T: RealField + Copy> LocalForm<'a, T> {
    /// Add `value` to the locally stored entry of the global scalar dof.
    ///
    /// # Panics
    ///
    /// Panics if the dof is not stored on this process. Assembly only ever
    /// produces contributions for dofs of locally stored cells, so an
    /// unresolvable dof indicates an inconsistent index map.
    pub fn add(&mut self, global_dof: usize, value: T) {
        let bs = self.vector.index_map.block_size();
        let local_block = self
            .vector
            .index_map
            .global_to_local(global_dof / bs)
            .unwrap_or_else(|| panic!("Global dof {} is not stored on this process", global_dof));
        self.vector.values[local_block * bs + global_dof % bs] += value;
    }
}

impl<'a, T: Scalar> Deref for LocalForm<'a, T> {
    type Target = DVector<T>;

    fn deref(&self) -> &Self::Target {
        &self.vector.values
    }
}

impl<'a, T: Scalar> DerefMut for LocalForm<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vector.values
    }
}

impl<'a, T: Scalar> Drop for LocalForm<'a, T> {
    fn drop(&mut self) {
        // Commit point: a distributed backend would release the cached local
        // array here. The guard existing at all is what guarantees commit on
        // every exit path.
        log::trace!("local form released");
    }
}

/// A vector that is either plain or nested, mirroring the `plain`/`nest`
/// vector types of PETSc-style backends.
#[derive(Debug, Clone, PartialEq)]
pub enum DistVector<T: Scalar> {
    Plain(GlobalVector<T>),
    Nest(NestedVector<T>),
}

impl<T: Scalar> DistVector<T> {
    pub fn kind(&self) -> VectorKind {
        match self {
            DistVector::Plain(_) => VectorKind::Plain,
            DistVector::Nest(_) => VectorKind::Nest,
        }
    }

    pub fn as_plain(&self) -> Result<&GlobalVector<T>, ConstraintError> {
        match self {
            DistVector::Plain(v) => Ok(v),
            DistVector::Nest(_) => Err(ConstraintError::WrongVectorKind {
                expected: VectorKind::Plain,
                found: VectorKind::Nest,
            }),
        }
    }

    pub fn as_nest(&self) -> Result<&NestedVector<T>, ConstraintError> {
        match self {
            DistVector::Nest(v) => Ok(v),
            DistVector::Plain(_) => Err(ConstraintError::WrongVectorKind {
                expected: VectorKind::Nest,
                found: VectorKind::Plain,
            }),
        }
    }

    pub fn as_nest_mut(&mut self) -> Result<&mut NestedVector<T>, ConstraintError> {
        match self {
            DistVector::Nest(v) => Ok(v),
            DistVector::Plain(_) => Err(ConstraintError::WrongVectorKind {
                expected: VectorKind::Nest,
                found: VectorKind::Plain,
            }),
        }
    }
}

//! Multi-point constraint relations and their local-to-global expansion.

use crate::error::ConstraintError;
use crate::la::{GlobalVector, IndexMap};
use nalgebra::{DVectorView, RealField};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default guard against runaway master chains during recursive expansion.
///
/// Cyclic chains are rejected at [`MultiPointConstraint::finalize`], so the
/// guard only catches accidentally deep staging of constraints.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 32;

/// The masters, coefficients and constant offset of a single slave dof.
///
/// The slave's value is
/// `u_slave = sum_i coefficients[i] * u_masters[i] + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation<T> {
    masters: Vec<usize>,
    coefficients: Vec<T>,
    offset: T,
}

impl<T> Relation<T> {
    pub fn masters(&self) -> &[usize] {
        &self.masters
    }

    pub fn coefficients(&self) -> &[T] {
        &self.coefficients
    }

    pub fn offset(&self) -> &T {
        &self.offset
    }
}

/// A set of multi-point constraint relations over a global dof numbering.
///
/// Relations are added one slave at a time, then the store is locked with
/// [`finalize`](Self::finalize), which validates the slave → master graph and
/// builds the reverse master → dependent-slaves index. A finalized store is
/// immutable and can be shared across any number of assembly passes; when the
/// mesh or the constraint definition changes, build a new store.
#[derive(Debug, Clone)]
pub struct MultiPointConstraint<T: RealField + Copy> {
    index_map: Arc<IndexMap>,
    relations: FxHashMap<usize, Relation<T>>,
    // Built at finalize
    dependents: FxHashMap<usize, Vec<usize>>,
    slaves: Vec<usize>,
    finalized: bool,
}

impl<T: RealField + Copy> MultiPointConstraint<T> {
    /// An empty constraint set over `num_dofs` contiguous, locally owned
    /// scalar dofs.
    pub fn new(num_dofs: usize) -> Self {
        Self::with_index_map(Arc::new(IndexMap::new(num_dofs, 1)))
    }

    /// An empty constraint set over the dof numbering described by the given
    /// index map.
    pub fn with_index_map(index_map: Arc<IndexMap>) -> Self {
        Self {
            index_map,
            relations: FxHashMap::default(),
            dependents: FxHashMap::default(),
            slaves: Vec::new(),
            finalized: false,
        }
    }

    pub fn index_map(&self) -> &Arc<IndexMap> {
        &self.index_map
    }

    /// Total number of locally addressable scalar dofs.
    pub fn num_dofs(&self) -> usize {
        self.index_map.local_size() * self.index_map.block_size()
    }

    pub fn num_slaves(&self) -> usize {
        self.relations.len()
    }

    /// Number of unknowns in the reduced system.
    pub fn num_free_dofs(&self) -> usize {
        self.num_dofs() - self.num_slaves()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add the relation `u_slave = sum_i coefficients[i] * u_masters[i] + offset`.
    ///
    /// Fails with [`ConstraintError::FrozenStore`] after
    /// [`finalize`](Self::finalize), and with
    /// [`ConstraintError::InvalidRelation`] for mismatched master/coefficient
    /// lengths, out-of-range dofs, a slave referencing itself, non-finite
    /// coefficients or a slave that is already constrained. Cycles spanning
    /// several relations are only detectable once all relations are known and
    /// are rejected at `finalize`.
    pub fn add_relation(
        &mut self,
        slave: usize,
        masters: &[usize],
        coefficients: &[T],
        offset: T,
    ) -> Result<(), ConstraintError> {
        if self.finalized {
            return Err(ConstraintError::FrozenStore);
        }
        let invalid = |reason: String| ConstraintError::InvalidRelation { slave, reason };
        if masters.len() != coefficients.len() {
            return Err(invalid(format!(
                "{} masters but {} coefficients",
                masters.len(),
                coefficients.len()
            )));
        }
        if !self.dof_is_addressable(slave) {
            return Err(invalid(format!("slave dof {} is out of range", slave)));
        }
        for &master in masters {
            if master == slave {
                return Err(invalid("slave dof references itself as master".to_string()));
            }
            if !self.dof_is_addressable(master) {
                return Err(invalid(format!("master dof {} is out of range", master)));
            }
        }
        for coeff in coefficients {
            if !coeff.is_finite() {
                return Err(invalid("non-finite coefficient".to_string()));
            }
        }
        if !offset.is_finite() {
            return Err(invalid("non-finite offset".to_string()));
        }
        if self.relations.contains_key(&slave) {
            return Err(invalid("slave dof is already constrained".to_string()));
        }
        self.relations.insert(
            slave,
            Relation {
                masters: masters.to_vec(),
                coefficients: coefficients.to_vec(),
                offset,
            },
        );
        Ok(())
    }

    /// Lock the store: reject cyclic master chains and build the reverse
    /// master → dependent-slaves index.
    ///
    /// After a successful `finalize`, any further mutation fails with
    /// [`ConstraintError::FrozenStore`]. Finalizing an already finalized
    /// store is a no-op.
    pub fn finalize(&mut self) -> Result<(), ConstraintError> {
        if self.finalized {
            return Ok(());
        }
        self.check_acyclic()?;

        let mut dependents: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (&slave, relation) in &self.relations {
            for &master in &relation.masters {
                dependents.entry(master).or_default().push(slave);
            }
        }
        // Deterministic iteration order independently of hash map internals
        for slaves in dependents.values_mut() {
            slaves.sort_unstable();
        }
        let mut slaves: Vec<_> = self.relations.keys().copied().collect();
        slaves.sort_unstable();

        self.dependents = dependents;
        self.slaves = slaves;
        self.finalized = true;
        Ok(())
    }

    pub fn is_slave(&self, dof: usize) -> bool {
        self.relations.contains_key(&dof)
    }

    /// The relation constraining `slave`, if any.
    pub fn masters_of(&self, slave: usize) -> Option<&Relation<T>> {
        self.relations.get(&slave)
    }

    /// The slaves that depend on `master`, in ascending dof order.
    ///
    /// # Panics
    ///
    /// Panics if the store has not been finalized; the reverse index is built
    /// by [`finalize`](Self::finalize).
    pub fn dependents_of(&self, master: usize) -> &[usize] {
        assert!(self.finalized, "Store must be finalized");
        self.dependents
            .get(&master)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All slave dofs, in ascending order.
    ///
    /// # Panics
    ///
    /// Panics if the store has not been finalized.
    pub fn slaves(&self) -> &[usize] {
        assert!(self.finalized, "Store must be finalized");
        &self.slaves
    }

    /// A zero-initialized global vector for the reduced system described by
    /// this constraint.
    ///
    /// Storage covers the full local dof range: slave slots are retained so
    /// that global indexing stays stable, but they carry no unknown; their
    /// contributions are redistributed onto masters during assembly.
    pub fn create_vector(&self) -> GlobalVector<T> {
        GlobalVector::zeros(Arc::clone(&self.index_map))
    }

    /// Expand a single dof contribution of the given weight into
    /// `(free dof, weight)` pairs, redistributing slave contributions onto
    /// masters recursively.
    ///
    /// Offset contributions (`weight * offset` per traversed relation) go to
    /// the `lifting` buffer rather than to `out`: constant offsets enter the
    /// right-hand side through [`apply_lifting`], never the reduced unknown
    /// vector.
    ///
    /// [`apply_lifting`]: crate::assembly::global::apply_lifting
    pub fn expand_dof(
        &self,
        dof: usize,
        weight: T,
        max_depth: usize,
        out: &mut Vec<(usize, T)>,
        lifting: &mut Vec<(usize, T)>,
    ) -> Result<(), ConstraintError> {
        self.expand_dof_recursive(dof, weight, 0, max_depth, out, lifting)
    }

    /// Expand a local element vector into `(free dof, value)` contributions.
    ///
    /// `dofs` is the element's global dof index list as returned by the
    /// external dof map, and `local` the matching local element vector.
    /// `out` and `lifting` are cleared before expansion.
    ///
    /// # Panics
    ///
    /// Panics if `dofs` and `local` have different lengths.
    pub fn expand_element_vector(
        &self,
        dofs: &[usize],
        local: DVectorView<'_, T>,
        max_depth: usize,
        out: &mut Vec<(usize, T)>,
        lifting: &mut Vec<(usize, T)>,
    ) -> Result<(), ConstraintError> {
        assert_eq!(
            dofs.len(),
            local.len(),
            "Element dof list and local vector must have equal length"
        );
        out.clear();
        lifting.clear();
        for (local_idx, &dof) in dofs.iter().enumerate() {
            self.expand_dof_recursive(dof, local[local_idx], 0, max_depth, out, lifting)?;
        }
        Ok(())
    }

    /// The global reduction matrix `K` mapping reduced unknowns to the full
    /// dof set.
    ///
    /// Free dofs carry an identity row; a slave row holds its recursively
    /// expanded master coefficients. The lifting identity
    /// `b ← b − scale · Kᵀ(A(g − x0))` is formulated in terms of this matrix.
    ///
    /// # Panics
    ///
    /// Panics if the store has not been finalized.
    pub fn constraint_matrix(&self) -> CsrMatrix<T> {
        assert!(self.finalized, "Store must be finalized");
        let n = self.num_dofs();
        let mut coo = CooMatrix::new(n, n);
        let mut expanded = Vec::new();
        let mut lifting = Vec::new();
        // Acyclic after finalize, so expansion depth is bounded by the number
        // of relations
        let max_depth = self.relations.len() + 1;
        for dof in 0..n {
            if self.is_slave(dof) {
                expanded.clear();
                lifting.clear();
                self.expand_dof_recursive(dof, T::one(), 0, max_depth, &mut expanded, &mut lifting)
                    .expect("Expansion of a finalized store cannot exceed its relation count");
                for &(master, coeff) in &expanded {
                    coo.push(dof, master, coeff);
                }
            } else {
                coo.push(dof, dof, T::one());
            }
        }
        CsrMatrix::from(&coo)
    }

    fn expand_dof_recursive(
        &self,
        dof: usize,
        weight: T,
        depth: usize,
        max_depth: usize,
        out: &mut Vec<(usize, T)>,
        lifting: &mut Vec<(usize, T)>,
    ) -> Result<(), ConstraintError> {
        let Some(relation) = self.relations.get(&dof) else {
            out.push((dof, weight));
            return Ok(());
        };
        if depth >= max_depth {
            return Err(ConstraintError::ConstraintDepthExceeded { dof, max_depth });
        }
        lifting.push((dof, weight * relation.offset));
        for (&master, &coeff) in relation.masters.iter().zip(&relation.coefficients) {
            self.expand_dof_recursive(master, weight * coeff, depth + 1, max_depth, out, lifting)?;
        }
        Ok(())
    }

    fn dof_is_addressable(&self, dof: usize) -> bool {
        let bs = self.index_map.block_size();
        self.index_map.global_to_local(dof / bs).is_some()
    }

    /// Depth-first search over the slave → master edges restricted to masters
    /// that are themselves slaves.
    fn check_acyclic(&self) -> Result<(), ConstraintError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks: FxHashMap<usize, Mark> =
            self.relations.keys().map(|&s| (s, Mark::Unvisited)).collect();

        for &root in self.relations.keys() {
            if marks[&root] != Mark::Unvisited {
                continue;
            }
            // Iterative DFS; each stack entry is (node, next master position)
            let mut stack = vec![(root, 0usize)];
            marks.insert(root, Mark::InProgress);
            while let Some(top) = stack.last_mut() {
                let (node, pos) = *top;
                let masters = &self.relations[&node].masters;
                let mut next_slave_master = None;
                let mut next_pos = pos;
                while next_pos < masters.len() {
                    let master = masters[next_pos];
                    next_pos += 1;
                    if self.relations.contains_key(&master) {
                        next_slave_master = Some(master);
                        break;
                    }
                }
                top.1 = next_pos;
                match next_slave_master {
                    Some(master) => {
                        match marks[&master] {
                            Mark::InProgress => {
                                return Err(ConstraintError::InvalidRelation {
                                    slave: master,
                                    reason: "slave dof participates in a cyclic master chain"
                                        .to_string(),
                                });
                            }
                            Mark::Unvisited => {
                                marks.insert(master, Mark::InProgress);
                                stack.push((master, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }
}

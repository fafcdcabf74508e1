//! Global assembly of constrained vectors and matrices.

use crate::assembly::local::{
    ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler,
};
use crate::bc::DirichletBC;
use crate::constraint::{MultiPointConstraint, DEFAULT_MAX_EXPANSION_DEPTH};
use crate::error::ConstraintError;
use crate::instrumentation::{enter_phase, Instrumentation, LogInstrumentation, Phase};
use crate::la::GlobalVector;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseEntryMut};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

/// An assembler accumulating local element vectors into a constrained global
/// vector.
///
/// Slave contributions are redistributed onto masters according to the
/// constraint; ghost contributions are folded onto their owners by a reverse
/// scatter-add once accumulation finishes. Buffers are reused across calls so
/// that assembling many vectors with the same assembler does not allocate.
pub struct VectorAssembler<T: Scalar> {
    workspace: RefCell<VectorAssemblerWorkspace<T>>,
    max_expansion_depth: usize,
    instrumentation: Arc<dyn Instrumentation>,
}

struct VectorAssemblerWorkspace<T: Scalar> {
    element_dofs: Vec<usize>,
    element_vector: DVector<T>,
    element_matrix: DMatrix<T>,
    prescribed: DVector<T>,
    correction: DVector<T>,
    expanded: Vec<(usize, T)>,
    lifting: Vec<(usize, T)>,
}

impl<T: Scalar> Default for VectorAssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            element_dofs: Vec::new(),
            element_vector: DVector::from_vec(Vec::new()),
            element_matrix: DMatrix::from_vec(0, 0, Vec::new()),
            prescribed: DVector::from_vec(Vec::new()),
            correction: DVector::from_vec(Vec::new()),
            expanded: Vec::new(),
            lifting: Vec::new(),
        }
    }
}

impl<T: Scalar> Default for VectorAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(VectorAssemblerWorkspace::default()),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            instrumentation: Arc::new(LogInstrumentation),
        }
    }
}

impl<T: Scalar> VectorAssembler<T> {
    /// Override the guard against runaway master chains during expansion.
    pub fn with_max_expansion_depth(mut self, max_depth: usize) -> Self {
        self.max_expansion_depth = max_depth;
        self
    }

    /// Install a hook that is notified around the accumulation and
    /// synchronization phases.
    pub fn with_instrumentation(mut self, hook: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = hook;
        self
    }
}

impl<T: RealField + Copy> VectorAssembler<T> {
    /// Assemble the linear form described by `element_assembler` into a
    /// global vector under the given constraint.
    ///
    /// If `target` is `None`, a fresh zero vector sized to the constraint's
    /// index map is allocated. A provided target is zeroed before
    /// accumulation: the result is **not** cumulative across calls on the
    /// same target. Callers that manage zeroing themselves use
    /// [`assemble_vector_accumulate`](Self::assemble_vector_accumulate).
    ///
    /// The target is returned for chaining; ownership transfers back to the
    /// caller.
    pub fn assemble_vector<EA>(
        &self,
        element_assembler: &EA,
        constraint: &MultiPointConstraint<T>,
        target: Option<GlobalVector<T>>,
    ) -> eyre::Result<GlobalVector<T>>
    where
        EA: ElementVectorAssembler<T> + ?Sized,
    {
        let mut b = match target {
            Some(b) => b,
            None => constraint.create_vector(),
        };
        self.assemble_vector_in_place(element_assembler, constraint, &mut b)?;
        Ok(b)
    }

    /// Zero `b`'s local entries, then accumulate the constrained form into it.
    pub fn assemble_vector_in_place<EA>(
        &self,
        element_assembler: &EA,
        constraint: &MultiPointConstraint<T>,
        b: &mut GlobalVector<T>,
    ) -> eyre::Result<()>
    where
        EA: ElementVectorAssembler<T> + ?Sized,
    {
        {
            let mut b_local = b.local_form();
            b_local.fill(T::zero());
        }
        self.assemble_vector_accumulate(element_assembler, constraint, b)
    }

    /// Accumulate the constrained form into `b` without zeroing it first.
    pub fn assemble_vector_accumulate<EA>(
        &self,
        element_assembler: &EA,
        constraint: &MultiPointConstraint<T>,
        b: &mut GlobalVector<T>,
    ) -> eyre::Result<()>
    where
        EA: ElementVectorAssembler<T> + ?Sized,
    {
        eyre::ensure!(
            constraint.is_finalized(),
            "Constraint store must be finalized before assembly"
        );
        eyre::ensure!(
            **b.index_map() == **constraint.index_map(),
            "Target vector must be laid out by the constraint's index map"
        );
        eyre::ensure!(
            element_assembler.num_dofs() <= constraint.num_dofs(),
            "Element assembler addresses {} dofs but the constraint's index map stores only {}",
            element_assembler.num_dofs(),
            constraint.num_dofs()
        );
        let ws = &mut *self.workspace.borrow_mut();

        {
            let _accumulation = enter_phase(&*self.instrumentation, Phase::VectorAccumulation);
            let mut b_local = b.local_form();
            for i in 0..element_assembler.num_elements() {
                let n = element_assembler.element_dof_count(i);
                ws.element_dofs.resize(n, usize::MAX);
                element_assembler.populate_element_dofs(&mut ws.element_dofs, i);

                ws.element_vector.resize_vertically_mut(n, T::zero());
                ws.element_vector.fill(T::zero());
                element_assembler.assemble_element_vector_into(
                    i,
                    DVectorViewMut::from(&mut ws.element_vector),
                )?;

                constraint.expand_element_vector(
                    &ws.element_dofs,
                    DVectorView::from(&ws.element_vector),
                    self.max_expansion_depth,
                    &mut ws.expanded,
                    &mut ws.lifting,
                )?;
                for &(dof, value) in &ws.expanded {
                    b_local.add(dof, value);
                }
                // Offset contributions enter the right-hand side through
                // apply_lifting, never the reduced vector
            }
        }

        let _reduction = enter_phase(&*self.instrumentation, Phase::GhostReduction);
        b.scatter_reverse_add();
        Ok(())
    }

    /// Correct the right-hand side for eliminated dofs:
    /// `b ← b − scale · Kᵀ·(A_j·(g_j − x0_j))` summed over the forms `j`,
    /// where `K` is the constraint matrix, `A_j` the local bilinear operator
    /// of form `j` and `g_j` the values prescribed by the form's boundary
    /// conditions and by slave offsets.
    ///
    /// `x0` is either empty (treated as zero) or one current-iterate vector
    /// per form, so that incremental/nonlinear drivers lift the *residual*
    /// prescribed value `g − x0`. This correction is required for the reduced
    /// system to stay equivalent to the original whenever elimination changes
    /// the effective system; omitting it silently produces an inconsistent
    /// solution.
    pub fn apply_lifting(
        &self,
        b: &mut GlobalVector<T>,
        forms: &[&dyn ElementMatrixAssembler<T>],
        bcs: &[Vec<DirichletBC<T>>],
        constraint: &MultiPointConstraint<T>,
        x0: &[GlobalVector<T>],
        scale: T,
    ) -> eyre::Result<()> {
        if forms.len() != bcs.len() {
            return Err(ConstraintError::LengthMismatch {
                what: "forms/bcs",
                left: forms.len(),
                right: bcs.len(),
            }
            .into());
        }
        if !x0.is_empty() && x0.len() != forms.len() {
            return Err(ConstraintError::LengthMismatch {
                what: "forms/x0",
                left: forms.len(),
                right: x0.len(),
            }
            .into());
        }
        eyre::ensure!(
            constraint.is_finalized(),
            "Constraint store must be finalized before lifting"
        );
        for (j, form) in forms.iter().enumerate() {
            eyre::ensure!(
                form.num_dofs() <= constraint.num_dofs(),
                "Form {} addresses {} dofs but the constraint's index map stores only {}",
                j,
                form.num_dofs(),
                constraint.num_dofs()
            );
        }
        let ws = &mut *self.workspace.borrow_mut();

        {
            let _lifting = enter_phase(&*self.instrumentation, Phase::Lifting);
            // The local form guard commits the view back on every exit path,
            // including errors
            let mut b_local = b.local_form();
            for (j, form) in forms.iter().enumerate() {
                let form_bcs = &bcs[j];
                let x0_j = x0.get(j);
                for i in 0..form.num_elements() {
                    let n = form.element_dof_count(i);
                    ws.element_dofs.resize(n, usize::MAX);
                    form.populate_element_dofs(&mut ws.element_dofs, i);

                    // Residual prescribed values g - x0 on the element
                    ws.prescribed.resize_vertically_mut(n, T::zero());
                    ws.prescribed.fill(T::zero());
                    let mut any_prescribed = false;
                    for (k, &dof) in ws.element_dofs.iter().enumerate() {
                        let g = form_bcs
                            .iter()
                            .find_map(|bc| bc.value(dof))
                            .or_else(|| constraint.masters_of(dof).map(|rel| *rel.offset()));
                        if let Some(g) = g {
                            let x0_value = x0_j
                                .and_then(|x0_vec| x0_vec.get_global(dof))
                                .unwrap_or_else(T::zero);
                            ws.prescribed[k] = g - x0_value;
                            any_prescribed = any_prescribed || ws.prescribed[k] != T::zero();
                        }
                    }
                    if !any_prescribed {
                        continue;
                    }

                    let dim = ws.element_matrix.nrows();
                    if dim != n {
                        ws.element_matrix.resize_mut(n, n, T::zero());
                    }
                    ws.element_matrix.fill(T::zero());
                    form.assemble_element_matrix_into(
                        i,
                        DMatrixViewMut::from(&mut ws.element_matrix),
                    )?;

                    ws.correction.resize_vertically_mut(n, T::zero());
                    ws.element_matrix.mul_to(&ws.prescribed, &mut ws.correction);

                    // Apply Kᵀ row-wise: free rows subtract directly, slave
                    // rows redistribute onto their masters
                    for (k, &dof) in ws.element_dofs.iter().enumerate() {
                        ws.expanded.clear();
                        ws.lifting.clear();
                        constraint.expand_dof(
                            dof,
                            T::one(),
                            self.max_expansion_depth,
                            &mut ws.expanded,
                            &mut ws.lifting,
                        )?;
                        for &(row, weight) in &ws.expanded {
                            b_local.add(row, -scale * weight * ws.correction[k]);
                        }
                    }
                }
            }
        }

        let _reduction = enter_phase(&*self.instrumentation, Phase::GhostReduction);
        b.scatter_reverse_add();
        Ok(())
    }
}

/// Free-function form of [`VectorAssembler::assemble_vector`] using a default
/// assembler.
pub fn assemble_vector<T, EA>(
    element_assembler: &EA,
    constraint: &MultiPointConstraint<T>,
    target: Option<GlobalVector<T>>,
) -> eyre::Result<GlobalVector<T>>
where
    T: RealField + Copy,
    EA: ElementVectorAssembler<T> + ?Sized,
{
    VectorAssembler::default().assemble_vector(element_assembler, constraint, target)
}

/// Free-function form of [`VectorAssembler::apply_lifting`] using a default
/// assembler.
pub fn apply_lifting<T: RealField + Copy>(
    b: &mut GlobalVector<T>,
    forms: &[&dyn ElementMatrixAssembler<T>],
    bcs: &[Vec<DirichletBC<T>>],
    constraint: &MultiPointConstraint<T>,
    x0: &[GlobalVector<T>],
    scale: T,
) -> eyre::Result<()> {
    VectorAssembler::default().apply_lifting(b, forms, bcs, constraint, x0, scale)
}

/// An assembler accumulating local element matrices into a constrained CSR
/// matrix.
///
/// Both row and column contributions of slave dofs are redistributed onto
/// masters; eliminated slave diagonals receive a representative scale so that
/// the reduced operator stays non-singular.
pub struct MatrixAssembler<T: Scalar> {
    workspace: RefCell<MatrixAssemblerWorkspace<T>>,
    max_expansion_depth: usize,
    instrumentation: Arc<dyn Instrumentation>,
}

struct MatrixAssemblerWorkspace<T: Scalar> {
    element_dofs: Vec<usize>,
    element_matrix: DMatrix<T>,
    // Per-local-dof expansions stored back to back; `expansion_offsets` has
    // one more entry than there are local dofs
    expansions: Vec<(usize, T)>,
    expansion_offsets: Vec<usize>,
    lifting: Vec<(usize, T)>,
}

impl<T: Scalar> Default for MatrixAssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            element_dofs: Vec::new(),
            element_matrix: DMatrix::from_vec(0, 0, Vec::new()),
            expansions: Vec::new(),
            expansion_offsets: Vec::new(),
            lifting: Vec::new(),
        }
    }
}

impl<T: Scalar> Default for MatrixAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(MatrixAssemblerWorkspace::default()),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            instrumentation: Arc::new(LogInstrumentation),
        }
    }
}

impl<T: Scalar> MatrixAssembler<T> {
    pub fn with_max_expansion_depth(mut self, max_depth: usize) -> Self {
        self.max_expansion_depth = max_depth;
        self
    }

    pub fn with_instrumentation(mut self, hook: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = hook;
        self
    }
}

impl<T: RealField + Copy> MatrixAssembler<T> {
    /// Build the sparsity pattern of the constrained operator.
    ///
    /// Couplings between expanded dofs are a superset of the unconstrained
    /// element pattern: wherever a cell contains a slave, its masters couple
    /// with every other (expanded) dof of the cell and with each other, and
    /// the eliminated slave keeps a diagonal slot.
    ///
    /// Entries are collected into a `BTreeSet` so that each coupling is
    /// stored exactly once before the offsets are laid out.
    pub fn assemble_pattern<CA>(
        &self,
        element_assembler: &CA,
        constraint: &MultiPointConstraint<T>,
    ) -> eyre::Result<SparsityPattern>
    where
        CA: ElementConnectivityAssembler + ?Sized,
    {
        eyre::ensure!(
            constraint.is_finalized(),
            "Constraint store must be finalized before assembly"
        );
        log::debug!("Generating constrained sparsity pattern");
        let _pattern = enter_phase(&*self.instrumentation, Phase::PatternConstruction);
        let ws = &mut *self.workspace.borrow_mut();

        let mut matrix_entries = BTreeSet::new();
        let mut expanded_dofs = BTreeSet::new();
        for i in 0..element_assembler.num_elements() {
            let n = element_assembler.element_dof_count(i);
            ws.element_dofs.resize(n, usize::MAX);
            element_assembler.populate_element_dofs(&mut ws.element_dofs, i);

            expanded_dofs.clear();
            for &dof in &ws.element_dofs {
                ws.expansions.clear();
                ws.lifting.clear();
                constraint.expand_dof(
                    dof,
                    T::one(),
                    self.max_expansion_depth,
                    &mut ws.expansions,
                    &mut ws.lifting,
                )?;
                expanded_dofs.extend(ws.expansions.iter().map(|&(target, _)| target));
                if constraint.is_slave(dof) {
                    // Eliminated dof keeps its diagonal slot
                    matrix_entries.insert((dof, dof));
                }
            }
            for &row in &expanded_dofs {
                for &col in &expanded_dofs {
                    matrix_entries.insert((row, col));
                }
            }
        }

        let num_rows = constraint.num_dofs();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            while i + 1 > offsets.len() {
                // New row reached; the while loop handles consecutive empty
                // rows
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
            .map_err(|err| eyre::eyre!("Constructed invalid sparsity pattern: {:?}", err))
    }

    /// Assemble the constrained operator into a fresh CSR matrix.
    pub fn assemble_matrix<EA>(
        &self,
        element_assembler: &EA,
        constraint: &MultiPointConstraint<T>,
    ) -> eyre::Result<CsrMatrix<T>>
    where
        EA: ElementMatrixAssembler<T> + ?Sized,
    {
        let pattern = self.assemble_pattern(element_assembler, constraint)?;
        let initial_values = vec![T::zero(); pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, initial_values)
            .expect("Pattern and values are consistent by construction");
        self.assemble_into_csr(&mut matrix, element_assembler, constraint)?;

        // A unit diagonal would ignore the scaling of the assembled entries;
        // take the first non-zero diagonal entry as a representative scale
        let scale = matrix
            .diagonal_as_csr()
            .values()
            .iter()
            .find(|value| **value != T::zero())
            .map(|value| value.abs())
            .unwrap_or_else(T::one);
        for &slave in constraint.slaves() {
            if let Some(SparseEntryMut::NonZero(entry)) = matrix.get_entry_mut(slave, slave) {
                *entry = scale;
            }
        }
        Ok(matrix)
    }

    /// Accumulate the constrained element matrices into `csr`, whose pattern
    /// must cover every expanded coupling.
    pub fn assemble_into_csr<EA>(
        &self,
        csr: &mut CsrMatrix<T>,
        element_assembler: &EA,
        constraint: &MultiPointConstraint<T>,
    ) -> eyre::Result<()>
    where
        EA: ElementMatrixAssembler<T> + ?Sized,
    {
        eyre::ensure!(
            constraint.is_finalized(),
            "Constraint store must be finalized before assembly"
        );
        let _accumulation = enter_phase(&*self.instrumentation, Phase::MatrixAccumulation);
        let ws = &mut *self.workspace.borrow_mut();

        for i in 0..element_assembler.num_elements() {
            let n = element_assembler.element_dof_count(i);
            ws.element_dofs.resize(n, usize::MAX);
            element_assembler.populate_element_dofs(&mut ws.element_dofs, i);

            ws.element_matrix.resize_mut(n, n, T::zero());
            ws.element_matrix.fill(T::zero());
            element_assembler
                .assemble_element_matrix_into(i, DMatrixViewMut::from(&mut ws.element_matrix))?;

            ws.expansions.clear();
            ws.expansion_offsets.clear();
            ws.expansion_offsets.push(0);
            for &dof in &ws.element_dofs {
                ws.lifting.clear();
                constraint.expand_dof(
                    dof,
                    T::one(),
                    self.max_expansion_depth,
                    &mut ws.expansions,
                    &mut ws.lifting,
                )?;
                ws.expansion_offsets.push(ws.expansions.len());
            }

            for a in 0..n {
                let rows = &ws.expansions[ws.expansion_offsets[a]..ws.expansion_offsets[a + 1]];
                for b in 0..n {
                    let cols = &ws.expansions[ws.expansion_offsets[b]..ws.expansion_offsets[b + 1]];
                    let value = ws.element_matrix[(a, b)];
                    for &(row, row_weight) in rows {
                        for &(col, col_weight) in cols {
                            match csr.get_entry_mut(row, col) {
                                Some(SparseEntryMut::NonZero(entry)) => {
                                    *entry += row_weight * col_weight * value;
                                }
                                _ => eyre::bail!(
                                    "Entry ({}, {}) is missing from the matrix pattern",
                                    row,
                                    col
                                ),
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

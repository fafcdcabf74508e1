//! The boundary towards the external form compiler.
//!
//! A form compiler turns a symbolic linear or bilinear form into per-cell
//! kernels: a local dense vector or matrix together with the cell's global
//! dof index list. This module consumes such kernels opaquely through the
//! traits below; it never inspects their internals.

use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, Scalar};

/// Provides the dof connectivity of a set of elements.
pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    /// Total number of global scalar dofs addressed by the connectivity.
    fn num_dofs(&self) -> usize;

    fn element_dof_count(&self, element_index: usize) -> usize;

    /// Write the element's global dof indices into `output`.
    ///
    /// # Panics
    ///
    /// Panics if `output.len()` differs from the element's dof count.
    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize);
}

/// Produces local element vectors, e.g. for the right-hand side of a linear
/// system.
pub trait ElementVectorAssembler<T: Scalar>: ElementConnectivityAssembler {
    fn assemble_element_vector_into(
        &self,
        element_index: usize,
        output: DVectorViewMut<T>,
    ) -> eyre::Result<()>;
}

/// Produces local element matrices, e.g. for the operator of a bilinear form.
pub trait ElementMatrixAssembler<T: Scalar>: ElementConnectivityAssembler {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        output: DMatrixViewMut<T>,
    ) -> eyre::Result<()>;
}

/// Element vectors supplied up front, one dense vector per element.
///
/// The simplest realization of the form-compiler boundary: suitable when the
/// local kernels have already been evaluated by an external code, and for
/// tests.
#[derive(Debug, Clone)]
pub struct PrecomputedElementVectors<T: Scalar> {
    num_dofs: usize,
    connectivity: Vec<Vec<usize>>,
    element_vectors: Vec<DVector<T>>,
}

impl<T: Scalar> PrecomputedElementVectors<T> {
    /// Element `i` contributes `element_vectors[i]` on the dofs
    /// `connectivity[i]`.
    pub fn new(
        num_dofs: usize,
        connectivity: Vec<Vec<usize>>,
        element_vectors: Vec<DVector<T>>,
    ) -> eyre::Result<Self> {
        eyre::ensure!(
            connectivity.len() == element_vectors.len(),
            "Connectivity and element vector counts must match \
             ({} elements vs {} vectors)",
            connectivity.len(),
            element_vectors.len()
        );
        for (i, (dofs, vector)) in connectivity.iter().zip(&element_vectors).enumerate() {
            eyre::ensure!(
                dofs.len() == vector.len(),
                "Element {}: {} dofs but local vector of length {}",
                i,
                dofs.len(),
                vector.len()
            );
        }
        Ok(Self {
            num_dofs,
            connectivity,
            element_vectors,
        })
    }
}

impl<T: Scalar> ElementConnectivityAssembler for PrecomputedElementVectors<T> {
    fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.connectivity[element_index].len()
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.connectivity[element_index]);
    }
}

impl<T: Scalar> ElementVectorAssembler<T> for PrecomputedElementVectors<T> {
    fn assemble_element_vector_into(
        &self,
        element_index: usize,
        mut output: DVectorViewMut<T>,
    ) -> eyre::Result<()> {
        output.copy_from(&self.element_vectors[element_index]);
        Ok(())
    }
}

/// Element matrices supplied up front, one dense matrix per element.
#[derive(Debug, Clone)]
pub struct PrecomputedElementMatrices<T: Scalar> {
    num_dofs: usize,
    connectivity: Vec<Vec<usize>>,
    element_matrices: Vec<DMatrix<T>>,
}

impl<T: Scalar> PrecomputedElementMatrices<T> {
    /// Element `i` contributes `element_matrices[i]` on the dofs
    /// `connectivity[i]`.
    pub fn new(
        num_dofs: usize,
        connectivity: Vec<Vec<usize>>,
        element_matrices: Vec<DMatrix<T>>,
    ) -> eyre::Result<Self> {
        eyre::ensure!(
            connectivity.len() == element_matrices.len(),
            "Connectivity and element matrix counts must match \
             ({} elements vs {} matrices)",
            connectivity.len(),
            element_matrices.len()
        );
        for (i, (dofs, matrix)) in connectivity.iter().zip(&element_matrices).enumerate() {
            eyre::ensure!(
                matrix.nrows() == dofs.len() && matrix.ncols() == dofs.len(),
                "Element {}: {} dofs but local matrix of dimensions {}x{}",
                i,
                dofs.len(),
                matrix.nrows(),
                matrix.ncols()
            );
        }
        Ok(Self {
            num_dofs,
            connectivity,
            element_matrices,
        })
    }
}

impl<T: Scalar> ElementConnectivityAssembler for PrecomputedElementMatrices<T> {
    fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.connectivity[element_index].len()
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.connectivity[element_index]);
    }
}

impl<T: Scalar> ElementMatrixAssembler<T> for PrecomputedElementMatrices<T> {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        mut output: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        output.copy_from(&self.element_matrices[element_index]);
        Ok(())
    }
}

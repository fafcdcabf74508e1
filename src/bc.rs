//! Prescribed (Dirichlet) boundary data.

use crate::error::ConstraintError;
use nalgebra::RealField;
use serde::{Deserialize, Serialize};

/// A set of dofs with prescribed values `g`, eliminated from the system and
/// folded back into the right-hand side by
/// [`apply_lifting`](crate::assembly::global::apply_lifting).
///
/// Entries are kept sorted by dof so that lookups during lifting are
/// logarithmic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirichletBC<T: RealField + Copy> {
    dofs: Vec<usize>,
    values: Vec<T>,
}

impl<T: RealField + Copy> DirichletBC<T> {
    /// Prescribe `values[i]` on `dofs[i]`.
    ///
    /// Fails if the lists have different lengths or a dof is prescribed
    /// twice.
    pub fn new(mut dofs: Vec<usize>, mut values: Vec<T>) -> Result<Self, ConstraintError> {
        if dofs.len() != values.len() {
            return Err(ConstraintError::LengthMismatch {
                what: "dofs/values",
                left: dofs.len(),
                right: values.len(),
            });
        }
        let mut permutation: Vec<_> = (0..dofs.len()).collect();
        permutation.sort_unstable_by_key(|&i| dofs[i]);
        dofs = permutation.iter().map(|&i| dofs[i]).collect();
        values = permutation.iter().map(|&i| values[i]).collect();
        if let Some(duplicate) = dofs.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConstraintError::DuplicatePrescribedValue { dof: duplicate[0] });
        }
        Ok(Self { dofs, values })
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The prescribed value on `dof`, if any.
    pub fn value(&self, dof: usize) -> Option<T> {
        self.dofs
            .binary_search(&dof)
            .ok()
            .map(|idx| self.values[idx])
    }
}

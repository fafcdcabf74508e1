//! Assembly of nested (block) vectors.
//!
//! Block systems pair one linear form and one constraint per block; the
//! functions here fan the plain-vector assembly of
//! [`global`](crate::assembly::global) out over the blocks.

use crate::assembly::global::VectorAssembler;
use crate::assembly::local::ElementVectorAssembler;
use crate::constraint::MultiPointConstraint;
use crate::error::ConstraintError;
use crate::la::{DistVector, NestedVector};
use itertools::izip;
use nalgebra::RealField;

/// A zero nested vector with one block per (form, constraint) pair, each
/// block sized to its constraint's index map.
///
/// Fails with [`ConstraintError::LengthMismatch`] before any allocation when
/// the list lengths disagree.
pub fn create_vector_nest<T: RealField + Copy>(
    forms: &[&dyn ElementVectorAssembler<T>],
    constraints: &[MultiPointConstraint<T>],
) -> Result<DistVector<T>, ConstraintError> {
    if forms.len() != constraints.len() {
        return Err(ConstraintError::LengthMismatch {
            what: "forms/constraints",
            left: forms.len(),
            right: constraints.len(),
        });
    }
    let blocks = constraints
        .iter()
        .map(MultiPointConstraint::create_vector)
        .collect();
    Ok(DistVector::Nest(NestedVector::from_blocks(blocks)))
}

/// Assemble one linear form per block into the nested vector `b`.
///
/// Block `i` is assembled from `forms[i]` under `constraints[i]`, with the
/// zero → accumulate → reverse scatter contract of
/// [`VectorAssembler::assemble_vector_in_place`] applied per block. Block
/// order is significant only for reproducibility of floating-point summation.
///
/// Fails with [`ConstraintError::LengthMismatch`] when the number of forms,
/// constraints and blocks disagree, and with
/// [`ConstraintError::WrongVectorKind`] when `b` is a plain vector.
pub fn assemble_vector_nest<T: RealField + Copy>(
    b: &mut DistVector<T>,
    forms: &[&dyn ElementVectorAssembler<T>],
    constraints: &[MultiPointConstraint<T>],
) -> eyre::Result<()> {
    if forms.len() != constraints.len() {
        return Err(ConstraintError::LengthMismatch {
            what: "forms/constraints",
            left: forms.len(),
            right: constraints.len(),
        }
        .into());
    }
    let nest = b.as_nest_mut()?;
    if nest.num_blocks() != forms.len() {
        return Err(ConstraintError::LengthMismatch {
            what: "blocks/forms",
            left: nest.num_blocks(),
            right: forms.len(),
        }
        .into());
    }
    let assembler = VectorAssembler::default();
    for (form, constraint, block) in izip!(forms, constraints, nest.blocks_mut()) {
        assembler.assemble_vector_in_place(*form, constraint, block)?;
    }
    Ok(())
}

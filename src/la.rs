//! Linear-algebra containers for constrained assembly.
//!
//! The types in this module mirror the small slice of a distributed
//! vector/matrix backend that constrained assembly requires: an index map
//! describing owned and ghost degrees of freedom, a global vector with scoped
//! local views and a reverse scatter-add, and a nested (block) vector for
//! multi-field problems.

mod index_map;
mod nest;
mod vector;

pub use index_map::IndexMap;
pub use nest::NestedVector;
pub use vector::{DistVector, GlobalVector, LocalForm, VectorKind};

//! Assembly of constrained global vectors and matrices.
//!
//! [`local`] holds the boundary towards the external form compiler: traits
//! producing local element vectors/matrices and dof connectivity. [`global`]
//! accumulates those local contributions into global objects under a
//! [`MultiPointConstraint`](crate::constraint::MultiPointConstraint),
//! and [`nest`] composes multiple constrained subsystems into block
//! structures.

pub mod global;
pub mod local;
pub mod nest;

//! Multi-point constraint assembly for finite element computations.
//!
//! A *multi-point constraint* (MPC) ties one degree of freedom, the *slave*,
//! to a linear combination of *master* degrees of freedom plus a constant
//! offset. Periodic boundary conditions and tying constraints between
//! non-matching meshes are the typical sources of such relations.
//!
//! This crate owns the constraint bookkeeping and the constrained global
//! assembly: local element vectors and matrices produced by an external form
//! compiler are accumulated into global objects in which every slave
//! contribution has been redistributed onto its masters, and the right-hand
//! side is corrected ("lifted") for the eliminated degrees of freedom. The
//! element kernels themselves and the linear solver consuming the assembled
//! system are external collaborators, reached only through the traits in
//! [`assembly::local`].
//!
//! The main entry points are [`constraint::MultiPointConstraint`] for defining
//! relations, [`assembly::global::VectorAssembler`] and
//! [`assembly::global::MatrixAssembler`] for assembly,
//! [`assembly::global::apply_lifting`] for right-hand side corrections and
//! [`assembly::nest`] for block-structured multi-field problems.

pub mod assembly;
pub mod bc;
pub mod constraint;
pub mod error;
pub mod instrumentation;
pub mod la;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

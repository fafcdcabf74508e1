//! Error types for constraint definition and constrained assembly.

use crate::la::VectorKind;
use thiserror::Error;

/// Errors arising from constraint definition or constrained assembly.
///
/// Every variant indicates a programming error in problem setup rather than a
/// transient condition: none of them are meaningful to retry. Since assembly
/// involves collective synchronization across processes, an error raised on
/// one process must abort the whole operation; local recovery would leave the
/// collective protocol desynchronized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// A constraint relation is malformed, or the slave → master graph turned
    /// out to be cyclic at finalization.
    #[error("invalid relation for slave dof {slave}: {reason}")]
    InvalidRelation { slave: usize, reason: String },

    /// The store has been finalized and no longer accepts new relations.
    #[error("constraint store is finalized; relations can no longer be added")]
    FrozenStore,

    /// Recursive master expansion exceeded the configured depth limit.
    ///
    /// Cycles are already rejected at finalization, so hitting this limit
    /// means an accidentally deep (but finite) master chain.
    #[error("constraint expansion exceeded maximum depth {max_depth} at dof {dof}")]
    ConstraintDepthExceeded { dof: usize, max_depth: usize },

    /// A dof was given more than one prescribed boundary value.
    #[error("dof {dof} has more than one prescribed value")]
    DuplicatePrescribedValue { dof: usize },

    /// Two parallel lists that must correspond entry-wise have different
    /// lengths.
    #[error("length mismatch for {what}: {left} vs {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    /// A nested-vector operation was handed a vector of the wrong kind.
    #[error("wrong vector kind: expected {expected} vector, found {found} vector")]
    WrongVectorKind {
        expected: VectorKind,
        found: VectorKind,
    },
}

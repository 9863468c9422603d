//! Error types for the operation model
//!
//! Every variant here is a programming error in the caller: the search layer
//! handed over a malformed type model or test.

use crate::model::TypeIdx;
use crate::operation::{OpId, Reference};

/// Errors while building a [`crate::TypeModel`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// No subject type was declared
    #[error("type model has no subject type")]
    MissingSubject,

    /// More than one subject type was declared
    #[error("type model declares more than one subject type")]
    MultipleSubjects,

    /// A type name was declared twice
    #[error("type declared twice: {0}")]
    DuplicateType(String),

    /// A member refers to an undeclared type
    #[error("unknown type {0}")]
    UnknownType(TypeIdx),

    /// Static methods have no receiver to observe
    #[error("static method cannot be an observer: {0}")]
    StaticObserver(String),
}

/// Invariant violations in a [`crate::Test`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// Two steps share one operation identity
    #[error("duplicate operation identity {0}")]
    DuplicateOperation(OpId),

    /// A reference names an undeclared type
    #[error("{reference} in {op} has an unknown type")]
    UnknownType {
        /// Offending step
        op: OpId,
        /// Offending reference
        reference: Reference,
    },

    /// A reference points past its type's pool
    #[error("{reference} in {op} is outside a pool of {pool} slots")]
    DanglingSlot {
        /// Offending step
        op: OpId,
        /// Offending reference
        reference: Reference,
        /// Pool size of the reference's type
        pool: u32,
    },

    /// The operation does not match the model's member tables
    #[error("{op} is malformed: {reason}")]
    Malformed {
        /// Offending step
        op: OpId,
        /// What is wrong
        reason: String,
    },
}

impl IrError {
    /// Create malformed-operation error
    pub fn malformed(op: OpId, reason: impl Into<String>) -> Self {
        Self::Malformed {
            op,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = IrError::DanglingSlot {
            op: OpId(3),
            reference: Reference::new(TypeIdx(1), 9),
            pool: 4,
        };
        assert_eq!(err.to_string(), "t1#9 in op3 is outside a pool of 4 slots");
        assert_eq!(
            ModelError::DuplicateType("Stack".into()).to_string(),
            "type declared twice: Stack"
        );
    }
}

//! Fragment IR
//!
//! The intermediate representation shared by the splitter, the
//! canonicalization pipeline and the coalescing evaluator.
//!
//! # Core Concepts
//!
//! - [`TypeModel`]: types, reference pools and members available to a subject's tests
//! - [`Reference`]: a typed value slot
//! - [`Operation`]: the closed instruction set, with structural def/use extraction
//! - [`Test`] / [`Fragment`] / [`CanonicalFragment`]: whole candidates, their
//!   independent pieces, and the normal form used as a cache key
//! - [`Fingerprint`]: 32-byte Blake3 content digest
//!
//! # Example
//!
//! ```rust,ignore
//! use frag_ir::{Operation, Reference, Test, TypeModel};
//!
//! let mut b = TypeModel::builder();
//! let stack = b.add_subject("Stack", 2);
//! let new_stack = b.add_constructor(stack, vec![], false);
//! let model = std::sync::Arc::new(b.build()?);
//!
//! let test = Test::from_operations(model, [Operation::CreateObject {
//!     target: Some(Reference::new(stack, 0)),
//!     constructor: new_stack,
//!     params: vec![],
//! }])?;
//! ```

#![warn(unreachable_pub)]

mod error;
mod fingerprint;
mod model;
mod operation;
mod program;

pub use error::{IrError, ModelError};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use model::{
    ConstructorId, ConstructorInfo, MethodId, MethodInfo, StaticValueId, StaticValueInfo,
    TypeIdx, TypeInfo, TypeKind, TypeModel, TypeModelBuilder,
};
pub use operation::{Literal, OpId, Operands, Operation, Reference, Step, StepDisplay};
pub use program::{CanonicalFragment, Fragment, Test};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

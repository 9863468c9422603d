//! Operations over typed reference slots
//!
//! [`Operation`] is the closed instruction set of a candidate test. Every
//! downstream component works from the structural def/use extraction defined
//! here, so equality, ordering and hashing are purely structural.

use crate::model::{ConstructorId, MethodId, StaticValueId, TypeIdx, TypeKind, TypeModel};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Operand list returned by the def/use extractors
pub type Operands = SmallVec<[Reference; 4]>;

/// A value slot: position `slot` in the reference pool of type `ty`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Declared type of the slot
    pub ty: TypeIdx,
    /// Position within the type's pool
    pub slot: u32,
}

impl Reference {
    /// Create a reference
    #[inline]
    #[must_use]
    pub const fn new(ty: TypeIdx, slot: u32) -> Self {
        Self { ty, slot }
    }

    /// Same type, different slot
    #[inline]
    #[must_use]
    pub const fn with_slot(self, slot: u32) -> Self {
        Self { ty: self.ty, slot }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ty, self.slot)
    }
}

/// Primitive literal
///
/// Floats are stored as their bit pattern so literals are totally ordered
/// and hashable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Literal {
    /// Boolean
    Bool(bool),
    /// Any integral value
    Int(i64),
    /// IEEE-754 double, as bits
    Float(u64),
    /// Character
    Char(char),
    /// String
    Str(String),
}

impl Literal {
    /// Float literal
    #[inline]
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::Float(value.to_bits())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// A single operation of a test
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Clear every slot binding
    Reset,
    /// `target = Declaring.CONSTANT` (or `null`)
    AssignConstant {
        /// Assigned slot
        target: Reference,
        /// Static value, `None` for null
        value: Option<StaticValueId>,
    },
    /// `target = literal` (or `null`)
    AssignPrimitive {
        /// Assigned slot
        target: Reference,
        /// Literal, `None` for null
        value: Option<Literal>,
    },
    /// `target = new T(params)`
    CreateObject {
        /// Assigned slot, if the result is kept
        target: Option<Reference>,
        /// Constructor called
        constructor: ConstructorId,
        /// Arguments
        params: Vec<Reference>,
    },
    /// `target = receiver.method(params)`
    Invoke {
        /// Assigned slot, if the result is kept
        target: Option<Reference>,
        /// Receiver, `None` for static calls
        receiver: Option<Reference>,
        /// Method called
        method: MethodId,
        /// Arguments
        params: Vec<Reference>,
    },
}

impl Operation {
    /// Slot assigned by this operation
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<Reference> {
        match self {
            Self::Reset => None,
            Self::AssignConstant { target, .. } | Self::AssignPrimitive { target, .. } => {
                Some(*target)
            }
            Self::CreateObject { target, .. } | Self::Invoke { target, .. } => *target,
        }
    }

    /// Slots read by this operation: receiver first, then arguments in order
    #[must_use]
    pub fn uses(&self) -> Operands {
        match self {
            Self::Reset | Self::AssignConstant { .. } | Self::AssignPrimitive { .. } => {
                Operands::new()
            }
            Self::CreateObject { params, .. } => params.iter().copied().collect(),
            Self::Invoke {
                receiver, params, ..
            } => receiver.iter().chain(params.iter()).copied().collect(),
        }
    }

    /// Slots this operation may write: its target, plus the receiver and
    /// object-typed arguments of a call that is not pure
    #[must_use]
    pub fn defs(&self, model: &TypeModel) -> Operands {
        let mut defs: Operands = self.target().into_iter().collect();
        for slot in self.mutated(model) {
            if !defs.contains(&slot) {
                defs.push(slot);
            }
        }
        defs
    }

    /// Operands whose state a non-pure call may change
    #[must_use]
    pub fn mutated(&self, model: &TypeModel) -> Operands {
        if self.is_pure(model) {
            return Operands::new();
        }
        let mut out = Operands::new();
        for slot in self.uses() {
            if model.kind_of(slot.ty) == TypeKind::Object && !out.contains(&slot) {
                out.push(slot);
            }
        }
        out
    }

    /// Rewrite every read operand through `f`; targets are left alone
    pub fn map_uses(&mut self, mut f: impl FnMut(Reference) -> Reference) {
        match self {
            Self::Reset | Self::AssignConstant { .. } | Self::AssignPrimitive { .. } => {}
            Self::CreateObject { params, .. } => {
                for p in params.iter_mut() {
                    *p = f(*p);
                }
            }
            Self::Invoke {
                receiver, params, ..
            } => {
                if let Some(r) = receiver.as_mut() {
                    *r = f(*r);
                }
                for p in params.iter_mut() {
                    *p = f(*p);
                }
            }
        }
    }

    /// Rewrite the target through `f`
    pub fn map_target(&mut self, f: impl FnOnce(Reference) -> Reference) {
        match self {
            Self::Reset => {}
            Self::AssignConstant { target, .. } | Self::AssignPrimitive { target, .. } => {
                *target = f(*target);
            }
            Self::CreateObject { target, .. } | Self::Invoke { target, .. } => {
                if let Some(t) = target.as_mut() {
                    *t = f(*t);
                }
            }
        }
    }

    /// Drop the result binding of a call; assignments and `Reset` are unchanged
    pub fn strip_target(&mut self) {
        if let Self::CreateObject { target, .. } | Self::Invoke { target, .. } = self {
            *target = None;
        }
    }

    /// `true` for `CreateObject` and `Invoke`
    #[inline]
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Self::CreateObject { .. } | Self::Invoke { .. })
    }

    /// Call without effects beyond its result. Assignments are pure, `Reset`
    /// and calls to unknown members are not.
    #[must_use]
    pub fn is_pure(&self, model: &TypeModel) -> bool {
        match self {
            Self::Reset => false,
            Self::AssignConstant { .. } | Self::AssignPrimitive { .. } => true,
            Self::CreateObject { constructor, .. } => {
                model.constructor(*constructor).is_some_and(|c| c.pure)
            }
            Self::Invoke { method, .. } => model.method(*method).is_some_and(|m| m.pure),
        }
    }

    /// Read-only accessor call eligible for observer merging
    #[must_use]
    pub fn is_observer_call(&self, model: &TypeModel) -> bool {
        match self {
            Self::Invoke {
                receiver: Some(_),
                method,
                ..
            } => model.method(*method).is_some_and(|m| m.observer),
            _ => false,
        }
    }

    /// Static call (no receiver) to a known or unknown method
    #[inline]
    #[must_use]
    pub fn is_static_call(&self) -> bool {
        matches!(self, Self::Invoke { receiver: None, .. })
    }

    /// Whether the operation exercises the subject type: an operand of the
    /// subject type, or a member declared by it
    #[must_use]
    pub fn touches_subject(&self, model: &TypeModel) -> bool {
        let subject = model.subject();
        if self.target().is_some_and(|t| t.ty == subject)
            || self.uses().iter().any(|r| r.ty == subject)
        {
            return true;
        }
        match self {
            Self::Reset | Self::AssignPrimitive { .. } => false,
            Self::AssignConstant { value, .. } => value
                .and_then(|v| model.static_value(v))
                .is_some_and(|s| s.declaring == subject),
            Self::CreateObject { constructor, .. } => model
                .constructor(*constructor)
                .is_some_and(|c| c.declaring == subject),
            Self::Invoke { method, .. } => {
                model.method(*method).is_some_and(|m| m.declaring == subject)
            }
        }
    }

    /// Check the operation against the model's member tables.
    ///
    /// Returns a description of the first problem found. Slot ranges are not
    /// checked here; see [`crate::Test::new`].
    #[must_use]
    pub fn malformation(&self, model: &TypeModel) -> Option<String> {
        for r in self.target().into_iter().chain(self.uses()) {
            if model.type_info(r.ty).is_none() {
                return Some(format!("reference {r} has unknown type"));
            }
        }
        match self {
            Self::Reset | Self::AssignPrimitive { .. } => None,
            Self::AssignConstant { value, .. } => value
                .filter(|v| model.static_value(*v).is_none())
                .map(|v| format!("unknown static value {v}")),
            Self::CreateObject {
                constructor,
                params,
                ..
            } => match model.constructor(*constructor) {
                None => Some(format!("unknown constructor {constructor}")),
                Some(c) if c.params.len() != params.len() => Some(format!(
                    "{constructor} takes {} arguments, got {}",
                    c.params.len(),
                    params.len()
                )),
                Some(_) => None,
            },
            Self::Invoke {
                receiver,
                method,
                params,
                ..
            } => match model.method(*method) {
                None => Some(format!("unknown method {method}")),
                Some(m) if m.params.len() != params.len() => Some(format!(
                    "{} takes {} arguments, got {}",
                    m.name,
                    m.params.len(),
                    params.len()
                )),
                Some(m) if m.is_static == receiver.is_some() => {
                    Some(format!("receiver mismatch calling {}", m.name))
                }
                Some(_) => None,
            },
        }
    }

    /// Stable rank of the operation kind
    #[inline]
    #[must_use]
    pub fn kind_rank(&self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::AssignConstant { .. } => 1,
            Self::AssignPrimitive { .. } => 2,
            Self::CreateObject { .. } => 3,
            Self::Invoke { .. } => 4,
        }
    }
}

/// Identity of an operation within a test (arena index, not a position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// An operation placed in a test, with the failure it raised when the
/// candidate was last executed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Step {
    /// Stable identity
    pub id: OpId,
    /// The operation
    pub op: Operation,
    /// Exception type name recorded for this operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Step {
    /// Step with no recorded failure
    #[inline]
    #[must_use]
    pub fn new(id: OpId, op: Operation) -> Self {
        Self {
            id,
            op,
            failure: None,
        }
    }

    /// Record a failure on this step
    #[inline]
    #[must_use]
    pub fn with_failure(mut self, exception: impl Into<String>) -> Self {
        self.failure = Some(exception.into());
        self
    }
}

impl Step {
    /// Render with the model's type and member names
    #[inline]
    #[must_use]
    pub fn display<'a>(&'a self, model: &'a TypeModel) -> StepDisplay<'a> {
        StepDisplay { step: self, model }
    }
}

/// Human-readable form of a [`Step`], from [`Step::display`]
#[derive(Debug, Clone, Copy)]
pub struct StepDisplay<'a> {
    step: &'a Step,
    model: &'a TypeModel,
}

impl StepDisplay<'_> {
    fn short_name(&self, ty: TypeIdx) -> &str {
        let name = self.model.type_name(ty);
        name.rsplit('.').next().unwrap_or(name)
    }

    fn reference(&self, f: &mut fmt::Formatter<'_>, r: Reference) -> fmt::Result {
        write!(f, "{}#{}", self.short_name(r.ty), r.slot)
    }

    fn arguments(&self, f: &mut fmt::Formatter<'_>, params: &[Reference]) -> fmt::Result {
        f.write_str("(")?;
        for (n, p) in params.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            self.reference(f, *p)?;
        }
        f.write_str(")")
    }

    fn assigned(&self, f: &mut fmt::Formatter<'_>, target: Option<Reference>) -> fmt::Result {
        if let Some(t) = target {
            self.reference(f, t)?;
            f.write_str(" = ")?;
        }
        Ok(())
    }
}

impl fmt::Display for StepDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model;
        match &self.step.op {
            Operation::Reset => f.write_str("reset")?,
            Operation::AssignConstant { target, value } => {
                self.assigned(f, Some(*target))?;
                match (*value).and_then(|v| model.static_value(v)) {
                    Some(s) => write!(f, "{}.{}", self.short_name(s.declaring), s.name)?,
                    None if value.is_some() => write!(f, "<unknown static>")?,
                    None => f.write_str("null")?,
                }
            }
            Operation::AssignPrimitive { target, value } => {
                self.assigned(f, Some(*target))?;
                match value {
                    Some(literal) => write!(f, "{literal}")?,
                    None => f.write_str("null")?,
                }
            }
            Operation::CreateObject {
                target,
                constructor,
                params,
            } => {
                self.assigned(f, *target)?;
                match model.constructor(*constructor) {
                    Some(c) => write!(f, "new {}", self.short_name(c.declaring))?,
                    None => write!(f, "new <{constructor}>")?,
                }
                self.arguments(f, params)?;
            }
            Operation::Invoke {
                target,
                receiver,
                method,
                params,
            } => {
                self.assigned(f, *target)?;
                let info = model.method(*method);
                match (receiver, info) {
                    (Some(r), _) => self.reference(f, *r)?,
                    (None, Some(m)) => f.write_str(self.short_name(m.declaring))?,
                    (None, None) => f.write_str("<static>")?,
                }
                match info {
                    Some(m) => write!(f, ".{}", m.name)?,
                    None => write!(f, ".<{method}>")?,
                }
                self.arguments(f, params)?;
            }
        }
        if let Some(failure) = &self.step.failure {
            write!(f, "  // throws {failure}")?;
        }
        Ok(())
    }
}

//! Type model for a subject under test
//!
//! A [`TypeModel`] is built once per subject type by the search layer and
//! shared (behind an `Arc`) by every test, fragment and canonical fragment
//! derived from it. It declares the types that appear in tests, the size of
//! each type's reference pool, and the members operations may call.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning table
            #[inline]
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_type!(
    /// Index of a type in the model
    TypeIdx,
    "t"
);
index_type!(
    /// Index of a constructor in the model
    ConstructorId,
    "ctor"
);
index_type!(
    /// Index of a method in the model
    MethodId,
    "m"
);
index_type!(
    /// Index of a static value (constant, enum member, field) in the model
    StaticValueId,
    "k"
);

/// Nullability class of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Non-nullable primitive (`int`, `bool`)
    Primitive,
    /// Nullable primitive wrapper (`Integer`, `String`)
    Boxed,
    /// Any other reference type
    Object,
}

impl TypeKind {
    /// Primitive or boxed primitive
    #[inline]
    #[must_use]
    pub fn is_primitive_like(self) -> bool {
        matches!(self, Self::Primitive | Self::Boxed)
    }
}

/// A declared type and its reference pool size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Fully qualified type name
    pub name: String,
    /// Nullability class
    pub kind: TypeKind,
    /// Number of reference slots in this type's pool
    pub slots: u32,
}

/// A constructor of some declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorInfo {
    /// Type being constructed
    pub declaring: TypeIdx,
    /// Parameter types
    pub params: Vec<TypeIdx>,
    /// Constructor has no effect beyond building its result
    pub pure: bool,
}

/// A method of some declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Declaring type
    pub declaring: TypeIdx,
    /// Simple method name
    pub name: String,
    /// Called without a receiver
    pub is_static: bool,
    /// Parameter types
    pub params: Vec<TypeIdx>,
    /// Return type, `None` for void
    pub returns: Option<TypeIdx>,
    /// Method does not mutate its receiver or arguments
    pub pure: bool,
    /// Read-only accessor; identical calls may be merged
    pub observer: bool,
}

/// A static value (constant, enum member) of some declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticValueInfo {
    /// Declaring type
    pub declaring: TypeIdx,
    /// Simple name
    pub name: String,
    /// Value type
    pub ty: TypeIdx,
}

/// Types and members available to the tests of one subject type
///
/// Deserialized models go through the same checks as [`TypeModelBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModelParts")]
pub struct TypeModel {
    subject: TypeIdx,
    types: Vec<TypeInfo>,
    constructors: Vec<ConstructorInfo>,
    methods: Vec<MethodInfo>,
    statics: Vec<StaticValueInfo>,
}

/// Unchecked serialized form of a [`TypeModel`]
#[derive(Deserialize)]
struct ModelParts {
    subject: TypeIdx,
    types: Vec<TypeInfo>,
    constructors: Vec<ConstructorInfo>,
    methods: Vec<MethodInfo>,
    statics: Vec<StaticValueInfo>,
}

impl TryFrom<ModelParts> for TypeModel {
    type Error = ModelError;

    fn try_from(parts: ModelParts) -> Result<Self, Self::Error> {
        let mut b = TypeModelBuilder::default();
        for (n, info) in parts.types.into_iter().enumerate() {
            if parts.subject.index() == n {
                b.add_subject(info.name, info.slots);
            } else {
                b.add_type(info.name, info.kind, info.slots);
            }
        }
        for c in parts.constructors {
            b.add_constructor(c.declaring, c.params, c.pure);
        }
        for m in parts.methods {
            b.add_method(m);
        }
        for v in parts.statics {
            b.add_static(v.declaring, v.name, v.ty);
        }
        b.build()
    }
}

impl TypeModel {
    /// Start building a model
    #[inline]
    #[must_use]
    pub fn builder() -> TypeModelBuilder {
        TypeModelBuilder::default()
    }

    /// The subject type
    #[inline]
    #[must_use]
    pub fn subject(&self) -> TypeIdx {
        self.subject
    }

    /// Name of the subject type
    #[inline]
    #[must_use]
    pub fn subject_name(&self) -> &str {
        &self.types[self.subject.index()].name
    }

    /// Look up a type
    #[inline]
    #[must_use]
    pub fn type_info(&self, ty: TypeIdx) -> Option<&TypeInfo> {
        self.types.get(ty.index())
    }

    /// Type name, or `"?"` for an unknown index
    #[inline]
    #[must_use]
    pub fn type_name(&self, ty: TypeIdx) -> &str {
        self.type_info(ty).map_or("?", |t| t.name.as_str())
    }

    /// Nullability class of a type, `Object` for an unknown index
    #[inline]
    #[must_use]
    pub fn kind_of(&self, ty: TypeIdx) -> TypeKind {
        self.type_info(ty).map_or(TypeKind::Object, |t| t.kind)
    }

    /// Look up a constructor
    #[inline]
    #[must_use]
    pub fn constructor(&self, id: ConstructorId) -> Option<&ConstructorInfo> {
        self.constructors.get(id.index())
    }

    /// Look up a method
    #[inline]
    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodInfo> {
        self.methods.get(id.index())
    }

    /// Look up a static value
    #[inline]
    #[must_use]
    pub fn static_value(&self, id: StaticValueId) -> Option<&StaticValueInfo> {
        self.statics.get(id.index())
    }

    /// Number of declared types
    #[inline]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

/// Fluent builder for [`TypeModel`]
#[derive(Debug, Default)]
pub struct TypeModelBuilder {
    subject: Option<TypeIdx>,
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeIdx>,
    constructors: Vec<ConstructorInfo>,
    methods: Vec<MethodInfo>,
    statics: Vec<StaticValueInfo>,
    errors: Vec<ModelError>,
}

impl TypeModelBuilder {
    /// Declare a type with a pool of `slots` references
    pub fn add_type(&mut self, name: impl Into<String>, kind: TypeKind, slots: u32) -> TypeIdx {
        let name = name.into();
        if let Some(&existing) = self.by_name.get(&name) {
            self.errors.push(ModelError::DuplicateType(name));
            return existing;
        }
        let idx = TypeIdx(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.by_name.insert(name.clone(), idx);
        self.types.push(TypeInfo { name, kind, slots });
        idx
    }

    /// Declare the subject type
    pub fn add_subject(&mut self, name: impl Into<String>, slots: u32) -> TypeIdx {
        let idx = self.add_type(name, TypeKind::Object, slots);
        if self.subject.replace(idx).is_some() {
            self.errors.push(ModelError::MultipleSubjects);
        }
        idx
    }

    /// Declare a constructor
    pub fn add_constructor(
        &mut self,
        declaring: TypeIdx,
        params: Vec<TypeIdx>,
        pure: bool,
    ) -> ConstructorId {
        self.check_types(std::iter::once(declaring).chain(params.iter().copied()));
        let id = ConstructorId(u32::try_from(self.constructors.len()).unwrap_or(u32::MAX));
        self.constructors.push(ConstructorInfo {
            declaring,
            params,
            pure,
        });
        id
    }

    /// Declare a method
    pub fn add_method(&mut self, method: MethodInfo) -> MethodId {
        self.check_types(
            std::iter::once(method.declaring)
                .chain(method.params.iter().copied())
                .chain(method.returns),
        );
        if method.observer && method.is_static {
            self.errors
                .push(ModelError::StaticObserver(method.name.clone()));
        }
        let id = MethodId(u32::try_from(self.methods.len()).unwrap_or(u32::MAX));
        self.methods.push(method);
        id
    }

    /// Declare a static value
    pub fn add_static(
        &mut self,
        declaring: TypeIdx,
        name: impl Into<String>,
        ty: TypeIdx,
    ) -> StaticValueId {
        self.check_types([declaring, ty]);
        let id = StaticValueId(u32::try_from(self.statics.len()).unwrap_or(u32::MAX));
        self.statics.push(StaticValueInfo {
            declaring,
            name: name.into(),
            ty,
        });
        id
    }

    /// Look up a declared type by name
    #[must_use]
    pub fn type_named(&self, name: &str) -> Option<TypeIdx> {
        self.by_name.get(name).copied()
    }

    /// Finish the model
    ///
    /// # Errors
    /// Returns the first problem recorded while building
    pub fn build(mut self) -> Result<TypeModel, ModelError> {
        if !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0));
        }
        let subject = self.subject.ok_or(ModelError::MissingSubject)?;
        Ok(TypeModel {
            subject,
            types: self.types,
            constructors: self.constructors,
            methods: self.methods,
            statics: self.statics,
        })
    }

    fn check_types(&mut self, types: impl IntoIterator<Item = TypeIdx>) {
        for ty in types {
            if ty.index() >= self.types.len() {
                self.errors.push(ModelError::UnknownType(ty));
            }
        }
    }
}

impl MethodInfo {
    /// Instance method with the given shape
    #[must_use]
    pub fn instance(
        declaring: TypeIdx,
        name: impl Into<String>,
        params: Vec<TypeIdx>,
        returns: Option<TypeIdx>,
    ) -> Self {
        Self {
            declaring,
            name: name.into(),
            is_static: false,
            params,
            returns,
            pure: false,
            observer: false,
        }
    }

    /// Static method with the given shape
    #[must_use]
    pub fn static_fn(
        declaring: TypeIdx,
        name: impl Into<String>,
        params: Vec<TypeIdx>,
        returns: Option<TypeIdx>,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::instance(declaring, name, params, returns)
        }
    }

    /// Mark as side-effect free
    #[inline]
    #[must_use]
    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    /// Mark as read-only accessor (implies pure)
    #[inline]
    #[must_use]
    pub fn observer(mut self) -> Self {
        self.pure = true;
        self.observer = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_subject() {
        let mut b = TypeModel::builder();
        b.add_type("int", TypeKind::Primitive, 4);
        assert!(matches!(b.build(), Err(ModelError::MissingSubject)));
    }

    #[test]
    fn builder_rejects_duplicate_type() {
        let mut b = TypeModel::builder();
        b.add_subject("Stack", 2);
        b.add_type("Stack", TypeKind::Object, 2);
        assert!(matches!(b.build(), Err(ModelError::DuplicateType(name)) if name == "Stack"));
    }

    #[test]
    fn builder_rejects_static_observer() {
        let mut b = TypeModel::builder();
        let s = b.add_subject("Stack", 2);
        b.add_method(MethodInfo::static_fn(s, "size", vec![], None).observer());
        assert!(matches!(b.build(), Err(ModelError::StaticObserver(_))));
    }

    #[test]
    fn lookups() {
        let mut b = TypeModel::builder();
        let int = b.add_type("int", TypeKind::Primitive, 4);
        let s = b.add_subject("Stack", 2);
        let push = b.add_method(MethodInfo::instance(s, "push", vec![int], None));
        let model = b.build().unwrap();

        assert_eq!(model.subject(), s);
        assert_eq!(model.subject_name(), "Stack");
        assert_eq!(model.kind_of(int), TypeKind::Primitive);
        assert_eq!(model.method(push).unwrap().name, "push");
        assert!(model.method(MethodId(9)).is_none());
        assert_eq!(model.type_name(TypeIdx(42)), "?");
    }

    fn stack_model() -> TypeModel {
        let mut b = TypeModel::builder();
        let int = b.add_type("int", TypeKind::Primitive, 4);
        let s = b.add_subject("Stack", 2);
        b.add_constructor(s, vec![int], false);
        b.add_method(MethodInfo::instance(s, "peek", vec![], Some(int)).observer());
        b.add_static(s, "EMPTY", s);
        b.build().unwrap()
    }

    #[test]
    fn deserialized_model_matches_built_one() {
        let model = stack_model();
        let json = serde_json::to_string(&model).unwrap();
        let back: TypeModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.subject_name(), "Stack");
    }

    #[test]
    fn deserialized_model_is_validated() {
        let mut json = serde_json::to_value(stack_model()).unwrap();
        json["subject"] = serde_json::json!(7);
        let err = serde_json::from_value::<TypeModel>(json).unwrap_err();
        assert!(err.to_string().contains("no subject type"), "{err}");

        let mut json = serde_json::to_value(stack_model()).unwrap();
        json["methods"][0]["params"] = serde_json::json!([9]);
        let err = serde_json::from_value::<TypeModel>(json).unwrap_err();
        assert!(err.to_string().contains("unknown type"), "{err}");
    }

    #[test]
    fn observer_implies_pure() {
        let m = MethodInfo::instance(TypeIdx(0), "peek", vec![], None).observer();
        assert!(m.pure && m.observer);
    }
}

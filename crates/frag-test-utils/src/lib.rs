//! Testing utilities for the fragment coalescing workspace
//!
//! Shared fixtures: a small `Stack` subject model with operation builders,
//! a synthetic evaluator, and a random candidate generator.

#![allow(missing_docs)]

mod evaluator;
mod generator;

pub use evaluator::{synthetic_coverage, SyntheticEvaluator};
pub use generator::{random_test, GeneratorConfig};

use frag_ir::{
    ConstructorId, Literal, MethodId, MethodInfo, OpId, Operation, Reference, StaticValueId, Step,
    Test, TypeIdx, TypeKind, TypeModel,
};
use std::sync::Arc;

/// `Stack` subject model used throughout the workspace tests
///
/// Pools: `int` 4, `boolean` 2, `Integer` 2, `List` 2, `Stack` 3.
#[derive(Debug, Clone)]
pub struct DemoModel {
    pub model: Arc<TypeModel>,
    pub int: TypeIdx,
    pub boolean: TypeIdx,
    pub boxed: TypeIdx,
    pub list: TypeIdx,
    pub stack: TypeIdx,
    pub new_stack: ConstructorId,
    pub new_stack_sized: ConstructorId,
    pub new_list: ConstructorId,
    pub push: MethodId,
    pub push_boxed: MethodId,
    pub pop: MethodId,
    pub peek: MethodId,
    pub size: MethodId,
    pub is_empty: MethodId,
    pub push_all: MethodId,
    pub list_add: MethodId,
    pub stack_of: MethodId,
    pub reset_counter: MethodId,
    pub abs: MethodId,
    pub get: MethodId,
    pub empty: StaticValueId,
}

impl Default for DemoModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoModel {
    pub fn new() -> Self {
        let mut b = TypeModel::builder();
        let int = b.add_type("int", TypeKind::Primitive, 4);
        let boolean = b.add_type("boolean", TypeKind::Primitive, 2);
        let boxed = b.add_type("java.lang.Integer", TypeKind::Boxed, 2);
        let list = b.add_type("java.util.List", TypeKind::Object, 2);
        let stack = b.add_subject("com.example.Stack", 3);

        let new_stack = b.add_constructor(stack, vec![], false);
        let new_stack_sized = b.add_constructor(stack, vec![int], false);
        let new_list = b.add_constructor(list, vec![], true);

        let push = b.add_method(MethodInfo::instance(stack, "push", vec![int], None));
        let push_boxed = b.add_method(MethodInfo::instance(stack, "pushBoxed", vec![boxed], None));
        let pop = b.add_method(MethodInfo::instance(stack, "pop", vec![], Some(int)));
        let peek = b.add_method(MethodInfo::instance(stack, "peek", vec![], Some(int)).observer());
        let size = b.add_method(MethodInfo::instance(stack, "size", vec![], Some(int)).observer());
        let is_empty = b.add_method(
            MethodInfo::instance(stack, "isEmpty", vec![], Some(boolean)).observer(),
        );
        let push_all = b.add_method(MethodInfo::instance(stack, "pushAll", vec![list], None));
        let list_add = b.add_method(MethodInfo::instance(list, "add", vec![int], Some(boolean)));
        let stack_of = b.add_method(MethodInfo::static_fn(stack, "of", vec![int], Some(stack)));
        let reset_counter = b.add_method(MethodInfo::static_fn(stack, "resetCounter", vec![], None));
        let abs = b.add_method(MethodInfo::static_fn(int, "abs", vec![int], Some(int)).pure());
        let get = b.add_method(MethodInfo::instance(stack, "get", vec![int], Some(int)).observer());
        let empty = b.add_static(stack, "EMPTY", stack);

        let model = b.build().expect("demo model is well formed");
        Self {
            model: Arc::new(model),
            int,
            boolean,
            boxed,
            list,
            stack,
            new_stack,
            new_stack_sized,
            new_list,
            push,
            push_boxed,
            pop,
            peek,
            size,
            is_empty,
            push_all,
            list_add,
            stack_of,
            reset_counter,
            abs,
            get,
            empty,
        }
    }

    pub fn s(&self, slot: u32) -> Reference {
        Reference::new(self.stack, slot)
    }

    pub fn i(&self, slot: u32) -> Reference {
        Reference::new(self.int, slot)
    }

    pub fn b(&self, slot: u32) -> Reference {
        Reference::new(self.boolean, slot)
    }

    pub fn bx(&self, slot: u32) -> Reference {
        Reference::new(self.boxed, slot)
    }

    pub fn l(&self, slot: u32) -> Reference {
        Reference::new(self.list, slot)
    }

    /// Validated test, ids numbered by position
    pub fn test(&self, ops: Vec<Operation>) -> Test {
        Test::from_operations(Arc::clone(&self.model), ops).expect("fixture test is valid")
    }

    /// Validated test from explicit steps
    pub fn test_steps(&self, steps: Vec<Step>) -> Test {
        Test::new(Arc::clone(&self.model), steps).expect("fixture test is valid")
    }

    /// Steps numbered by position
    pub fn steps(&self, ops: Vec<Operation>) -> Vec<Step> {
        ops.into_iter()
            .enumerate()
            .map(|(n, op)| Step::new(OpId(n as u32), op))
            .collect()
    }

    /// `stack#s = new Stack()`
    pub fn new_stack(&self, s: u32) -> Operation {
        Operation::CreateObject {
            target: Some(self.s(s)),
            constructor: self.new_stack,
            params: vec![],
        }
    }

    /// `stack#s = new Stack(int#i)`
    pub fn new_stack_sized(&self, s: u32, i: u32) -> Operation {
        Operation::CreateObject {
            target: Some(self.s(s)),
            constructor: self.new_stack_sized,
            params: vec![self.i(i)],
        }
    }

    /// `list#l = new List()`
    pub fn new_list(&self, l: u32) -> Operation {
        Operation::CreateObject {
            target: Some(self.l(l)),
            constructor: self.new_list,
            params: vec![],
        }
    }

    /// `int#slot = value`
    pub fn int(&self, slot: u32, value: i64) -> Operation {
        Operation::AssignPrimitive {
            target: self.i(slot),
            value: Some(Literal::Int(value)),
        }
    }

    /// `int#slot = null` (only reachable through repair)
    pub fn null_int(&self, slot: u32) -> Operation {
        Operation::AssignPrimitive {
            target: self.i(slot),
            value: None,
        }
    }

    /// `Integer#slot = value` or `null`
    pub fn boxed(&self, slot: u32, value: Option<i64>) -> Operation {
        Operation::AssignPrimitive {
            target: self.bx(slot),
            value: value.map(Literal::Int),
        }
    }

    /// `stack#s = Stack.EMPTY`
    pub fn empty(&self, s: u32) -> Operation {
        Operation::AssignConstant {
            target: self.s(s),
            value: Some(self.empty),
        }
    }

    /// `stack#s = null`
    pub fn null_stack(&self, s: u32) -> Operation {
        Operation::AssignConstant {
            target: self.s(s),
            value: None,
        }
    }

    fn call(&self, target: Option<Reference>, receiver: Reference, method: MethodId, params: Vec<Reference>) -> Operation {
        Operation::Invoke {
            target,
            receiver: Some(receiver),
            method,
            params,
        }
    }

    /// `stack#s.push(int#i)`
    pub fn push(&self, s: u32, i: u32) -> Operation {
        self.call(None, self.s(s), self.push, vec![self.i(i)])
    }

    /// `stack#s.pushBoxed(Integer#b)`
    pub fn push_boxed(&self, s: u32, b: u32) -> Operation {
        self.call(None, self.s(s), self.push_boxed, vec![self.bx(b)])
    }

    /// `stack#s.pop()`, result discarded
    pub fn pop(&self, s: u32) -> Operation {
        self.call(None, self.s(s), self.pop, vec![])
    }

    /// `int#i = stack#s.pop()`
    pub fn pop_into(&self, i: u32, s: u32) -> Operation {
        self.call(Some(self.i(i)), self.s(s), self.pop, vec![])
    }

    /// `int#i = stack#s.peek()`
    pub fn peek(&self, i: u32, s: u32) -> Operation {
        self.call(Some(self.i(i)), self.s(s), self.peek, vec![])
    }

    /// `int#i = stack#s.size()`
    pub fn size(&self, i: u32, s: u32) -> Operation {
        self.call(Some(self.i(i)), self.s(s), self.size, vec![])
    }

    /// `boolean#b = stack#s.isEmpty()`
    pub fn is_empty(&self, b: u32, s: u32) -> Operation {
        self.call(Some(self.b(b)), self.s(s), self.is_empty, vec![])
    }

    /// `stack#s.pushAll(list#l)`
    pub fn push_all(&self, s: u32, l: u32) -> Operation {
        self.call(None, self.s(s), self.push_all, vec![self.l(l)])
    }

    /// `list#l.add(int#i)`, result discarded
    pub fn list_add(&self, l: u32, i: u32) -> Operation {
        self.call(None, self.l(l), self.list_add, vec![self.i(i)])
    }

    /// `stack#s = Stack.of(int#i)`
    pub fn stack_of(&self, s: u32, i: u32) -> Operation {
        Operation::Invoke {
            target: Some(self.s(s)),
            receiver: None,
            method: self.stack_of,
            params: vec![self.i(i)],
        }
    }

    /// `Stack.resetCounter()`
    pub fn reset_counter(&self) -> Operation {
        Operation::Invoke {
            target: None,
            receiver: None,
            method: self.reset_counter,
            params: vec![],
        }
    }

    /// `int#t = stack#s.get(int#i)`
    pub fn get(&self, t: u32, s: u32, i: u32) -> Operation {
        self.call(Some(self.i(t)), self.s(s), self.get, vec![self.i(i)])
    }

    /// `int#t = int.abs(int#i)`
    pub fn abs(&self, t: u32, i: u32) -> Operation {
        Operation::Invoke {
            target: Some(self.i(t)),
            receiver: None,
            method: self.abs,
            params: vec![self.i(i)],
        }
    }
}

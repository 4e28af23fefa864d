// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Reference agent
//!
//! A small single-threaded engine implementing [`Engine`]: a heap of
//! objects with ordinary properties, a class table, a pending exception
//! slot and a mark-and-sweep collector that finalizes class instances.
//! Property access and calls on class instances dispatch to the class's
//! registered traps.

use core::fmt;
use std::{any::Any, rc::Rc};

use ahash::RandomState;
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    engine::{ClassBehaviour, ClassDef, ClassId, Engine, EngineError, OpaqueLink, TrapFailure},
    heap::{CreateHeapData, Heap, ObjectHeapData},
};

pub mod converter;
mod value;

pub use value::{Atom, Object, Value};

#[derive(Debug, Default)]
pub struct Options {
    /// Turns [`Agent::gc`] into a no-op. Instances are still finalized
    /// when the agent is dropped.
    pub disable_gc: bool,
}

pub type JsResult<T> = std::result::Result<T, JsError>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct JsError(pub(crate) Value);

impl JsError {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(self) -> Value {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    Error,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
}

impl ExceptionType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
            Self::SyntaxError => "SyntaxError",
            Self::TypeError => "TypeError",
        }
    }
}

pub struct Agent {
    pub(crate) heap: Heap,
    options: Options,
    classes: HashMap<ClassId, ClassDef<Agent>, RandomState>,
    exception: Option<Value>,
    runtime_opaque: Option<Rc<dyn Any>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("classes", &self.classes)
            .field("exception", &self.exception)
            .field("runtime_opaque", &self.runtime_opaque.is_some())
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(options: Options) -> Self {
        Self {
            heap: Heap::new(),
            options,
            classes: HashMap::default(),
            exception: None,
            runtime_opaque: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Creates an empty ordinary object.
    pub fn create_object(&mut self) -> Object {
        self.heap.create(ObjectHeapData::ordinary())
    }

    /// Creates an error object of the given kind. The error is returned, not
    /// raised.
    pub fn throw_exception(&mut self, kind: ExceptionType, message: &str) -> JsError {
        let error = self.create_object();
        let name = self.heap.intern("name");
        let message_key = self.heap.intern("message");
        let data = &mut self.heap[error];
        data.set(name, Value::from(kind.name()));
        data.set(message_key, Value::from(message));
        JsError(Value::Object(error))
    }

    pub fn is_live(&self, object: Object) -> bool {
        self.heap.is_live(object)
    }

    /// Number of objects that have not been collected.
    pub fn live_objects(&self) -> usize {
        self.heap.objects.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn class_of(&self, object: Object) -> Option<ClassId> {
        self.heap.object(object)?.class_id
    }

    /// ### \[\[Get\]\]
    pub fn get(&mut self, target: &Value, name: &str) -> JsResult<Value> {
        let object = self.expect_object(target)?;
        let atom = self.heap.intern(name);
        match self.behaviour_of(object) {
            ClassBehaviour::Exotic(methods) => {
                trace!(property = name, "dispatching [[Get]] to class trap");
                let value = methods.get_property(self, target, atom, target);
                self.complete(value)
            }
            _ => Ok(self.heap[object].get(atom).cloned().unwrap_or_default()),
        }
    }

    /// ### \[\[Set\]\]
    ///
    /// Returns whether the assignment was accepted.
    pub fn set(&mut self, target: &Value, name: &str, value: Value) -> JsResult<bool> {
        let object = self.expect_object(target)?;
        let atom = self.heap.intern(name);
        match self.behaviour_of(object) {
            ClassBehaviour::Exotic(methods) => {
                trace!(property = name, "dispatching [[Set]] to class trap");
                let status = methods.set_property(self, target, atom, &value, target);
                self.complete(status.into())
            }
            _ => {
                self.heap[object].set(atom, value);
                Ok(true)
            }
        }
    }

    /// ### \[\[OwnPropertyKeys\]\]
    ///
    /// Names of the enumerable own properties of `target`, in order.
    pub fn own_property_keys(&mut self, target: &Value) -> JsResult<Vec<String>> {
        let object = self.expect_object(target)?;
        match self.behaviour_of(object) {
            ClassBehaviour::Exotic(methods) => {
                match methods.get_own_property_names(self, target) {
                    Ok(entries) => {
                        let keys = entries
                            .iter()
                            .filter(|entry| entry.is_enumerable)
                            .map(|entry| self.heap.atom_to_string(entry.atom))
                            .collect();
                        self.complete(keys)
                    }
                    Err(TrapFailure) => Err(match self.exception.take() {
                        Some(error) => JsError(error),
                        None => self.throw_exception(
                            ExceptionType::TypeError,
                            "object failed to enumerate its own properties",
                        ),
                    }),
                }
            }
            _ => Ok(self.heap[object]
                .properties
                .iter()
                .map(|(atom, _)| self.heap.atom_to_string(*atom))
                .collect()),
        }
    }

    /// ### \[\[Call\]\]
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let object = self.expect_object(callee)?;
        let ClassBehaviour::Call(behaviour) = self.behaviour_of(object) else {
            return Err(self.throw_exception(ExceptionType::TypeError, "value is not a function"));
        };
        trace!(argc = args.len(), "dispatching [[Call]] to class trap");
        let result = behaviour.call(self, callee, this, args);
        self.complete(result)
    }

    /// Collects every object not reachable from `roots`, running class
    /// finalizers before any slot is released.
    pub fn gc(&mut self, roots: &[Value]) {
        if self.options.disable_gc {
            return;
        }
        self.collect(roots);
    }

    fn collect(&mut self, roots: &[Value]) {
        let dead = self.heap.unreachable_objects(roots);
        if dead.is_empty() {
            return;
        }
        let mut finalized = 0usize;
        for object in dead.iter().copied() {
            let finalizer = self
                .heap
                .object(object)
                .and_then(|data| data.class_id)
                .and_then(|class_id| self.classes.get(&class_id))
                .and_then(|class_def| class_def.finalizer);
            if let Some(finalizer) = finalizer {
                finalizer(self, &Value::Object(object));
                finalized += 1;
            }
        }
        for object in dead.iter().copied() {
            self.heap.sweep(object);
        }
        debug!(collected = dead.len(), finalized, "garbage collection");
    }

    fn expect_object(&mut self, value: &Value) -> JsResult<Object> {
        match value {
            Value::Object(object) if self.heap.is_live(*object) => Ok(*object),
            Value::Object(_) => Err(self.throw_exception(
                ExceptionType::ReferenceError,
                "object has been collected",
            )),
            _ => Err(self.throw_exception(ExceptionType::TypeError, "value is not an object")),
        }
    }

    fn behaviour_of(&self, object: Object) -> ClassBehaviour<Agent> {
        self.class_of(object)
            .and_then(|class_id| self.classes.get(&class_id))
            .map_or(ClassBehaviour::Ordinary, |class_def| class_def.behaviour.clone())
    }

    /// Turns an error raised during a trap into the operation's result.
    fn complete<T>(&mut self, value: T) -> JsResult<T> {
        match self.exception.take() {
            Some(error) => Err(JsError(error)),
            None => Ok(value),
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.collect(&[]);
        }
    }
}

impl Engine for Agent {
    type Value = Value;
    type Atom = Atom;

    fn undefined(&self) -> Value {
        Value::Undefined
    }

    fn is_registered_class(&self, class_id: ClassId) -> bool {
        self.classes.contains_key(&class_id)
    }

    fn new_class(&mut self, class_id: ClassId, class_def: ClassDef<Self>) -> Result<(), EngineError> {
        if self.classes.contains_key(&class_id) {
            return Err(EngineError::ClassAlreadyRegistered(class_id));
        }
        self.classes.insert(class_id, class_def);
        Ok(())
    }

    fn new_object_class(&mut self, class_id: ClassId) -> Result<Value, EngineError> {
        if !self.classes.contains_key(&class_id) {
            return Err(EngineError::ClassNotRegistered(class_id));
        }
        Ok(Value::Object(self.heap.create(ObjectHeapData::instance(class_id))))
    }

    fn set_opaque(&mut self, value: &Value, link: OpaqueLink) -> Result<(), EngineError> {
        let object = value.as_object().ok_or(EngineError::NotAnObject)?;
        let data = self.heap.object_mut(object).ok_or(EngineError::NotAnObject)?;
        let slot = data.opaque.as_mut().ok_or(EngineError::NoOpaqueSlot)?;
        *slot = link;
        Ok(())
    }

    fn get_opaque(&mut self, value: &Value, class_id: ClassId) -> Option<&mut OpaqueLink> {
        let data = self.heap.object_mut(value.as_object()?)?;
        if data.class_id != Some(class_id) {
            return None;
        }
        data.opaque.as_mut()
    }

    fn get_opaque2(&mut self, value: &Value, class_id: ClassId) -> Option<&mut OpaqueLink> {
        if self.get_opaque(value, class_id).is_none() {
            let error = self.throw_exception(
                ExceptionType::TypeError,
                "value is not an instance of the expected class",
            );
            self.throw(error.value());
            return None;
        }
        self.get_opaque(value, class_id)
    }

    fn throw(&mut self, error: Value) {
        self.exception = Some(error);
    }

    fn new_atom(&mut self, name: &str) -> Atom {
        self.heap.intern(name)
    }

    fn atom_to_string(&self, atom: Atom) -> String {
        self.heap.atom_to_string(atom)
    }

    fn runtime_opaque(&self) -> Option<Rc<dyn Any>> {
        self.runtime_opaque.clone()
    }

    fn set_runtime_opaque(&mut self, data: Option<Rc<dyn Any>>) {
        self.runtime_opaque = data;
    }
}

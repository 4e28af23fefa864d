// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Engine interface
//!
//! The primitives this crate consumes from an embedded engine: class
//! registration keyed by a numeric [`ClassId`], a per-value [`OpaqueLink`]
//! slot with a class-checked and an unchecked accessor, an error-raise
//! primitive, atom and string conversion for property names, and one
//! runtime-wide opaque slot where the host runtime keeps its state.
//!
//! The engine drives property access and calls on class instances through
//! the [`ExoticMethods`] and [`CallBehaviour`] traits registered in a
//! [`ClassDef`], and tells the class about collected instances through its
//! [`Finalizer`].

use core::{
    fmt::{self, Debug, Display},
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};
use std::{any::Any, rc::Rc};

use thiserror::Error;

/// Class ids below this value are left to the engine's own classes.
const FIRST_DYNAMIC_CLASS_ID: u32 = 64;

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(FIRST_DYNAMIC_CLASS_ID);

/// Numeric identifier of an engine class.
///
/// Ids are process-wide: an id handed out by [`ClassId::allocate`] is never
/// handed out again, and the same id may be registered with any number of
/// engine runtimes, each holding its own [`ClassDef`] for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClassId(NonZeroU32);

impl ClassId {
    /// Allocates a fresh class id from the process-wide counter.
    pub fn allocate() -> Self {
        let id = NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed);
        assert!(id != u32::MAX, "ClassId space exhausted");
        Self(NonZeroU32::new(id).expect("ClassId counter starts above zero"))
    }

    /// Wraps one of the engine's reserved class ids.
    pub const fn reserved(value: u32) -> Option<Self> {
        if value == 0 || value >= FIRST_DYNAMIC_CLASS_ID {
            return None;
        }
        match NonZeroU32::new(value) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub const fn into_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The per-value record tying an engine object to the native state behind
/// it.
///
/// `native_state` is an index into a table owned by whoever registered the
/// object's class, never an address. Clearing it with [`OpaqueLink::take`]
/// makes any later lookup observe an empty link instead of stale state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueLink {
    pub native_state: Option<NonZeroU32>,
}

impl OpaqueLink {
    pub const EMPTY: Self = Self { native_state: None };

    pub const fn new(native_state: NonZeroU32) -> Self {
        Self {
            native_state: Some(native_state),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.native_state.is_none()
    }

    /// Clears the link, returning what it pointed to.
    pub fn take(&mut self) -> Option<NonZeroU32> {
        self.native_state.take()
    }
}

/// Result of a `[[Set]]` trap. The engine reads it as `1` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SetStatus {
    Rejected = 0,
    Accepted = 1,
}

impl From<bool> for SetStatus {
    fn from(value: bool) -> Self {
        if value { Self::Accepted } else { Self::Rejected }
    }
}

impl From<SetStatus> for bool {
    fn from(value: SetStatus) -> Self {
        value == SetStatus::Accepted
    }
}

/// Failure of an own-property enumeration trap. If the trap raised an
/// error through [`Engine::throw`], that error is what the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFailure;

/// One entry of an own-property enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEnum<A> {
    pub atom: A,
    pub is_enumerable: bool,
}

/// Property traps replacing the engine's ordinary object behaviour.
pub trait ExoticMethods<E: Engine> {
    /// ### \[\[Get\]\]
    ///
    /// When the trap raises an error through [`Engine::throw`] the returned
    /// value is never consulted.
    fn get_property(
        &self,
        engine: &mut E,
        this: &E::Value,
        name: E::Atom,
        receiver: &E::Value,
    ) -> E::Value;

    /// ### \[\[Set\]\]
    fn set_property(
        &self,
        engine: &mut E,
        this: &E::Value,
        name: E::Atom,
        value: &E::Value,
        receiver: &E::Value,
    ) -> SetStatus;

    /// ### \[\[OwnPropertyKeys\]\]
    ///
    /// The returned block holds exactly one entry per own property.
    fn get_own_property_names(
        &self,
        engine: &mut E,
        this: &E::Value,
    ) -> Result<Box<[PropertyEnum<E::Atom>]>, TrapFailure>;
}

/// Call trap making class instances callable.
pub trait CallBehaviour<E: Engine> {
    /// ### \[\[Call\]\]
    ///
    /// When the trap raises an error through [`Engine::throw`] the returned
    /// value is never consulted.
    fn call(&self, engine: &mut E, func_obj: &E::Value, this: &E::Value, args: &[E::Value])
    -> E::Value;
}

/// Called by the engine's collector for every unreachable class instance,
/// while the instance's opaque slot is still readable.
pub type Finalizer<E> = fn(&mut E, &<E as Engine>::Value);

pub enum ClassBehaviour<E: Engine> {
    Ordinary,
    Exotic(Rc<dyn ExoticMethods<E>>),
    Call(Rc<dyn CallBehaviour<E>>),
}

impl<E: Engine> Clone for ClassBehaviour<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Ordinary => Self::Ordinary,
            Self::Exotic(methods) => Self::Exotic(methods.clone()),
            Self::Call(behaviour) => Self::Call(behaviour.clone()),
        }
    }
}

impl<E: Engine> Debug for ClassBehaviour<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinary => f.write_str("Ordinary"),
            Self::Exotic(_) => f.write_str("Exotic"),
            Self::Call(_) => f.write_str("Call"),
        }
    }
}

/// Class definition bundle handed to [`Engine::new_class`].
pub struct ClassDef<E: Engine> {
    pub class_name: &'static str,
    pub finalizer: Option<Finalizer<E>>,
    pub behaviour: ClassBehaviour<E>,
}

impl<E: Engine> Clone for ClassDef<E> {
    fn clone(&self) -> Self {
        Self {
            class_name: self.class_name,
            finalizer: self.finalizer,
            behaviour: self.behaviour.clone(),
        }
    }
}

impl<E: Engine> Debug for ClassDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("class_name", &self.class_name)
            .field("finalizer", &self.finalizer.is_some())
            .field("behaviour", &self.behaviour)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("class {0} is not registered with this runtime")]
    ClassNotRegistered(ClassId),
    #[error("class {0} is already registered with this runtime")]
    ClassAlreadyRegistered(ClassId),
    #[error("value is not an object")]
    NotAnObject,
    #[error("object has no opaque slot")]
    NoOpaqueSlot,
    #[error("runtime opaque slot is held by another embedder")]
    RuntimeOpaqueInUse,
    #[error("no host runtime is installed on this engine")]
    HostRuntimeNotInstalled,
}

/// An engine runtime as seen by the host proxy layer.
///
/// All calls happen on the engine's single evaluation thread.
pub trait Engine: Sized + 'static {
    /// Engine-native value.
    type Value: Clone + Debug;
    /// Engine-native property name.
    type Atom: Copy + Debug + Eq;

    /// The "no value" placeholder returned from traps that raised an error.
    fn undefined(&self) -> Self::Value;

    fn is_registered_class(&self, class_id: ClassId) -> bool;

    /// Registers `class_def` under `class_id`. Registering an id twice is an
    /// error; callers check [`Engine::is_registered_class`] first.
    fn new_class(&mut self, class_id: ClassId, class_def: ClassDef<Self>)
    -> Result<(), EngineError>;

    /// Creates a tracked object of a registered class with an empty
    /// [`OpaqueLink`] slot.
    fn new_object_class(&mut self, class_id: ClassId) -> Result<Self::Value, EngineError>;

    fn set_opaque(&mut self, value: &Self::Value, link: OpaqueLink) -> Result<(), EngineError>;

    /// Quiet opaque lookup, for callers that already know the class of
    /// `value`. Returns `None` without raising when `value` carries no
    /// opaque slot or is not an instance of `class_id`.
    fn get_opaque(&mut self, value: &Self::Value, class_id: ClassId) -> Option<&mut OpaqueLink>;

    /// Class-checked opaque lookup. Raises a `TypeError` and returns `None`
    /// when `value` is not an instance of `class_id`.
    fn get_opaque2(&mut self, value: &Self::Value, class_id: ClassId)
    -> Option<&mut OpaqueLink>;

    /// Raises `error` through the engine's exception channel.
    fn throw(&mut self, error: Self::Value);

    fn new_atom(&mut self, name: &str) -> Self::Atom;

    fn atom_to_string(&self, atom: Self::Atom) -> String;

    fn runtime_opaque(&self) -> Option<Rc<dyn Any>>;

    fn set_runtime_opaque(&mut self, data: Option<Rc<dyn Any>>);
}

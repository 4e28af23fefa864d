// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Host proxies
//!
//! Engine classes whose instances stand in for host objects and host
//! functions. Every instance carries an [`OpaqueLink`] naming a slot in a
//! per-runtime [`ProxyTable`]; the slot holds the native proxy that owns the
//! host behaviour. Traps recover the proxy through the link, convert their
//! inputs with the runtime's [`ValueConverter`], run the host logic through
//! [`invoke_host`] and convert the result back.
//!
//! [`OpaqueLink`]: crate::engine::OpaqueLink

use core::{fmt, num::NonZeroU32};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind, panic_any, resume_unwind},
};

use tracing::{debug, error};

use crate::{
    engine::{ClassDef, ClassId, Engine, EngineError},
    heap::indexes::BaseIndex,
    host::{EngineOf, HostError, HostResult, HostValueOf, ValueConverter},
};

pub mod host_function;
pub mod host_object;

pub use host_function::{HostFunctionProxy, MAX_INLINE_ARGUMENTS};
pub use host_object::HostObjectProxy;

/// How [`resolve`] reaches a value's opaque slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Validates the class and raises a `TypeError` through the engine when
    /// the value is not an instance of it.
    Checked,
    /// Quiet lookup for callers that already know the value's class.
    Unchecked,
}

/// Recovers the native state index stored in `value`'s opaque link.
///
/// Returns `None` when the value has no opaque slot, is not an instance of
/// `class_id`, or its link has been cleared.
pub fn resolve<E: Engine>(
    engine: &mut E,
    value: &E::Value,
    class_id: ClassId,
    lookup: Lookup,
) -> Option<NonZeroU32> {
    let link = match lookup {
        Lookup::Checked => engine.get_opaque2(value, class_id),
        Lookup::Unchecked => engine.get_opaque(value, class_id),
    }?;
    link.native_state
}

/// Registers `class_id` with `engine` unless it already is. The definition
/// is only built when registration happens. Returns whether it did.
pub fn ensure_class_registered<E: Engine>(
    engine: &mut E,
    class_id: ClassId,
    class_def: impl FnOnce() -> ClassDef<E>,
) -> Result<bool, EngineError> {
    if engine.is_registered_class(class_id) {
        return Ok(false);
    }
    let class_def = class_def();
    debug!(
        class_id = class_id.into_u32(),
        class_name = class_def.class_name,
        "registering host proxy class"
    );
    engine.new_class(class_id, class_def)?;
    Ok(true)
}

/// Slot table owning the native proxies of one runtime.
///
/// Removing a proxy empties its slot; the slot may be handed out again
/// afterwards.
#[derive(Debug)]
pub struct ProxyTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<BaseIndex<T>>,
}

impl<T> Default for ProxyTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> ProxyTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, proxy: T) -> BaseIndex<T> {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index.into_index()];
                debug_assert!(slot.is_none());
                *slot = Some(proxy);
                index
            }
            None => {
                let index = BaseIndex::from_index(self.slots.len());
                self.slots.push(Some(proxy));
                index
            }
        }
    }

    pub fn get(&self, index: BaseIndex<T>) -> Option<&T> {
        self.slots.get(index.into_index())?.as_ref()
    }

    pub fn remove(&mut self, index: BaseIndex<T>) -> Option<T> {
        let removed = self.slots.get_mut(index.into_index())?.take()?;
        self.free.push(index);
        Some(removed)
    }

    /// Number of live proxies.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Panic payload of a failure in the proxy bookkeeping itself.
///
/// [`invoke_host`] never swallows it, so it unwinds out of every nested trap
/// up to the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractViolation(pub &'static str);

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host proxy contract violated: {}", self.0)
    }
}

#[cold]
#[track_caller]
pub(crate) fn contract_violation(message: &'static str) -> ! {
    let violation = ContractViolation(message);
    error!("{violation}");
    panic_any(violation)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "host logic panicked".to_owned()
    }
}

/// Runs host logic for `trap` and applies the boundary error policy.
///
/// A structured [`HostError::Js`] is converted and raised through
/// [`Engine::throw`]. Any other failure, including a panic, is swallowed:
/// nothing is raised and the trap reports its "no value" result. Either
/// way `None` is returned and nothing unwinds into engine frames.
pub(crate) fn invoke_host<C: ValueConverter, T>(
    engine: &mut EngineOf<C>,
    converter: &C,
    trap: &'static str,
    host: impl FnOnce(&mut EngineOf<C>) -> HostResult<T, HostValueOf<C>>,
) -> Option<T> {
    let result = match catch_unwind(AssertUnwindSafe(|| host(&mut *engine))) {
        Ok(result) => result,
        Err(payload) if payload.is::<ContractViolation>() => resume_unwind(payload),
        Err(payload) => Err(HostError::native(panic_message(payload.as_ref()))),
    };
    match result {
        Ok(value) => Some(value),
        Err(HostError::Js(error)) => {
            let error = converter.to_engine_value(engine, &error);
            engine.throw(error);
            None
        }
        Err(HostError::Native(error)) => {
            debug!(trap, %error, "swallowed unstructured host failure");
            None
        }
    }
}

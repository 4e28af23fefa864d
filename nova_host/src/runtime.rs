// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Host runtime
//!
//! Per-engine state of the host bridge, kept in the engine's runtime opaque
//! slot: the value converter and the tables owning every live proxy. Host
//! code exposes its objects and functions into the engine through the free
//! functions of this module.

use core::{
    cell::RefCell,
    fmt,
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};
use std::{any::Any, rc::Rc};

use tracing::debug;

use crate::{
    engine::{Engine, EngineError, OpaqueLink},
    host::{EngineOf, EngineValueOf, HostFunctionType, HostObject, ValueConverter},
    proxy::{HostFunctionProxy, HostObjectProxy, Lookup, ProxyTable},
};

static NEXT_RUNTIME_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one installed [`HostRuntime`] for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(NonZeroU32);

impl RuntimeId {
    fn next() -> Self {
        let id = NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed);
        assert!(id != 0, "RuntimeId space exhausted");
        Self(NonZeroU32::new(id).expect("checked above"))
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub struct HostRuntime<C: ValueConverter> {
    id: RuntimeId,
    converter: C,
    host_objects: RefCell<ProxyTable<HostObjectProxy<C>>>,
    host_functions: RefCell<ProxyTable<HostFunctionProxy<C>>>,
}

impl<C: ValueConverter> fmt::Debug for HostRuntime<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRuntime")
            .field("id", &self.id)
            .field("live_host_objects", &self.live_host_objects())
            .field("live_host_functions", &self.live_host_functions())
            .finish()
    }
}

impl<C: ValueConverter> HostRuntime<C> {
    /// Installs a host runtime on `engine` and registers both proxy classes
    /// with it.
    ///
    /// Installing again with the same converter type returns the runtime
    /// that is already there and leaves `converter` unused.
    pub fn install(engine: &mut EngineOf<C>, converter: C) -> Result<Rc<Self>, EngineError> {
        let runtime = match engine.runtime_opaque() {
            Some(data) => data
                .downcast::<Self>()
                .map_err(|_| EngineError::RuntimeOpaqueInUse)?,
            None => {
                let runtime = Rc::new(Self {
                    id: RuntimeId::next(),
                    converter,
                    host_objects: RefCell::new(ProxyTable::new()),
                    host_functions: RefCell::new(ProxyTable::new()),
                });
                engine.set_runtime_opaque(Some(runtime.clone() as Rc<dyn Any>));
                debug!(runtime = %runtime.id, "installed host runtime");
                runtime
            }
        };
        HostObjectProxy::<C>::register_class(engine)?;
        HostFunctionProxy::<C>::register_class(engine)?;
        Ok(runtime)
    }

    /// The runtime installed on `engine`, if any.
    pub fn of(engine: &EngineOf<C>) -> Option<Rc<Self>> {
        engine.runtime_opaque()?.downcast::<Self>().ok()
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Host object proxies whose engine objects have not been finalized.
    pub fn live_host_objects(&self) -> usize {
        self.host_objects.borrow().len()
    }

    /// Host function proxies whose engine objects have not been finalized.
    pub fn live_host_functions(&self) -> usize {
        self.host_functions.borrow().len()
    }

    pub(crate) fn host_objects(&self) -> &RefCell<ProxyTable<HostObjectProxy<C>>> {
        &self.host_objects
    }

    pub(crate) fn host_functions(&self) -> &RefCell<ProxyTable<HostFunctionProxy<C>>> {
        &self.host_functions
    }
}

fn installed<C: ValueConverter>(engine: &EngineOf<C>) -> Result<Rc<HostRuntime<C>>, EngineError> {
    HostRuntime::<C>::of(engine).ok_or(EngineError::HostRuntimeNotInstalled)
}

/// Exposes `host_object` to scripts as a new engine object.
///
/// The proxy keeps its own reference to `host_object` until the engine
/// finalizes the object; other references must be gone by then.
pub fn create_from_host_object<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    host_object: Rc<dyn HostObject<C>>,
) -> Result<EngineValueOf<C>, EngineError> {
    let runtime = installed::<C>(engine)?;
    HostObjectProxy::<C>::register_class(engine)?;
    let value = engine.new_object_class(HostObjectProxy::<C>::class_id())?;
    let mut host_objects = runtime.host_objects().borrow_mut();
    let index = host_objects.insert(HostObjectProxy::new(runtime.id(), host_object));
    if let Err(error) = engine.set_opaque(&value, OpaqueLink::new(index.into_non_zero())) {
        host_objects.remove(index);
        return Err(error);
    }
    Ok(value)
}

/// Exposes `host_function` to scripts as a new callable engine object.
pub fn create_from_host_function<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    name: &str,
    param_count: u32,
    host_function: HostFunctionType<C>,
) -> Result<EngineValueOf<C>, EngineError> {
    let runtime = installed::<C>(engine)?;
    HostFunctionProxy::<C>::register_class(engine)?;
    let value = engine.new_object_class(HostFunctionProxy::<C>::class_id())?;
    let mut host_functions = runtime.host_functions().borrow_mut();
    let index = host_functions.insert(HostFunctionProxy::new(
        runtime.id(),
        name.to_owned(),
        param_count,
        host_function,
    ));
    if let Err(error) = engine.set_opaque(&value, OpaqueLink::new(index.into_non_zero())) {
        host_functions.remove(index);
        return Err(error);
    }
    Ok(value)
}

pub fn is_host_object<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    value: &EngineValueOf<C>,
) -> bool {
    get_host_object::<C>(engine, value).is_some()
}

/// The host object behind `value`, or `None` if `value` is not a host
/// object proxy.
pub fn get_host_object<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    value: &EngineValueOf<C>,
) -> Option<Rc<dyn HostObject<C>>> {
    HostObjectProxy::<C>::host_object_of(engine, value, Lookup::Unchecked)
}

/// Like [`get_host_object`], but raises a `TypeError` through the engine
/// when `value` is not a host object proxy. For host logic validating its
/// receiver.
pub fn expect_host_object<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    value: &EngineValueOf<C>,
) -> Option<Rc<dyn HostObject<C>>> {
    HostObjectProxy::<C>::host_object_of(engine, value, Lookup::Checked)
}

pub fn is_host_function<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    value: &EngineValueOf<C>,
) -> bool {
    HostFunctionProxy::<C>::signature_of(engine, value, Lookup::Unchecked).is_some()
}

/// Name and declared parameter count of the host function behind `value`.
pub fn get_host_function<C: ValueConverter>(
    engine: &mut EngineOf<C>,
    value: &EngineValueOf<C>,
) -> Option<(String, u32)> {
    HostFunctionProxy::<C>::signature_of(engine, value, Lookup::Unchecked)
}

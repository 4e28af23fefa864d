// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::marker::PhantomData;
use std::rc::Rc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::{
    engine::{
        ClassBehaviour, ClassDef, ClassId, Engine, EngineError, ExoticMethods, OpaqueLink,
        PropertyEnum, SetStatus, TrapFailure,
    },
    heap::indexes::BaseIndex,
    host::{EngineAtomOf, EngineOf, EngineValueOf, HostObject, ValueConverter},
    runtime::{HostRuntime, RuntimeId},
};

use super::{Lookup, contract_violation, ensure_class_registered, invoke_host, resolve};

static HOST_OBJECT_CLASS_ID: OnceCell<ClassId> = OnceCell::new();

/// Native state behind one engine object exposing a [`HostObject`].
///
/// The proxy shares ownership of the host object with the host code that
/// created it. By the time the engine finalizes the object, the proxy must
/// be the only owner left.
pub struct HostObjectProxy<C: ValueConverter> {
    runtime: RuntimeId,
    host_object: Rc<dyn HostObject<C>>,
}

impl<C: ValueConverter> core::fmt::Debug for HostObjectProxy<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostObjectProxy")
            .field("runtime", &self.runtime)
            .field("owners", &Rc::strong_count(&self.host_object))
            .finish()
    }
}

impl<C: ValueConverter> HostObjectProxy<C> {
    pub(crate) fn new(runtime: RuntimeId, host_object: Rc<dyn HostObject<C>>) -> Self {
        Self {
            runtime,
            host_object,
        }
    }

    /// Process-wide class id, assigned on first use.
    pub fn class_id() -> ClassId {
        *HOST_OBJECT_CLASS_ID.get_or_init(ClassId::allocate)
    }

    /// Registers the host object class with `engine` unless already done.
    pub fn register_class(engine: &mut EngineOf<C>) -> Result<bool, EngineError> {
        ensure_class_registered(engine, Self::class_id(), || ClassDef {
            class_name: "HostObjectProxy",
            finalizer: Some(Self::finalizer),
            behaviour: ClassBehaviour::Exotic(Rc::new(HostObjectTraps::<C>(PhantomData))),
        })
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    pub fn host_object(&self) -> &Rc<dyn HostObject<C>> {
        &self.host_object
    }

    /// Looks up the host object behind `value`.
    ///
    /// With [`Lookup::Checked`] a value of any other class raises a
    /// `TypeError` through the engine.
    pub fn host_object_of(
        engine: &mut EngineOf<C>,
        value: &EngineValueOf<C>,
        lookup: Lookup,
    ) -> Option<Rc<dyn HostObject<C>>> {
        let native_state = resolve(engine, value, Self::class_id(), lookup)?;
        let runtime = HostRuntime::<C>::of(engine)?;
        let host_objects = runtime.host_objects().borrow();
        let proxy = host_objects.get(BaseIndex::from_non_zero(native_state))?;
        Some(proxy.host_object.clone())
    }

    /// Recovers the runtime and host object for a trap on `this`.
    fn recover(
        engine: &mut EngineOf<C>,
        this: &EngineValueOf<C>,
    ) -> (Rc<HostRuntime<C>>, Rc<dyn HostObject<C>>) {
        let Some(native_state) = resolve(engine, this, Self::class_id(), Lookup::Unchecked) else {
            contract_violation("host object trap reached an object without proxy state");
        };
        let Some(runtime) = HostRuntime::<C>::of(engine) else {
            contract_violation("host object trap reached an engine without a host runtime");
        };
        let host_object = match runtime
            .host_objects()
            .borrow()
            .get(BaseIndex::from_non_zero(native_state))
        {
            Some(proxy) => proxy.host_object.clone(),
            None => contract_violation("host object proxy state was already released"),
        };
        (runtime, host_object)
    }

    fn finalizer(engine: &mut EngineOf<C>, value: &EngineValueOf<C>) {
        Self::detach(engine, value).release();
    }

    /// Clears `value`'s link and takes its proxy out of the runtime table.
    /// The host object stays alive until the proxy is released.
    fn detach(engine: &mut EngineOf<C>, value: &EngineValueOf<C>) -> Self {
        let native_state = engine
            .get_opaque(value, Self::class_id())
            .and_then(OpaqueLink::take);
        let Some(native_state) = native_state else {
            contract_violation("host object finalized without proxy state");
        };
        let Some(runtime) = HostRuntime::<C>::of(engine) else {
            contract_violation("host object finalized after its host runtime");
        };
        let proxy = runtime
            .host_objects()
            .borrow_mut()
            .remove(BaseIndex::from_non_zero(native_state));
        match proxy {
            Some(proxy) => proxy,
            None => contract_violation("host object proxy state was already released"),
        }
    }

    fn release(self) {
        if Rc::strong_count(&self.host_object) != 1 {
            contract_violation("host object is still shared when its proxy is finalized");
        }
        debug!(runtime = ?self.runtime, "released host object proxy");
    }
}

struct HostObjectTraps<C>(PhantomData<fn() -> C>);

impl<C: ValueConverter> ExoticMethods<EngineOf<C>> for HostObjectTraps<C> {
    fn get_property(
        &self,
        engine: &mut EngineOf<C>,
        this: &EngineValueOf<C>,
        name: EngineAtomOf<C>,
        _receiver: &EngineValueOf<C>,
    ) -> EngineValueOf<C> {
        trace!(atom = ?name, "host object get");
        let (runtime, host_object) = HostObjectProxy::<C>::recover(engine, this);
        let converter = runtime.converter();
        let name = converter.to_host_prop_name_id(engine, name);
        match invoke_host(engine, converter, "get", |engine| {
            host_object.get(engine, &name)
        }) {
            Some(value) => converter.to_engine_value(engine, &value),
            None => engine.undefined(),
        }
    }

    fn set_property(
        &self,
        engine: &mut EngineOf<C>,
        this: &EngineValueOf<C>,
        name: EngineAtomOf<C>,
        value: &EngineValueOf<C>,
        _receiver: &EngineValueOf<C>,
    ) -> SetStatus {
        trace!(atom = ?name, "host object set");
        let (runtime, host_object) = HostObjectProxy::<C>::recover(engine, this);
        let converter = runtime.converter();
        let name = converter.to_host_prop_name_id(engine, name);
        let value = converter.to_host_value(engine, value);
        invoke_host(engine, converter, "set", |engine| {
            host_object.set(engine, &name, &value)
        })
        .is_some()
        .into()
    }

    fn get_own_property_names(
        &self,
        engine: &mut EngineOf<C>,
        this: &EngineValueOf<C>,
    ) -> Result<Box<[PropertyEnum<EngineAtomOf<C>>]>, TrapFailure> {
        let (runtime, host_object) = HostObjectProxy::<C>::recover(engine, this);
        let converter = runtime.converter();
        let names = invoke_host(engine, converter, "get_own_property_names", |engine| {
            host_object.get_property_names(engine)
        })
        .ok_or(TrapFailure)?;
        trace!(count = names.len(), "host object own property names");
        let table: Box<[_]> = names
            .iter()
            .map(|name| {
                let name = converter.prop_name_to_utf8(engine, name);
                PropertyEnum {
                    atom: engine.new_atom(&name),
                    is_enumerable: true,
                }
            })
            .collect();
        debug_assert_eq!(table.len(), names.len());
        Ok(table)
    }
}

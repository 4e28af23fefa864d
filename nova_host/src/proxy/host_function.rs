// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::marker::PhantomData;
use std::rc::Rc;

use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    engine::{CallBehaviour, ClassBehaviour, ClassDef, ClassId, Engine, EngineError, OpaqueLink},
    heap::indexes::BaseIndex,
    host::{EngineOf, EngineValueOf, HostFunctionType, HostResult, HostValueOf, ValueConverter},
    runtime::{HostRuntime, RuntimeId},
};

use super::{Lookup, contract_violation, ensure_class_registered, invoke_host, resolve};

/// Arguments up to this count are converted into inline storage; longer
/// argument lists get one heap buffer of exactly their length.
pub const MAX_INLINE_ARGUMENTS: usize = 8;

static HOST_FUNCTION_CLASS_ID: OnceCell<ClassId> = OnceCell::new();

type SharedHostFunction<C> = Rc<
    dyn Fn(
        &mut EngineOf<C>,
        &HostValueOf<C>,
        &[HostValueOf<C>],
    ) -> HostResult<HostValueOf<C>, HostValueOf<C>>,
>;

/// Native state behind one callable engine object.
pub struct HostFunctionProxy<C: ValueConverter> {
    runtime: RuntimeId,
    name: String,
    param_count: u32,
    host_function: SharedHostFunction<C>,
}

impl<C: ValueConverter> core::fmt::Debug for HostFunctionProxy<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostFunctionProxy")
            .field("runtime", &self.runtime)
            .field("name", &self.name)
            .field("param_count", &self.param_count)
            .finish()
    }
}

impl<C: ValueConverter> HostFunctionProxy<C> {
    pub(crate) fn new(
        runtime: RuntimeId,
        name: String,
        param_count: u32,
        host_function: HostFunctionType<C>,
    ) -> Self {
        Self {
            runtime,
            name,
            param_count,
            host_function: Rc::from(host_function),
        }
    }

    /// Process-wide class id, assigned on first use.
    pub fn class_id() -> ClassId {
        *HOST_FUNCTION_CLASS_ID.get_or_init(ClassId::allocate)
    }

    /// Registers the host function class with `engine` unless already done.
    pub fn register_class(engine: &mut EngineOf<C>) -> Result<bool, EngineError> {
        ensure_class_registered(engine, Self::class_id(), || ClassDef {
            class_name: "HostFunctionProxy",
            finalizer: Some(Self::finalizer),
            behaviour: ClassBehaviour::Call(Rc::new(HostFunctionTraps::<C>(PhantomData))),
        })
    }

    pub fn runtime(&self) -> RuntimeId {
        self.runtime
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_count(&self) -> u32 {
        self.param_count
    }

    /// Name and declared parameter count of the host function behind
    /// `value`, if it is one.
    pub fn signature_of(
        engine: &mut EngineOf<C>,
        value: &EngineValueOf<C>,
        lookup: Lookup,
    ) -> Option<(String, u32)> {
        let native_state = resolve(engine, value, Self::class_id(), lookup)?;
        let runtime = HostRuntime::<C>::of(engine)?;
        let host_functions = runtime.host_functions().borrow();
        let proxy = host_functions.get(BaseIndex::from_non_zero(native_state))?;
        Some((proxy.name.clone(), proxy.param_count))
    }

    fn recover(
        engine: &mut EngineOf<C>,
        func_obj: &EngineValueOf<C>,
    ) -> (Rc<HostRuntime<C>>, SharedHostFunction<C>) {
        let Some(native_state) = resolve(engine, func_obj, Self::class_id(), Lookup::Unchecked)
        else {
            contract_violation("host function called without proxy state");
        };
        let Some(runtime) = HostRuntime::<C>::of(engine) else {
            contract_violation("host function called on an engine without a host runtime");
        };
        let host_function = match runtime
            .host_functions()
            .borrow()
            .get(BaseIndex::from_non_zero(native_state))
        {
            Some(proxy) => proxy.host_function.clone(),
            None => contract_violation("host function proxy state was already released"),
        };
        (runtime, host_function)
    }

    fn finalizer(engine: &mut EngineOf<C>, value: &EngineValueOf<C>) {
        let native_state = engine
            .get_opaque(value, Self::class_id())
            .and_then(OpaqueLink::take);
        let Some(native_state) = native_state else {
            contract_violation("host function finalized without proxy state");
        };
        let Some(runtime) = HostRuntime::<C>::of(engine) else {
            contract_violation("host function finalized after its host runtime");
        };
        let proxy = runtime
            .host_functions()
            .borrow_mut()
            .remove(BaseIndex::from_non_zero(native_state));
        let Some(proxy) = proxy else {
            contract_violation("host function proxy state was already released");
        };
        debug!(runtime = ?proxy.runtime, name = %proxy.name, "released host function proxy");
    }
}

/// Converts engine arguments to host values, inline up to
/// [`MAX_INLINE_ARGUMENTS`].
pub(crate) fn marshal_arguments<C: ValueConverter>(
    converter: &C,
    engine: &mut EngineOf<C>,
    args: &[EngineValueOf<C>],
) -> SmallVec<[HostValueOf<C>; MAX_INLINE_ARGUMENTS]> {
    if args.len() > MAX_INLINE_ARGUMENTS {
        let mut spilled = Vec::with_capacity(args.len());
        spilled.extend(args.iter().map(|arg| converter.to_host_value(engine, arg)));
        SmallVec::from_vec(spilled)
    } else {
        args.iter()
            .map(|arg| converter.to_host_value(engine, arg))
            .collect()
    }
}

struct HostFunctionTraps<C>(PhantomData<fn() -> C>);

impl<C: ValueConverter> CallBehaviour<EngineOf<C>> for HostFunctionTraps<C> {
    fn call(
        &self,
        engine: &mut EngineOf<C>,
        func_obj: &EngineValueOf<C>,
        this: &EngineValueOf<C>,
        args: &[EngineValueOf<C>],
    ) -> EngineValueOf<C> {
        trace!(argc = args.len(), "host function call");
        let (runtime, host_function) = HostFunctionProxy::<C>::recover(engine, func_obj);
        let converter = runtime.converter();
        let arguments = marshal_arguments(converter, engine, args);
        let this = converter.to_host_value(engine, this);
        match invoke_host(engine, converter, "call", |engine| {
            host_function(engine, &this, arguments.as_slice())
        }) {
            Some(value) => converter.to_engine_value(engine, &value),
            None => engine.undefined(),
        }
    }
}

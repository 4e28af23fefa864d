// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ## Host interface
//!
//! What the proxy layer needs from the host side: a [`ValueConverter`]
//! between engine-native and host-native values, the [`HostObject`]
//! capability set, the [`HostFunctionType`] callable shape, and the
//! [`HostError`] contract through which host logic reports failures.

use std::error::Error;

use thiserror::Error;

use crate::engine::Engine;

/// Converts values and property names between the engine and the host.
///
/// A pure function of its input; it owns no proxy state.
pub trait ValueConverter: 'static {
    type Engine: Engine;
    /// Host-native value.
    type Value;
    /// Host-native property identifier.
    type PropNameId;

    fn to_host_value(&self, engine: &mut Self::Engine, value: &EngineValueOf<Self>)
    -> Self::Value;

    fn to_engine_value(&self, engine: &mut Self::Engine, value: &Self::Value)
    -> EngineValueOf<Self>;

    fn to_host_prop_name_id(
        &self,
        engine: &mut Self::Engine,
        atom: EngineAtomOf<Self>,
    ) -> Self::PropNameId;

    fn prop_name_to_utf8(&self, engine: &mut Self::Engine, name: &Self::PropNameId) -> String;
}

pub type EngineOf<C> = <C as ValueConverter>::Engine;
pub type EngineValueOf<C> = <EngineOf<C> as Engine>::Value;
pub type EngineAtomOf<C> = <EngineOf<C> as Engine>::Atom;
pub type HostValueOf<C> = <C as ValueConverter>::Value;
pub type PropNameIdOf<C> = <C as ValueConverter>::PropNameId;

/// Failure reported by host logic.
#[derive(Debug, Error)]
pub enum HostError<V> {
    /// Structured error. The carried value crosses into the engine's
    /// exception channel unchanged.
    #[error("host raised a JavaScript error")]
    Js(V),
    /// Any other failure. Never visible to scripts.
    #[error("{0}")]
    Native(Box<dyn Error + 'static>),
}

impl<V> HostError<V> {
    pub fn js(value: V) -> Self {
        Self::Js(value)
    }

    pub fn native(error: impl Into<Box<dyn Error + 'static>>) -> Self {
        Self::Native(error.into())
    }

    pub fn is_js(&self) -> bool {
        matches!(self, Self::Js(_))
    }
}

pub type HostResult<T, V> = Result<T, HostError<V>>;

/// Object implemented by the host and surfaced into the engine through a
/// host object proxy.
pub trait HostObject<C: ValueConverter> {
    fn get(
        &self,
        engine: &mut EngineOf<C>,
        name: &PropNameIdOf<C>,
    ) -> HostResult<HostValueOf<C>, HostValueOf<C>>;

    /// Rejects every assignment unless overridden.
    fn set(
        &self,
        _engine: &mut EngineOf<C>,
        _name: &PropNameIdOf<C>,
        _value: &HostValueOf<C>,
    ) -> HostResult<(), HostValueOf<C>> {
        Err(HostError::native("host object does not accept assignments"))
    }

    fn get_property_names(
        &self,
        _engine: &mut EngineOf<C>,
    ) -> HostResult<Vec<PropNameIdOf<C>>, HostValueOf<C>> {
        Ok(Vec::new())
    }
}

/// Callable implemented by the host: `(engine, this, arguments) -> value`.
pub type HostFunctionType<C> = Box<
    dyn Fn(
        &mut EngineOf<C>,
        &HostValueOf<C>,
        &[HostValueOf<C>],
    ) -> HostResult<HostValueOf<C>, HostValueOf<C>>,
>;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host object and host function proxies.
//!
//! Lets host code expose objects with custom property behaviour and
//! callable functions to scripts running in an embedded engine. Each exposed
//! item is an instance of an engine class whose opaque slot links to a
//! native proxy; the proxy owns the host behaviour and translates values
//! and errors across the boundary.
//!
//! ```
//! use std::rc::Rc;
//!
//! use nova_host::{
//!     HostError, HostObject, HostResult, HostRuntime, create_from_host_object,
//!     agent::{Agent, Options, Value, converter::{AgentConverter, HostValue, PropNameId}},
//! };
//!
//! struct Answer;
//!
//! impl HostObject<AgentConverter> for Answer {
//!     fn get(&self, _: &mut Agent, name: &PropNameId) -> HostResult<HostValue, HostValue> {
//!         match name.as_str() {
//!             "answer" => Ok(HostValue::Number(42.0)),
//!             _ => Err(HostError::js(HostValue::from("no such property"))),
//!         }
//!     }
//! }
//!
//! let mut agent = Agent::new(Options::default());
//! HostRuntime::install(&mut agent, AgentConverter).unwrap();
//! let object = create_from_host_object::<AgentConverter>(&mut agent, Rc::new(Answer)).unwrap();
//! assert_eq!(agent.get(&object, "answer"), Ok(Value::Number(42.0)));
//! assert!(agent.get(&object, "question").is_err());
//! ```

#[cfg(feature = "agent")]
pub mod agent;
pub mod engine;
pub mod heap;
pub mod host;
pub mod proxy;
pub mod runtime;

pub use engine::{
    ClassBehaviour, ClassDef, ClassId, Engine, EngineError, OpaqueLink, PropertyEnum, SetStatus,
    TrapFailure,
};
pub use host::{HostError, HostFunctionType, HostObject, HostResult, ValueConverter};
pub use proxy::{
    ContractViolation, HostFunctionProxy, HostObjectProxy, Lookup, MAX_INLINE_ARGUMENTS,
};
pub use runtime::{
    HostRuntime, RuntimeId, create_from_host_function, create_from_host_object,
    expect_host_object, get_host_function, get_host_object, is_host_function, is_host_object,
};

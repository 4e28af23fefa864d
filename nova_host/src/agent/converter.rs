// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::rc::Rc;

use crate::{engine::Engine, host::ValueConverter};

use super::{Agent, Atom, Object, Value};

/// Host-side value for the reference agent. Strings are owned by the host;
/// objects stay engine handles.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(Object),
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropNameId(String);

impl PropNameId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AgentConverter;

impl ValueConverter for AgentConverter {
    type Engine = Agent;
    type Value = HostValue;
    type PropNameId = PropNameId;

    fn to_host_value(&self, _agent: &mut Agent, value: &Value) -> HostValue {
        match value {
            Value::Undefined => HostValue::Undefined,
            Value::Null => HostValue::Null,
            Value::Boolean(value) => HostValue::Boolean(*value),
            Value::Number(value) => HostValue::Number(*value),
            Value::String(value) => HostValue::String(value.to_string()),
            Value::Object(object) => HostValue::Object(*object),
        }
    }

    fn to_engine_value(&self, _agent: &mut Agent, value: &HostValue) -> Value {
        match value {
            HostValue::Undefined => Value::Undefined,
            HostValue::Null => Value::Null,
            HostValue::Boolean(value) => Value::Boolean(*value),
            HostValue::Number(value) => Value::Number(*value),
            HostValue::String(value) => Value::String(Rc::from(value.as_str())),
            HostValue::Object(object) => Value::Object(*object),
        }
    }

    fn to_host_prop_name_id(&self, agent: &mut Agent, atom: Atom) -> PropNameId {
        PropNameId(agent.atom_to_string(atom))
    }

    fn prop_name_to_utf8(&self, _agent: &mut Agent, name: &PropNameId) -> String {
        name.0.clone()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg(feature = "agent")]

use std::{
    cell::{Cell, RefCell},
    panic,
    rc::Rc,
};

use nova_host::{
    ContractViolation, HostError, HostObject, HostResult, HostRuntime, ValueConverter,
    agent::{
        Agent, Options, Value,
        converter::{AgentConverter, HostValue, PropNameId},
    },
    create_from_host_object, get_host_object, is_host_object,
};

/// Key-value store counting how often it is read.
#[derive(Default)]
struct Store {
    reads: Rc<Cell<u32>>,
    entries: RefCell<Vec<(String, HostValue)>>,
}

impl Store {
    fn with(entries: &[(&str, HostValue)]) -> Self {
        Self {
            reads: Rc::default(),
            entries: RefCell::new(
                entries
                    .iter()
                    .map(|(name, value)| ((*name).to_owned(), value.clone()))
                    .collect(),
            ),
        }
    }
}

impl HostObject<AgentConverter> for Store {
    fn get(&self, _: &mut Agent, name: &PropNameId) -> HostResult<HostValue, HostValue> {
        self.reads.set(self.reads.get() + 1);
        Ok(self
            .entries
            .borrow()
            .iter()
            .find(|(key, _)| key == name.as_str())
            .map(|(_, value)| value.clone())
            .unwrap_or_default())
    }

    fn set(&self, _: &mut Agent, name: &PropNameId, value: &HostValue) -> HostResult<(), HostValue> {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|(key, _)| key == name.as_str()) {
            Some((_, slot)) => *slot = value.clone(),
            None => entries.push((name.as_str().to_owned(), value.clone())),
        }
        Ok(())
    }

    fn get_property_names(&self, _: &mut Agent) -> HostResult<Vec<PropNameId>, HostValue> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .map(|(key, _)| PropNameId::new(key.as_str()))
            .collect())
    }
}

/// Fails every operation the same way.
enum Failing {
    Js,
    Native,
    Panic,
}

impl Failing {
    fn fail<T>(&self) -> HostResult<T, HostValue> {
        match self {
            Self::Js => Err(HostError::js(HostValue::from("boom"))),
            Self::Native => Err(HostError::native("disk on fire")),
            Self::Panic => panic!("host bug"),
        }
    }
}

impl HostObject<AgentConverter> for Failing {
    fn get(&self, _: &mut Agent, _: &PropNameId) -> HostResult<HostValue, HostValue> {
        self.fail()
    }

    fn set(&self, _: &mut Agent, _: &PropNameId, _: &HostValue) -> HostResult<(), HostValue> {
        self.fail()
    }

    fn get_property_names(&self, _: &mut Agent) -> HostResult<Vec<PropNameId>, HostValue> {
        self.fail()
    }
}

/// Only implements `get`.
struct ReadOnly;

impl HostObject<AgentConverter> for ReadOnly {
    fn get(&self, _: &mut Agent, name: &PropNameId) -> HostResult<HostValue, HostValue> {
        Ok(HostValue::from(name.as_str()))
    }
}

/// Reads through to an ordinary engine object.
struct Forwarder {
    target: Value,
}

impl HostObject<AgentConverter> for Forwarder {
    fn get(&self, agent: &mut Agent, name: &PropNameId) -> HostResult<HostValue, HostValue> {
        match agent.get(&self.target, name.as_str()) {
            Ok(value) => Ok(AgentConverter.to_host_value(agent, &value)),
            Err(error) => Err(HostError::js(
                AgentConverter.to_host_value(agent, &error.value()),
            )),
        }
    }
}

fn setup() -> Agent {
    let mut agent = Agent::new(Options::default());
    HostRuntime::install(&mut agent, AgentConverter).unwrap();
    agent
}

fn expose(agent: &mut Agent, host_object: impl HostObject<AgentConverter> + 'static) -> Value {
    create_from_host_object::<AgentConverter>(agent, Rc::new(host_object)).unwrap()
}

fn live_host_objects(agent: &Agent) -> usize {
    HostRuntime::<AgentConverter>::of(agent)
        .unwrap()
        .live_host_objects()
}

#[test]
fn get_returns_host_value_every_time() {
    let mut agent = setup();
    let store = Store::with(&[("x", HostValue::Number(1.0))]);
    let reads = store.reads.clone();
    let object = expose(&mut agent, store);

    assert_eq!(agent.get(&object, "x"), Ok(Value::Number(1.0)));
    assert_eq!(agent.get(&object, "x"), Ok(Value::Number(1.0)));
    assert_eq!(agent.get(&object, "missing"), Ok(Value::Undefined));
    assert_eq!(reads.get(), 3);
}

#[test]
fn set_is_forwarded() {
    let mut agent = setup();
    let object = expose(&mut agent, Store::default());

    assert_eq!(agent.set(&object, "greeting", Value::from("hi")), Ok(true));
    assert_eq!(agent.get(&object, "greeting"), Ok(Value::from("hi")));
    assert_eq!(agent.set(&object, "greeting", Value::Null), Ok(true));
    assert_eq!(agent.get(&object, "greeting"), Ok(Value::Null));
}

#[test]
fn default_set_rejects_without_error() {
    let mut agent = setup();
    let object = expose(&mut agent, ReadOnly);

    assert_eq!(agent.set(&object, "name", Value::from(1.0)), Ok(false));
    assert_eq!(agent.get(&object, "name"), Ok(Value::from("name")));
    assert_eq!(agent.own_property_keys(&object), Ok(vec![]));
}

#[test]
fn enumeration_lists_every_name_in_order() {
    let mut agent = setup();
    let object = expose(
        &mut agent,
        Store::with(&[
            ("a", HostValue::Undefined),
            ("b", HostValue::Boolean(true)),
            ("c", HostValue::Number(3.0)),
        ]),
    );

    assert_eq!(
        agent.own_property_keys(&object),
        Ok(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
    );
}

#[test]
fn empty_enumeration() {
    let mut agent = setup();
    let object = expose(&mut agent, Store::default());
    assert_eq!(agent.own_property_keys(&object), Ok(vec![]));
}

#[test]
fn structured_errors_reach_scripts_unchanged() {
    let mut agent = setup();
    let object = expose(&mut agent, Failing::Js);

    let error = agent.get(&object, "x").unwrap_err();
    assert_eq!(error.value(), Value::from("boom"));
    let error = agent.set(&object, "x", Value::Null).unwrap_err();
    assert_eq!(error.value(), Value::from("boom"));
    let error = agent.own_property_keys(&object).unwrap_err();
    assert_eq!(error.value(), Value::from("boom"));
}

#[test]
fn unstructured_errors_are_swallowed() {
    let mut agent = setup();
    let object = expose(&mut agent, Failing::Native);

    assert_eq!(agent.get(&object, "x"), Ok(Value::Undefined));
    assert_eq!(agent.set(&object, "x", Value::Null), Ok(false));
}

#[test]
fn failed_enumeration_without_error_is_reported_by_the_engine() {
    let mut agent = setup();
    let object = expose(&mut agent, Failing::Native);

    let error = agent.own_property_keys(&object).unwrap_err().value();
    assert_eq!(agent.get(&error, "name"), Ok(Value::from("TypeError")));
}

#[test]
fn host_panics_do_not_unwind_into_the_engine() {
    let mut agent = setup();
    let object = expose(&mut agent, Failing::Panic);

    assert_eq!(agent.get(&object, "x"), Ok(Value::Undefined));
    assert_eq!(agent.set(&object, "x", Value::Null), Ok(false));
    assert!(agent.own_property_keys(&object).is_err());
    // The engine is still usable afterwards.
    let plain = Value::Object(agent.create_object());
    assert_eq!(agent.set(&plain, "ok", Value::from(true)), Ok(true));
}

#[test]
fn host_logic_may_reenter_the_engine() {
    let mut agent = setup();
    let target = Value::Object(agent.create_object());
    agent.set(&target, "x", Value::from(5.0)).unwrap();
    let object = expose(&mut agent, Forwarder { target });

    assert_eq!(agent.get(&object, "x"), Ok(Value::from(5.0)));
    assert_eq!(agent.get(&object, "y"), Ok(Value::Undefined));
}

#[test]
fn nested_engine_errors_travel_back_as_structured_errors() {
    let mut agent = setup();
    let object = expose(&mut agent, Forwarder { target: Value::Null });

    let error = agent.get(&object, "x").unwrap_err().value();
    assert_eq!(agent.get(&error, "name"), Ok(Value::from("TypeError")));
}

#[test]
fn unreachable_host_objects_are_finalized() {
    let mut agent = setup();
    let host_object: Rc<dyn HostObject<AgentConverter>> = Rc::new(ReadOnly);
    let weak = Rc::downgrade(&host_object);
    let object = create_from_host_object::<AgentConverter>(&mut agent, host_object).unwrap();
    let holder = Value::Object(agent.create_object());
    agent.set(&holder, "object", object.clone()).unwrap();

    agent.gc(std::slice::from_ref(&holder));
    assert_eq!(live_host_objects(&agent), 1);
    assert!(weak.upgrade().is_some());

    agent.gc(&[]);
    assert_eq!(live_host_objects(&agent), 0);
    assert!(weak.upgrade().is_none());
    assert!(!agent.is_live(object.as_object().unwrap()));
}

#[test]
fn dropping_the_agent_finalizes_host_objects() {
    let mut agent = setup();
    let host_object: Rc<dyn HostObject<AgentConverter>> = Rc::new(Store::default());
    let weak = Rc::downgrade(&host_object);
    create_from_host_object::<AgentConverter>(&mut agent, host_object).unwrap();

    drop(agent);
    assert!(weak.upgrade().is_none());
}

#[test]
fn finalizing_a_shared_host_object_is_fatal() {
    let payload = panic::catch_unwind(|| {
        let mut agent = setup();
        let host_object: Rc<dyn HostObject<AgentConverter>> = Rc::new(ReadOnly);
        let _kept = host_object.clone();
        create_from_host_object::<AgentConverter>(&mut agent, host_object).unwrap();
        agent.gc(&[]);
    })
    .unwrap_err();
    let violation = payload.downcast_ref::<ContractViolation>().unwrap();
    assert!(violation.to_string().contains("still shared"));
}

#[test]
fn host_objects_can_be_recovered_from_values() {
    let mut agent = setup();
    let host_object: Rc<dyn HostObject<AgentConverter>> = Rc::new(ReadOnly);
    let weak = Rc::downgrade(&host_object);
    let object = create_from_host_object::<AgentConverter>(&mut agent, host_object).unwrap();
    let plain = Value::Object(agent.create_object());

    assert!(is_host_object::<AgentConverter>(&mut agent, &object));
    assert!(!is_host_object::<AgentConverter>(&mut agent, &plain));
    assert!(!is_host_object::<AgentConverter>(&mut agent, &Value::from(1.0)));

    let recovered = get_host_object::<AgentConverter>(&mut agent, &object).unwrap();
    assert!(Rc::ptr_eq(&recovered, &weak.upgrade().unwrap()));
}

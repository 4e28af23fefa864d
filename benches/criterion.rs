// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{hint::black_box, rc::Rc};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use nova_host::{
    HostObject, HostResult, HostRuntime, MAX_INLINE_ARGUMENTS, create_from_host_function,
    create_from_host_object,
    agent::{
        Agent, Options, Value,
        converter::{AgentConverter, HostValue, PropNameId},
    },
};

struct Constant;

impl HostObject<AgentConverter> for Constant {
    fn get(&self, _: &mut Agent, _: &PropNameId) -> HostResult<HostValue, HostValue> {
        Ok(HostValue::Number(1.0))
    }

    fn set(&self, _: &mut Agent, _: &PropNameId, _: &HostValue) -> HostResult<(), HostValue> {
        Ok(())
    }

    fn get_property_names(&self, _: &mut Agent) -> HostResult<Vec<PropNameId>, HostValue> {
        Ok(["a", "b", "c", "d"].into_iter().map(PropNameId::new).collect())
    }
}

fn argument_count(
    _: &mut Agent,
    _: &HostValue,
    args: &[HostValue],
) -> HostResult<HostValue, HostValue> {
    Ok(HostValue::Number(args.len() as f64))
}

fn setup() -> Agent {
    let mut agent = Agent::new(Options::default());
    HostRuntime::install(&mut agent, AgentConverter).unwrap();
    agent
}

fn bench_host_object(c: &mut Criterion) {
    let mut agent = setup();
    let object = create_from_host_object::<AgentConverter>(&mut agent, Rc::new(Constant)).unwrap();

    c.bench_function("host object [[Get]]", |b| {
        b.iter(|| agent.get(black_box(&object), "value").unwrap())
    });
    c.bench_function("host object [[Set]]", |b| {
        b.iter(|| agent.set(black_box(&object), "value", Value::Null).unwrap())
    });
    c.bench_function("host object [[OwnPropertyKeys]]", |b| {
        b.iter(|| agent.own_property_keys(black_box(&object)).unwrap())
    });
}

fn bench_host_function(c: &mut Criterion) {
    let mut agent = setup();
    let function = create_from_host_function::<AgentConverter>(
        &mut agent,
        "count",
        0,
        Box::new(argument_count),
    )
    .unwrap();
    let inline = vec![Value::from(1.0); MAX_INLINE_ARGUMENTS];
    let spilled = vec![Value::from(1.0); MAX_INLINE_ARGUMENTS + 1];

    c.bench_function("host function [[Call]] (inline arguments)", |b| {
        b.iter(|| agent.call(&function, &Value::Undefined, black_box(&inline)).unwrap())
    });
    c.bench_function("host function [[Call]] (spilled arguments)", |b| {
        b.iter(|| agent.call(&function, &Value::Undefined, black_box(&spilled)).unwrap())
    });
}

fn bench_finalization(c: &mut Criterion) {
    c.bench_function("host object finalization", |b| {
        b.iter_batched(
            || {
                let mut agent = setup();
                for _ in 0..100 {
                    create_from_host_object::<AgentConverter>(&mut agent, Rc::new(Constant))
                        .unwrap();
                }
                agent
            },
            |mut agent| {
                agent.gc(&[]);
                agent
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_host_object, bench_host_function, bench_finalization);
criterion_main!(benches);

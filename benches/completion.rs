//! Benchmarks for requirement completion.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use reqsolve::conformance::{ConformanceDecl, ConformanceTable, NominalDecl};
use reqsolve::engine::{Engine, EngineConfig};
use reqsolve::interface::{InterfaceDecl, InterfaceRegistry};
use reqsolve::requirement::RawRequirement;
use reqsolve::{MutableTerm, Symbol, Type};

/// `params` parameters, each conforming to `P` and fixed to `Foo<Int, U_i>`.
fn setup(params: usize) -> (InterfaceRegistry, Arc<ConformanceTable>, Vec<RawRequirement>) {
    let mut interfaces = InterfaceRegistry::new();
    let q = interfaces
        .register(InterfaceDecl::new("Q").with_members(&["V"]))
        .unwrap();
    let p = interfaces
        .register(InterfaceDecl::new("P").with_members(&["A", "C"]))
        .unwrap();

    let int = Type::nominal("Int", vec![]);
    let mut table = ConformanceTable::new();
    table.add_nominal(NominalDecl::new("Int", 0)).unwrap();
    table.add_nominal(NominalDecl::new("Foo", 2)).unwrap();
    table
        .add_conformance(&interfaces, ConformanceDecl::new("Int", &q).witness("V", int.clone()))
        .unwrap();
    table
        .add_conformance(
            &interfaces,
            ConformanceDecl::new("Foo", &p)
                .witness("A", int.clone())
                .witness("C", Type::member(Type::Param(1), &q, "V"))
                .conditional(RawRequirement::conforms(Type::Param(1), &q)),
        )
        .unwrap();

    // Even slots are the `U_i`, odd slots the `T_i`.
    let mut requirements = Vec::new();
    for i in (0..params * 2).step_by(2) {
        requirements.push(RawRequirement::conforms(Type::Param(i + 1), &p));
        requirements.push(RawRequirement::same_type(
            Type::Param(i + 1),
            Type::nominal("Foo", vec![int.clone(), Type::Param(i)]),
        ));
    }
    (interfaces, Arc::new(table), requirements)
}

fn completed_engine(params: usize) -> Engine {
    let (interfaces, table, requirements) = setup(params);
    let mut engine = Engine::new(EngineConfig::default(), interfaces, table).unwrap();
    engine
        .add_generic_signature(params * 2, &requirements)
        .unwrap();
    engine.complete().unwrap();
    engine
}

fn bench_complete(c: &mut Criterion) {
    for params in [1, 8] {
        c.bench_function(&format!("complete_{params}"), |bench| {
            bench.iter(|| black_box(completed_engine(params).stats()))
        });
    }
}

fn bench_reduce(c: &mut Criterion) {
    let engine = completed_engine(8);
    let p = reqsolve::InterfaceId::new("P");
    let term = MutableTerm::from(vec![Symbol::GenericParam(15), Symbol::member(&p, "C")]);

    c.bench_function("reduce_member", |bench| {
        bench.iter(|| black_box(engine.reduce(&term)))
    });
}

criterion_group!(benches, bench_complete, bench_reduce);
criterion_main!(benches);

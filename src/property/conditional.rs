//! Conditional requirements of concrete conformances.
//!
//! `Foo<X, Y>: P where Y: Q` only holds when `Y: Q`. Once a key is known to
//! be `Foo<Int, U>` and to conform to `P`, `U: Q` becomes a new fact.

use crate::conformance::{ConcreteImpl, ConformanceLookup};
use crate::error::RequirementError;
use crate::interface::InterfaceRegistry;
use crate::requirement::{Requirement, desugar_requirement, rule_for_requirement};
use crate::rewrite::RewriteSystem;
use crate::term::Term;
use crate::trace::{DebugCategory, TraceEvent};
use crate::types::TermRoot;

use super::PropertyMap;

impl PropertyMap {
    pub(super) fn infer_conditional_requirements(
        &self,
        system: &mut RewriteSystem,
        interfaces: &InterfaceRegistry,
        lookup: &dyn ConformanceLookup,
        imp: &ConcreteImpl,
        substitutions: &[Term],
    ) {
        let conditional = imp.conditional_requirements();
        if conditional.is_empty() {
            return;
        }
        let tracer = system.tracer().clone();

        let mut desugared = Vec::new();
        let mut errors = Vec::new();
        for raw in conditional {
            desugar_requirement(raw, lookup, &mut desugared, &mut errors);
        }
        for error in errors {
            system.record_requirement_error(error);
        }

        // Interfaces seen for the first time bring their own rules along.
        for req in &desugared {
            let Requirement::Conformance { interface, .. } = req else {
                continue;
            };
            if system.is_known_interface(interface) {
                continue;
            }
            if let Err(err) = system.register_interface(interfaces, lookup, interface) {
                tracing::warn!(%interface, error = %err, "cannot import interface of conditional requirement");
            }
        }

        let root = TermRoot::Substitutions(substitutions);
        for req in &desugared {
            match rule_for_requirement(req, root) {
                Ok((lhs, rhs)) => {
                    tracer.emit(DebugCategory::ConditionalRequirements, || {
                        TraceEvent::ConditionalRequirement {
                            requirement: req.to_string(),
                        }
                    });
                    system.add_explicit_rule(lhs, rhs);
                }
                Err(err) => system.record_requirement_error(RequirementError::Unlowerable {
                    ty: req.subject().to_string(),
                    reason: err.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::conformance::{ConformanceDecl, ConformanceTable, NominalDecl};
    use crate::interface::InterfaceDecl;
    use crate::requirement::RawRequirement;
    use crate::symbol::{InterfaceId, Symbol};
    use crate::term::MutableTerm;
    use crate::types::Type;

    fn int() -> Type {
        Type::nominal("Int", vec![])
    }

    fn setup() -> (InterfaceRegistry, ConformanceTable, InterfaceId) {
        let mut registry = InterfaceRegistry::new();
        let q = registry.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        let mut table = ConformanceTable::new();
        table.add_nominal(NominalDecl::new("Int", 0)).unwrap();
        table.add_nominal(NominalDecl::new("String", 0)).unwrap();
        table
            .add_conformance(&registry, ConformanceDecl::new("Int", &q).witness("V", int()))
            .unwrap();
        (registry, table, q)
    }

    fn foo_impl(conditional: Vec<RawRequirement>) -> ConcreteImpl {
        ConcreteImpl::new(
            Type::nominal("Foo", vec![int(), Type::Param(0)]),
            InterfaceId::new("P"),
            BTreeMap::new(),
            conditional,
        )
    }

    #[test]
    fn conditional_requirements_become_rules_once() {
        let (registry, table, q) = setup();
        let imp = foo_impl(vec![
            RawRequirement::conforms(Type::Param(1), &q),
            RawRequirement::conforms(int(), &q),
        ]);
        let substitutions = [
            Term::from(vec![Symbol::GenericParam(0)]),
            Term::from(vec![Symbol::GenericParam(1)]),
        ];
        let map = PropertyMap::new();
        let mut system = RewriteSystem::new();

        map.infer_conditional_requirements(&mut system, &registry, &table, &imp, &substitutions);
        assert!(system.is_known_interface(&q));
        assert!(system.requirement_errors().is_empty());
        let u = MutableTerm::from(vec![Symbol::GenericParam(1)]);
        assert_eq!(system.reduce(&u.with(Symbol::Interface(q.clone()))).0, u);

        let count = system.len();
        map.infer_conditional_requirements(&mut system, &registry, &table, &imp, &substitutions);
        assert_eq!(system.len(), count);
    }

    #[test]
    fn failures_are_recorded_and_the_rest_proceeds() {
        let (registry, table, q) = setup();
        let imp = foo_impl(vec![
            RawRequirement::conforms(Type::nominal("String", vec![]), &q),
            RawRequirement::conforms(Type::Param(3), &q),
            RawRequirement::conforms(Type::Param(0), &q),
        ]);
        let substitutions = [Term::from(vec![Symbol::GenericParam(0)])];
        let map = PropertyMap::new();
        let mut system = RewriteSystem::new();

        map.infer_conditional_requirements(&mut system, &registry, &table, &imp, &substitutions);
        let errors = system.requirement_errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            RequirementError::ConcreteDoesNotConform { ty, .. } if ty == "String"
        ));
        assert!(matches!(&errors[1], RequirementError::Unlowerable { .. }));

        let t = MutableTerm::from(vec![Symbol::GenericParam(0)]);
        assert_eq!(system.reduce(&t.with(Symbol::Interface(q))).0, t);
    }
}

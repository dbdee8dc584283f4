//! Nested type concretization.
//!
//! When a key `T` conforms to an interface `P` and is also fixed to (or
//! bounded by) a concrete type `C`, the implementation of `P` by `C` decides
//! what every member type `T.[P:X]` is. For each such pair this pass records
//! the compound rule `T.[C : P] => T` and one rule per member type tying
//! `T.[C : P].[P:X]` to its witness.

use crate::conformance::{ConcreteImpl, Conformance, ConformanceLookup};
use crate::interface::InterfaceRegistry;
use crate::rewrite::{RewritePath, RewriteStep, RewriteSystem, RuleId};
use crate::symbol::{InterfaceId, Name, Symbol};
use crate::term::{MutableTerm, Term};
use crate::trace::{DebugCategory, TraceEvent};
use crate::types::{TermRoot, Type};

use super::{ConcreteProperty, PropertyMap, RequirementKind};

impl PropertyMap {
    /// Run one concretization pass over the current bags.
    pub fn concretize_nested_types(
        &mut self,
        system: &mut RewriteSystem,
        interfaces: &InterfaceRegistry,
        lookup: &dyn ConformanceLookup,
    ) {
        for slot in 0..self.entries.len() {
            let bag = &self.entries[slot];
            if bag.conforms_to().is_empty() {
                continue;
            }
            let key = bag.key().clone();
            let conforms: Vec<(InterfaceId, RuleId)> = bag
                .conforms_to()
                .iter()
                .cloned()
                .zip(bag.conforms_to_rules().iter().copied())
                .collect();
            let parents = [
                (RequirementKind::SameType, bag.concrete_type().cloned()),
                (RequirementKind::Superclass, bag.superclass().cloned()),
            ];
            for (kind, parent) in parents {
                let Some(parent) = parent else {
                    continue;
                };
                system.tracer().emit(DebugCategory::ConcretizeNestedTypes, || {
                    TraceEvent::ConcretizingKey {
                        key: key.to_string(),
                        via: kind.as_str().to_string(),
                    }
                });
                let ctx = Parent {
                    slot,
                    key: &key,
                    kind,
                    property: &parent,
                };
                self.concretize_from_parent(system, interfaces, lookup, &ctx, &conforms);
            }
        }
    }

    fn concretize_from_parent(
        &mut self,
        system: &mut RewriteSystem,
        interfaces: &InterfaceRegistry,
        lookup: &dyn ConformanceLookup,
        parent: &Parent<'_>,
        conforms: &[(InterfaceId, RuleId)],
    ) {
        let tracer = system.tracer().clone();
        let concrete_rule = parent.property.rule;

        for (interface, conformance_rule) in conforms {
            let pair = (concrete_rule, *conformance_rule);

            // Already processed, typically for a suffix of this key.
            if let Some(imp) = self.concrete_conformances.get(&pair) {
                let imp = imp.clone();
                self.entries[parent.slot].conformances_mut(parent.kind).push(imp);
                tracer.emit(DebugCategory::ConcretizeNestedTypes, || {
                    TraceEvent::CachedConformance {
                        key: parent.key.to_string(),
                        concrete_rule,
                        conformance_rule: *conformance_rule,
                    }
                });
                continue;
            }

            let Some(conformance) = lookup.lookup_conformance(&parent.property.schema, interface)
            else {
                let conflict = parent.kind.missing_conformance_conflicts();
                if conflict {
                    // Only rules stated on this very key; ones inherited from
                    // a suffix are that suffix's business.
                    for rule in [concrete_rule, *conformance_rule] {
                        if system.rule(rule).rhs().len() == parent.key.len() {
                            system.mark_conflicting(rule);
                        }
                    }
                }
                tracer.emit(DebugCategory::ConcretizeNestedTypes, || {
                    TraceEvent::MissingConformance {
                        concrete: parent.property.schema.to_string(),
                        interface: interface.to_string(),
                        conflict,
                    }
                });
                continue;
            };

            let imp = match conformance {
                Conformance::Concrete(imp) => imp,
                Conformance::Abstract(_) => panic!(
                    "conformance of concrete type `{}` to `{interface}` resolved to an abstract conformance",
                    parent.property.schema
                ),
            };

            let previous = self.concrete_conformances.insert(pair, imp.clone());
            assert!(
                previous.is_none(),
                "rules {concrete_rule} and {conformance_rule} concretized twice"
            );
            self.entries[parent.slot]
                .conformances_mut(parent.kind)
                .push(imp.clone());

            let conformance_symbol = Symbol::concrete_conformance(
                parent.property.schema.clone(),
                parent.property.substitutions.clone(),
                interface.clone(),
            );
            record_concrete_conformance_rule(
                system,
                concrete_rule,
                *conformance_rule,
                &conformance_symbol,
            );

            for member in interfaces.member_types(interface) {
                self.concretize_type_witness(
                    system,
                    parent,
                    &conformance_symbol,
                    interface,
                    &imp,
                    member,
                );
            }

            // Conditional requirements are only inferred for top-level
            // generic signatures, never inside a requirement signature.
            if parent.key.root_interface().is_none() {
                self.infer_conditional_requirements(
                    system,
                    interfaces,
                    lookup,
                    &imp,
                    &parent.property.substitutions,
                );
            }
        }
    }

    fn concretize_type_witness(
        &self,
        system: &mut RewriteSystem,
        parent: &Parent<'_>,
        conformance_symbol: &Symbol,
        interface: &InterfaceId,
        imp: &ConcreteImpl,
        member: &Name,
    ) {
        let tracer = system.tracer().clone();
        let witness = imp.type_witness(member).cloned().unwrap_or(Type::Error);
        tracer.emit(DebugCategory::ConcretizeNestedTypes, || TraceEvent::TypeWitness {
            interface: interface.to_string(),
            member: member.to_string(),
            concrete: parent.property.schema.to_string(),
            witness: witness.to_string(),
        });

        let member_symbol = Symbol::MemberType {
            interface: interface.clone(),
            name: member.clone(),
        };
        let subject = parent
            .key
            .to_mutable()
            .with(conformance_symbol.clone())
            .with(member_symbol.clone());

        let mut path = RewritePath::new();
        let constraint = self.constraint_term_for_type_witness(
            system,
            parent,
            conformance_symbol,
            &member_symbol,
            witness,
            &subject,
            &mut path,
        );

        let shown = tracer
            .enabled(DebugCategory::ConcretizeNestedTypes)
            .then(|| (constraint.to_string(), subject.to_string()));
        if system.add_rule(constraint, subject, &path).is_some() {
            if let Some((lhs, rhs)) = shown {
                tracer.emit(DebugCategory::ConcretizeNestedTypes, || TraceEvent::InducedRule {
                    lhs,
                    rhs,
                });
            }
        }
    }

    /// The term the subject `T.[C : P].[P:X]` is equated with, plus the path
    /// from that term to the subject.
    ///
    /// * abstract witness `U.Y`: the term for `U.Y`;
    /// * fully concrete witness already carried by a prefix `V` of the key:
    ///   `V.[concrete: W]`;
    /// * witness equal to `C` itself (same-type only): `T.[C : P]`;
    /// * otherwise `T.[C : P].[P:X].[concrete: W]`.
    #[allow(clippy::too_many_arguments)]
    fn constraint_term_for_type_witness(
        &self,
        system: &mut RewriteSystem,
        parent: &Parent<'_>,
        conformance_symbol: &Symbol,
        member_symbol: &Symbol,
        mut witness: Type,
        subject: &MutableTerm,
        path: &mut RewritePath,
    ) -> MutableTerm {
        let tracer = system.tracer().clone();
        let substitutions = conformance_symbol.substitutions();
        let root = TermRoot::Substitutions(substitutions);
        let key = parent.key;

        if witness.is_type_parameter() {
            match root.term_for_type(&witness) {
                Ok(result) => {
                    let relation = system
                        .relations_mut()
                        .record(Term::from(&result), Term::from(subject));
                    path.add(RewriteStep::relation(0, 0, relation, false));
                    return result;
                }
                Err(_) => witness = Type::Error,
            }
        }

        let (schema, witness_substitutions) = root
            .substitution_schema(&witness)
            .unwrap_or((Type::Error, Vec::new()));
        let mut witness_symbol = Symbol::concrete(schema, witness_substitutions);

        if !witness.has_type_parameter() {
            for end in (1..=key.len()).rev() {
                let prefix = Term::from(key[..end].to_vec());
                let Some(bag) = self.bag(&prefix) else {
                    continue;
                };
                if bag.concrete_type().is_some_and(|c| c.schema == witness) {
                    let result = bag.key().to_mutable().with(witness_symbol.clone());
                    let relation = system
                        .relations_mut()
                        .record(Term::from(&result), Term::from(subject));
                    path.add(RewriteStep::relation(0, 0, relation, false));
                    tracer.emit(DebugCategory::ConcretizeNestedTypes, || {
                        TraceEvent::ReusedPrefix {
                            term: result.to_string(),
                        }
                    });
                    return result;
                }
            }
        }

        // Recorded against the witness before its substitutions are simplified.
        let concrete_relation = system.relations_mut().record_concrete_type_witness(
            conformance_symbol,
            member_symbol,
            &witness_symbol,
        );

        let mut subst_path = RewritePath::new();
        if let Some((simplified, relation)) = system.simplify_substitutions(&witness_symbol) {
            // [concrete: W'] => [concrete: W], at the end of T.[C : P].[P:X].[concrete: W'].
            subst_path.add(RewriteStep::relation(key.len() + 2, 0, relation, true));
            witness_symbol = simplified;
        }

        let parent_symbol = parent.kind.symbol(
            parent.property.schema.clone(),
            parent.property.substitutions.clone(),
        );
        if parent.kind == RequirementKind::SameType
            && witness_symbol.schema() == parent_symbol.schema()
            && witness_symbol.substitutions() == parent_symbol.substitutions()
        {
            tracer.emit(DebugCategory::ConcretizeNestedTypes, || {
                TraceEvent::SelfReferentialWitness {
                    key: key.to_string(),
                }
            });
            let result = key.to_mutable().with(conformance_symbol.clone());
            let same_relation = system
                .relations_mut()
                .record_same_type_witness(conformance_symbol, member_symbol);
            // T.[C : P] => T.[C : P].[P:X].[concrete: C]
            path.add(RewriteStep::relation(key.len(), 0, same_relation, true));
            path.append(&subst_path);
            // T.[C : P].[P:X].[concrete: W] => T.[C : P].[P:X]
            path.add(RewriteStep::relation(key.len(), 0, concrete_relation, false));
            return result;
        }

        let result = subject.with(witness_symbol);
        path.append(&subst_path);
        path.add(RewriteStep::relation(key.len(), 0, concrete_relation, false));
        result
    }
}

/// The key being concretized and the property fixing it.
struct Parent<'a> {
    slot: usize,
    key: &'a Term,
    kind: RequirementKind,
    property: &'a ConcreteProperty,
}

/// Add `T''.[C : P] => T''` for a concrete rule `T'.[concrete: C] => T'` and
/// a conformance rule `T.[P] => T`, where `T''` is the longer of `T` and `T'`
/// and the shorter one is a suffix of it.
fn record_concrete_conformance_rule(
    system: &mut RewriteSystem,
    concrete_rule: RuleId,
    conformance_rule: RuleId,
    conformance_symbol: &Symbol,
) {
    let concrete = system.rule(concrete_rule);
    let conformance = system.rule(conformance_rule);
    let mut concrete_symbol = concrete
        .property_symbol()
        .unwrap_or_else(|| panic!("concrete rule {concrete_rule} is not a property rule"))
        .clone();
    let interface_symbol = conformance
        .property_symbol()
        .unwrap_or_else(|| panic!("conformance rule {conformance_rule} is not a property rule"))
        .clone();
    let concrete_rhs_len = concrete.rhs().len();
    let conformance_rhs_len = conformance.rhs().len();
    let rhs = if concrete_rhs_len > conformance_rhs_len {
        concrete.rhs().to_mutable()
    } else {
        conformance.rhs().to_mutable()
    };

    let mut path = RewritePath::new();
    // T'' => T''.[P]
    path.add(RewriteStep::rule(
        rhs.len() - conformance_rhs_len,
        0,
        conformance_rule,
        true,
    ));
    // T''.[P] => T''.[concrete: C].[P]
    let prefix_length = rhs.len() - concrete_rhs_len;
    path.add(RewriteStep::rule(prefix_length, 1, concrete_rule, true));

    if prefix_length > 0 && !conformance_symbol.substitutions().is_empty() {
        path.add(RewriteStep::prefix_substitutions(prefix_length, 1, false));
        concrete_symbol = concrete_symbol.prepend_prefix_to_substitutions(&rhs[..prefix_length]);
    }

    // T''.[concrete: C].[P] => T''.[C : P]
    let relation = system.relations_mut().record_concrete_conformance(
        &concrete_symbol,
        &interface_symbol,
        conformance_symbol,
    );
    path.add(RewriteStep::relation(rhs.len(), 0, relation, false));

    let lhs = rhs.with(conformance_symbol.clone());
    path.invert();
    system.add_rule(lhs, rhs, &path);
}

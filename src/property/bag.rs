//! Property bags: the facts known about one canonical term.

use std::fmt;
use std::sync::Arc;

use crate::conformance::ConcreteImpl;
use crate::rewrite::RuleId;
use crate::symbol::{InterfaceId, Symbol};
use crate::term::Term;
use crate::types::Type;

/// The kind of requirement that fixed a key to a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    /// The key *is* the concrete type.
    SameType,
    /// The key is bounded by the concrete class.
    Superclass,
}

impl RequirementKind {
    /// Whether a concrete type without the required conformance is a conflict.
    pub fn missing_conformance_conflicts(self) -> bool {
        match self {
            Self::SameType => true,
            Self::Superclass => false,
        }
    }

    pub fn symbol(self, schema: Type, substitutions: Vec<Term>) -> Symbol {
        match self {
            Self::SameType => Symbol::concrete(schema, substitutions),
            Self::Superclass => Symbol::superclass(schema, substitutions),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SameType => "same-type",
            Self::Superclass => "superclass",
        }
    }
}

/// A concrete type or superclass bound, with the rule that introduced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteProperty {
    pub schema: Type,
    pub substitutions: Vec<Term>,
    pub rule: RuleId,
}

impl ConcreteProperty {
    fn same_type_as(&self, other: &ConcreteProperty) -> bool {
        self.schema == other.schema && self.substitutions == other.substitutions
    }
}

#[derive(Debug, Clone)]
pub struct PropertyBag {
    key: Term,
    conforms_to: Vec<InterfaceId>,
    /// Parallel to `conforms_to`.
    conforms_to_rules: Vec<RuleId>,
    concrete_type: Option<ConcreteProperty>,
    superclass: Option<ConcreteProperty>,
    concrete_conformances: Vec<Arc<ConcreteImpl>>,
    superclass_conformances: Vec<Arc<ConcreteImpl>>,
}

impl PropertyBag {
    pub(crate) fn new(key: Term) -> Self {
        Self {
            key,
            conforms_to: Vec::new(),
            conforms_to_rules: Vec::new(),
            concrete_type: None,
            superclass: None,
            concrete_conformances: Vec::new(),
            superclass_conformances: Vec::new(),
        }
    }

    /// Copy the properties of a suffix's bag. `prefix` is the part of this
    /// key in front of the suffix; substitutions are re-rooted onto it.
    pub(crate) fn inherit(&mut self, suffix: &PropertyBag, prefix: &[Symbol]) {
        self.conforms_to = suffix.conforms_to.clone();
        self.conforms_to_rules = suffix.conforms_to_rules.clone();
        let reroot = |p: &ConcreteProperty| ConcreteProperty {
            schema: p.schema.clone(),
            substitutions: p
                .substitutions
                .iter()
                .map(|t| Term::new(prefix.iter().cloned().chain(t.iter().cloned())))
                .collect(),
            rule: p.rule,
        };
        self.concrete_type = suffix.concrete_type.as_ref().map(reroot);
        self.superclass = suffix.superclass.as_ref().map(reroot);
    }

    /// Record the property of `rule`. Returns the rule to mark conflicting
    /// when it contradicts a property already present.
    pub(crate) fn add_property(&mut self, symbol: &Symbol, rule: RuleId) -> Option<RuleId> {
        match symbol {
            Symbol::Interface(p) => {
                if !self.conforms_to.contains(p) {
                    self.conforms_to.push(p.clone());
                    self.conforms_to_rules.push(rule);
                }
                None
            }
            Symbol::ConcreteType {
                schema,
                substitutions,
            } => merge(&mut self.concrete_type, schema, substitutions, rule),
            Symbol::Superclass {
                schema,
                substitutions,
            } => merge(&mut self.superclass, schema, substitutions, rule),
            // Derived from the other properties; nothing to record.
            _ => None,
        }
    }

    pub fn key(&self) -> &Term {
        &self.key
    }

    pub fn conforms_to(&self) -> &[InterfaceId] {
        &self.conforms_to
    }

    pub fn conforms_to_rules(&self) -> &[RuleId] {
        &self.conforms_to_rules
    }

    pub fn concrete_type(&self) -> Option<&ConcreteProperty> {
        self.concrete_type.as_ref()
    }

    pub fn superclass(&self) -> Option<&ConcreteProperty> {
        self.superclass.as_ref()
    }

    pub fn is_concrete_type(&self) -> bool {
        self.concrete_type.is_some()
    }

    pub fn has_superclass_bound(&self) -> bool {
        self.superclass.is_some()
    }

    pub fn property(&self, kind: RequirementKind) -> Option<&ConcreteProperty> {
        match kind {
            RequirementKind::SameType => self.concrete_type.as_ref(),
            RequirementKind::Superclass => self.superclass.as_ref(),
        }
    }

    /// Conformances resolved this round through the concrete type.
    pub fn concrete_conformances(&self) -> &[Arc<ConcreteImpl>] {
        &self.concrete_conformances
    }

    /// Conformances resolved this round through the superclass bound.
    pub fn superclass_conformances(&self) -> &[Arc<ConcreteImpl>] {
        &self.superclass_conformances
    }

    pub(crate) fn conformances_mut(&mut self, kind: RequirementKind) -> &mut Vec<Arc<ConcreteImpl>> {
        match kind {
            RequirementKind::SameType => &mut self.concrete_conformances,
            RequirementKind::Superclass => &mut self.superclass_conformances,
        }
    }

    /// Interfaces not already implied by the superclass bound.
    pub fn conforms_to_excluding_superclass_conformances(&self) -> Vec<&InterfaceId> {
        self.conforms_to
            .iter()
            .filter(|p| !self.superclass_conformances.iter().any(|c| c.interface == **p))
            .collect()
    }
}

fn merge(
    slot: &mut Option<ConcreteProperty>,
    schema: &Type,
    substitutions: &[Term],
    rule: RuleId,
) -> Option<RuleId> {
    let incoming = ConcreteProperty {
        schema: schema.clone(),
        substitutions: substitutions.to_vec(),
        rule,
    };
    if let Some(existing) = slot.as_ref() {
        // Incoming rules always belong to this key, so marking them leaves
        // inherited rules alone.
        return (!existing.same_type_as(&incoming)).then_some(rule);
    }
    *slot = Some(incoming);
    None
}

impl fmt::Display for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {{", self.key)?;
        if !self.conforms_to.is_empty() {
            f.write_str(" conforms_to: [")?;
            for (i, p) in self.conforms_to.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str("]")?;
        }
        if let Some(c) = &self.concrete_type {
            write!(f, " {}", RequirementKind::SameType.symbol(c.schema.clone(), c.substitutions.clone()))?;
        }
        if let Some(c) = &self.superclass {
            write!(f, " {}", RequirementKind::Superclass.symbol(c.schema.clone(), c.substitutions.clone()))?;
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gp(i: u32) -> Symbol {
        Symbol::GenericParam(i)
    }

    #[test]
    fn conformances_are_an_ordered_set() {
        let mut bag = PropertyBag::new(Term::from(vec![gp(0)]));
        let p = InterfaceId::new("P");
        let q = InterfaceId::new("Q");
        bag.add_property(&Symbol::Interface(q.clone()), 3);
        bag.add_property(&Symbol::Interface(p.clone()), 5);
        bag.add_property(&Symbol::Interface(q.clone()), 7);
        assert_eq!(bag.conforms_to(), &[q, p]);
        assert_eq!(bag.conforms_to_rules(), &[3, 5]);
    }

    #[test]
    fn differing_concrete_types_conflict() {
        let mut bag = PropertyBag::new(Term::from(vec![gp(0)]));
        let int = Symbol::concrete(Type::nominal("Int", vec![]), vec![]);
        let string = Symbol::concrete(Type::nominal("String", vec![]), vec![]);
        assert_eq!(bag.add_property(&int, 1), None);
        assert_eq!(bag.add_property(&int, 2), None);
        assert_eq!(bag.add_property(&string, 4), Some(4));
        assert_eq!(bag.concrete_type().unwrap().rule, 1);
    }

    #[test]
    fn inherited_substitutions_are_rerooted() {
        let p = InterfaceId::new("P");
        let mut suffix = PropertyBag::new(Term::from(vec![Symbol::member(&p, "A")]));
        suffix.add_property(
            &Symbol::concrete(
                Type::nominal("Array", vec![Type::Param(0)]),
                vec![Term::from(vec![Symbol::member(&p, "B")])],
            ),
            2,
        );
        suffix.add_property(&Symbol::Interface(p.clone()), 3);

        let mut bag = PropertyBag::new(Term::from(vec![gp(0), Symbol::member(&p, "A")]));
        bag.inherit(&suffix, &[gp(0)]);
        let concrete = bag.concrete_type().unwrap();
        assert_eq!(concrete.substitutions[0].to_string(), "τ_0_0.[P:B]");
        assert_eq!(concrete.rule, 2);
        assert_eq!(bag.conforms_to(), &[p]);
        assert!(bag.to_string().contains("[concrete: Array<τ_0_0> with <τ_0_0.[P:B]>]"));
    }
}

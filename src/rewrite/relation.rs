//! Recorded equivalences between terms.
//!
//! A relation is an equivalence the engine asserts once and then cites from
//! derivations by id. The same `(lhs, rhs)` pair always gets the same id.

use std::collections::HashMap;

use crate::symbol::Symbol;
use crate::term::Term;

pub type RelationId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub lhs: Term,
    pub rhs: Term,
}

#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    relations: Vec<Relation>,
    cache: HashMap<(Term, Term), RelationId>,
}

impl RelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, lhs: Term, rhs: Term) -> RelationId {
        if let Some(&id) = self.cache.get(&(lhs.clone(), rhs.clone())) {
            return id;
        }
        let id = self.relations.len();
        self.cache.insert((lhs.clone(), rhs.clone()), id);
        self.relations.push(Relation { lhs, rhs });
        id
    }

    pub fn get(&self, id: RelationId) -> &Relation {
        &self.relations[id]
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// `[concrete: C].[P] => [concrete: C : P]`
    pub fn record_concrete_conformance(
        &mut self,
        concrete: &Symbol,
        interface: &Symbol,
        concrete_conformance: &Symbol,
    ) -> RelationId {
        self.record(
            Term::from(vec![concrete.clone(), interface.clone()]),
            Term::from(vec![concrete_conformance.clone()]),
        )
    }

    /// `[C : P].[P:X].[concrete: W] => [C : P].[P:X]`
    pub fn record_concrete_type_witness(
        &mut self,
        concrete_conformance: &Symbol,
        member: &Symbol,
        witness: &Symbol,
    ) -> RelationId {
        self.record(
            Term::from(vec![
                concrete_conformance.clone(),
                member.clone(),
                witness.clone(),
            ]),
            Term::from(vec![concrete_conformance.clone(), member.clone()]),
        )
    }

    /// `[C : P].[P:X].[concrete: C] => [C : P]`
    pub fn record_same_type_witness(
        &mut self,
        concrete_conformance: &Symbol,
        member: &Symbol,
    ) -> RelationId {
        let concrete = match concrete_conformance {
            Symbol::ConcreteConformance {
                schema,
                substitutions,
                ..
            } => Symbol::concrete(schema.clone(), substitutions.clone()),
            other => other.clone(),
        };
        self.record(
            Term::from(vec![concrete_conformance.clone(), member.clone(), concrete]),
            Term::from(vec![concrete_conformance.clone()]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::InterfaceId;
    use crate::types::Type;

    #[test]
    fn recording_is_memoized() {
        let mut table = RelationTable::new();
        let a = Term::from(vec![Symbol::GenericParam(1)]);
        let b = Term::from(vec![Symbol::GenericParam(0)]);
        let first = table.record(a.clone(), b.clone());
        assert_eq!(table.record(a.clone(), b.clone()), first);
        assert_ne!(table.record(b, a), first);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_type_witness_shape() {
        let mut table = RelationTable::new();
        let p = InterfaceId::new("P");
        let bar = Type::nominal("Bar", vec![]);
        let conf = Symbol::concrete_conformance(bar.clone(), vec![], p.clone());
        let id = table.record_same_type_witness(&conf, &Symbol::member(&p, "M"));
        let rel = table.get(id);
        assert_eq!(rel.lhs.len(), 3);
        assert_eq!(rel.lhs[2], Symbol::concrete(bar, vec![]));
        assert_eq!(rel.rhs.to_string(), "[concrete: Bar : P]");
    }
}

//! The property map: per-term facts derived from property rules.
//!
//! Each round the map is rebuilt from the live property rules `X.[p] => X`
//! of the rewrite system, one [`PropertyBag`] per key `X`. A bag starts out
//! with the properties of its longest proper suffix that has a bag, since
//! rules apply anywhere inside a term. The concretization pass then reads the
//! bags and adds rules back to the system.
//!
//! Bags are discarded at the next rebuild. The at-most-once cache of resolved
//! conformances lives for the whole run.

mod bag;
mod concretize;
mod conditional;

use std::collections::HashMap;
use std::sync::Arc;

use crate::conformance::ConcreteImpl;
use crate::rewrite::{RewriteSystem, RuleId};
use crate::symbol::Symbol;
use crate::term::Term;
use crate::trace::{DebugCategory, TraceEvent};

pub use bag::{ConcreteProperty, PropertyBag, RequirementKind};

#[derive(Debug, Default)]
pub struct PropertyMap {
    entries: Vec<PropertyBag>,
    index: HashMap<Term, usize>,
    /// `(concrete rule, conformance rule)` pairs already concretized.
    concrete_conformances: HashMap<(RuleId, RuleId), Arc<ConcreteImpl>>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the bags from the current rules. Returns the number of rules
    /// newly marked conflicting.
    pub fn rebuild(&mut self, system: &mut RewriteSystem) -> usize {
        self.entries.clear();
        self.index.clear();

        let mut property_rules: Vec<(RuleId, Symbol)> = system
            .rules()
            .iter()
            .filter(|r| !r.is_simplified() && !r.is_permanent() && !r.is_conflicting())
            .filter_map(|r| r.property_symbol().map(|s| (r.id(), s.clone())))
            .collect();
        property_rules.sort_by_key(|(id, _)| (system.rule(*id).rhs().len(), *id));

        let tracer = system.tracer().clone();
        let mut conflicts = 0;
        for (id, symbol) in property_rules {
            let key = system.rule(id).rhs().clone();
            let slot = self.get_or_create(&key);
            if let Some(conflicting) = self.entries[slot].add_property(&symbol, id) {
                system.mark_conflicting(conflicting);
                conflicts += 1;
                tracer.emit(DebugCategory::PropertyMap, || TraceEvent::PropertyConflict {
                    key: key.to_string(),
                    rule: conflicting,
                });
            }
        }

        tracer.emit(DebugCategory::PropertyMap, || TraceEvent::BuiltPropertyMap {
            bags: self.entries.len(),
        });
        conflicts
    }

    fn get_or_create(&mut self, key: &Term) -> usize {
        if let Some(&slot) = self.index.get(key) {
            return slot;
        }
        let mut bag = PropertyBag::new(key.clone());
        for start in 1..key.len() {
            let suffix = Term::from(key[start..].to_vec());
            if let Some(&parent) = self.index.get(&suffix) {
                bag.inherit(&self.entries[parent], &key[..start]);
                break;
            }
        }
        let slot = self.entries.len();
        self.entries.push(bag);
        self.index.insert(key.clone(), slot);
        slot
    }

    /// The bag for `term` itself, or for its longest suffix that has one.
    pub fn lookup_properties(&self, term: &[Symbol]) -> Option<&PropertyBag> {
        (0..term.len()).find_map(|start| {
            let suffix = Term::from(term[start..].to_vec());
            self.index.get(&suffix).map(|&slot| &self.entries[slot])
        })
    }

    /// The bag whose key is exactly `key`.
    pub fn bag(&self, key: &Term) -> Option<&PropertyBag> {
        self.index.get(key).map(|&slot| &self.entries[slot])
    }

    pub fn entries(&self) -> &[PropertyBag] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `(concrete rule, conformance rule)` pairs resolved so far.
    pub fn resolved_conformance_count(&self) -> usize {
        self.concrete_conformances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::InterfaceId;
    use crate::term::MutableTerm;
    use crate::types::Type;

    fn gp(i: u32) -> Symbol {
        Symbol::GenericParam(i)
    }

    #[test]
    fn bags_collect_properties_per_key() {
        let p = InterfaceId::new("P");
        let mut system = RewriteSystem::new();
        system.add_explicit_rule(
            MutableTerm::from(vec![gp(0), Symbol::Interface(p.clone())]),
            MutableTerm::from(vec![gp(0)]),
        );
        system.add_explicit_rule(
            MutableTerm::from(vec![gp(0), Symbol::concrete(Type::nominal("Int", vec![]), vec![])]),
            MutableTerm::from(vec![gp(0)]),
        );
        let mut map = PropertyMap::new();
        assert_eq!(map.rebuild(&mut system), 0);
        assert_eq!(map.len(), 1);
        let bag = map.bag(&Term::from(vec![gp(0)])).unwrap();
        assert_eq!(bag.conforms_to(), &[p.clone()]);
        assert!(bag.is_concrete_type());

        let member = [gp(0), Symbol::member(&p, "A")];
        assert!(map.lookup_properties(&member).is_none());
        let nested = [Symbol::member(&p, "A"), gp(0)];
        assert_eq!(map.lookup_properties(&nested).unwrap().key(), bag.key());
    }

    #[test]
    fn conflicting_concrete_types_mark_the_newer_rule() {
        let mut system = RewriteSystem::new();
        let t = MutableTerm::from(vec![gp(0)]);
        system.add_explicit_rule(t.with(Symbol::concrete(Type::nominal("Int", vec![]), vec![])), t.clone());
        let newer = system
            .add_explicit_rule(t.with(Symbol::concrete(Type::nominal("String", vec![]), vec![])), t.clone())
            .unwrap();
        let mut map = PropertyMap::new();
        assert_eq!(map.rebuild(&mut system), 1);
        assert!(system.rule(newer).is_conflicting());
        // Conflicting rules are no longer evidence.
        assert_eq!(map.rebuild(&mut system), 0);
        assert_eq!(
            map.bag(&Term::from(t)).unwrap().concrete_type().unwrap().schema,
            Type::nominal("Int", vec![])
        );
    }

    #[test]
    fn longer_keys_inherit_from_suffixes() {
        let p = InterfaceId::new("P");
        let q = InterfaceId::new("Q");
        let a = Symbol::member(&p, "A");
        let mut system = RewriteSystem::new();
        system.add_explicit_rule(
            MutableTerm::from(vec![a.clone(), Symbol::Interface(q.clone())]),
            MutableTerm::from(vec![a.clone()]),
        );
        system.add_explicit_rule(
            MutableTerm::from(vec![gp(0), a.clone(), Symbol::concrete(Type::nominal("Int", vec![]), vec![])]),
            MutableTerm::from(vec![gp(0), a.clone()]),
        );
        let mut map = PropertyMap::new();
        map.rebuild(&mut system);
        let bag = map.bag(&Term::from(vec![gp(0), a])).unwrap();
        assert_eq!(bag.conforms_to(), &[q]);
        assert!(bag.is_concrete_type());
    }
}

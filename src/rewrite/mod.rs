//! The rewrite system: rule store, reduction, relations and derivations.
//!
//! Rules are oriented by shortlex order and only ever appended. Every rule the
//! engine derives carries a [`RewritePath`] that replays from its left-hand
//! side to its right-hand side; [`RewriteSystem::verify_derivations`] checks
//! them all. Explicit rules (lowered requirements) and permanent rules
//! (structural identities of an interface) are axioms and carry none.

pub mod path;
pub mod relation;
pub mod rule;

use std::collections::{BTreeSet, HashMap};

use crate::conformance::ConformanceLookup;
use crate::error::{InterfaceError, ReqResult, RequirementError, RewriteError};
use crate::interface::InterfaceRegistry;
use crate::requirement::{desugar_requirement, rule_for_requirement};
use crate::symbol::{InterfaceId, Symbol};
use crate::term::{MutableTerm, Term};
use crate::trace::{DebugCategory, TraceEvent, Tracer};
use crate::types::TermRoot;

pub use path::{RewritePath, RewriteStep, StepKind};
pub use relation::{Relation, RelationId, RelationTable};
pub use rule::{Rule, RuleId};

#[derive(Debug, Default)]
pub struct RewriteSystem {
    rules: Vec<Rule>,
    /// Live rules by the first symbol of their left-hand side.
    index: HashMap<Symbol, Vec<RuleId>>,
    relations: RelationTable,
    known_interfaces: BTreeSet<InterfaceId>,
    requirement_errors: Vec<RequirementError>,
    tracer: Tracer,
}

impl RewriteSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracer(tracer: Tracer) -> Self {
        Self {
            tracer,
            ..Self::default()
        }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }

    // ── Rule store ──────────────────────────────────────────────────────

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    pub fn relations_mut(&mut self) -> &mut RelationTable {
        &mut self.relations
    }

    /// Add a derived rule. `path` must rewrite `lhs` into `rhs`.
    ///
    /// Both sides are normalized first; if they meet, nothing is added and
    /// `None` is returned.
    ///
    /// # Panics
    ///
    /// If `path` is empty: a derived rule without a derivation is an engine bug.
    pub fn add_rule(
        &mut self,
        lhs: MutableTerm,
        rhs: MutableTerm,
        path: &RewritePath,
    ) -> Option<RuleId> {
        assert!(
            !path.is_empty(),
            "rule {lhs} => {rhs} added without a derivation"
        );
        let (lhs_nf, lhs_path) = self.normalize(&lhs);
        let (rhs_nf, rhs_path) = self.normalize(&rhs);
        if lhs_nf == rhs_nf {
            return None;
        }
        let mut full = lhs_path.inverted();
        full.append(path);
        full.append(&rhs_path);
        Some(self.insert(lhs_nf, rhs_nf, Some(full)))
    }

    /// Add a rule stating a requirement. It has no derivation.
    pub fn add_explicit_rule(&mut self, lhs: MutableTerm, rhs: MutableTerm) -> Option<RuleId> {
        let (lhs, _) = self.normalize(&lhs);
        let (rhs, _) = self.normalize(&rhs);
        if lhs == rhs {
            return None;
        }
        let id = self.insert(lhs, rhs, None);
        self.rules[id].mark_explicit();
        Some(id)
    }

    /// Add a structural identity. Permanent rules are never simplified and
    /// never contribute properties.
    pub fn add_permanent_rule(&mut self, lhs: MutableTerm, rhs: MutableTerm) -> Option<RuleId> {
        let id = self.add_explicit_rule(lhs, rhs)?;
        self.rules[id].mark_permanent();
        Some(id)
    }

    // Orient and append.
    fn insert(&mut self, a: MutableTerm, b: MutableTerm, path: Option<RewritePath>) -> RuleId {
        let (lhs, rhs, path) = if a > b {
            (a, b, path)
        } else {
            (b, a, path.map(|p| p.inverted()))
        };
        let id = self.rules.len();
        if let Some(first) = lhs.first() {
            self.index.entry(first.clone()).or_default().push(id);
        }
        self.rules.push(Rule::new(id, Term::from(lhs), Term::from(rhs), path));
        id
    }

    pub fn mark_conflicting(&mut self, id: RuleId) {
        self.rules[id].mark_conflicting();
    }

    // ── Reduction ───────────────────────────────────────────────────────

    /// Reduce `term` to normal form with live rules, leftmost match first.
    pub fn reduce(&self, term: &MutableTerm) -> (MutableTerm, RewritePath) {
        let mut term = term.clone();
        let mut path = RewritePath::new();
        self.reduce_in_place(&mut term, &mut path);
        (term, path)
    }

    pub fn is_reducible(&self, term: &[Symbol]) -> bool {
        self.find_match(term).is_some()
    }

    fn reduce_in_place(&self, term: &mut MutableTerm, path: &mut RewritePath) {
        while let Some((pos, id)) = self.find_match(term) {
            let rule = &self.rules[id];
            let end = term.len() - pos - rule.lhs().len();
            term.splice(pos, pos + rule.lhs().len(), rule.rhs());
            path.add(RewriteStep::rule(pos, end, id, false));
        }
    }

    fn find_match(&self, term: &[Symbol]) -> Option<(usize, RuleId)> {
        for pos in 0..term.len() {
            let Some(candidates) = self.index.get(&term[pos]) else {
                continue;
            };
            for &id in candidates {
                let rule = &self.rules[id];
                if !rule.is_simplified() && term[pos..].starts_with(rule.lhs()) {
                    return Some((pos, id));
                }
            }
        }
        None
    }

    /// Reduce `term`, including the substitution terms inside its symbols.
    pub fn normalize(&mut self, term: &MutableTerm) -> (MutableTerm, RewritePath) {
        let mut term = term.clone();
        let mut path = RewritePath::new();
        loop {
            self.reduce_in_place(&mut term, &mut path);
            let mut changed = false;
            for pos in 0..term.len() {
                if let Some((simplified, relation)) = self.simplify_substitutions(&term[pos]) {
                    let end = term.len() - pos - 1;
                    term.symbols_mut()[pos] = simplified;
                    path.add(RewriteStep::relation(pos, end, relation, false));
                    changed = true;
                }
            }
            if !changed {
                return (term, path);
            }
        }
    }

    /// Reduce the substitution terms of a property symbol.
    ///
    /// Returns the simplified symbol together with the relation
    /// `[old] => [new]` it was recorded under, or `None` if every
    /// substitution is already reduced.
    pub fn simplify_substitutions(&mut self, symbol: &Symbol) -> Option<(Symbol, RelationId)> {
        let substitutions = symbol.substitutions();
        if substitutions.is_empty() {
            return None;
        }
        let mut changed = false;
        let reduced: Vec<Term> = substitutions
            .iter()
            .map(|t| {
                let (nf, path) = self.reduce(&t.to_mutable());
                changed |= !path.is_empty();
                Term::from(nf)
            })
            .collect();
        if !changed {
            return None;
        }
        let simplified = symbol.with_substitutions(reduced);
        let relation = self.relations.record(
            Term::from(vec![symbol.clone()]),
            Term::from(vec![simplified.clone()]),
        );
        Some((simplified, relation))
    }

    // ── Derivations ─────────────────────────────────────────────────────

    /// Replay `path` starting from `term`.
    pub fn apply_path(
        &self,
        term: &MutableTerm,
        path: &RewritePath,
    ) -> Result<MutableTerm, RewriteError> {
        let mut term = term.clone();
        for (index, step) in path.steps().iter().enumerate() {
            self.apply_step(&mut term, step)
                .map_err(|reason| RewriteError::PathMismatch {
                    step: index,
                    term: term.to_string(),
                    reason,
                })?;
        }
        Ok(term)
    }

    fn apply_step(&self, term: &mut MutableTerm, step: &RewriteStep) -> Result<(), String> {
        let (lhs, rhs) = match step.kind {
            StepKind::Rule(id) => {
                let rule = self.rules.get(id).ok_or(format!("no rule {id}"))?;
                (rule.lhs(), rule.rhs())
            }
            StepKind::Relation(id) => {
                if id >= self.relations.len() {
                    return Err(format!("no relation {id}"));
                }
                let relation = self.relations.get(id);
                (&relation.lhs, &relation.rhs)
            }
            StepKind::PrefixSubstitutions { length } => {
                return apply_prefix_step(term, step, length);
            }
        };
        let (from, to) = if step.inverse { (rhs, lhs) } else { (lhs, rhs) };
        if step.start_offset + from.len() + step.end_offset != term.len() {
            return Err(format!(
                "offsets ({}, {}) do not frame `{from}`",
                step.start_offset, step.end_offset
            ));
        }
        let range = step.start_offset..step.start_offset + from.len();
        if term[range.clone()] != from[..] {
            return Err(format!("expected `{from}`"));
        }
        term.splice(range.start, range.end, to);
        Ok(())
    }

    /// Replay every recorded derivation against its rule.
    pub fn verify_derivations(&self) -> Result<usize, RewriteError> {
        let mut checked = 0;
        for rule in &self.rules {
            let Some(path) = rule.derivation() else {
                continue;
            };
            let end = self.apply_path(&rule.lhs().to_mutable(), path)?;
            if Term::from(&end) != *rule.rhs() {
                return Err(RewriteError::WrongEndpoint {
                    rule: rule.id(),
                    expected: rule.rhs().to_string(),
                    actual: end.to_string(),
                });
            }
            checked += 1;
        }
        Ok(checked)
    }

    // ── Round-start bookkeeping ─────────────────────────────────────────

    /// Bring rules back to normal form after new rules were added.
    ///
    /// A property rule whose key (or substitutions) became reducible is
    /// transported onto the reduced key. Any other rule with a reducible
    /// right-hand side is replaced by one with the reduced right-hand side.
    /// Returns the number of rules marked simplified.
    pub fn simplify_rules(&mut self) -> usize {
        let mut simplified = 0;
        let mut id = 0;
        while id < self.rules.len() {
            let rule = &self.rules[id];
            if rule.is_simplified() || rule.is_permanent() {
                id += 1;
                continue;
            }
            let lhs = rule.lhs().to_mutable();
            let rhs = rule.rhs().to_mutable();
            let side = if let Some(symbol) = rule.property_symbol() {
                let stale_subs = symbol
                    .substitutions()
                    .iter()
                    .any(|t| self.is_reducible(t));
                if stale_subs || self.is_reducible(&rhs) {
                    self.rules[id].mark_lhs_simplified();
                    Some("lhs")
                } else {
                    None
                }
            } else if self.is_reducible(&rhs) {
                self.rules[id].mark_rhs_simplified();
                Some("rhs")
            } else {
                None
            };
            if let Some(side) = side {
                simplified += 1;
                self.tracer.emit(DebugCategory::Simplify, || TraceEvent::SimplifiedRule {
                    rule: id,
                    side: side.to_string(),
                });
                let was_conflicting = self.rules[id].is_conflicting();
                let replacement = self.add_rule(
                    lhs,
                    rhs,
                    &RewritePath::from(RewriteStep::rule(0, 0, id, false)),
                );
                if let (Some(new_id), true) = (replacement, was_conflicting) {
                    self.rules[new_id].mark_conflicting();
                }
            }
            id += 1;
        }
        simplified
    }

    // ── Interfaces ──────────────────────────────────────────────────────

    pub fn is_known_interface(&self, id: &InterfaceId) -> bool {
        self.known_interfaces.contains(id)
    }

    pub fn known_interfaces(&self) -> &BTreeSet<InterfaceId> {
        &self.known_interfaces
    }

    /// Import the rules of `id` and of every interface it references,
    /// each exactly once. Returns whether `id` was new.
    ///
    /// Every requirement signature is lowered before anything is recorded,
    /// so a failure leaves the system untouched.
    pub fn register_interface(
        &mut self,
        registry: &InterfaceRegistry,
        lookup: &dyn ConformanceLookup,
        id: &InterfaceId,
    ) -> ReqResult<bool> {
        if self.known_interfaces.contains(id) {
            return Ok(false);
        }

        let mut pending = Vec::new();
        let mut seen = BTreeSet::new();
        let mut worklist = vec![id.clone()];
        while let Some(next) = worklist.pop() {
            if self.known_interfaces.contains(&next) || !seen.insert(next.clone()) {
                continue;
            }
            let decl = registry.get(&next).ok_or_else(|| InterfaceError::Unknown {
                interface: id.to_string(),
                referenced: next.to_string(),
            })?;

            let mut requirements = Vec::new();
            let mut errors = Vec::new();
            for raw in &decl.requirements {
                desugar_requirement(raw, lookup, &mut requirements, &mut errors);
            }
            let lowered = requirements
                .iter()
                .map(|req| rule_for_requirement(req, TermRoot::Interface(&next)))
                .collect::<Result<Vec<_>, _>>()?;

            worklist.extend(
                registry
                    .referenced_interfaces(&next)
                    .into_iter()
                    .filter(|p| !self.known_interfaces.contains(p) && !seen.contains(p)),
            );
            pending.push((next, decl, lowered, errors));
        }

        for (next, decl, lowered, errors) in pending {
            self.known_interfaces.insert(next.clone());
            self.tracer
                .emit(DebugCategory::ConditionalRequirements, || {
                    TraceEvent::RegisteredInterface {
                        interface: next.to_string(),
                    }
                });

            let this = Symbol::Interface(next.clone());
            let root = MutableTerm::from(vec![this.clone()]);
            self.add_permanent_rule(root.with(this.clone()), root.clone());
            for member in &decl.members {
                let projection = Symbol::MemberType {
                    interface: next.clone(),
                    name: member.clone(),
                };
                self.add_permanent_rule(
                    root.with(projection.clone()),
                    MutableTerm::from(vec![projection]),
                );
            }
            for parent in &decl.inherits {
                self.add_explicit_rule(root.with(Symbol::Interface(parent.clone())), root.clone());
            }
            for (lhs, rhs) in lowered {
                self.add_explicit_rule(lhs, rhs);
            }
            for error in errors {
                self.record_requirement_error(error);
            }
        }
        Ok(true)
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    pub fn requirement_errors(&self) -> &[RequirementError] {
        &self.requirement_errors
    }

    pub fn record_requirement_error(&mut self, error: RequirementError) {
        if !self.requirement_errors.contains(&error) {
            self.requirement_errors.push(error);
        }
    }
}

fn apply_prefix_step(term: &mut MutableTerm, step: &RewriteStep, length: usize) -> Result<(), String> {
    let prefix_end = step.start_offset + length;
    if step.end_offset + 1 > term.len() || term.len() - 1 - step.end_offset < prefix_end {
        return Err(format!(
            "prefix of length {length} at {} overlaps the edited symbol",
            step.start_offset
        ));
    }
    let at = term.len() - 1 - step.end_offset;
    let prefix: Vec<Symbol> = term[step.start_offset..prefix_end].to_vec();
    let symbol = &term[at];
    let edited = if step.inverse {
        symbol
            .strip_prefix_from_substitutions(&prefix)
            .ok_or_else(|| format!("substitutions of `{symbol}` do not start with the prefix"))?
    } else {
        symbol.prepend_prefix_to_substitutions(&prefix)
    };
    term.symbols_mut()[at] = edited;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::ConformanceTable;
    use crate::interface::InterfaceDecl;
    use crate::requirement::RawRequirement;
    use crate::types::Type;

    fn gp(i: u32) -> Symbol {
        Symbol::GenericParam(i)
    }

    fn term(symbols: Vec<Symbol>) -> MutableTerm {
        MutableTerm::from(symbols)
    }

    #[test]
    fn explicit_rules_are_oriented() {
        let mut system = RewriteSystem::new();
        let id = system.add_explicit_rule(term(vec![gp(0)]), term(vec![gp(1)])).unwrap();
        let rule = system.rule(id);
        assert_eq!(rule.lhs().to_string(), "τ_0_1");
        assert_eq!(rule.rhs().to_string(), "τ_0_0");
        assert!(rule.is_explicit());
        assert!(system.add_explicit_rule(term(vec![gp(1)]), term(vec![gp(0)])).is_none());
    }

    #[test]
    fn reduction_records_steps() {
        let p = InterfaceId::new("P");
        let mut system = RewriteSystem::new();
        system.add_explicit_rule(term(vec![gp(1)]), term(vec![gp(0)]));
        let (nf, path) = system.reduce(&term(vec![gp(1), Symbol::member(&p, "A")]));
        assert_eq!(nf, term(vec![gp(0), Symbol::member(&p, "A")]));
        assert_eq!(path.steps(), &[RewriteStep::rule(0, 1, 0, false)]);
        assert_eq!(
            system.apply_path(&term(vec![gp(1), Symbol::member(&p, "A")]), &path).unwrap(),
            nf
        );
    }

    #[test]
    fn derived_rule_replays() {
        let p = InterfaceId::new("P");
        let mut system = RewriteSystem::new();
        let base = system.add_explicit_rule(term(vec![gp(1)]), term(vec![gp(0)])).unwrap();
        let relation = system.relations_mut().record(
            Term::from(vec![gp(1), Symbol::member(&p, "A")]),
            Term::from(vec![gp(2)]),
        );
        let path = RewritePath::from(RewriteStep::relation(0, 0, relation, false));
        let id = system
            .add_rule(term(vec![gp(1), Symbol::member(&p, "A")]), term(vec![gp(2)]), &path)
            .unwrap();
        // The left side was normalized through the base rule.
        assert_eq!(system.rule(id).lhs().to_string(), "τ_0_0.[P:A]");
        assert!(system.rule(id).derivation().unwrap().steps().len() > 1);
        assert_eq!(system.verify_derivations().unwrap(), 1);
        assert!(!system.rule(base).is_simplified());
    }

    #[test]
    #[should_panic(expected = "without a derivation")]
    fn empty_derivation_panics() {
        let mut system = RewriteSystem::new();
        system.add_rule(term(vec![gp(1)]), term(vec![gp(0)]), &RewritePath::new());
    }

    #[test]
    fn substitutions_are_simplified_through_a_relation() {
        let mut system = RewriteSystem::new();
        system.add_explicit_rule(term(vec![gp(1)]), term(vec![gp(0)]));
        let array = Symbol::concrete(
            Type::nominal("Array", vec![Type::Param(0)]),
            vec![Term::from(vec![gp(1)])],
        );
        let (simplified, relation) = system.simplify_substitutions(&array).unwrap();
        assert_eq!(simplified.substitutions(), &[Term::from(vec![gp(0)])]);
        assert_eq!(system.relations().get(relation).rhs[0], simplified);

        let (nf, path) = system.normalize(&term(vec![gp(2), array.clone()]));
        assert_eq!(nf, term(vec![gp(2), simplified]));
        assert_eq!(system.apply_path(&term(vec![gp(2), array]), &path).unwrap(), nf);
    }

    #[test]
    fn simplify_rules_transports_property_rules() {
        let q = InterfaceId::new("Q");
        let mut system = RewriteSystem::new();
        let conformance = system
            .add_explicit_rule(term(vec![gp(1), Symbol::Interface(q.clone())]), term(vec![gp(1)]))
            .unwrap();
        system.add_explicit_rule(term(vec![gp(1)]), term(vec![gp(0)]));

        assert_eq!(system.simplify_rules(), 1);
        assert!(system.rule(conformance).is_lhs_simplified());
        let transported = system.rules().last().unwrap();
        assert_eq!(transported.to_string(), "τ_0_0.[Q] => τ_0_0");
        assert_eq!(system.verify_derivations().unwrap(), 1);
        assert_eq!(system.simplify_rules(), 0);
    }

    #[test]
    fn prefix_substitution_steps_replay() {
        let p = InterfaceId::new("P");
        let system = RewriteSystem::new();
        let array = Symbol::concrete(
            Type::nominal("Array", vec![Type::Param(0)]),
            vec![Term::from(vec![Symbol::member(&p, "B")])],
        );
        let start = term(vec![gp(0), Symbol::member(&p, "A"), array]);
        let path = RewritePath::from(RewriteStep::prefix_substitutions(1, 0, false));
        let out = system.apply_path(&start, &path).unwrap();
        assert_eq!(out[2].substitutions()[0].to_string(), "τ_0_0.[P:B]");
        assert_eq!(system.apply_path(&out, &path.inverted()).unwrap(), start);
        assert!(system.apply_path(&start, &path.inverted()).is_err());
    }

    #[test]
    fn interfaces_register_transitively_once() {
        let mut registry = InterfaceRegistry::new();
        let q = registry.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        let p = registry
            .register(
                InterfaceDecl::new("P")
                    .with_members(&["A"])
                    .with_requirement(RawRequirement::conforms(
                        Type::member(Type::Param(0), &InterfaceId::new("P"), "A"),
                        &q,
                    )),
            )
            .unwrap();
        let table = ConformanceTable::new();
        let mut system = RewriteSystem::new();

        assert!(system.register_interface(&registry, &table, &p).unwrap());
        assert!(system.is_known_interface(&q));
        let count = system.len();
        assert!(!system.register_interface(&registry, &table, &q).unwrap());
        assert_eq!(system.len(), count);

        let shown: Vec<String> = system.rules().iter().map(|r| r.to_string()).collect();
        assert!(shown.contains(&"[P].[P:A] => [P:A] [permanent] [explicit]".to_string()));
        assert!(shown.contains(&"[P:A].[Q] => [P:A] [explicit]".to_string()));

        let err = system
            .register_interface(&registry, &table, &InterfaceId::new("Missing"))
            .unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn failed_registration_leaves_no_trace() {
        let mut registry = InterfaceRegistry::new();
        let q = registry.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        let p = InterfaceId::new("P");
        let broken = InterfaceDecl::new("P")
            .with_members(&["A"])
            .with_requirement(RawRequirement::conforms(Type::Param(1), &q))
            .with_requirement(RawRequirement::conforms(
                Type::member(Type::Param(0), &p, "A"),
                &q,
            ));
        registry.insert_unchecked(broken);
        let table = ConformanceTable::new();
        let mut system = RewriteSystem::new();

        assert!(system.register_interface(&registry, &table, &p).is_err());
        assert!(!system.is_known_interface(&p));
        assert!(!system.is_known_interface(&q));
        assert!(system.is_empty());

        // A second attempt fails the same way instead of reporting success.
        assert!(system.register_interface(&registry, &table, &p).is_err());
        assert!(system.is_empty());
    }
}

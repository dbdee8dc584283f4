//! Oriented rewrite rules.

use std::fmt;

use super::path::RewritePath;
use crate::symbol::Symbol;
use crate::term::Term;

pub type RuleId = usize;

/// `lhs => rhs`, with `lhs > rhs` in shortlex order.
///
/// Rules are append-only. Instead of being removed they are marked
/// simplified (replaced by a newer rule) or conflicting (kept for
/// diagnostics but no longer evidence for properties).
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    lhs: Term,
    rhs: Term,
    permanent: bool,
    explicit: bool,
    conflicting: bool,
    lhs_simplified: bool,
    rhs_simplified: bool,
    derivation: Option<RewritePath>,
}

impl Rule {
    pub(crate) fn new(id: RuleId, lhs: Term, rhs: Term, derivation: Option<RewritePath>) -> Self {
        debug_assert!(lhs > rhs, "rule {lhs} => {rhs} is not oriented");
        Self {
            id,
            lhs,
            rhs,
            permanent: false,
            explicit: false,
            conflicting: false,
            lhs_simplified: false,
            rhs_simplified: false,
            derivation,
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn lhs(&self) -> &Term {
        &self.lhs
    }

    pub fn rhs(&self) -> &Term {
        &self.rhs
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn is_conflicting(&self) -> bool {
        self.conflicting
    }

    pub fn is_lhs_simplified(&self) -> bool {
        self.lhs_simplified
    }

    pub fn is_rhs_simplified(&self) -> bool {
        self.rhs_simplified
    }

    /// Simplified rules no longer take part in reduction.
    pub fn is_simplified(&self) -> bool {
        self.lhs_simplified || self.rhs_simplified
    }

    pub fn derivation(&self) -> Option<&RewritePath> {
        self.derivation.as_ref()
    }

    /// For a property rule `X.[p] => X`, the symbol `[p]`.
    pub fn property_symbol(&self) -> Option<&Symbol> {
        if self.lhs.len() != self.rhs.len() + 1 || !self.lhs.starts_with(&self.rhs) {
            return None;
        }
        self.lhs.last().filter(|s| s.is_property())
    }

    pub(crate) fn mark_permanent(&mut self) {
        self.permanent = true;
    }

    pub(crate) fn mark_explicit(&mut self) {
        self.explicit = true;
    }

    /// Idempotent.
    pub(crate) fn mark_conflicting(&mut self) {
        self.conflicting = true;
    }

    pub(crate) fn mark_lhs_simplified(&mut self) {
        self.lhs_simplified = true;
    }

    pub(crate) fn mark_rhs_simplified(&mut self) {
        self.rhs_simplified = true;
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.lhs, self.rhs)?;
        let flags = [
            (self.permanent, "permanent"),
            (self.explicit, "explicit"),
            (self.conflicting, "conflicting"),
            (self.lhs_simplified, "lhs↓"),
            (self.rhs_simplified, "rhs↓"),
        ];
        for (set, name) in flags {
            if set {
                write!(f, " [{name}]")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::InterfaceId;
    use crate::types::Type;

    #[test]
    fn property_symbol_of_property_rule() {
        let p = InterfaceId::new("P");
        let t = Term::from(vec![Symbol::GenericParam(0)]);
        let lhs = Term::from(vec![Symbol::GenericParam(0), Symbol::Interface(p.clone())]);
        let rule = Rule::new(0, lhs, t.clone(), None);
        assert_eq!(rule.property_symbol(), Some(&Symbol::Interface(p.clone())));

        let member = Term::from(vec![Symbol::GenericParam(0), Symbol::member(&p, "A")]);
        let rule = Rule::new(1, member, t.clone(), None);
        assert_eq!(rule.property_symbol(), None);

        let concrete = Symbol::concrete(Type::nominal("Int", vec![]), vec![]);
        let lhs = Term::from(vec![Symbol::GenericParam(0), concrete.clone()]);
        let mut rule = Rule::new(2, lhs, t, None);
        rule.mark_conflicting();
        rule.mark_conflicting();
        assert_eq!(rule.property_symbol(), Some(&concrete));
        assert!(rule.to_string().ends_with("[conflicting]"));
    }
}

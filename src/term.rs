//! Terms: immutable and mutable symbol sequences.
//!
//! A [`Term`] is a path of symbols rooted at a generic parameter (or, inside
//! an interface's requirement signature, at the interface itself). Terms are
//! ordered *shortlex*: shorter terms are smaller, and terms of equal length
//! compare symbol by symbol. Rewrite rules always run from the larger side
//! to the smaller one, which keeps reduction terminating.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::symbol::{InterfaceId, Symbol};

fn shortlex(a: &[Symbol], b: &[Symbol]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn write_symbols(f: &mut fmt::Formatter<'_>, symbols: &[Symbol]) -> fmt::Result {
    for (i, s) in symbols.iter().enumerate() {
        if i > 0 {
            f.write_str(".")?;
        }
        write!(f, "{s}")?;
    }
    Ok(())
}

fn root_interface(symbols: &[Symbol]) -> Option<&InterfaceId> {
    match symbols.first()? {
        Symbol::Interface(p) | Symbol::MemberType { interface: p, .. } => Some(p),
        _ => None,
    }
}

/// Immutable, cheaply clonable term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term(Arc<[Symbol]>);

impl Term {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self(symbols.into_iter().collect())
    }

    /// The interface this term is rooted in, if it belongs to an interface's
    /// requirement signature rather than a top-level generic signature.
    pub fn root_interface(&self) -> Option<&InterfaceId> {
        root_interface(&self.0)
    }

    pub fn to_mutable(&self) -> MutableTerm {
        MutableTerm(self.0.to_vec())
    }
}

impl Deref for Term {
    type Target = [Symbol];

    fn deref(&self) -> &[Symbol] {
        &self.0
    }
}

impl From<Vec<Symbol>> for Term {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self(symbols.into())
    }
}

impl From<MutableTerm> for Term {
    fn from(term: MutableTerm) -> Self {
        Self(term.0.into())
    }
}

impl From<&MutableTerm> for Term {
    fn from(term: &MutableTerm) -> Self {
        Self(term.0.as_slice().into())
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        shortlex(&self.0, &other.0)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbols(f, &self.0)
    }
}

/// Editable counterpart of [`Term`], used while a derivation is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MutableTerm(Vec<Symbol>);

impl MutableTerm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, symbol: Symbol) {
        self.0.push(symbol);
    }

    pub fn append(&mut self, symbols: &[Symbol]) {
        self.0.extend_from_slice(symbols);
    }

    /// A copy of this term followed by `symbol`.
    pub fn with(&self, symbol: Symbol) -> Self {
        let mut out = self.clone();
        out.add(symbol);
        out
    }

    /// Replace `self[start..end]` with `replacement`.
    pub fn splice(&mut self, start: usize, end: usize, replacement: &[Symbol]) {
        self.0.splice(start..end, replacement.iter().cloned());
    }

    pub fn symbols_mut(&mut self) -> &mut [Symbol] {
        &mut self.0
    }

    pub fn root_interface(&self) -> Option<&InterfaceId> {
        root_interface(&self.0)
    }
}

impl Deref for MutableTerm {
    type Target = [Symbol];

    fn deref(&self) -> &[Symbol] {
        &self.0
    }
}

impl From<Vec<Symbol>> for MutableTerm {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }
}

impl From<&[Symbol]> for MutableTerm {
    fn from(symbols: &[Symbol]) -> Self {
        Self(symbols.to_vec())
    }
}

impl From<&Term> for MutableTerm {
    fn from(term: &Term) -> Self {
        term.to_mutable()
    }
}

impl PartialOrd for MutableTerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MutableTerm {
    fn cmp(&self, other: &Self) -> Ordering {
        shortlex(&self.0, &other.0)
    }
}

impl fmt::Display for MutableTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbols(f, &self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> InterfaceId {
        InterfaceId::new("P")
    }

    #[test]
    fn shortlex_prefers_shorter_terms() {
        let short = Term::from(vec![Symbol::GenericParam(5)]);
        let long = Term::from(vec![Symbol::GenericParam(0), Symbol::member(&p(), "A")]);
        assert!(short < long);
    }

    #[test]
    fn equal_length_terms_compare_symbolwise() {
        let t_a = Term::from(vec![Symbol::GenericParam(1), Symbol::member(&p(), "A")]);
        let u_a = Term::from(vec![Symbol::GenericParam(0), Symbol::member(&p(), "A")]);
        assert!(u_a < t_a);
    }

    #[test]
    fn root_interface_detection() {
        let top = Term::from(vec![Symbol::GenericParam(0), Symbol::member(&p(), "A")]);
        assert!(top.root_interface().is_none());

        let nested = Term::from(vec![Symbol::member(&p(), "A"), Symbol::Interface(p())]);
        assert_eq!(nested.root_interface(), Some(&p()));

        let self_rooted = MutableTerm::from(vec![Symbol::Interface(p())]);
        assert_eq!(self_rooted.root_interface(), Some(&p()));
    }

    #[test]
    fn splice_replaces_a_range() {
        let mut term = MutableTerm::from(vec![
            Symbol::GenericParam(0),
            Symbol::member(&p(), "A"),
            Symbol::Interface(p()),
        ]);
        term.splice(1, 3, &[Symbol::member(&p(), "B")]);
        assert_eq!(
            term,
            MutableTerm::from(vec![Symbol::GenericParam(0), Symbol::member(&p(), "B")])
        );
    }

    #[test]
    fn display_joins_with_dots() {
        let term = Term::from(vec![Symbol::GenericParam(0), Symbol::member(&p(), "A")]);
        assert_eq!(term.to_string(), "τ_0_0.[P:A]");
        assert_eq!(Term::from(term.to_mutable()), term);
    }
}

//! Core symbol types for the reqsolve engine.
//!
//! Symbols are the atomic steps of a [`Term`]: a generic parameter root, an
//! interface (conformance) property, a member-type projection, or one of the
//! concrete property annotations. Concrete, superclass and concrete-conformance
//! symbols carry a *schema* (a [`Type`] with parameter slots) plus the ordered
//! substitution terms filling those slots.

use std::fmt;
use std::sync::Arc;

use crate::term::Term;
use crate::types::Type;

/// Interned name of a member type or nominal type.
pub type Name = Arc<str>;

/// Identifies an interface by its (unique) declared name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(Arc<str>);

impl InterfaceId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic step in a term.
///
/// The derived ordering compares variants in declaration order first; terms
/// built from these symbols are compared shortlex (see [`Term`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// Root of a top-level term: the generic parameter with this index.
    GenericParam(u32),
    /// Conformance property `[P]`; also the `Self` root of interface-internal terms.
    Interface(InterfaceId),
    /// Member-type projection `[P:A]`.
    MemberType { interface: InterfaceId, name: Name },
    /// `[concrete: schema with <substitutions>]`.
    ConcreteType { schema: Type, substitutions: Vec<Term> },
    /// `[superclass: schema with <substitutions>]`.
    Superclass { schema: Type, substitutions: Vec<Term> },
    /// `[concrete: schema : P]`: the concrete type's implementation of `P`.
    ConcreteConformance {
        schema: Type,
        substitutions: Vec<Term>,
        interface: InterfaceId,
    },
}

impl Symbol {
    pub fn member(interface: &InterfaceId, name: impl AsRef<str>) -> Self {
        Self::MemberType {
            interface: interface.clone(),
            name: Name::from(name.as_ref()),
        }
    }

    pub fn concrete(schema: Type, substitutions: Vec<Term>) -> Self {
        Self::ConcreteType {
            schema,
            substitutions,
        }
    }

    pub fn superclass(schema: Type, substitutions: Vec<Term>) -> Self {
        Self::Superclass {
            schema,
            substitutions,
        }
    }

    pub fn concrete_conformance(
        schema: Type,
        substitutions: Vec<Term>,
        interface: InterfaceId,
    ) -> Self {
        Self::ConcreteConformance {
            schema,
            substitutions,
            interface,
        }
    }

    /// Property symbols are the ones that may end the left-hand side of a
    /// property rule `X.[p] => X`.
    pub fn is_property(&self) -> bool {
        matches!(
            self,
            Self::Interface(_)
                | Self::ConcreteType { .. }
                | Self::Superclass { .. }
                | Self::ConcreteConformance { .. }
        )
    }

    pub fn schema(&self) -> Option<&Type> {
        match self {
            Self::ConcreteType { schema, .. }
            | Self::Superclass { schema, .. }
            | Self::ConcreteConformance { schema, .. } => Some(schema),
            _ => None,
        }
    }

    pub fn substitutions(&self) -> &[Term] {
        match self {
            Self::ConcreteType { substitutions, .. }
            | Self::Superclass { substitutions, .. }
            | Self::ConcreteConformance { substitutions, .. } => substitutions,
            _ => &[],
        }
    }

    /// The interface of a conformance, member-type or concrete-conformance symbol.
    pub fn interface(&self) -> Option<&InterfaceId> {
        match self {
            Self::Interface(p)
            | Self::MemberType { interface: p, .. }
            | Self::ConcreteConformance { interface: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Rebuild this symbol with a different substitution list.
    ///
    /// Symbols without substitutions are returned unchanged.
    pub fn with_substitutions(&self, substitutions: Vec<Term>) -> Self {
        match self {
            Self::ConcreteType { schema, .. } => Self::concrete(schema.clone(), substitutions),
            Self::Superclass { schema, .. } => Self::superclass(schema.clone(), substitutions),
            Self::ConcreteConformance {
                schema, interface, ..
            } => Self::concrete_conformance(schema.clone(), substitutions, interface.clone()),
            other => other.clone(),
        }
    }

    /// Prepend `prefix` to every substitution term.
    pub fn prepend_prefix_to_substitutions(&self, prefix: &[Symbol]) -> Self {
        let substitutions = self
            .substitutions()
            .iter()
            .map(|t| {
                let mut symbols = prefix.to_vec();
                symbols.extend(t.iter().cloned());
                Term::from(symbols)
            })
            .collect();
        self.with_substitutions(substitutions)
    }

    /// Inverse of [`Symbol::prepend_prefix_to_substitutions`]. Returns `None`
    /// if some substitution term does not start with `prefix`.
    pub fn strip_prefix_from_substitutions(&self, prefix: &[Symbol]) -> Option<Self> {
        let substitutions = self
            .substitutions()
            .iter()
            .map(|t| t.strip_prefix(prefix).map(|rest| Term::from(rest.to_vec())))
            .collect::<Option<Vec<_>>>()?;
        Some(self.with_substitutions(substitutions))
    }
}

fn write_substitutions(f: &mut fmt::Formatter<'_>, substitutions: &[Term]) -> fmt::Result {
    if substitutions.is_empty() {
        return Ok(());
    }
    f.write_str(" with <")?;
    for (i, t) in substitutions.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{t}")?;
    }
    f.write_str(">")
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenericParam(index) => write!(f, "τ_0_{index}"),
            Self::Interface(p) => write!(f, "[{p}]"),
            Self::MemberType { interface, name } => write!(f, "[{interface}:{name}]"),
            Self::ConcreteType {
                schema,
                substitutions,
            } => {
                write!(f, "[concrete: {schema}")?;
                write_substitutions(f, substitutions)?;
                f.write_str("]")
            }
            Self::Superclass {
                schema,
                substitutions,
            } => {
                write!(f, "[superclass: {schema}")?;
                write_substitutions(f, substitutions)?;
                f.write_str("]")
            }
            Self::ConcreteConformance {
                schema,
                substitutions,
                interface,
            } => {
                write!(f, "[concrete: {schema}")?;
                write_substitutions(f, substitutions)?;
                write!(f, " : {interface}]")
            }
        }
    }
}

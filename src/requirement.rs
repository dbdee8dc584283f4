//! Generic requirements: desugaring raw requirements and lowering them to rules.
//!
//! Raw requirements are what declarations carry (a conformance may name a
//! composition of interfaces, a same-type requirement may relate two concrete
//! types). Desugaring splits and checks them into canonical [`Requirement`]s,
//! which lower one-to-one onto rewrite rules.

use std::fmt;

use crate::conformance::{Conformance, ConformanceLookup, MAX_RESOLUTION_DEPTH};
use crate::error::{RequirementError, TermError};
use crate::symbol::{InterfaceId, Symbol};
use crate::term::MutableTerm;
use crate::types::{TermRoot, Type};

/// A requirement as written in a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRequirement {
    /// `subject: P & Q & ...`
    Conformance {
        subject: Type,
        interfaces: Vec<InterfaceId>,
    },
    /// `first == second`
    SameType { first: Type, second: Type },
    /// `subject: bound` where `bound` is a class.
    Superclass { subject: Type, bound: Type },
}

impl RawRequirement {
    pub fn conforms(subject: Type, interface: &InterfaceId) -> Self {
        Self::Conformance {
            subject,
            interfaces: vec![interface.clone()],
        }
    }

    pub fn same_type(first: Type, second: Type) -> Self {
        Self::SameType { first, second }
    }

    pub fn superclass(subject: Type, bound: Type) -> Self {
        Self::Superclass { subject, bound }
    }

    /// Every type mentioned by this requirement.
    pub fn types(&self) -> Vec<&Type> {
        match self {
            Self::Conformance { subject, .. } => vec![subject],
            Self::SameType { first, second } => vec![first, second],
            Self::Superclass { subject, bound } => vec![subject, bound],
        }
    }

    /// Interfaces this requirement asks conformance to.
    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceId> {
        let slice: &[InterfaceId] = match self {
            Self::Conformance { interfaces, .. } => interfaces,
            _ => &[],
        };
        slice.iter()
    }

    /// Replace the declaration's parameters with `args`.
    pub fn substitute(&self, args: &[Type]) -> Result<Self, TermError> {
        Ok(match self {
            Self::Conformance {
                subject,
                interfaces,
            } => Self::Conformance {
                subject: subject.substitute(args)?,
                interfaces: interfaces.clone(),
            },
            Self::SameType { first, second } => Self::SameType {
                first: first.substitute(args)?,
                second: second.substitute(args)?,
            },
            Self::Superclass { subject, bound } => Self::Superclass {
                subject: subject.substitute(args)?,
                bound: bound.substitute(args)?,
            },
        })
    }
}

impl fmt::Display for RawRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conformance {
                subject,
                interfaces,
            } => {
                write!(f, "{subject}: ")?;
                for (i, p) in interfaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
            Self::SameType { first, second } => write!(f, "{first} == {second}"),
            Self::Superclass { subject, bound } => write!(f, "{subject}: {bound}"),
        }
    }
}

/// A desugared requirement. The subject is always a type parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Conformance { subject: Type, interface: InterfaceId },
    SameType { first: Type, second: Type },
    Superclass { subject: Type, bound: Type },
}

impl Requirement {
    pub fn subject(&self) -> &Type {
        match self {
            Self::Conformance { subject, .. } | Self::Superclass { subject, .. } => subject,
            Self::SameType { first, .. } => first,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conformance { subject, interface } => write!(f, "{subject}: {interface}"),
            Self::SameType { first, second } => write!(f, "{first} == {second}"),
            Self::Superclass { subject, bound } => write!(f, "{subject}: {bound}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Desugaring
// ---------------------------------------------------------------------------

/// Desugar `raw` into canonical requirements, appending to `out`.
///
/// Requirements that are trivially true are dropped; requirements on concrete
/// subjects are checked against `lookup` and either dropped, replaced by the
/// conditional requirements they depend on, or reported in `errors`.
pub fn desugar_requirement(
    raw: &RawRequirement,
    lookup: &dyn ConformanceLookup,
    out: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
) {
    desugar_within(raw, lookup, out, errors, &mut Vec::new());
}

/// `active` holds the concrete conformances whose conditional requirements
/// are being expanded, outermost first.
fn desugar_within(
    raw: &RawRequirement,
    lookup: &dyn ConformanceLookup,
    out: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
    active: &mut Vec<(Type, InterfaceId)>,
) {
    match raw {
        RawRequirement::Conformance {
            subject,
            interfaces,
        } => {
            for interface in interfaces {
                desugar_conformance(subject, interface, lookup, out, errors, active);
            }
        }
        RawRequirement::SameType { first, second } => {
            desugar_same_type(first, second, out, errors);
        }
        RawRequirement::Superclass { subject, bound } => {
            if subject.is_type_parameter() {
                out.push(Requirement::Superclass {
                    subject: subject.clone(),
                    bound: bound.clone(),
                });
            } else if !is_subclass(subject, bound, lookup) {
                errors.push(RequirementError::NotASubclass {
                    ty: subject.to_string(),
                    bound: bound.to_string(),
                });
            }
        }
    }
}

fn desugar_conformance(
    subject: &Type,
    interface: &InterfaceId,
    lookup: &dyn ConformanceLookup,
    out: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
    active: &mut Vec<(Type, InterfaceId)>,
) {
    if subject.is_type_parameter() {
        out.push(Requirement::Conformance {
            subject: subject.clone(),
            interface: interface.clone(),
        });
        return;
    }
    if *subject == Type::Error {
        return;
    }
    let pair = (subject.clone(), interface.clone());
    if active.len() >= MAX_RESOLUTION_DEPTH || active.contains(&pair) {
        errors.push(RequirementError::CyclicConformance {
            ty: subject.to_string(),
            interface: interface.to_string(),
        });
        return;
    }
    match lookup.lookup_conformance(subject, interface) {
        Some(Conformance::Concrete(imp)) => {
            active.push(pair);
            for req in imp.conditional_requirements() {
                desugar_within(req, lookup, out, errors, active);
            }
            active.pop();
        }
        Some(Conformance::Abstract(_)) => {}
        None => errors.push(RequirementError::ConcreteDoesNotConform {
            ty: subject.to_string(),
            interface: interface.to_string(),
        }),
    }
}

fn desugar_same_type(
    first: &Type,
    second: &Type,
    out: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
) {
    if first == second || *first == Type::Error || *second == Type::Error {
        return;
    }
    if first.is_type_parameter() {
        out.push(Requirement::SameType {
            first: first.clone(),
            second: second.clone(),
        });
        return;
    }
    if second.is_type_parameter() {
        out.push(Requirement::SameType {
            first: second.clone(),
            second: first.clone(),
        });
        return;
    }
    match (first, second) {
        (
            Type::Nominal { name: n1, args: a1 },
            Type::Nominal { name: n2, args: a2 },
        ) if n1 == n2 && a1.len() == a2.len() => {
            for (x, y) in a1.iter().zip(a2) {
                desugar_same_type(x, y, out, errors);
            }
        }
        _ => errors.push(RequirementError::ConflictingConcreteTypes {
            first: first.to_string(),
            second: second.to_string(),
        }),
    }
}

fn is_subclass(ty: &Type, bound: &Type, lookup: &dyn ConformanceLookup) -> bool {
    let mut current = Some(ty.clone());
    for _ in 0..MAX_RESOLUTION_DEPTH {
        match current {
            Some(ref c) if c == bound => return true,
            Some(ref c) => current = lookup.superclass(c),
            None => return false,
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// Lower a desugared requirement to the two sides of a rule.
///
/// The sides are returned unoriented for same-type requirements between two
/// parameters; the rewrite system orients every rule it adds.
pub fn rule_for_requirement(
    req: &Requirement,
    root: TermRoot<'_>,
) -> Result<(MutableTerm, MutableTerm), TermError> {
    match req {
        Requirement::Conformance { subject, interface } => {
            let term = root.term_for_type(subject)?;
            Ok((term.with(Symbol::Interface(interface.clone())), term))
        }
        Requirement::Superclass { subject, bound } => {
            let term = root.term_for_type(subject)?;
            let (schema, substitutions) = root.substitution_schema(bound)?;
            Ok((term.with(Symbol::superclass(schema, substitutions)), term))
        }
        Requirement::SameType { first, second } => {
            let term = root.term_for_type(first)?;
            if second.is_type_parameter() {
                return Ok((term, root.term_for_type(second)?));
            }
            let (schema, substitutions) = root.substitution_schema(second)?;
            Ok((term.with(Symbol::concrete(schema, substitutions)), term))
        }
    }
}

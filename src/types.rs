//! Concrete type model and lowering of types into terms.
//!
//! A [`Type`] is either a parameter slot, a member type projected off another
//! type, a nominal type applied to arguments, or the error placeholder used
//! when a witness cannot be resolved. What a `Param(n)` slot refers to depends
//! on context: inside a property symbol's schema it is substitution slot `n`;
//! inside a declaration it is that declaration's `n`-th generic parameter.

use std::fmt;

use crate::error::TermError;
use crate::symbol::{InterfaceId, Name, Symbol};
use crate::term::{MutableTerm, Term};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Param(usize),
    Member {
        base: Box<Type>,
        interface: InterfaceId,
        name: Name,
    },
    Nominal {
        name: Name,
        args: Vec<Type>,
    },
    Error,
}

impl Type {
    pub fn nominal(name: impl AsRef<str>, args: Vec<Type>) -> Self {
        Self::Nominal {
            name: Name::from(name.as_ref()),
            args,
        }
    }

    pub fn member(base: Type, interface: &InterfaceId, name: impl AsRef<str>) -> Self {
        Self::Member {
            base: Box::new(base),
            interface: interface.clone(),
            name: Name::from(name.as_ref()),
        }
    }

    /// A parameter, or a chain of member types rooted at one.
    pub fn is_type_parameter(&self) -> bool {
        match self {
            Self::Param(_) => true,
            Self::Member { base, .. } => base.is_type_parameter(),
            Self::Nominal { .. } | Self::Error => false,
        }
    }

    pub fn has_type_parameter(&self) -> bool {
        match self {
            Self::Param(_) => true,
            Self::Member { base, .. } => base.has_type_parameter(),
            Self::Nominal { args, .. } => args.iter().any(Type::has_type_parameter),
            Self::Error => false,
        }
    }

    pub fn nominal_name(&self) -> Option<&Name> {
        match self {
            Self::Nominal { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The largest parameter slot this type refers to.
    pub fn max_param(&self) -> Option<usize> {
        match self {
            Self::Param(i) => Some(*i),
            Self::Member { base, .. } => base.max_param(),
            Self::Nominal { args, .. } => args.iter().filter_map(Type::max_param).max(),
            Self::Error => None,
        }
    }

    /// Replace every `Param(i)` with `args[i]`.
    pub fn substitute(&self, args: &[Type]) -> Result<Type, TermError> {
        Ok(match self {
            Self::Param(index) => args.get(*index).cloned().ok_or(TermError::SlotOutOfRange {
                index: *index,
                available: args.len(),
            })?,
            Self::Member {
                base,
                interface,
                name,
            } => Self::Member {
                base: Box::new(base.substitute(args)?),
                interface: interface.clone(),
                name: name.clone(),
            },
            Self::Nominal { name, args: inner } => Self::Nominal {
                name: name.clone(),
                args: inner
                    .iter()
                    .map(|a| a.substitute(args))
                    .collect::<Result<_, _>>()?,
            },
            Self::Error => Self::Error,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(index) => write!(f, "τ_0_{index}"),
            Self::Member {
                base,
                interface,
                name,
            } => write!(f, "{base}.[{interface}:{name}]"),
            Self::Nominal { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Error => f.write_str("<<error type>>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lowering types to terms
// ---------------------------------------------------------------------------

/// What the parameters of a type are resolved against when lowering.
#[derive(Debug, Clone, Copy)]
pub enum TermRoot<'a> {
    /// `Param(n)` is the `n`-th substitution term.
    Substitutions(&'a [Term]),
    /// `Param(0)` is `Self` of this interface; `Self.A` lowers to `[P:A]`.
    Interface(&'a InterfaceId),
}

impl TermRoot<'_> {
    /// Lower a type parameter to the term it denotes.
    pub fn term_for_type(&self, ty: &Type) -> Result<MutableTerm, TermError> {
        match ty {
            Type::Param(index) => match self {
                TermRoot::Substitutions(subs) => subs
                    .get(*index)
                    .map(MutableTerm::from)
                    .ok_or(TermError::SlotOutOfRange {
                        index: *index,
                        available: subs.len(),
                    }),
                TermRoot::Interface(p) if *index == 0 => {
                    Ok(MutableTerm::from(vec![Symbol::Interface((*p).clone())]))
                }
                TermRoot::Interface(p) => Err(TermError::InterfaceParameter {
                    interface: p.to_string(),
                    index: *index,
                }),
            },
            Type::Member {
                base,
                interface,
                name,
            } => {
                let projection = Symbol::MemberType {
                    interface: interface.clone(),
                    name: name.clone(),
                };
                // Inside an interface, `Self.A` is the root `[P:A]` rather
                // than `[P].[P:A]`.
                if matches!((self, base.as_ref()), (TermRoot::Interface(_), Type::Param(0))) {
                    return Ok(MutableTerm::from(vec![projection]));
                }
                let mut term = self.term_for_type(base)?;
                term.add(projection);
                Ok(term)
            }
            Type::Nominal { .. } | Type::Error => Err(TermError::NotATypeParameter {
                ty: ty.to_string(),
            }),
        }
    }

    /// Replace every maximal type-parameter subtree of `ty` with a fresh slot,
    /// returning the schema and the term for each slot in order.
    pub fn substitution_schema(&self, ty: &Type) -> Result<(Type, Vec<Term>), TermError> {
        let mut substitutions = Vec::new();
        let schema = self.schematize(ty, &mut substitutions)?;
        Ok((schema, substitutions))
    }

    fn schematize(&self, ty: &Type, substitutions: &mut Vec<Term>) -> Result<Type, TermError> {
        if ty.is_type_parameter() {
            let term = self.term_for_type(ty)?;
            substitutions.push(Term::from(term));
            return Ok(Type::Param(substitutions.len() - 1));
        }
        match ty {
            Type::Nominal { name, args } => Ok(Type::Nominal {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.schematize(a, substitutions))
                    .collect::<Result<_, _>>()?,
            }),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q() -> InterfaceId {
        InterfaceId::new("Q")
    }

    fn int() -> Type {
        Type::nominal("Int", vec![])
    }

    fn gp(i: u32) -> Term {
        Term::from(vec![Symbol::GenericParam(i)])
    }

    #[test]
    fn type_parameter_classification() {
        let v = Type::member(Type::Param(1), &q(), "V");
        assert!(v.is_type_parameter());
        assert!(!int().is_type_parameter());

        let arr = Type::nominal("Array", vec![Type::Param(0)]);
        assert!(!arr.is_type_parameter());
        assert!(arr.has_type_parameter());
        assert!(!Type::Error.has_type_parameter());
    }

    #[test]
    fn substitute_replaces_params() {
        let witness = Type::member(Type::Param(1), &q(), "V");
        let args = vec![int(), Type::Param(0)];
        assert_eq!(
            witness.substitute(&args).unwrap(),
            Type::member(Type::Param(0), &q(), "V")
        );
        assert!(matches!(
            Type::Param(4).substitute(&args),
            Err(TermError::SlotOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn term_for_type_with_substitutions() {
        let subs = vec![gp(0), gp(1)];
        let root = TermRoot::Substitutions(&subs);
        let term = root
            .term_for_type(&Type::member(Type::Param(1), &q(), "V"))
            .unwrap();
        assert_eq!(
            term,
            MutableTerm::from(vec![Symbol::GenericParam(1), Symbol::member(&q(), "V")])
        );
        assert!(root.term_for_type(&int()).is_err());
    }

    #[test]
    fn term_for_type_inside_interface() {
        let p = InterfaceId::new("P");
        let root = TermRoot::Interface(&p);
        assert_eq!(
            root.term_for_type(&Type::Param(0)).unwrap(),
            MutableTerm::from(vec![Symbol::Interface(p.clone())])
        );
        let nested = Type::member(Type::member(Type::Param(0), &p, "A"), &q(), "V");
        assert_eq!(
            root.term_for_type(&nested).unwrap(),
            MutableTerm::from(vec![Symbol::member(&p, "A"), Symbol::member(&q(), "V")])
        );
        assert!(matches!(
            root.term_for_type(&Type::Param(1)),
            Err(TermError::InterfaceParameter { index: 1, .. })
        ));
    }

    #[test]
    fn substitution_schema_extracts_parameters() {
        let subs = vec![gp(0), gp(1)];
        let root = TermRoot::Substitutions(&subs);
        let pair = Type::nominal(
            "Pair",
            vec![Type::member(Type::Param(1), &q(), "V"), int()],
        );
        let (schema, terms) = root.substitution_schema(&pair).unwrap();
        assert_eq!(schema, Type::nominal("Pair", vec![Type::Param(0), int()]));
        assert_eq!(
            terms,
            vec![Term::from(vec![Symbol::GenericParam(1), Symbol::member(&q(), "V")])]
        );

        let (schema, terms) = root.substitution_schema(&int()).unwrap();
        assert_eq!(schema, int());
        assert!(terms.is_empty());
    }

    #[test]
    fn display_forms() {
        let foo = Type::nominal("Foo", vec![int(), Type::member(Type::Param(0), &q(), "V")]);
        assert_eq!(foo.to_string(), "Foo<Int, τ_0_0.[Q:V]>");
        assert_eq!(Type::Error.to_string(), "<<error type>>");
        assert_eq!(foo.max_param(), Some(0));
        assert_eq!(int().max_param(), None);
    }
}

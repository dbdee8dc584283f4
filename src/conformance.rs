//! Nominal types, their interface implementations, and conformance lookup.
//!
//! A [`ConformanceTable`] records which nominal types implement which
//! interfaces, the type witness chosen for each member type, and any
//! conditional requirements on the nominal's own parameters. Lookups
//! specialize a declaration to concrete arguments and hand back a
//! [`ConcreteImpl`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ConformanceError, InterfaceError};
use crate::interface::InterfaceRegistry;
use crate::requirement::RawRequirement;
use crate::symbol::{InterfaceId, Name};
use crate::types::Type;

/// Nested member types are resolved through at most this many conformances.
pub(crate) const MAX_RESOLUTION_DEPTH: usize = 32;

/// A nominal type declaration.
#[derive(Debug, Clone)]
pub struct NominalDecl {
    pub name: Name,
    /// Number of generic parameters, referred to as `Param(0..params)`.
    pub params: usize,
    pub superclass: Option<Type>,
}

impl NominalDecl {
    pub fn new(name: impl AsRef<str>, params: usize) -> Self {
        Self {
            name: Name::from(name.as_ref()),
            params,
            superclass: None,
        }
    }

    pub fn with_superclass(mut self, superclass: Type) -> Self {
        self.superclass = Some(superclass);
        self
    }
}

/// `nominal: interface`, with a witness per member type.
#[derive(Debug, Clone)]
pub struct ConformanceDecl {
    pub nominal: Name,
    pub interface: InterfaceId,
    /// Witnesses, written against the nominal's parameters.
    pub witnesses: BTreeMap<Name, Type>,
    /// Requirements the nominal's arguments must meet for the conformance to hold.
    pub conditional: Vec<RawRequirement>,
}

impl ConformanceDecl {
    pub fn new(nominal: impl AsRef<str>, interface: &InterfaceId) -> Self {
        Self {
            nominal: Name::from(nominal.as_ref()),
            interface: interface.clone(),
            witnesses: BTreeMap::new(),
            conditional: Vec::new(),
        }
    }

    pub fn witness(mut self, member: impl AsRef<str>, ty: Type) -> Self {
        self.witnesses.insert(Name::from(member.as_ref()), ty);
        self
    }

    pub fn conditional(mut self, requirement: RawRequirement) -> Self {
        self.conditional.push(requirement);
        self
    }
}

/// A conformance specialized to the arguments of one concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteImpl {
    pub conforming: Type,
    pub interface: InterfaceId,
    witnesses: BTreeMap<Name, Type>,
    conditional: Vec<RawRequirement>,
}

impl ConcreteImpl {
    pub fn new(
        conforming: Type,
        interface: InterfaceId,
        witnesses: BTreeMap<Name, Type>,
        conditional: Vec<RawRequirement>,
    ) -> Self {
        Self {
            conforming,
            interface,
            witnesses,
            conditional,
        }
    }

    /// The type chosen for member `name`, or `None` if the implementation
    /// does not provide one.
    pub fn type_witness(&self, name: &str) -> Option<&Type> {
        self.witnesses.get(name)
    }

    pub fn conditional_requirements(&self) -> &[RawRequirement] {
        &self.conditional
    }
}

/// Result of a conformance lookup.
#[derive(Debug, Clone)]
pub enum Conformance {
    Concrete(Arc<ConcreteImpl>),
    /// The subject is a type parameter; the conformance is a requirement, not
    /// an implementation.
    Abstract(InterfaceId),
}

/// Answers "does this type implement this interface, and how".
pub trait ConformanceLookup: Send + Sync {
    fn lookup_conformance(&self, ty: &Type, interface: &InterfaceId) -> Option<Conformance>;

    /// The direct superclass of a class type.
    fn superclass(&self, _ty: &Type) -> Option<Type> {
        None
    }
}

// ---------------------------------------------------------------------------
// ConformanceTable
// ---------------------------------------------------------------------------

/// Declared nominal types and conformances.
#[derive(Debug, Clone, Default)]
pub struct ConformanceTable {
    nominals: BTreeMap<Name, NominalDecl>,
    conformances: BTreeMap<(Name, InterfaceId), ConformanceDecl>,
}

impl ConformanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_nominal(&mut self, decl: NominalDecl) -> Result<(), ConformanceError> {
        if self.nominals.contains_key(&decl.name) {
            return Err(ConformanceError::DuplicateNominal {
                name: decl.name.to_string(),
            });
        }
        if let Some(name) = decl.superclass.as_ref().and_then(Type::nominal_name) {
            if !self.nominals.contains_key(name) {
                return Err(ConformanceError::UnknownNominal {
                    name: name.to_string(),
                });
            }
        }
        self.nominals.insert(decl.name.clone(), decl);
        Ok(())
    }

    /// Register a conformance after checking it against the nominal's
    /// declaration and the interface's member types.
    pub fn add_conformance(
        &mut self,
        interfaces: &InterfaceRegistry,
        decl: ConformanceDecl,
    ) -> Result<(), ConformanceError> {
        let nominal = self
            .nominals
            .get(&decl.nominal)
            .ok_or_else(|| ConformanceError::UnknownNominal {
                name: decl.nominal.to_string(),
            })?;
        let iface = interfaces
            .get(&decl.interface)
            .ok_or_else(|| InterfaceError::Unknown {
                interface: decl.nominal.to_string(),
                referenced: decl.interface.to_string(),
            })?;
        let key = (decl.nominal.clone(), decl.interface.clone());
        if self.conformances.contains_key(&key) {
            return Err(ConformanceError::Duplicate {
                nominal: decl.nominal.to_string(),
                interface: decl.interface.to_string(),
            });
        }

        for (member, witness) in &decl.witnesses {
            if !iface.declares_member(member) {
                return Err(InterfaceError::UnknownMember {
                    interface: decl.interface.to_string(),
                    member: member.to_string(),
                }
                .into());
            }
            if let Some(index) = witness.max_param().filter(|i| *i >= nominal.params) {
                return Err(ConformanceError::ParameterOutOfRange {
                    nominal: decl.nominal.to_string(),
                    interface: decl.interface.to_string(),
                    member: member.to_string(),
                    index,
                    count: nominal.params,
                });
            }
            interfaces.check_member_projections(witness)?;
        }
        for req in &decl.conditional {
            for p in req.interfaces() {
                if !interfaces.contains(p) {
                    return Err(InterfaceError::Unknown {
                        interface: decl.nominal.to_string(),
                        referenced: p.to_string(),
                    }
                    .into());
                }
            }
            for ty in req.types() {
                interfaces.check_member_projections(ty)?;
            }
        }

        self.conformances.insert(key, decl);
        Ok(())
    }

    pub fn nominal(&self, name: &str) -> Option<&NominalDecl> {
        self.nominals.get(name)
    }

    pub fn len(&self) -> usize {
        self.conformances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conformances.is_empty()
    }

    fn lookup_at(&self, ty: &Type, interface: &InterfaceId, depth: usize) -> Option<Conformance> {
        if depth > MAX_RESOLUTION_DEPTH {
            return None;
        }
        if ty.is_type_parameter() {
            return Some(Conformance::Abstract(interface.clone()));
        }
        let (name, args) = match ty {
            Type::Nominal { name, args } => (name, args),
            Type::Member { .. } => {
                let resolved = self.resolve(ty, depth + 1);
                return match resolved {
                    Type::Error => None,
                    other => self.lookup_at(&other, interface, depth + 1),
                };
            }
            Type::Param(_) | Type::Error => return None,
        };
        let nominal = self.nominals.get(name)?;
        if nominal.params != args.len() {
            return None;
        }

        let Some(decl) = self.conformances.get(&(name.clone(), interface.clone())) else {
            // Inherited from the superclass, if any.
            let superclass = nominal.superclass.as_ref()?.substitute(args).ok()?;
            return self.lookup_at(&superclass, interface, depth + 1);
        };

        let mut witnesses = BTreeMap::new();
        for (member, witness) in &decl.witnesses {
            let specialized = witness.substitute(args).ok()?;
            witnesses.insert(member.clone(), self.resolve(&specialized, depth + 1));
        }
        let conditional = decl
            .conditional
            .iter()
            .map(|r| r.substitute(args))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        Some(Conformance::Concrete(Arc::new(ConcreteImpl::new(
            ty.clone(),
            interface.clone(),
            witnesses,
            conditional,
        ))))
    }

    /// Resolve member types projected off concrete bases. Projections off a
    /// type parameter are left alone; unresolvable ones become [`Type::Error`].
    fn resolve(&self, ty: &Type, depth: usize) -> Type {
        if depth > MAX_RESOLUTION_DEPTH {
            return Type::Error;
        }
        match ty {
            Type::Member {
                base,
                interface,
                name,
            } => {
                let base = self.resolve(base, depth + 1);
                if base.is_type_parameter() {
                    return Type::Member {
                        base: Box::new(base),
                        interface: interface.clone(),
                        name: name.clone(),
                    };
                }
                match self.lookup_at(&base, interface, depth + 1) {
                    Some(Conformance::Concrete(imp)) => imp
                        .type_witness(name)
                        .map(|w| self.resolve(w, depth + 1))
                        .unwrap_or(Type::Error),
                    _ => Type::Error,
                }
            }
            Type::Nominal { name, args } => Type::Nominal {
                name: name.clone(),
                args: args.iter().map(|a| self.resolve(a, depth + 1)).collect(),
            },
            Type::Param(_) | Type::Error => ty.clone(),
        }
    }
}

impl ConformanceLookup for ConformanceTable {
    fn lookup_conformance(&self, ty: &Type, interface: &InterfaceId) -> Option<Conformance> {
        self.lookup_at(ty, interface, 0)
    }

    fn superclass(&self, ty: &Type) -> Option<Type> {
        let Type::Nominal { name, args } = ty else {
            return None;
        };
        self.nominals.get(name)?.superclass.as_ref()?.substitute(args).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::InterfaceDecl;

    fn int() -> Type {
        Type::nominal("Int", vec![])
    }

    fn setup() -> (InterfaceRegistry, ConformanceTable) {
        let mut reg = InterfaceRegistry::new();
        let q = reg.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        let p = reg
            .register(InterfaceDecl::new("P").with_members(&["A", "C"]))
            .unwrap();

        let mut table = ConformanceTable::new();
        table.add_nominal(NominalDecl::new("Int", 0)).unwrap();
        table.add_nominal(NominalDecl::new("Foo", 2)).unwrap();
        table
            .add_conformance(&reg, ConformanceDecl::new("Int", &q).witness("V", int()))
            .unwrap();
        table
            .add_conformance(
                &reg,
                ConformanceDecl::new("Foo", &p)
                    .witness("A", Type::Param(0))
                    .witness("C", Type::member(Type::Param(1), &q, "V"))
                    .conditional(RawRequirement::conforms(Type::Param(1), &q)),
            )
            .unwrap();
        (reg, table)
    }

    fn concrete(c: Option<Conformance>) -> Arc<ConcreteImpl> {
        match c {
            Some(Conformance::Concrete(imp)) => imp,
            other => panic!("expected a concrete conformance, got {other:?}"),
        }
    }

    #[test]
    fn lookup_specializes_witnesses() {
        let (_, table) = setup();
        let p = InterfaceId::new("P");
        let q = InterfaceId::new("Q");
        let foo = Type::nominal("Foo", vec![int(), Type::Param(0)]);
        let imp = concrete(table.lookup_conformance(&foo, &p));
        assert_eq!(imp.type_witness("A"), Some(&int()));
        assert_eq!(
            imp.type_witness("C"),
            Some(&Type::member(Type::Param(0), &q, "V"))
        );
        assert_eq!(imp.type_witness("Missing"), None);
        assert_eq!(
            imp.conditional_requirements(),
            &[RawRequirement::conforms(Type::Param(0), &q)]
        );
    }

    #[test]
    fn witnesses_on_concrete_bases_are_resolved() {
        let (_, table) = setup();
        let foo = Type::nominal("Foo", vec![int(), int()]);
        let imp = concrete(table.lookup_conformance(&foo, &InterfaceId::new("P")));
        assert_eq!(imp.type_witness("C"), Some(&int()));
    }

    #[test]
    fn type_parameters_conform_abstractly() {
        let (_, table) = setup();
        let q = InterfaceId::new("Q");
        assert!(matches!(
            table.lookup_conformance(&Type::Param(3), &q),
            Some(Conformance::Abstract(_))
        ));
        assert!(table.lookup_conformance(&int(), &InterfaceId::new("P")).is_none());
        assert!(table
            .lookup_conformance(&Type::nominal("Foo", vec![int()]), &InterfaceId::new("P"))
            .is_none());
    }

    #[test]
    fn conformance_is_inherited_from_superclass() {
        let (reg, mut table) = setup();
        let q = InterfaceId::new("Q");
        table.add_nominal(NominalDecl::new("Base", 0)).unwrap();
        table
            .add_nominal(NominalDecl::new("Derived", 0).with_superclass(Type::nominal("Base", vec![])))
            .unwrap();
        table
            .add_conformance(&reg, ConformanceDecl::new("Base", &q).witness("V", int()))
            .unwrap();
        let derived = Type::nominal("Derived", vec![]);
        let imp = concrete(table.lookup_conformance(&derived, &q));
        assert_eq!(imp.type_witness("V"), Some(&int()));
        assert_eq!(table.superclass(&derived), Some(Type::nominal("Base", vec![])));
    }

    #[test]
    fn invalid_declarations_are_rejected() {
        let (reg, mut table) = setup();
        let p = InterfaceId::new("P");
        let q = InterfaceId::new("Q");

        let err = table.add_nominal(NominalDecl::new("Int", 0)).unwrap_err();
        assert!(matches!(err, ConformanceError::DuplicateNominal { .. }));

        let err = table
            .add_conformance(&reg, ConformanceDecl::new("Missing", &q))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::UnknownNominal { .. }));

        let err = table
            .add_conformance(&reg, ConformanceDecl::new("Int", &q))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::Duplicate { .. }));

        let err = table
            .add_conformance(&reg, ConformanceDecl::new("Int", &p).witness("A", Type::Param(0)))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::ParameterOutOfRange { index: 0, .. }));

        let err = table
            .add_conformance(&reg, ConformanceDecl::new("Int", &p).witness("Z", int()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConformanceError::Interface(InterfaceError::UnknownMember { .. })
        ));
    }
}

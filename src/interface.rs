//! Interface declarations and the registry that resolves them.
//!
//! An interface declares member types, inherits other interfaces, and carries
//! a requirement signature written against `Self` (`Param(0)`). The registry
//! is immutable input for a run; the rewrite system imports an interface's
//! rules lazily, the first time the interface is referenced.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InterfaceError;
use crate::requirement::RawRequirement;
use crate::symbol::{InterfaceId, Name};
use crate::types::Type;

/// A declared interface.
#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub name: InterfaceId,
    /// Member types, in declaration order.
    pub members: Vec<Name>,
    pub inherits: Vec<InterfaceId>,
    /// Requirement signature, with `Param(0)` standing for `Self`.
    pub requirements: Vec<RawRequirement>,
}

impl InterfaceDecl {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: InterfaceId::new(name),
            members: Vec::new(),
            inherits: Vec::new(),
            requirements: Vec::new(),
        }
    }

    pub fn with_members(mut self, members: &[&str]) -> Self {
        self.members.extend(members.iter().map(|m| Name::from(*m)));
        self
    }

    pub fn inheriting(mut self, parent: &InterfaceId) -> Self {
        self.inherits.push(parent.clone());
        self
    }

    pub fn with_requirement(mut self, requirement: RawRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn declares_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| &**m == member)
    }
}

/// All interfaces known to a run, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct InterfaceRegistry {
    decls: BTreeMap<InterfaceId, InterfaceDecl>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration. Everything it refers to, other than itself,
    /// must already be registered.
    pub fn register(&mut self, decl: InterfaceDecl) -> Result<InterfaceId, InterfaceError> {
        if self.decls.contains_key(&decl.name) {
            return Err(InterfaceError::Duplicate {
                name: decl.name.to_string(),
            });
        }
        for parent in &decl.inherits {
            self.check_known(&decl, parent)?;
        }
        for req in &decl.requirements {
            for p in req.interfaces() {
                self.check_known(&decl, p)?;
            }
            for ty in req.types() {
                self.check_type(&decl, ty)?;
            }
        }
        let id = decl.name.clone();
        self.decls.insert(id.clone(), decl);
        Ok(id)
    }

    /// Register without validation, for exercising malformed declarations.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, decl: InterfaceDecl) {
        self.decls.insert(decl.name.clone(), decl);
    }

    pub fn get(&self, id: &InterfaceId) -> Option<&InterfaceDecl> {
        self.decls.get(id)
    }

    pub fn contains(&self, id: &InterfaceId) -> bool {
        self.decls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Member types declared directly by `id`.
    pub fn member_types(&self, id: &InterfaceId) -> &[Name] {
        self.decls
            .get(id)
            .map(|d| d.members.as_slice())
            .unwrap_or(&[])
    }

    /// Interfaces that `id` names directly: inherited ones and the targets of
    /// conformance requirements in its requirement signature.
    pub fn referenced_interfaces(&self, id: &InterfaceId) -> BTreeSet<InterfaceId> {
        let mut out = BTreeSet::new();
        if let Some(decl) = self.decls.get(id) {
            out.extend(decl.inherits.iter().cloned());
            for req in &decl.requirements {
                out.extend(req.interfaces().cloned());
            }
        }
        out.remove(id);
        out
    }

    /// Check that every member projection in `ty` names a declared member.
    pub fn check_member_projections(&self, ty: &Type) -> Result<(), InterfaceError> {
        match ty {
            Type::Member {
                base,
                interface,
                name,
            } => {
                let decl = self.decls.get(interface).ok_or_else(|| InterfaceError::Unknown {
                    interface: interface.to_string(),
                    referenced: interface.to_string(),
                })?;
                if !decl.declares_member(name) {
                    return Err(InterfaceError::UnknownMember {
                        interface: interface.to_string(),
                        member: name.to_string(),
                    });
                }
                self.check_member_projections(base)
            }
            Type::Nominal { args, .. } => {
                args.iter().try_for_each(|a| self.check_member_projections(a))
            }
            Type::Param(_) | Type::Error => Ok(()),
        }
    }

    fn check_known(&self, decl: &InterfaceDecl, id: &InterfaceId) -> Result<(), InterfaceError> {
        if *id == decl.name || self.decls.contains_key(id) {
            Ok(())
        } else {
            Err(InterfaceError::Unknown {
                interface: decl.name.to_string(),
                referenced: id.to_string(),
            })
        }
    }

    // Like `check_member_projections`, but the declaration being registered
    // may project its own members.
    fn check_type(&self, decl: &InterfaceDecl, ty: &Type) -> Result<(), InterfaceError> {
        match ty {
            Type::Member {
                base,
                interface,
                name,
            } => {
                let declared = if *interface == decl.name {
                    decl.declares_member(name)
                } else {
                    self.check_known(decl, interface)?;
                    self.decls
                        .get(interface)
                        .is_some_and(|d| d.declares_member(name))
                };
                if !declared {
                    return Err(InterfaceError::UnknownMember {
                        interface: interface.to_string(),
                        member: name.to_string(),
                    });
                }
                self.check_type(decl, base)
            }
            Type::Nominal { args, .. } => args.iter().try_for_each(|a| self.check_type(decl, a)),
            Type::Param(0) | Type::Error => Ok(()),
            Type::Param(index) => Err(InterfaceError::ForeignParameter {
                interface: decl.name.to_string(),
                index: *index,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InterfaceRegistry {
        let mut reg = InterfaceRegistry::new();
        reg.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        let q = InterfaceId::new("Q");
        reg.register(
            InterfaceDecl::new("P")
                .with_members(&["A", "C"])
                .with_requirement(RawRequirement::conforms(
                    Type::member(Type::Param(0), &InterfaceId::new("P"), "A"),
                    &q,
                )),
        )
        .unwrap();
        reg
    }

    #[test]
    fn register_and_lookup() {
        let reg = registry();
        let p = InterfaceId::new("P");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.member_types(&p).len(), 2);
        assert!(reg.get(&p).unwrap().declares_member("C"));
        assert!(reg.member_types(&InterfaceId::new("Missing")).is_empty());
    }

    #[test]
    fn duplicate_rejected() {
        let mut reg = registry();
        let err = reg.register(InterfaceDecl::new("Q")).unwrap_err();
        assert!(matches!(err, InterfaceError::Duplicate { .. }));
    }

    #[test]
    fn unknown_inherited_interface_rejected() {
        let mut reg = InterfaceRegistry::new();
        let err = reg
            .register(InterfaceDecl::new("R").inheriting(&InterfaceId::new("Nope")))
            .unwrap_err();
        assert!(matches!(err, InterfaceError::Unknown { .. }));
    }

    #[test]
    fn unknown_member_rejected() {
        let mut reg = registry();
        let q = InterfaceId::new("Q");
        let err = reg
            .register(InterfaceDecl::new("S").with_requirement(RawRequirement::conforms(
                Type::member(Type::Param(0), &q, "Missing"),
                &q,
            )))
            .unwrap_err();
        assert!(matches!(err, InterfaceError::UnknownMember { .. }));
    }

    #[test]
    fn parameters_other_than_self_rejected() {
        let mut reg = registry();
        let q = InterfaceId::new("Q");
        let err = reg
            .register(
                InterfaceDecl::new("S")
                    .with_requirement(RawRequirement::conforms(Type::Param(1), &q)),
            )
            .unwrap_err();
        assert!(matches!(err, InterfaceError::ForeignParameter { index: 1, .. }));
        assert!(!reg.contains(&InterfaceId::new("S")));
    }

    #[test]
    fn referenced_interfaces_collects_parents_and_requirements() {
        let mut reg = registry();
        let p = InterfaceId::new("P");
        reg.register(InterfaceDecl::new("R").inheriting(&p)).unwrap();
        let refs = reg.referenced_interfaces(&InterfaceId::new("R"));
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![p.clone()]);

        let refs = reg.referenced_interfaces(&p);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![InterfaceId::new("Q")]);
    }
}

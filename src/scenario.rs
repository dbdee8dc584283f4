//! Scenario files: a generic signature plus the declarations it needs.
//!
//! ```toml
//! params = ["U", "T"]
//! requirements = ["T: P", "T == Foo<Int, U>"]
//!
//! [[interface]]
//! name = "Q"
//! members = ["V"]
//!
//! [[interface]]
//! name = "P"
//! members = ["A", "C"]
//!
//! [[nominal]]
//! name = "Int"
//!
//! [[nominal]]
//! name = "Foo"
//! params = ["X", "Y"]
//!
//! [[conformance]]
//! type = "Foo"
//! interface = "P"
//! witnesses = { A = "X", C = "Y.V" }
//! where = ["Y: Q"]
//! ```
//!
//! Types are written `Int`, `Foo<Int, U>`, `Y.V` (the member is resolved by
//! its name, which must be declared by exactly one interface) or `Y.[Q:V]`.
//! Requirements are `A: P`, `A: P & Q`, `A: SomeClass` or `A == B`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::conformance::{ConformanceDecl, ConformanceTable, NominalDecl};
use crate::engine::{Engine, EngineConfig};
use crate::error::{ReqResult, RequirementError};
use crate::interface::{InterfaceDecl, InterfaceRegistry};
use crate::requirement::RawRequirement;
use crate::symbol::{InterfaceId, Name};
use crate::types::Type;

#[derive(Debug, Error, Diagnostic)]
pub enum ScenarioError {
    #[error("cannot read scenario {path}")]
    #[diagnostic(code(reqsolve::scenario::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse scenario {path}: {message}")]
    #[diagnostic(
        code(reqsolve::scenario::parse),
        help("A scenario is a TOML document with `params`, `requirements`, and \
              `[[interface]]`, `[[nominal]]` and `[[conformance]]` tables.")
    )]
    Parse { path: String, message: String },

    #[error("invalid syntax in `{input}`: {message}")]
    #[diagnostic(
        code(reqsolve::scenario::syntax),
        help("Types look like `Foo<Int, T>`, `T.A` or `T.[P:A]`; requirements like `T: P` or `T == U`.")
    )]
    Syntax { input: String, message: String },

    #[error("unknown name `{name}` in `{input}`")]
    #[diagnostic(
        code(reqsolve::scenario::unknown_name),
        help("Names must be a generic parameter in scope, a declared nominal type, or a declared interface.")
    )]
    UnknownName { name: String, input: String },

    #[error("member type `{member}` is declared by several interfaces: {candidates}")]
    #[diagnostic(
        code(reqsolve::scenario::ambiguous_member),
        help("Spell the projection out as `.[Interface:{member}]`.")
    )]
    AmbiguousMember { member: String, candidates: String },
}

// ── File format ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceEntry>,
    #[serde(default, rename = "nominal")]
    pub nominals: Vec<NominalEntry>,
    #[serde(default, rename = "conformance")]
    pub conformances: Vec<ConformanceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceEntry {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
    /// Written against `Self`.
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NominalEntry {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub superclass: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConformanceEntry {
    #[serde(rename = "type")]
    pub nominal: String,
    pub interface: String,
    #[serde(default)]
    pub witnesses: BTreeMap<String, String>,
    #[serde(default, rename = "where")]
    pub conditional: Vec<String>,
}

/// A scenario turned into engine inputs.
pub struct Built {
    pub engine: Engine,
    pub param_names: Vec<String>,
    /// Requirements of the signature that could not be met.
    pub errors: Vec<RequirementError>,
}

impl Scenario {
    pub fn from_toml_str(source: &str, origin: &str) -> Result<Self, ScenarioError> {
        toml::from_str(source).map_err(|e| ScenarioError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }

    /// Parse a type written against the signature's parameters.
    pub fn parse_type(&self, input: &str) -> Result<Type, ScenarioError> {
        let names = Names::new(self);
        Scope::new(&names, &self.params[..]).ty(input)
    }

    /// Declare everything and add the signature to a fresh engine.
    pub fn build(&self, config: EngineConfig) -> ReqResult<Built> {
        let names = Names::new(self);

        let mut registry = InterfaceRegistry::new();
        for entry in &self.interfaces {
            let scope = Scope::new(&names, &["Self"][..]);
            let mut decl = InterfaceDecl::new(&entry.name);
            decl.members = entry.members.iter().map(|m| Name::from(m.as_str())).collect();
            for parent in &entry.inherits {
                decl.inherits.push(names.interface(parent, parent)?);
            }
            for req in &entry.requirements {
                decl.requirements.push(scope.requirement(req)?);
            }
            registry.register(decl)?;
        }

        let mut table = ConformanceTable::new();
        for entry in &self.nominals {
            let mut decl = NominalDecl::new(&entry.name, entry.params.len());
            if let Some(superclass) = &entry.superclass {
                let scope = Scope::new(&names, &entry.params[..]);
                decl = decl.with_superclass(scope.ty(superclass)?);
            }
            table.add_nominal(decl)?;
        }
        for entry in &self.conformances {
            let params = self
                .nominals
                .iter()
                .find(|n| n.name == entry.nominal)
                .map(|n| n.params.as_slice())
                .unwrap_or(&[]);
            let scope = Scope::new(&names, params);
            let interface = names.interface(&entry.interface, &entry.interface)?;
            let mut decl = ConformanceDecl::new(&entry.nominal, &interface);
            for (member, witness) in &entry.witnesses {
                decl = decl.witness(member, scope.ty(witness)?);
            }
            for req in &entry.conditional {
                decl = decl.conditional(scope.requirement(req)?);
            }
            table.add_conformance(&registry, decl)?;
        }

        let scope = Scope::new(&names, &self.params[..]);
        let requirements = self
            .requirements
            .iter()
            .map(|r| scope.requirement(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut engine = Engine::new(config, registry, Arc::new(table))?;
        let errors = engine.add_generic_signature(self.params.len(), &requirements)?;
        Ok(Built {
            engine,
            param_names: self.params.clone(),
            errors,
        })
    }
}

// ── Name resolution ─────────────────────────────────────────────────────

struct Names {
    interfaces: BTreeSet<String>,
    nominals: BTreeSet<String>,
    /// Member name -> interfaces declaring it.
    members: BTreeMap<String, Vec<String>>,
}

impl Names {
    fn new(scenario: &Scenario) -> Self {
        let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &scenario.interfaces {
            for m in &entry.members {
                members.entry(m.clone()).or_default().push(entry.name.clone());
            }
        }
        Self {
            interfaces: scenario.interfaces.iter().map(|i| i.name.clone()).collect(),
            nominals: scenario.nominals.iter().map(|n| n.name.clone()).collect(),
            members,
        }
    }

    fn interface(&self, name: &str, input: &str) -> Result<InterfaceId, ScenarioError> {
        if self.interfaces.contains(name) {
            Ok(InterfaceId::new(name))
        } else {
            Err(ScenarioError::UnknownName {
                name: name.to_string(),
                input: input.to_string(),
            })
        }
    }

    fn member_owner(&self, member: &str, input: &str) -> Result<InterfaceId, ScenarioError> {
        match self.members.get(member).map(Vec::as_slice) {
            Some([only]) => Ok(InterfaceId::new(only)),
            Some(many) if many.len() > 1 => Err(ScenarioError::AmbiguousMember {
                member: member.to_string(),
                candidates: many.join(", "),
            }),
            _ => Err(ScenarioError::UnknownName {
                name: member.to_string(),
                input: input.to_string(),
            }),
        }
    }
}

/// Names resolve against the generic parameters in scope first.
struct Scope<'a> {
    names: &'a Names,
    params: Vec<&'a str>,
}

impl<'a> Scope<'a> {
    fn new<S: AsRef<str>>(names: &'a Names, params: &'a [S]) -> Self {
        Self {
            names,
            params: params.iter().map(AsRef::as_ref).collect(),
        }
    }

    fn ty(&self, input: &str) -> Result<Type, ScenarioError> {
        let mut parser = Parser::new(input, self);
        let ty = parser.ty()?;
        parser.finish()?;
        Ok(ty)
    }

    fn requirement(&self, input: &str) -> Result<RawRequirement, ScenarioError> {
        if let Some((lhs, rhs)) = input.split_once("==") {
            return Ok(RawRequirement::same_type(self.ty(lhs)?, self.ty(rhs)?));
        }
        let Some((lhs, rhs)) = input.split_once(':') else {
            return Err(ScenarioError::Syntax {
                input: input.to_string(),
                message: "expected `:` or `==`".into(),
            });
        };
        // A leading `[` means the colon belongs to a `[P:A]` projection.
        if lhs.contains('[') && !lhs.contains(']') {
            return self.requirement_with_projection(input);
        }
        self.finish_requirement(input, lhs, rhs)
    }

    fn requirement_with_projection(&self, input: &str) -> Result<RawRequirement, ScenarioError> {
        let mut depth = 0usize;
        for (i, c) in input.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                ':' if depth == 0 => {
                    return self.finish_requirement(input, &input[..i], &input[i + 1..]);
                }
                _ => {}
            }
        }
        Err(ScenarioError::Syntax {
            input: input.to_string(),
            message: "expected `:` or `==`".into(),
        })
    }

    fn finish_requirement(
        &self,
        input: &str,
        lhs: &str,
        rhs: &str,
    ) -> Result<RawRequirement, ScenarioError> {
        let subject = self.ty(lhs)?;
        let parts: Vec<&str> = rhs.split('&').map(str::trim).collect();
        if let [single] = parts.as_slice() {
            if !self.names.interfaces.contains(*single) {
                return Ok(RawRequirement::superclass(subject, self.ty(single)?));
            }
        }
        let interfaces = parts
            .iter()
            .map(|p| self.names.interface(p, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RawRequirement::Conformance {
            subject,
            interfaces,
        })
    }

    fn resolve(&self, name: &str, input: &str) -> Result<Type, ScenarioError> {
        if let Some(index) = self.params.iter().position(|p| *p == name) {
            return Ok(Type::Param(index));
        }
        if self.names.nominals.contains(name) {
            return Ok(Type::nominal(name, Vec::new()));
        }
        Err(ScenarioError::UnknownName {
            name: name.to_string(),
            input: input.to_string(),
        })
    }
}

// ── Type syntax ─────────────────────────────────────────────────────────

struct Parser<'s, 'a> {
    input: &'s str,
    rest: &'s str,
    scope: &'s Scope<'a>,
}

impl<'s, 'a> Parser<'s, 'a> {
    fn new(input: &'s str, scope: &'s Scope<'a>) -> Self {
        Self {
            input,
            rest: input,
            scope,
        }
    }

    fn error(&self, message: impl Into<String>) -> ScenarioError {
        ScenarioError::Syntax {
            input: self.input.trim().to_string(),
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix(c) {
            self.rest = rest;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ScenarioError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{c}`")))
        }
    }

    fn ident(&mut self) -> Result<&'s str, ScenarioError> {
        self.skip_ws();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(self.error("expected a name"));
        }
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(name)
    }

    fn ty(&mut self) -> Result<Type, ScenarioError> {
        let name = self.ident()?;
        let mut ty = if self.eat('<') {
            let mut args = vec![self.ty()?];
            while self.eat(',') {
                args.push(self.ty()?);
            }
            self.expect('>')?;
            if !self.scope.names.nominals.contains(name) {
                return Err(ScenarioError::UnknownName {
                    name: name.to_string(),
                    input: self.input.trim().to_string(),
                });
            }
            Type::nominal(name, args)
        } else {
            self.scope.resolve(name, self.input.trim())?
        };

        while self.eat('.') {
            ty = if self.eat('[') {
                let interface = self.ident()?;
                self.expect(':')?;
                let member = self.ident()?;
                self.expect(']')?;
                let interface = self.scope.names.interface(interface, self.input.trim())?;
                Type::member(ty, &interface, member)
            } else {
                let member = self.ident()?;
                let interface = self.scope.names.member_owner(member, self.input.trim())?;
                Type::member(ty, &interface, member)
            };
        }
        Ok(ty)
    }

    fn finish(&mut self) -> Result<(), ScenarioError> {
        self.skip_ws();
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected `{}`", self.rest)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKED: &str = r#"
params = ["U", "T"]
requirements = ["U: Q", "T: P", "T == Foo<Int, U>"]

[[interface]]
name = "Q"
members = ["V"]

[[interface]]
name = "P"
members = ["A", "C"]

[[nominal]]
name = "Int"

[[nominal]]
name = "Foo"
params = ["X", "Y"]

[[conformance]]
type = "Int"
interface = "Q"
witnesses = { V = "Int" }

[[conformance]]
type = "Foo"
interface = "P"
witnesses = { A = "X", C = "Y.V" }
where = ["Y: Q"]
"#;

    fn names() -> Names {
        Names::new(&Scenario::from_toml_str(WORKED, "inline").unwrap())
    }

    #[test]
    fn parses_types() {
        let names = names();
        let params = ["U", "T"];
        let scope = Scope::new(&names, &params[..]);
        let q = InterfaceId::new("Q");
        assert_eq!(
            scope.ty("Foo<Int, U>").unwrap(),
            Type::nominal("Foo", vec![Type::nominal("Int", vec![]), Type::Param(0)])
        );
        assert_eq!(scope.ty("T.V").unwrap(), Type::member(Type::Param(1), &q, "V"));
        assert_eq!(scope.ty(" T.[Q:V] ").unwrap(), Type::member(Type::Param(1), &q, "V"));
        assert!(matches!(scope.ty("Bogus"), Err(ScenarioError::UnknownName { .. })));
        assert!(matches!(scope.ty("Foo<Int"), Err(ScenarioError::Syntax { .. })));
        assert!(matches!(scope.ty("T U"), Err(ScenarioError::Syntax { .. })));
    }

    #[test]
    fn parses_requirements() {
        let names = names();
        let params = ["U", "T"];
        let scope = Scope::new(&names, &params[..]);
        let p = InterfaceId::new("P");
        let q = InterfaceId::new("Q");
        assert_eq!(
            scope.requirement("T: P & Q").unwrap(),
            RawRequirement::Conformance {
                subject: Type::Param(1),
                interfaces: vec![p, q.clone()],
            }
        );
        assert_eq!(
            scope.requirement("T == U.V").unwrap(),
            RawRequirement::same_type(Type::Param(1), Type::member(Type::Param(0), &q, "V"))
        );
        assert_eq!(
            scope.requirement("U.[Q:V]: Q").unwrap(),
            RawRequirement::conforms(Type::member(Type::Param(0), &q, "V"), &q)
        );
        assert_eq!(
            scope.requirement("T: Int").unwrap(),
            RawRequirement::superclass(Type::Param(1), Type::nominal("Int", vec![]))
        );
        assert!(scope.requirement("T").is_err());
    }

    #[test]
    fn builds_the_engine() {
        let scenario = Scenario::from_toml_str(WORKED, "inline").unwrap();
        let built = scenario.build(EngineConfig::default()).unwrap();
        assert!(built.errors.is_empty());
        assert_eq!(built.param_names, vec!["U", "T"]);
        assert_eq!(built.engine.interfaces().len(), 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Scenario::from_toml_str("bogus = 1", "inline").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { .. }));
    }
}

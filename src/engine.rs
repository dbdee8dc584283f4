//! Engine facade: owns the rewrite system and drives completion.
//!
//! A run registers a generic signature, then alternates rebuilding the
//! property map with nested type concretization until a round adds no rule.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conformance::ConformanceLookup;
use crate::error::{
    EngineError, EngineResult, InterfaceError, ReqResult, RequirementError, RewriteError,
    TermError,
};
use crate::interface::InterfaceRegistry;
use crate::property::{PropertyBag, PropertyMap};
use crate::requirement::{RawRequirement, desugar_requirement, rule_for_requirement};
use crate::rewrite::{RewriteSystem, Rule};
use crate::symbol::{InterfaceId, Symbol};
use crate::term::{MutableTerm, Term};
use crate::trace::{TraceSink, Tracer, TracingSink};
use crate::types::{TermRoot, Type};

/// Configuration for the completion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rounds before completion gives up (default: 100).
    pub max_rounds: usize,
    /// Rules the system may hold before completion gives up (default: 4000).
    pub max_rules: usize,
    /// Trace categories.
    pub debug: crate::trace::DebugFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            max_rules: 4000,
            debug: Default::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_rounds == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_rounds must be > 0".into(),
            });
        }
        if self.max_rules == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_rules must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Parse a TOML configuration. `origin` names the source in errors.
    pub fn from_toml_str(source: &str, origin: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| EngineError::ConfigParse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }
}

/// What one round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundStats {
    pub new_rules: usize,
    pub simplified: usize,
    pub conflicts: usize,
    pub bags: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionStats {
    pub rounds: usize,
    pub rules: usize,
    pub live_rules: usize,
    pub conflicting: usize,
    pub relations: usize,
}

pub struct Engine {
    config: EngineConfig,
    interfaces: InterfaceRegistry,
    lookup: Arc<dyn ConformanceLookup>,
    system: RewriteSystem,
    map: PropertyMap,
    rounds: usize,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        interfaces: InterfaceRegistry,
        lookup: Arc<dyn ConformanceLookup>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let tracer = if config.debug.is_empty() {
            Tracer::disabled()
        } else {
            Tracer::new(config.debug, Arc::new(TracingSink))
        };
        tracing::info!(
            interfaces = interfaces.len(),
            max_rounds = config.max_rounds,
            max_rules = config.max_rules,
            "initializing reqsolve engine"
        );
        Ok(Self {
            config,
            interfaces,
            lookup,
            system: RewriteSystem::with_tracer(tracer),
            map: PropertyMap::new(),
            rounds: 0,
        })
    }

    /// Send trace events for the configured categories to `sink`.
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.system.set_tracer(Tracer::new(self.config.debug, sink));
        self
    }

    /// Add the requirements of a generic signature over parameters
    /// `0..param_count`. Returns the requirements that could not be met.
    pub fn add_generic_signature(
        &mut self,
        param_count: usize,
        requirements: &[RawRequirement],
    ) -> ReqResult<Vec<RequirementError>> {
        let mut referenced = Vec::new();
        for req in requirements {
            for ty in req.types() {
                if let Some(index) = ty.max_param().filter(|i| *i >= param_count) {
                    return Err(TermError::SlotOutOfRange {
                        index,
                        available: param_count,
                    }
                    .into());
                }
                self.interfaces.check_member_projections(ty)?;
                collect_member_interfaces(ty, &mut referenced);
            }
            referenced.extend(req.interfaces().cloned());
        }
        for id in &referenced {
            if !self.interfaces.contains(id) {
                return Err(InterfaceError::Unknown {
                    interface: "<generic signature>".into(),
                    referenced: id.to_string(),
                }
                .into());
            }
        }
        for id in &referenced {
            self.system
                .register_interface(&self.interfaces, self.lookup.as_ref(), id)?;
        }

        let mut desugared = Vec::new();
        let mut errors = Vec::new();
        for raw in requirements {
            desugar_requirement(raw, self.lookup.as_ref(), &mut desugared, &mut errors);
        }

        let params: Vec<Term> = (0..param_count)
            .map(|i| Term::from(vec![Symbol::GenericParam(i as u32)]))
            .collect();
        let root = TermRoot::Substitutions(&params);
        for req in &desugared {
            let (lhs, rhs) = rule_for_requirement(req, root)?;
            self.system.add_explicit_rule(lhs, rhs);
        }
        for error in &errors {
            tracing::warn!(%error, "unsatisfiable requirement");
            self.system.record_requirement_error(error.clone());
        }
        Ok(errors)
    }

    /// One round: simplify, rebuild the property map, concretize.
    pub fn run_round(&mut self) -> RoundStats {
        let before = self.system.len();
        let simplified = self.system.simplify_rules();
        let conflicts = self.map.rebuild(&mut self.system);
        self.map
            .concretize_nested_types(&mut self.system, &self.interfaces, self.lookup.as_ref());
        self.rounds += 1;
        let stats = RoundStats {
            new_rules: self.system.len() - before,
            simplified,
            conflicts,
            bags: self.map.len(),
        };
        tracing::debug!(
            round = self.rounds,
            new_rules = stats.new_rules,
            simplified = stats.simplified,
            conflicts = stats.conflicts,
            bags = stats.bags,
            "completion round"
        );
        stats
    }

    /// Run rounds until one adds no rule.
    pub fn complete(&mut self) -> EngineResult<CompletionStats> {
        for _ in 0..self.config.max_rounds {
            let round = self.run_round();
            if self.system.len() > self.config.max_rules {
                return Err(EngineError::RuleLimit {
                    rules: self.system.len(),
                    max_rules: self.config.max_rules,
                });
            }
            if round.new_rules == 0 {
                let stats = self.stats();
                tracing::info!(
                    rounds = stats.rounds,
                    rules = stats.live_rules,
                    conflicting = stats.conflicting,
                    "completion reached a fixed point"
                );
                return Ok(stats);
            }
        }
        Err(EngineError::RoundLimit {
            max_rounds: self.config.max_rounds,
        })
    }

    pub fn stats(&self) -> CompletionStats {
        CompletionStats {
            rounds: self.rounds,
            rules: self.system.len(),
            live_rules: self.live_rules().count(),
            conflicting: self.conflicting_rules().len(),
            relations: self.system.relations().len(),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn reduce(&self, term: &MutableTerm) -> MutableTerm {
        self.system.reduce(term).0
    }

    pub fn rules(&self) -> &[Rule] {
        self.system.rules()
    }

    /// Rules that are neither simplified nor structural.
    pub fn live_rules(&self) -> impl Iterator<Item = &Rule> {
        self.system
            .rules()
            .iter()
            .filter(|r| !r.is_simplified() && !r.is_permanent())
    }

    pub fn conflicting_rules(&self) -> Vec<&Rule> {
        self.system
            .rules()
            .iter()
            .filter(|r| r.is_conflicting())
            .collect()
    }

    pub fn requirement_errors(&self) -> &[RequirementError] {
        self.system.requirement_errors()
    }

    /// Properties known for `term`, as of the last round.
    pub fn lookup_properties(&self, term: &[Symbol]) -> Option<&PropertyBag> {
        self.map.lookup_properties(term)
    }

    pub fn verify_derivations(&self) -> Result<usize, RewriteError> {
        self.system.verify_derivations()
    }

    pub fn system(&self) -> &RewriteSystem {
        &self.system
    }

    pub fn property_map(&self) -> &PropertyMap {
        &self.map
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn interfaces(&self) -> &InterfaceRegistry {
        &self.interfaces
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

fn collect_member_interfaces(ty: &Type, out: &mut Vec<InterfaceId>) {
    match ty {
        Type::Member {
            base, interface, ..
        } => {
            out.push(interface.clone());
            collect_member_interfaces(base, out);
        }
        Type::Nominal { args, .. } => {
            for a in args {
                collect_member_interfaces(a, out);
            }
        }
        Type::Param(_) | Type::Error => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::ConformanceTable;
    use crate::interface::InterfaceDecl;

    fn engine_with_q() -> Engine {
        let mut reg = InterfaceRegistry::new();
        reg.register(InterfaceDecl::new("Q").with_members(&["V"])).unwrap();
        Engine::new(EngineConfig::default(), reg, Arc::new(ConformanceTable::new())).unwrap()
    }

    #[test]
    fn config_defaults_and_validation() {
        let config = EngineConfig::default();
        assert_eq!(config.max_rounds, 100);
        assert!(config.validate().is_ok());
        let bad = EngineConfig {
            max_rules: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn config_from_toml() {
        let config = EngineConfig::from_toml_str(
            "max_rounds = 7\n[debug]\nproperty_map = true\n",
            "inline",
        )
        .unwrap();
        assert_eq!(config.max_rounds, 7);
        assert_eq!(config.max_rules, 4000);
        assert!(config.debug.property_map);

        let err = EngineConfig::from_toml_str("max_rounds = \"many\"", "inline").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse { .. }));
        let err = EngineConfig::from_toml_str("max_rounds = 0", "inline").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }));
    }

    #[test]
    fn signature_rejects_unknown_parameters_and_interfaces() {
        let mut engine = engine_with_q();
        let q = InterfaceId::new("Q");
        let err = engine
            .add_generic_signature(1, &[RawRequirement::conforms(Type::Param(3), &q)])
            .unwrap_err();
        assert!(err.to_string().contains("slot 3"));

        let err = engine
            .add_generic_signature(1, &[RawRequirement::conforms(Type::Param(0), &InterfaceId::new("Nope"))])
            .unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn trivial_signature_completes_in_one_round() {
        let mut engine = engine_with_q();
        let q = InterfaceId::new("Q");
        let errors = engine
            .add_generic_signature(1, &[RawRequirement::conforms(Type::Param(0), &q)])
            .unwrap();
        assert!(errors.is_empty());
        let stats = engine.complete().unwrap();
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.conflicting, 0);
        assert_eq!(engine.live_rules().count(), 1);
        let t = [Symbol::GenericParam(0)];
        assert_eq!(engine.lookup_properties(&t).unwrap().conforms_to(), &[q]);
    }
}

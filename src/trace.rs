//! Structured debug trace for the completion engine.
//!
//! The engine reports each decision branch as a [`TraceEvent`]. Events are
//! grouped into categories selected by [`DebugFlags`] and delivered to an
//! injectable [`TraceSink`]: forwarded to `tracing`, collected in memory for
//! tests, or dropped.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

// ── Categories ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugCategory {
    ConcretizeNestedTypes,
    ConditionalRequirements,
    PropertyMap,
    Simplify,
}

impl DebugCategory {
    pub const ALL: [DebugCategory; 4] = [
        Self::ConcretizeNestedTypes,
        Self::ConditionalRequirements,
        Self::PropertyMap,
        Self::Simplify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConcretizeNestedTypes => "concretize-nested-types",
            Self::ConditionalRequirements => "conditional-requirements",
            Self::PropertyMap => "property-map",
            Self::Simplify => "simplify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Which trace categories are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugFlags {
    pub concretize_nested_types: bool,
    pub conditional_requirements: bool,
    pub property_map: bool,
    pub simplify: bool,
}

impl DebugFlags {
    pub fn all() -> Self {
        Self {
            concretize_nested_types: true,
            conditional_requirements: true,
            property_map: true,
            simplify: true,
        }
    }

    pub fn contains(&self, category: DebugCategory) -> bool {
        match category {
            DebugCategory::ConcretizeNestedTypes => self.concretize_nested_types,
            DebugCategory::ConditionalRequirements => self.conditional_requirements,
            DebugCategory::PropertyMap => self.property_map,
            DebugCategory::Simplify => self.simplify,
        }
    }

    pub fn insert(&mut self, category: DebugCategory) {
        match category {
            DebugCategory::ConcretizeNestedTypes => self.concretize_nested_types = true,
            DebugCategory::ConditionalRequirements => self.conditional_requirements = true,
            DebugCategory::PropertyMap => self.property_map = true,
            DebugCategory::Simplify => self.simplify = true,
        }
    }

    /// Parse a comma-separated category list; `all` enables everything.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        let mut flags = Self::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item == "all" {
                return Ok(Self::all());
            }
            let category =
                DebugCategory::parse(item).ok_or_else(|| format!("unknown debug category `{item}`"))?;
            flags.insert(category);
        }
        Ok(flags)
    }

    pub fn is_empty(&self) -> bool {
        !DebugCategory::ALL.iter().any(|c| self.contains(*c))
    }
}

// ── Events ──────────────────────────────────────────────────────────────

/// One traced decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A key with conformances and a concrete type or superclass bound.
    ConcretizingKey { key: String, via: String },
    /// The pair was already processed, possibly for a suffix of this key.
    CachedConformance {
        key: String,
        concrete_rule: usize,
        conformance_rule: usize,
    },
    MissingConformance {
        concrete: String,
        interface: String,
        conflict: bool,
    },
    TypeWitness {
        interface: String,
        member: String,
        concrete: String,
        witness: String,
    },
    ReusedPrefix { term: String },
    SelfReferentialWitness { key: String },
    InducedRule { lhs: String, rhs: String },
    ConditionalRequirement { requirement: String },
    RegisteredInterface { interface: String },
    PropertyConflict { key: String, rule: usize },
    BuiltPropertyMap { bags: usize },
    SimplifiedRule { rule: usize, side: String },
}

impl TraceEvent {
    pub fn category(&self) -> DebugCategory {
        match self {
            Self::ConcretizingKey { .. }
            | Self::CachedConformance { .. }
            | Self::MissingConformance { .. }
            | Self::TypeWitness { .. }
            | Self::ReusedPrefix { .. }
            | Self::SelfReferentialWitness { .. }
            | Self::InducedRule { .. } => DebugCategory::ConcretizeNestedTypes,
            Self::ConditionalRequirement { .. } | Self::RegisteredInterface { .. } => {
                DebugCategory::ConditionalRequirements
            }
            Self::PropertyConflict { .. } | Self::BuiltPropertyMap { .. } => {
                DebugCategory::PropertyMap
            }
            Self::SimplifiedRule { .. } => DebugCategory::Simplify,
        }
    }
}

// ── TraceSink trait ─────────────────────────────────────────────────────

/// A destination for trace events.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

/// Forwards events to `tracing` at debug level.
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, event: &TraceEvent) {
        let category = event.category().as_str();
        match serde_json::to_string(event) {
            Ok(json) => tracing::debug!(category, "{json}"),
            Err(_) => tracing::debug!(category, ?event),
        }
    }
}

/// Collects events in memory.
pub struct CollectingSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for CollectingSink {
    fn emit(&self, event: &TraceEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Drops every event.
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: &TraceEvent) {}
}

// ── Tracer ──────────────────────────────────────────────────────────────

/// A sink plus the categories it wants.
#[derive(Clone)]
pub struct Tracer {
    flags: DebugFlags,
    sink: Arc<dyn TraceSink>,
}

impl Tracer {
    pub fn new(flags: DebugFlags, sink: Arc<dyn TraceSink>) -> Self {
        Self { flags, sink }
    }

    pub fn disabled() -> Self {
        Self::new(DebugFlags::default(), Arc::new(NullSink))
    }

    pub fn flags(&self) -> DebugFlags {
        self.flags
    }

    pub fn enabled(&self, category: DebugCategory) -> bool {
        self.flags.contains(category)
    }

    /// Build and emit an event only if its category is enabled.
    pub fn emit(&self, category: DebugCategory, event: impl FnOnce() -> TraceEvent) {
        if self.enabled(category) {
            self.sink.emit(&event());
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer").field("flags", &self.flags).finish()
    }
}

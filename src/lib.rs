// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # reqsolve
//!
//! Completion of generic requirements over a string rewriting system, with
//! nested type concretization.
//!
//! ## Architecture
//!
//! - **Terms** (`symbol`, `term`, `types`): symbols, shortlex-ordered terms, and
//!   the lowering of types to terms
//! - **Declarations** (`interface`, `conformance`, `requirement`): interfaces,
//!   nominal types, concrete conformances, and requirement desugaring
//! - **Rewriting** (`rewrite`): rules with derivation paths, relations, reduction
//! - **Property map** (`property`): per-term facts, concretization of nested
//!   types, and conditional requirement inference
//! - **Engine** (`engine`): the round loop, limits, and queries
//! - **Scenarios** (`scenario`): TOML input for the CLI
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use reqsolve::conformance::ConformanceTable;
//! use reqsolve::engine::{Engine, EngineConfig};
//! use reqsolve::interface::{InterfaceDecl, InterfaceRegistry};
//! use reqsolve::requirement::RawRequirement;
//! use reqsolve::types::Type;
//!
//! let mut interfaces = InterfaceRegistry::new();
//! let p = interfaces.register(InterfaceDecl::new("P").with_members(&["A"])).unwrap();
//! let mut engine =
//!     Engine::new(EngineConfig::default(), interfaces, Arc::new(ConformanceTable::new())).unwrap();
//! engine
//!     .add_generic_signature(1, &[RawRequirement::conforms(Type::Param(0), &p)])
//!     .unwrap();
//! engine.complete().unwrap();
//! for rule in engine.live_rules() {
//!     println!("{rule}");
//! }
//! ```

pub mod conformance;
pub mod engine;
pub mod error;
pub mod interface;
pub mod property;
pub mod requirement;
pub mod rewrite;
pub mod scenario;
pub mod symbol;
pub mod term;
pub mod trace;
pub mod types;

pub use error::{ReqError, ReqResult};
pub use symbol::{InterfaceId, Symbol};
pub use term::{MutableTerm, Term};
pub use types::Type;

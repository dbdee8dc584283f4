//! Rich diagnostic error types for the reqsolve engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Input-level conflicts (a concrete type
//! that does not satisfy a requirement) are *not* errors: they surface as
//! conflicting rules in the rewrite system. The types here cover malformed
//! declarations, malformed derivations, and resource limits.

use miette::Diagnostic;
use thiserror::Error;

use crate::scenario::ScenarioError;

/// Top-level error type for the reqsolve engine.
#[derive(Debug, Error, Diagnostic)]
pub enum ReqError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Conformance(#[from] ConformanceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] ScenarioError),
}

// ---------------------------------------------------------------------------
// Term errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TermError {
    #[error("parameter slot {index} is out of range: only {available} substitution term(s)")]
    #[diagnostic(
        code(reqsolve::term::slot_out_of_range),
        help(
            "A type refers to a generic parameter that the surrounding declaration \
             does not have. Check the parameter count of the declaration."
        )
    )]
    SlotOutOfRange { index: usize, available: usize },

    #[error("type `{ty}` is not a type parameter")]
    #[diagnostic(
        code(reqsolve::term::not_a_type_parameter),
        help("Only parameters and member types of parameters can be lowered to terms.")
    )]
    NotATypeParameter { ty: String },

    #[error("parameter {index} cannot appear inside the requirement signature of `{interface}`")]
    #[diagnostic(
        code(reqsolve::term::interface_parameter),
        help("Interface requirement signatures may only refer to `Self` (parameter 0).")
    )]
    InterfaceParameter { interface: String, index: usize },
}

// ---------------------------------------------------------------------------
// Rewrite errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RewriteError {
    #[error("rewrite step {step} does not apply to `{term}`: {reason}")]
    #[diagnostic(
        code(reqsolve::rewrite::path_mismatch),
        help(
            "A derivation path did not replay against its rule. This indicates \
             an engine bug; please report it together with the input scenario."
        )
    )]
    PathMismatch {
        step: usize,
        term: String,
        reason: String,
    },

    #[error("derivation of rule {rule} ends at `{actual}`, expected `{expected}`")]
    #[diagnostic(
        code(reqsolve::rewrite::wrong_endpoint),
        help("The derivation replays, but does not connect the two sides of its rule.")
    )]
    WrongEndpoint {
        rule: usize,
        expected: String,
        actual: String,
    },
}

// ---------------------------------------------------------------------------
// Interface errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InterfaceError {
    #[error("interface `{name}` is declared twice")]
    #[diagnostic(
        code(reqsolve::interface::duplicate),
        help("Every interface name must be unique within a registry.")
    )]
    Duplicate { name: String },

    #[error("interface `{interface}` refers to unknown interface `{referenced}`")]
    #[diagnostic(
        code(reqsolve::interface::unknown),
        help("Declare `{referenced}` before the interfaces that refer to it.")
    )]
    Unknown {
        interface: String,
        referenced: String,
    },

    #[error("interface `{interface}` has no member type `{member}`")]
    #[diagnostic(
        code(reqsolve::interface::unknown_member),
        help("Member projections must name a member type declared by the interface.")
    )]
    UnknownMember { interface: String, member: String },

    #[error("requirement signature of `{interface}` refers to parameter {index}")]
    #[diagnostic(
        code(reqsolve::interface::foreign_parameter),
        help("Requirements of an interface can only mention `Self`, which is parameter 0.")
    )]
    ForeignParameter { interface: String, index: usize },
}

// ---------------------------------------------------------------------------
// Conformance errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConformanceError {
    #[error("unknown nominal type `{name}`")]
    #[diagnostic(
        code(reqsolve::conformance::unknown_nominal),
        help("Declare the nominal type before declaring its conformances.")
    )]
    UnknownNominal { name: String },

    #[error("nominal type `{name}` is declared twice")]
    #[diagnostic(code(reqsolve::conformance::duplicate_nominal))]
    DuplicateNominal { name: String },

    #[error("`{nominal}` already implements `{interface}`")]
    #[diagnostic(
        code(reqsolve::conformance::duplicate),
        help("A nominal type can implement an interface at most once.")
    )]
    Duplicate { nominal: String, interface: String },

    #[error("witness for `{interface}.{member}` on `{nominal}` refers to parameter {index}, but `{nominal}` has {count}")]
    #[diagnostic(
        code(reqsolve::conformance::parameter_out_of_range),
        help("Witness types may only use the generic parameters of the conforming type.")
    )]
    ParameterOutOfRange {
        nominal: String,
        interface: String,
        member: String,
        index: usize,
        count: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Interface(#[from] InterfaceError),
}

// ---------------------------------------------------------------------------
// Requirement errors (non-fatal, collected for diagnostics)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum RequirementError {
    #[error("`{ty}` does not implement `{interface}`")]
    #[diagnostic(
        code(reqsolve::requirement::does_not_conform),
        help("The concrete type has no implementation of the required interface.")
    )]
    ConcreteDoesNotConform { ty: String, interface: String },

    #[error("`{first}` and `{second}` cannot be the same type")]
    #[diagnostic(
        code(reqsolve::requirement::conflicting_concrete),
        help("The two sides of the same-type requirement are structurally different.")
    )]
    ConflictingConcreteTypes { first: String, second: String },

    #[error("`{ty}` is not a subclass of `{bound}`")]
    #[diagnostic(code(reqsolve::requirement::not_a_subclass))]
    NotASubclass { ty: String, bound: String },

    #[error("conformance of `{ty}` to `{interface}` depends on itself")]
    #[diagnostic(
        code(reqsolve::requirement::cyclic_conformance),
        help("The conditional requirements of this conformance lead back to it, or grow without bound.")
    )]
    CyclicConformance { ty: String, interface: String },

    #[error("requirement on `{ty}` cannot be lowered: {reason}")]
    #[diagnostic(code(reqsolve::requirement::unlowerable))]
    Unlowerable { ty: String, reason: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(reqsolve::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("completion did not reach a fixed point within {max_rounds} rounds")]
    #[diagnostic(
        code(reqsolve::engine::round_limit),
        help(
            "The requirements keep inducing new rules. Increase `max_rounds`, \
             or look for concrete types whose member types recurse without bound."
        )
    )]
    RoundLimit { max_rounds: usize },

    #[error("rewrite system grew to {rules} rules, exceeding the limit of {max_rules}")]
    #[diagnostic(
        code(reqsolve::engine::rule_limit),
        help("Increase `max_rules` in EngineConfig or simplify the generic signature.")
    )]
    RuleLimit { rules: usize, max_rules: usize },

    #[error("cannot read configuration {path}")]
    #[diagnostic(code(reqsolve::engine::config_read))]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration {path}: {message}")]
    #[diagnostic(
        code(reqsolve::engine::config_parse),
        help("The configuration is a TOML table with `max_rounds`, `max_rules` and `[debug]`.")
    )]
    ConfigParse { path: String, message: String },
}

/// Convenience alias for functions returning reqsolve results.
pub type ReqResult<T> = std::result::Result<T, ReqError>;

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

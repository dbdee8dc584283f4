//! Rewrite paths: replayable derivations of rules.

use std::fmt;

use super::relation::RelationId;
use super::rule::RuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Rule(RuleId),
    Relation(RelationId),
    /// Prefix the substitutions of one symbol with the `length` symbols that
    /// start at the step's start offset.
    PrefixSubstitutions { length: usize },
}

/// One elementary step.
///
/// A rule or relation step rewrites the subterm that leaves `start_offset`
/// symbols before it and `end_offset` symbols after it. A prefix step edits
/// the symbol `end_offset` places from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStep {
    pub kind: StepKind,
    pub start_offset: usize,
    pub end_offset: usize,
    pub inverse: bool,
}

impl RewriteStep {
    pub fn rule(start_offset: usize, end_offset: usize, rule: RuleId, inverse: bool) -> Self {
        Self {
            kind: StepKind::Rule(rule),
            start_offset,
            end_offset,
            inverse,
        }
    }

    pub fn relation(
        start_offset: usize,
        end_offset: usize,
        relation: RelationId,
        inverse: bool,
    ) -> Self {
        Self {
            kind: StepKind::Relation(relation),
            start_offset,
            end_offset,
            inverse,
        }
    }

    pub fn prefix_substitutions(length: usize, end_offset: usize, inverse: bool) -> Self {
        Self {
            kind: StepKind::PrefixSubstitutions { length },
            start_offset: 0,
            end_offset,
            inverse,
        }
    }

    pub fn inverted(self) -> Self {
        Self {
            inverse: !self.inverse,
            ..self
        }
    }
}

impl fmt::Display for RewriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.inverse { "⁻¹" } else { "" };
        match self.kind {
            StepKind::Rule(id) => write!(f, "rule {id}{dir}")?,
            StepKind::Relation(id) => write!(f, "relation {id}{dir}")?,
            StepKind::PrefixSubstitutions { length } => write!(f, "prefix {length}{dir}")?,
        }
        write!(f, " @({}, {})", self.start_offset, self.end_offset)
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewritePath {
    steps: Vec<RewriteStep>,
}

impl RewritePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: RewriteStep) {
        self.steps.push(step);
    }

    pub fn append(&mut self, other: &RewritePath) {
        self.steps.extend_from_slice(&other.steps);
    }

    /// Reverse the path so it runs from its end back to its start.
    pub fn invert(&mut self) {
        self.steps.reverse();
        for step in &mut self.steps {
            step.inverse = !step.inverse;
        }
    }

    pub fn inverted(&self) -> Self {
        let mut out = self.clone();
        out.invert();
        out
    }

    pub fn steps(&self) -> &[RewriteStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<RewriteStep> for RewritePath {
    fn from(step: RewriteStep) -> Self {
        Self { steps: vec![step] }
    }
}

impl fmt::Display for RewritePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" ⊗ ")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_reverses_and_flips() {
        let mut path = RewritePath::new();
        path.add(RewriteStep::rule(0, 1, 4, false));
        path.add(RewriteStep::relation(2, 0, 7, true));
        path.invert();
        assert_eq!(
            path.steps(),
            &[RewriteStep::relation(2, 0, 7, false), RewriteStep::rule(0, 1, 4, true)]
        );
        assert_eq!(path.inverted().inverted(), path);
    }

    #[test]
    fn steps_display_their_offsets() {
        let path = RewritePath::from(RewriteStep::rule(3, 1, 3, false));
        assert_eq!(path.to_string(), "rule 3 @(3, 1)");
    }
}

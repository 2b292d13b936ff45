//! Decision trees: the compiled form of match patterns.
//!
//! A pattern compiles to a [`Decision`] over the match's scrutinee local:
//! primitive tests refine a [`Path`] into the value, [`Decision::Bind`]
//! nodes copy sub-values into locals, guards evaluate after the binds they
//! depend on, and alternation becomes [`Decision::Alternative`] with
//! fall-through. Bindings made inside alternation branches target shared
//! *sink* locals, so the arm body reads the same slot no matter which
//! branch matched.
//!
//! The tree for one arm either reaches [`Decision::Success`] (run the arm
//! body) or fails, falling through to the next arm. The match checker has
//! already proven the arms exhaustive, so the last arm of a checked match
//! cannot fail.

use crate::tir::{LocalId, Tir};

/// One step from a value to one of its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Tuple or record field by position.
    Field(u32),
    /// Array element by index.
    ArrayElement(u32),
    /// Payload of a union value (valid after its tag was tested).
    UnionPayload,
}

/// A path from the scrutinee to a sub-value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path(pub Vec<Step>);

impl Path {
    pub fn child(&self, step: Step) -> Path {
        let mut steps = self.0.clone();
        steps.push(step);
        Path(steps)
    }
}

/// A primitive test on the value at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Test {
    Int(i64),
    Bool(bool),
    Char(u8),
    /// Equality against a value bound earlier (a value pattern).
    Equals(LocalId),
    ArrayLength(u32),
    UnionTag(u32),
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub enum Decision {
    /// The pattern matched; run the arm body.
    Success,
    Test { path: Path, test: Test, then: Box<Decision> },
    Bind { path: Path, local: LocalId, then: Box<Decision> },
    /// Evaluate a guard; proceed only if it yields true.
    Guard { condition: Tir, then: Box<Decision> },
    /// Try each option in order; the first to reach success wins.
    Alternative(Vec<Decision>),
}

impl Decision {
    /// Number of [`Decision::Test`] nodes in the tree.
    pub fn test_count(&self) -> usize {
        match self {
            Decision::Success => 0,
            Decision::Test { then, .. } => 1 + then.test_count(),
            Decision::Bind { then, .. } => then.test_count(),
            Decision::Guard { then, .. } => then.test_count(),
            Decision::Alternative(options) => options.iter().map(|o| o.test_count()).sum(),
        }
    }

    /// Number of tests satisfying a predicate.
    pub fn count_tests(&self, pred: &dyn Fn(&Test) -> bool) -> usize {
        match self {
            Decision::Success => 0,
            Decision::Test { test, then, .. } => {
                usize::from(pred(test)) + then.count_tests(pred)
            }
            Decision::Bind { then, .. } => then.count_tests(pred),
            Decision::Guard { then, .. } => then.count_tests(pred),
            Decision::Alternative(options) => {
                options.iter().map(|o| o.count_tests(pred)).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_extend_without_sharing() {
        let root = Path::default();
        let first = root.child(Step::Field(0));
        let second = root.child(Step::Field(1));
        assert_eq!(first.0, vec![Step::Field(0)]);
        assert_eq!(second.0, vec![Step::Field(1)]);
        assert!(root.0.is_empty());
    }

    #[test]
    fn test_count_walks_all_branches() {
        let tree = Decision::Alternative(vec![
            Decision::Test {
                path: Path::default(),
                test: Test::Int(1),
                then: Box::new(Decision::Success),
            },
            Decision::Bind {
                path: Path::default(),
                local: LocalId(0),
                then: Box::new(Decision::Test {
                    path: Path::default(),
                    test: Test::ArrayLength(2),
                    then: Box::new(Decision::Success),
                }),
            },
        ]);

        assert_eq!(tree.test_count(), 2);
        assert_eq!(tree.count_tests(&|t| matches!(t, Test::ArrayLength(_))), 1);
    }
}

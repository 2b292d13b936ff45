//! Match redundancy and exhaustiveness analysis.
//!
//! The analysis works on [`Shape`]s: name-free clones of match patterns
//! that keep only what a value can look like. A *cover* (an `Or` of the
//! shapes of all arms seen so far) is grown arm by arm:
//!
//! - an arm already covered by the cover is unreachable (error);
//! - after all arms, the cover must cover the wildcard, otherwise the
//!   match is non-exhaustive (error).
//!
//! Guarded arms are skipped entirely: a guard may fail at runtime, so it
//! neither extends the cover nor counts as redundant. Value-equality
//! patterns cover nothing for the same reason.
//!
//! [`simplify`] keeps the cover small and drives exhaustiveness detection:
//! it drops alternatives covered by other alternatives, fuses union arms
//! of the same tag that differ in a single member, collapses all-wildcard
//! member lists, and collapses an alternation over union tags (or over
//! both booleans) to the wildcard once every case is handled.

use crate::expr::{Expr, ExprKind, MatchCase, MatchCaseKind};
use aike_base::{CompileError, Result};
use aike_kernel::{Prototype, Type, TypeStore};

/// The value-shape of a pattern, with binding names discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Matches anything.
    Any,
    /// Matches an unknown subset of values (value-equality patterns and
    /// guarded sub-patterns); covers nothing, covered only by `Any`.
    Value,
    Bool(bool),
    Int(i64),
    Char(u8),
    Array(Vec<Shape>),
    Members(Vec<Shape>),
    Union {
        tag: u32,
        /// Total number of variants in the union, for the
        /// all-tags-handled collapse.
        variants: u32,
        inner: Box<Shape>,
    },
    Or(Vec<Shape>),
}

/// Clones a resolved pattern into its shape.
pub fn clone_shape(case: &MatchCase<'_>, store: &TypeStore) -> Shape {
    match &case.kind {
        MatchCaseKind::Any { .. } => Shape::Any,
        MatchCaseKind::Value { .. } => Shape::Value,
        MatchCaseKind::Bool(value) => Shape::Bool(*value),
        MatchCaseKind::Int(value) => Shape::Int(*value),
        MatchCaseKind::Char(value) => Shape::Char(*value),
        MatchCaseKind::Array { elements } => {
            Shape::Array(elements.iter().map(|e| clone_shape(e, store)).collect())
        }
        MatchCaseKind::Members { values, .. } => {
            Shape::Members(values.get().iter().map(|v| clone_shape(v, store)).collect())
        }
        MatchCaseKind::Union { tag, pattern } => {
            let variants = union_variant_count(case, store);
            Shape::Union { tag: *tag, variants, inner: Box::new(clone_shape(pattern, store)) }
        }
        MatchCaseKind::Or { options, .. } => {
            Shape::Or(options.iter().map(|o| clone_shape(o, store)).collect())
        }
        // A guard anywhere in a pattern makes that sub-pattern cover an
        // unknown subset.
        MatchCaseKind::If { .. } => Shape::Value,
    }
}

fn union_variant_count(case: &MatchCase<'_>, store: &TypeStore) -> u32 {
    let ty = store.final_type(case.ty.get());
    if let Type::Instance { proto, .. } = store.get(ty) {
        if let Prototype::Union(u) = store.proto(*proto) {
            return u.variants.len() as u32;
        }
    }
    0
}

/// Does `cover` subsume `p`: is every concrete value matched by `p` also
/// matched by `cover`?
pub fn covers(cover: &Shape, p: &Shape) -> bool {
    // An alternation on the right is covered iff all its alternatives are.
    if let Shape::Or(options) = p {
        return options.iter().all(|option| covers(cover, option));
    }

    match cover {
        Shape::Any => true,
        Shape::Value => false,
        Shape::Bool(a) => matches!(p, Shape::Bool(b) if a == b),
        Shape::Int(a) => matches!(p, Shape::Int(b) if a == b),
        Shape::Char(a) => matches!(p, Shape::Char(b) if a == b),
        Shape::Array(elements) => match p {
            Shape::Array(other) => {
                elements.len() == other.len()
                    && elements.iter().zip(other.iter()).all(|(a, b)| covers(a, b))
            }
            _ => false,
        },
        Shape::Members(members) => match p {
            Shape::Members(other) => {
                members.len() == other.len()
                    && members.iter().zip(other.iter()).all(|(a, b)| covers(a, b))
            }
            _ => false,
        },
        Shape::Union { tag, inner, .. } => match p {
            Shape::Union { tag: other_tag, inner: other_inner, .. } => {
                tag == other_tag && covers(inner, other_inner)
            }
            _ => false,
        },
        Shape::Or(options) => options.iter().any(|option| covers(option, p)),
    }
}

fn equivalent(a: &Shape, b: &Shape) -> bool {
    covers(a, b) && covers(b, a)
}

/// Normalises a shape. On `Or` shapes this removes alternatives covered by
/// other alternatives, fuses same-tag union alternatives differing in one
/// member, and collapses exhaustive alternations to [`Shape::Any`].
/// Idempotent: `simplify(simplify(s)) == simplify(s)`.
pub fn simplify(shape: Shape) -> Shape {
    match shape {
        Shape::Array(elements) => Shape::Array(elements.into_iter().map(simplify).collect()),

        Shape::Members(members) => {
            let members: Vec<Shape> = members.into_iter().map(simplify).collect();
            if members.iter().all(|m| covers(m, &Shape::Any)) {
                Shape::Any
            } else {
                Shape::Members(members)
            }
        }

        Shape::Union { tag, variants, inner } => {
            Shape::Union { tag, variants, inner: Box::new(simplify(*inner)) }
        }

        Shape::Or(options) => simplify_or(options.into_iter().map(simplify).collect()),

        other => other,
    }
}

fn simplify_or(mut options: Vec<Shape>) -> Shape {
    // Drop alternatives covered by another alternative.
    let mut i = 0;
    while i < options.len() {
        let covered =
            (0..options.len()).any(|j| j != i && covers(&options[j], &options[i]));
        if covered {
            options.remove(i);
        } else {
            i += 1;
        }
    }

    // Fuse two same-tag union alternatives whose member lists differ in
    // exactly one position, then start over on the fused result.
    for i in 0..options.len() {
        for j in (i + 1)..options.len() {
            if let Some(fused) = fuse_union_pair(&options[i], &options[j]) {
                options[i] = fused;
                options.remove(j);
                return simplify(Shape::Or(options));
            }
        }
    }

    // Both booleans present: every value is handled.
    if options.contains(&Shape::Bool(true)) && options.contains(&Shape::Bool(false)) {
        return Shape::Any;
    }

    // Every union tag handled once, each with a fully-covering pattern.
    if let Some(Shape::Union { variants, .. }) = options.first() {
        let variants = *variants;
        let all_unions = options.iter().all(|o| matches!(o, Shape::Union { .. }));

        if all_unions && variants as usize == options.len() {
            let mut seen = vec![false; variants as usize];
            let mut complete = true;

            for option in &options {
                if let Shape::Union { tag, inner, .. } = option {
                    if seen[*tag as usize] || !covers(inner, &Shape::Any) {
                        complete = false;
                        break;
                    }
                    seen[*tag as usize] = true;
                }
            }

            if complete && seen.iter().all(|&s| s) {
                return Shape::Any;
            }
        }
    }

    if options.iter().any(|o| covers(o, &Shape::Any)) {
        return Shape::Any;
    }

    if options.len() == 1 {
        return options.pop().unwrap_or(Shape::Any);
    }

    Shape::Or(options)
}

/// If `a` and `b` are same-tag unions over member lists differing in
/// exactly one position, returns the fusion with that position widened to
/// an alternation.
fn fuse_union_pair(a: &Shape, b: &Shape) -> Option<Shape> {
    let (Shape::Union { tag: tag_a, variants, inner: inner_a },
         Shape::Union { tag: tag_b, inner: inner_b, .. }) = (a, b)
    else {
        return None;
    };

    if tag_a != tag_b {
        return None;
    }

    let (Shape::Members(members_a), Shape::Members(members_b)) =
        (inner_a.as_ref(), inner_b.as_ref())
    else {
        return None;
    };

    if members_a.len() != members_b.len() {
        return None;
    }

    let mut mismatch = None;
    for (k, (ma, mb)) in members_a.iter().zip(members_b.iter()).enumerate() {
        if !equivalent(ma, mb) {
            if mismatch.is_some() {
                return None;
            }
            mismatch = Some(k);
        }
    }
    let mismatch = mismatch?;

    let mut fused = members_a.clone();
    let mut alternatives = match fused[mismatch].clone() {
        Shape::Or(existing) => existing,
        single => vec![single],
    };
    match members_b[mismatch].clone() {
        Shape::Or(mut more) => alternatives.append(&mut more),
        single => alternatives.push(single),
    }
    fused[mismatch] = Shape::Or(alternatives);

    Some(Shape::Union {
        tag: *tag_a,
        variants: *variants,
        inner: Box::new(Shape::Members(fused)),
    })
}

// ----------------------------------------------------------------------
// The checker
// ----------------------------------------------------------------------

/// Checks one match: every arm must be reachable and the arms together
/// must cover every value of the scrutinee's type.
pub fn check_match(
    cases: &[&MatchCase<'_>],
    match_location: aike_base::Location,
    store: &TypeStore,
) -> Result<()> {
    let mut cover = Shape::Or(Vec::new());

    for case in cases {
        // Guarded arms never extend the cover and are never redundant.
        if matches!(case.kind, MatchCaseKind::If { .. }) {
            continue;
        }

        let flattened: Vec<&MatchCase<'_>> = match &case.kind {
            MatchCaseKind::Or { options, .. } => options.to_vec(),
            _ => vec![case],
        };

        for option in flattened {
            let shape = clone_shape(option, store);

            if covers(&cover, &shape) {
                return Err(CompileError::new("This case is already covered", option.location));
            }

            cover = simplify(match cover {
                Shape::Or(mut options) => {
                    options.push(shape);
                    Shape::Or(options)
                }
                other => Shape::Or(vec![other, shape]),
            });
        }
    }

    if !covers(&cover, &Shape::Any) {
        return Err(CompileError::new("The match doesn't cover all cases", match_location));
    }

    Ok(())
}

/// Walks the whole unit and checks every match expression.
pub fn check_matches(root: &Expr<'_>, store: &TypeStore) -> Result<()> {
    match &root.kind {
        ExprKind::Match { scrutinee, cases, bodies } => {
            check_matches(scrutinee, store)?;
            check_match(cases, root.location, store)?;
            for case in cases.iter() {
                if let MatchCaseKind::If { condition, .. } = &case.kind {
                    check_matches(condition, store)?;
                }
            }
            for body in bodies.iter() {
                check_matches(body, store)?;
            }
            Ok(())
        }

        ExprKind::Unit
        | ExprKind::Int(_)
        | ExprKind::Char(_)
        | ExprKind::Bool(_)
        | ExprKind::Binding(_)
        | ExprKind::External { .. }
        | ExprKind::ExternFunc { .. }
        | ExprKind::RecordCtor { .. }
        | ExprKind::UnionCtor { .. }
        | ExprKind::UnionDef { .. } => Ok(()),

        ExprKind::Array(exprs) | ExprKind::Tuple(exprs) | ExprKind::Block(exprs) => {
            for expr in exprs.iter() {
                check_matches(expr, store)?;
            }
            Ok(())
        }

        ExprKind::Unary { operand, .. } => check_matches(operand, store),
        ExprKind::Binary { left, right, .. } => {
            check_matches(left, store)?;
            check_matches(right, store)
        }
        ExprKind::Assign { place, value } => {
            check_matches(place, store)?;
            check_matches(value, store)
        }
        ExprKind::Call { callee, args } => {
            check_matches(callee, store)?;
            for arg in args.iter() {
                check_matches(arg, store)?;
            }
            Ok(())
        }
        ExprKind::Index { array, index } => {
            check_matches(array, store)?;
            check_matches(index, store)
        }
        ExprKind::Slice { array, start, end } => {
            check_matches(array, store)?;
            check_matches(start, store)?;
            end.map_or(Ok(()), |e| check_matches(e, store))
        }
        ExprKind::Member { aggregate, .. } => check_matches(aggregate, store),
        ExprKind::LetVar { body, .. } => check_matches(body, store),
        ExprKind::LetVars { body, .. } => check_matches(body, store),
        ExprKind::LetFunc { body, .. } => check_matches(body, store),
        ExprKind::If { cond, then_body, else_body } => {
            check_matches(cond, store)?;
            check_matches(then_body, store)?;
            check_matches(else_body, store)
        }
        ExprKind::ForIn { array, body, .. } => {
            check_matches(array, store)?;
            check_matches(body, store)
        }
        ExprKind::ForInRange { start, end, body, .. } => {
            check_matches(start, store)?;
            check_matches(end, store)?;
            check_matches(body, store)
        }
        ExprKind::While { cond, body } => {
            check_matches(cond, store)?;
            check_matches(body, store)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn union(tag: u32, variants: u32, inner: Shape) -> Shape {
        Shape::Union { tag, variants, inner: Box::new(inner) }
    }

    #[test]
    fn any_covers_everything() {
        assert!(covers(&Shape::Any, &Shape::Int(3)));
        assert!(covers(&Shape::Any, &Shape::Array(vec![Shape::Any])));
        assert!(covers(&Shape::Any, &Shape::Value));
        assert!(covers(&Shape::Any, &Shape::Any));
    }

    #[test]
    fn literals_cover_only_themselves() {
        assert!(covers(&Shape::Int(1), &Shape::Int(1)));
        assert!(!covers(&Shape::Int(1), &Shape::Int(2)));
        assert!(!covers(&Shape::Int(1), &Shape::Any));
        assert!(!covers(&Shape::Bool(true), &Shape::Bool(false)));
    }

    #[test]
    fn value_shapes_cover_nothing() {
        assert!(!covers(&Shape::Value, &Shape::Value));
        assert!(!covers(&Shape::Value, &Shape::Int(1)));
        assert!(covers(&Shape::Any, &Shape::Value));
    }

    #[test]
    fn arrays_cover_pointwise_at_equal_length() {
        let one = Shape::Array(vec![Shape::Any]);
        let two = Shape::Array(vec![Shape::Any, Shape::Any]);
        assert!(covers(&one, &Shape::Array(vec![Shape::Int(1)])));
        assert!(!covers(&one, &two));
    }

    #[test]
    fn or_on_the_right_needs_all_alternatives_covered() {
        let cover = Shape::Or(vec![Shape::Int(1), Shape::Int(2)]);
        let both = Shape::Or(vec![Shape::Int(1), Shape::Int(2)]);
        let extra = Shape::Or(vec![Shape::Int(1), Shape::Int(3)]);
        assert!(covers(&cover, &both));
        assert!(!covers(&cover, &extra));
    }

    #[test]
    fn simplify_removes_covered_alternatives() {
        let or = Shape::Or(vec![Shape::Int(1), Shape::Any, Shape::Int(2)]);
        assert_eq!(simplify(or), Shape::Any);
    }

    #[test]
    fn simplify_collapses_all_wildcard_members() {
        let members = Shape::Members(vec![Shape::Any, Shape::Any]);
        assert_eq!(simplify(members), Shape::Any);
    }

    #[test]
    fn simplify_collapses_exhaustive_union_tags() {
        let or = Shape::Or(vec![union(0, 2, Shape::Any), union(1, 2, Shape::Any)]);
        assert_eq!(simplify(or), Shape::Any);
    }

    #[test]
    fn incomplete_union_tags_do_not_collapse() {
        let or = Shape::Or(vec![union(0, 3, Shape::Any), union(1, 3, Shape::Any)]);
        let simplified = simplify(or);
        assert!(!covers(&simplified, &Shape::Any));
    }

    #[test]
    fn simplify_collapses_boolean_pair() {
        let or = Shape::Or(vec![Shape::Bool(true), Shape::Bool(false)]);
        assert_eq!(simplify(or), Shape::Any);
    }

    #[test]
    fn fuses_same_tag_unions_differing_in_one_member() {
        // Ctor(1, x) | Ctor(2, x) over a two-variant union with a sibling
        // wildcard-payload variant.
        let a = union(0, 2, Shape::Members(vec![Shape::Int(1), Shape::Any]));
        let b = union(0, 2, Shape::Members(vec![Shape::Int(2), Shape::Any]));
        let simplified = simplify(Shape::Or(vec![a, b]));

        match simplified {
            Shape::Union { tag: 0, inner, .. } => match *inner {
                Shape::Members(members) => {
                    assert_eq!(members.len(), 2);
                    assert!(matches!(&members[0], Shape::Or(options) if options.len() == 2));
                }
                other => panic!("expected members, got {other:?}"),
            },
            other => panic!("expected fused union, got {other:?}"),
        }
    }

    #[test]
    fn fusion_feeds_exhaustiveness() {
        // Tag 0 carries a member that becomes Any after fusing a wildcard
        // in; together with tag 1 the union is exhaustive.
        let a = union(0, 2, Shape::Members(vec![Shape::Int(1)]));
        let b = union(0, 2, Shape::Members(vec![Shape::Any]));
        let c = union(1, 2, Shape::Any);
        assert_eq!(simplify(Shape::Or(vec![a, b, c])), Shape::Any);
    }

    #[test]
    fn simplify_is_idempotent() {
        let samples = vec![
            Shape::Or(vec![Shape::Int(1), Shape::Int(1), Shape::Int(2)]),
            Shape::Or(vec![
                union(0, 2, Shape::Members(vec![Shape::Int(1), Shape::Any])),
                union(0, 2, Shape::Members(vec![Shape::Int(2), Shape::Any])),
                union(1, 2, Shape::Any),
            ]),
            Shape::Or(vec![Shape::Bool(true)]),
            Shape::Members(vec![Shape::Any, Shape::Int(4)]),
            Shape::Or(vec![Shape::Value, Shape::Int(1)]),
            Shape::Array(vec![Shape::Or(vec![Shape::Int(1), Shape::Any])]),
        ];

        for sample in samples {
            let once = simplify(sample);
            let twice = simplify(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn subsumption_is_preserved_by_simplify() {
        // Everything the original alternation covered is still covered
        // after simplification.
        let original = Shape::Or(vec![
            Shape::Int(1),
            Shape::Int(2),
            union(0, 2, Shape::Members(vec![Shape::Int(1)])),
        ]);
        let probes = vec![
            Shape::Int(1),
            Shape::Int(2),
            union(0, 2, Shape::Members(vec![Shape::Int(1)])),
        ];

        let simplified = simplify(original.clone());
        for probe in probes {
            assert_eq!(covers(&original, &probe), covers(&simplified, &probe));
        }
    }
}

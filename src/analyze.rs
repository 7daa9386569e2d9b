//! Reachability analyzer.
//!
//! For each flag reference sitting in an `if`/ternary condition, decides
//! the fate of the construct from the closed set: keep the then-branch,
//! keep the else-branch, remove the whole construct, simplify the
//! condition to a sub-expression, or leave it untouched. Anything the
//! analyzer cannot prove equivalent stays untouched - conservatism over
//! cleverness.

use rustc_hash::FxHashMap;
use tree_sitter::Node;

use crate::parse::{strip_parens, ParsedUnit, Span};
use crate::scan::usage::FlagReference;

/// What happens to a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchFate {
    /// Replace the construct with its then-branch contents.
    KeepThen,
    /// Replace the construct with its else-branch contents.
    KeepElse,
    /// Delete the construct entirely.
    RemoveAll,
    /// Replace the condition with the sub-expression at this span.
    SimplifyCondition(Span),
    /// No change.
    KeepBoth,
}

/// The shape of the construct being decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructKind {
    IfWithElse,
    IfWithoutElse,
    Ternary,
}

/// One decision, with everything the rewriter needs captured as byte
/// ranges of the original source.
#[derive(Debug, Clone)]
pub struct BranchPlan {
    pub construct: Span,
    pub kind: ConstructKind,
    pub fate: BranchFate,
    /// Then-branch node (block or single statement; expression for ternary).
    pub then_branch: Span,
    /// Else-branch node, when present.
    pub else_branch: Option<Span>,
    /// Condition expression with redundant parentheses stripped.
    pub condition: Span,
    pub flag_name: String,
}

/// Decide the fate of every construct that contains flag references.
///
/// Every reference with an enclosing construct contributes to exactly one
/// plan. A construct whose condition holds more than one reference is left
/// untouched: rewriting half a multi-flag condition would leave output
/// that a second run transforms differently.
pub fn analyze(unit: &ParsedUnit, references: &[FlagReference]) -> Vec<BranchPlan> {
    let mut by_construct: FxHashMap<Span, Vec<&FlagReference>> = FxHashMap::default();
    let mut order: Vec<Span> = Vec::new();
    for reference in references {
        if let Some(construct) = reference.construct {
            let group = by_construct.entry(construct).or_default();
            if group.is_empty() {
                order.push(construct);
            }
            group.push(reference);
        }
    }

    let mut plans = Vec::new();
    for construct_span in order {
        let group = &by_construct[&construct_span];
        if let Some(plan) = decide(unit, construct_span, group) {
            plans.push(plan);
        }
    }
    plans
}

fn decide(
    unit: &ParsedUnit,
    construct_span: Span,
    group: &[&FlagReference],
) -> Option<BranchPlan> {
    let construct = unit
        .root()
        .named_descendant_for_byte_range(construct_span.start, construct_span.end)?;
    if !matches!(construct.kind(), "if_statement" | "ternary_expression") {
        return None;
    }

    let condition = strip_parens(construct.child_by_field_name("condition")?);
    let (kind, then_branch, else_branch) = dissect(construct)?;

    let reference = group[0];
    let fate = if group.len() > 1 {
        tracing::debug!(
            flag = %reference.flag_name,
            "condition holds multiple flag references; leaving untouched"
        );
        BranchFate::KeepBoth
    } else {
        decide_fate(unit, condition, reference, kind)
    };

    Some(BranchPlan {
        construct: construct_span,
        kind,
        fate,
        then_branch,
        else_branch,
        condition: Span::of(condition),
        flag_name: reference.flag_name.clone(),
    })
}

/// Pull the branches out of an `if_statement` or `ternary_expression`.
fn dissect(construct: Node) -> Option<(ConstructKind, Span, Option<Span>)> {
    match construct.kind() {
        "if_statement" => {
            let consequence = construct.child_by_field_name("consequence")?;
            match construct.child_by_field_name("alternative") {
                Some(else_clause) => {
                    // else_clause wraps the actual statement (or else-if).
                    let body = else_clause.named_child(0)?;
                    Some((
                        ConstructKind::IfWithElse,
                        Span::of(consequence),
                        Some(Span::of(body)),
                    ))
                }
                None => Some((ConstructKind::IfWithoutElse, Span::of(consequence), None)),
            }
        }
        "ternary_expression" => {
            let consequence = construct.child_by_field_name("consequence")?;
            let alternative = construct.child_by_field_name("alternative")?;
            Some((
                ConstructKind::Ternary,
                Span::of(consequence),
                Some(Span::of(alternative)),
            ))
        }
        _ => None,
    }
}

fn decide_fate(
    unit: &ParsedUnit,
    condition: Node,
    reference: &FlagReference,
    kind: ConstructKind,
) -> BranchFate {
    let v = reference.effective_value();
    let ref_span = reference_core(unit, reference.span);

    // Rule 1: the whole condition is the flag (negations already folded
    // into the effective value).
    if Span::of(condition) == ref_span {
        return match (kind, v) {
            (ConstructKind::IfWithoutElse, false) => BranchFate::RemoveAll,
            (_, true) => BranchFate::KeepThen,
            (_, false) => BranchFate::KeepElse,
        };
    }

    // Rules 2 and 3: the flag is one operand of a top-level `&&`/`||`.
    if condition.kind() == "binary_expression" {
        let operator = condition
            .child_by_field_name("operator")
            .map(|o| unit.text_of(o))
            .unwrap_or("");
        if operator != "&&" && operator != "||" {
            return BranchFate::KeepBoth;
        }
        let (Some(left), Some(right)) = (
            condition.child_by_field_name("left"),
            condition.child_by_field_name("right"),
        ) else {
            return BranchFate::KeepBoth;
        };

        let other = if Span::of(strip_parens(left)) == ref_span {
            right
        } else if Span::of(strip_parens(right)) == ref_span {
            left
        } else {
            // The reference is nested deeper than one operand.
            return BranchFate::KeepBoth;
        };

        return match (operator, v) {
            // true && A == A
            ("&&", true) => BranchFate::SimplifyCondition(Span::of(other)),
            // false && A == false
            ("&&", false) => match kind {
                ConstructKind::IfWithoutElse => BranchFate::RemoveAll,
                _ => BranchFate::KeepElse,
            },
            // true || A == true
            ("||", true) => BranchFate::KeepThen,
            // false || A == A
            ("||", false) => BranchFate::SimplifyCondition(Span::of(other)),
            _ => BranchFate::KeepBoth,
        };
    }

    BranchFate::KeepBoth
}

/// The reference span with redundant outer parentheses stripped, so it
/// compares cleanly against operand and condition spans.
fn reference_core(unit: &ParsedUnit, span: Span) -> Span {
    unit.root()
        .named_descendant_for_byte_range(span.start, span.end)
        .map(|node| Span::of(strip_parens(node)))
        .unwrap_or(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagConfig;
    use crate::parse::parse_source;
    use crate::pattern::PatternSet;
    use crate::scan::usage::scan_usages;

    fn plans_for(source: &str, config_yaml: &str) -> Vec<BranchPlan> {
        let unit = parse_source(source, "a.ts").unwrap();
        let (config, _) = FlagConfig::parse(config_yaml, false).unwrap();
        let patterns = PatternSet::from_config(&config.patterns.methods);
        let scan = scan_usages(&unit, &config, &patterns);
        analyze(&unit, &scan.references)
    }

    const ON: &str = "patterns:\n  methods: ['*.isEnabled']\nflags:\n  f: true\n";
    const OFF: &str = "patterns:\n  methods: ['*.isEnabled']\nflags:\n  f: false\n";

    #[test]
    fn whole_condition_true_keeps_then() {
        let plans = plans_for("if (flags.isEnabled('f')) { a(); } else { b(); }\n", ON);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, ConstructKind::IfWithElse);
        assert_eq!(plans[0].fate, BranchFate::KeepThen);
    }

    #[test]
    fn whole_condition_false_keeps_else() {
        let plans = plans_for("if (flags.isEnabled('f')) { a(); } else { b(); }\n", OFF);
        assert_eq!(plans[0].fate, BranchFate::KeepElse);
    }

    #[test]
    fn false_without_else_removes_all() {
        let plans = plans_for("if (flags.isEnabled('f')) { a(); }\n", OFF);
        assert_eq!(plans[0].kind, ConstructKind::IfWithoutElse);
        assert_eq!(plans[0].fate, BranchFate::RemoveAll);
    }

    #[test]
    fn negated_false_keeps_then() {
        let plans = plans_for("if (!flags.isEnabled('f')) { a(); } else { b(); }\n", OFF);
        assert_eq!(plans[0].fate, BranchFate::KeepThen);
    }

    #[test]
    fn and_with_true_simplifies_to_other_operand() {
        let src = "if (flags.isEnabled('f') && user()) { a(); }\n";
        let plans = plans_for(src, ON);
        match plans[0].fate {
            BranchFate::SimplifyCondition(span) => {
                assert_eq!(span.text(src), "user()");
            }
            other => panic!("expected SimplifyCondition, got {other:?}"),
        }
    }

    #[test]
    fn and_with_false_kills_construct() {
        let plans = plans_for("if (flags.isEnabled('f') && user()) { a(); }\n", OFF);
        assert_eq!(plans[0].fate, BranchFate::RemoveAll);

        let plans = plans_for(
            "if (flags.isEnabled('f') && user()) { a(); } else { b(); }\n",
            OFF,
        );
        assert_eq!(plans[0].fate, BranchFate::KeepElse);
    }

    #[test]
    fn or_with_true_keeps_then() {
        let plans = plans_for("if (flags.isEnabled('f') || fallback()) { a(); }\n", ON);
        assert_eq!(plans[0].fate, BranchFate::KeepThen);
    }

    #[test]
    fn or_with_false_simplifies() {
        let src = "if (fallback() || flags.isEnabled('f')) { a(); }\n";
        let plans = plans_for(src, OFF);
        match plans[0].fate {
            BranchFate::SimplifyCondition(span) => {
                assert_eq!(span.text(src), "fallback()");
            }
            other => panic!("expected SimplifyCondition, got {other:?}"),
        }
    }

    #[test]
    fn ternary_false_keeps_else() {
        let src = "const x = flags.isEnabled('f') ? oldPath() : newPath();\n";
        let plans = plans_for(src, OFF);
        assert_eq!(plans[0].kind, ConstructKind::Ternary);
        assert_eq!(plans[0].fate, BranchFate::KeepElse);
        assert_eq!(plans[0].else_branch.unwrap().text(src), "newPath()");
    }

    #[test]
    fn negated_operand_of_and_matches() {
        let src = "if (!flags.isEnabled('f') && user()) { a(); }\n";
        // effective value false && user() == false
        let plans = plans_for(src, ON);
        assert_eq!(plans[0].fate, BranchFate::RemoveAll);
    }

    #[test]
    fn complex_condition_left_untouched() {
        let src = "if (a() ? flags.isEnabled('f') : b()) { run(); }\n";
        let plans = plans_for(src, ON);
        // Reference's construct is the inner ternary; its condition is a(),
        // which does not contain the reference, so no plan forms for it.
        assert!(plans.is_empty());
    }

    #[test]
    fn deeply_nested_operand_is_conservative() {
        let src = "if ((flags.isEnabled('f') && a()) && b()) { run(); }\n";
        let plans = plans_for(src, ON);
        assert_eq!(plans[0].fate, BranchFate::KeepBoth);
    }

    #[test]
    fn multi_flag_condition_left_untouched() {
        let yaml = "patterns:\n  methods: ['*.isEnabled']\nflags:\n  f: true\n  g: false\n";
        let src = "if (flags.isEnabled('f') && flags.isEnabled('g')) { run(); }\n";
        let plans = plans_for(src, yaml);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].fate, BranchFate::KeepBoth);
    }

    #[test]
    fn parenthesized_whole_condition_still_rule_one() {
        let plans = plans_for("if ((flags.isEnabled('f'))) { a(); } else { b(); }\n", ON);
        assert_eq!(plans[0].fate, BranchFate::KeepThen);
    }
}

//! Rewrite planner.
//!
//! Converts branch decisions and free flag references into one batch of
//! non-overlapping byte edits. Handles block promotion with
//! re-indentation, whole-line removal, and suppression of plans nested
//! inside another plan's edit range (the orchestrator's fixpoint loop
//! picks those up on the next scan of the rewritten source).

use crate::analyze::{BranchFate, BranchPlan, ConstructKind};
use crate::config::Settings;
use crate::edit::SourceEdit;
use crate::parse::Span;
use crate::scan::usage::FlagReference;

/// Edits plus the flags that produced them.
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    pub edits: Vec<SourceEdit>,
    pub touched_flags: Vec<String>,
}

/// Build the edit batch for one round of dead-branch elimination.
pub fn plan_rewrites(
    source: &str,
    plans: &[BranchPlan],
    references: &[FlagReference],
    settings: &Settings,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();

    // Plans that will actually edit, with the span each edit consumes.
    let actionable: Vec<(&BranchPlan, Span)> = plans
        .iter()
        .filter(|p| p.fate != BranchFate::KeepBoth)
        .map(|p| (p, consumed_span(p)))
        .collect();

    // A plan nested inside another plan's edit is deferred to the next
    // round; splicing its ancestor re-materializes the region anyway.
    let surviving: Vec<(&BranchPlan, Span)> = actionable
        .iter()
        .filter(|(_, span)| {
            !actionable
                .iter()
                .any(|(_, other)| *other != *span && other.contains(*span))
        })
        .cloned()
        .collect();

    for (plan, consumed) in &surviving {
        if let Some(edit) = plan_edit(source, plan, settings) {
            outcome.edits.push(edit);
            outcome.touched_flags.push(plan.flag_name.clone());
        } else {
            tracing::debug!(flag = %plan.flag_name, span = ?consumed, "plan produced no edit");
        }
    }

    // Free references: no enclosing construct, substitute the constant.
    for reference in references.iter().filter(|r| r.construct.is_none()) {
        let inside_plan = surviving
            .iter()
            .any(|(_, consumed)| consumed.contains(reference.span));
        if inside_plan {
            continue;
        }
        let replacement = if reference.effective_value() {
            "true"
        } else {
            "false"
        };
        outcome.edits.push(SourceEdit::new(
            reference.span.start,
            reference.span.len(),
            replacement,
        ));
        outcome.touched_flags.push(reference.flag_name.clone());
    }

    outcome
}

/// The byte range a plan's edit will cover.
fn consumed_span(plan: &BranchPlan) -> Span {
    match plan.fate {
        BranchFate::SimplifyCondition(_) => plan.condition,
        _ => plan.construct,
    }
}

fn plan_edit(source: &str, plan: &BranchPlan, settings: &Settings) -> Option<SourceEdit> {
    match plan.fate {
        BranchFate::KeepBoth => None,
        BranchFate::SimplifyCondition(operand) => Some(SourceEdit::new(
            plan.condition.start,
            plan.condition.len(),
            operand.text(source),
        )),
        BranchFate::RemoveAll => Some(line_removal_edit(source, plan.construct)),
        BranchFate::KeepThen | BranchFate::KeepElse => {
            let branch = if plan.fate == BranchFate::KeepThen {
                plan.then_branch
            } else {
                plan.else_branch?
            };
            match plan.kind {
                ConstructKind::Ternary => Some(SourceEdit::new(
                    plan.construct.start,
                    plan.construct.len(),
                    branch.text(source),
                )),
                ConstructKind::IfWithElse | ConstructKind::IfWithoutElse => {
                    let promoted = promote_branch(source, plan.construct, branch);
                    if promoted.trim().is_empty() {
                        // Nothing survives inside the kept branch.
                        if settings.remove_empty_blocks {
                            Some(line_removal_edit(source, plan.construct))
                        } else {
                            Some(SourceEdit::new(
                                plan.construct.start,
                                plan.construct.len(),
                                "{}",
                            ))
                        }
                    } else {
                        Some(SourceEdit::new(
                            plan.construct.start,
                            plan.construct.len(),
                            promoted,
                        ))
                    }
                }
            }
        }
    }
}

/// Delete a span, consuming its whole line when the line holds nothing
/// else, so removals leave no blank-line residue.
fn line_removal_edit(source: &str, span: Span) -> SourceEdit {
    let expanded = expand_to_lines(source, span, true);
    SourceEdit::delete(expanded.start, expanded.len())
}

/// Removal edit for a definition or import statement.
///
/// When `preserve_comments` is false, contiguous comment lines directly
/// above the statement are consumed too.
pub fn removal_edit(source: &str, span: Span, preserve_comments: bool) -> SourceEdit {
    let mut expanded = expand_to_lines(source, span, true);
    if !preserve_comments {
        expanded = consume_leading_comment_lines(source, expanded);
    }
    SourceEdit::delete(expanded.start, expanded.len())
}

/// Expand a span to full lines when it is the only content on them.
fn expand_to_lines(source: &str, span: Span, consume_newline: bool) -> Span {
    let bytes = source.as_bytes();

    let mut start = span.start.min(bytes.len());
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let at_line_start = start == 0 || bytes[start - 1] == b'\n';

    let mut end = span.end.min(bytes.len());
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
        end += 1;
    }
    let clear_after = end >= bytes.len() || bytes[end] == b'\n';

    if at_line_start && clear_after {
        if consume_newline && end < bytes.len() {
            end += 1;
        }
        Span::new(start, end)
    } else {
        span
    }
}

/// Extend a line-aligned span upward over contiguous full-line comments.
fn consume_leading_comment_lines(source: &str, span: Span) -> Span {
    let mut start = span.start;
    loop {
        if start == 0 {
            break;
        }
        // Previous line: [line_start, start), including its newline.
        let before = &source[..start];
        let Some(prev_newline) = before.strip_suffix('\n') else {
            break;
        };
        let line_start = prev_newline.rfind('\n').map(|p| p + 1).unwrap_or(0);
        let line = prev_newline[line_start..].trim();
        let is_comment = line.starts_with("//")
            || (line.starts_with("/*") && line.ends_with("*/"));
        if !is_comment {
            break;
        }
        start = line_start;
    }
    Span::new(start, span.end)
}

/// Promote a kept branch into its construct's position.
///
/// A block branch contributes its contents without braces, re-indented
/// from the block's column to the construct's column; a bare-statement
/// branch (including `else if` chains) contributes its text verbatim.
fn promote_branch(source: &str, construct: Span, branch: Span) -> String {
    let text = branch.text(source);
    if !(text.starts_with('{') && text.ends_with('}')) {
        return text.to_string();
    }

    let inner = &text[1..text.len() - 1];
    if !inner.contains('\n') {
        return inner.trim().to_string();
    }

    // Drop the partial line after `{` and the indentation line before `}`.
    let mut content = inner;
    if let Some(pos) = content.find('\n') {
        if content[..pos].trim().is_empty() {
            content = &content[pos + 1..];
        }
    }
    if let Some(pos) = content.rfind('\n') {
        if content[pos + 1..].trim().is_empty() {
            content = &content[..pos];
        }
    }
    if content.trim().is_empty() {
        return String::new();
    }

    let parent_indent = line_indent_at(source, construct.start);
    let block_indent = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(leading_whitespace)
        .unwrap_or("");

    let reindented: Vec<String> = content
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else if let Some(stripped) = line.strip_prefix(block_indent) {
                format!("{parent_indent}{stripped}")
            } else {
                format!("{}{}", parent_indent, line.trim_start())
            }
        })
        .collect();

    let joined = reindented.join("\n");
    // The construct's own position already sits after the indentation.
    joined
        .strip_prefix(parent_indent)
        .map(str::to_string)
        .unwrap_or(joined)
}

/// The whitespace prefix of the line containing `offset`, provided the
/// offset sits right after it.
fn line_indent_at(source: &str, offset: usize) -> &str {
    let bytes = source.as_bytes();
    let mut line_start = offset.min(bytes.len());
    while line_start > 0 && bytes[line_start - 1] != b'\n' {
        line_start -= 1;
    }
    let prefix = &source[line_start..offset.min(source.len())];
    if prefix.chars().all(|c| c == ' ' || c == '\t') {
        prefix
    } else {
        ""
    }
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    &line[..end]
}

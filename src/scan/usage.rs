//! Flag-usage scanner.
//!
//! One recursive traversal over the parsed unit with two jobs:
//!
//! 1. Track local variables whose initializer is a matched flag query
//!    ([`FlagVariableBinding`]); the call site itself emits no reference,
//!    its declaration is removed wholesale by the definition pass.
//! 2. Emit a [`FlagReference`] for every other matched call, and for every
//!    use of a previously bound flag variable.
//!
//! A reference absorbs the `!` and parenthesis wrappers immediately around
//! it, toggling `is_negated` per `!`, so downstream passes substitute the
//! whole wrapped expression. Bindings are visible only after their
//! declaration in traversal order.

use rustc_hash::FxHashMap;
use tree_sitter::Node;

use crate::config::FlagConfig;
use crate::parse::{ParsedUnit, Span};
use crate::pattern::{extract_flag_key, PatternSet};

/// A program location where a flag's value is consumed.
#[derive(Debug, Clone)]
pub struct FlagReference {
    /// Canonical flag name after alias resolution.
    pub flag_name: String,
    /// The configured value for the flag.
    pub resolved_value: bool,
    /// Byte range of the reference including `!`/paren wrappers.
    pub span: Span,
    /// Enclosing `if`/ternary whose condition contains this reference.
    pub construct: Option<Span>,
    /// Whether an odd number of `!` operators wrap the reference.
    pub is_negated: bool,
    /// Set when the reference is a use of a flag-bound local variable.
    pub variable_name: Option<String>,
}

impl FlagReference {
    /// The boolean this reference contributes after folding negations.
    pub fn effective_value(&self) -> bool {
        self.is_negated ^ self.resolved_value
    }
}

/// A local variable bound to a flag query result.
#[derive(Debug, Clone)]
pub struct FlagVariableBinding {
    pub variable_name: String,
    pub flag_name: String,
    pub resolved_value: bool,
    /// The whole declaration statement, for removal.
    pub declaration: Span,
}

/// Result of one usage scan.
#[derive(Debug, Default)]
pub struct UsageScan {
    pub references: Vec<FlagReference>,
    pub bindings: Vec<FlagVariableBinding>,
}

/// Scan a parsed unit for flag references and variable bindings.
pub fn scan_usages(unit: &ParsedUnit, config: &FlagConfig, patterns: &PatternSet) -> UsageScan {
    let mut scanner = Scanner {
        unit,
        config,
        patterns,
        by_name: FxHashMap::default(),
        out: UsageScan::default(),
    };
    scanner.visit(unit.root());
    scanner.out
}

struct Scanner<'a> {
    unit: &'a ParsedUnit,
    config: &'a FlagConfig,
    patterns: &'a PatternSet,
    /// Variable name -> index into `out.bindings`, in traversal order.
    by_name: FxHashMap<String, usize>,
    out: UsageScan,
}

impl<'a> Scanner<'a> {
    fn visit(&mut self, node: Node<'a>) {
        match node.kind() {
            "call_expression" => {
                if self.handle_call(node) {
                    // Matched calls are opaque: their arguments carry the
                    // flag key, not further program logic.
                    return;
                }
            }
            "identifier" => {
                self.handle_identifier(node);
            }
            _ => {}
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.visit(child);
            }
        }
    }

    /// Returns true when the call matched a pattern and was consumed.
    fn handle_call(&mut self, call: Node<'a>) -> bool {
        let Some(key_node) = self.patterns.match_call(call, self.unit) else {
            return false;
        };
        let Some(key) = extract_flag_key(key_node, self.unit) else {
            return false;
        };
        let Some(def) = self.config.resolve(&key) else {
            return false;
        };

        if let Some(declaration) = initializer_statement(call) {
            if let Some(variable_name) = declared_name(call, self.unit) {
                tracing::debug!(
                    flag = %def.name,
                    variable = %variable_name,
                    "flag query bound to local variable"
                );
                let binding = FlagVariableBinding {
                    variable_name: variable_name.clone(),
                    flag_name: def.name.clone(),
                    resolved_value: def.value,
                    declaration: Span::of(declaration),
                };
                self.by_name
                    .insert(variable_name, self.out.bindings.len());
                self.out.bindings.push(binding);
                return true;
            }
        }

        let (wrapper, is_negated) = absorb_wrappers(call, self.unit);
        let span = Span::of(wrapper);
        self.out.references.push(FlagReference {
            flag_name: def.name.clone(),
            resolved_value: def.value,
            span,
            construct: enclosing_condition(wrapper).map(Span::of),
            is_negated,
            variable_name: None,
        });
        true
    }

    fn handle_identifier(&mut self, node: Node<'a>) {
        let name = self.unit.text_of(node);
        let Some(&idx) = self.by_name.get(name) else {
            return;
        };
        if is_assignment_target(node) {
            // The variable is reassigned; leave this site alone.
            return;
        }
        let binding = &self.out.bindings[idx];
        let (flag_name, resolved_value) = (binding.flag_name.clone(), binding.resolved_value);

        let (wrapper, is_negated) = absorb_wrappers(node, self.unit);
        self.out.references.push(FlagReference {
            flag_name,
            resolved_value,
            span: Span::of(wrapper),
            construct: enclosing_condition(wrapper).map(Span::of),
            is_negated,
            variable_name: Some(name.to_string()),
        });
    }
}

/// If `call` is the direct initializer of a local variable declarator,
/// return the enclosing declaration statement.
fn initializer_statement<'t>(call: Node<'t>) -> Option<Node<'t>> {
    let declarator = call.parent()?;
    if declarator.kind() != "variable_declarator" {
        return None;
    }
    if declarator.child_by_field_name("value")?.id() != call.id() {
        return None;
    }
    let declaration = declarator.parent()?;
    match declaration.kind() {
        "lexical_declaration" | "variable_declaration" => Some(declaration),
        _ => None,
    }
}

/// The declared variable name for a call in initializer position.
fn declared_name(call: Node, unit: &ParsedUnit) -> Option<String> {
    let declarator = call.parent()?;
    let name = declarator.child_by_field_name("name")?;
    if name.kind() != "identifier" {
        return None;
    }
    Some(unit.text_of(name).to_string())
}

/// Absorb `!` and parenthesis wrappers around a node.
///
/// Each `!` toggles negation; parentheses are transparent. Stops at the
/// first ancestor that is neither.
fn absorb_wrappers<'t>(node: Node<'t>, unit: &ParsedUnit) -> (Node<'t>, bool) {
    let mut current = node;
    let mut negated = false;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "parenthesized_expression" => {
                // The parens of a statement condition are syntax, not a
                // wrapper; substituting them away would break the parse.
                let is_condition_parens = parent
                    .parent()
                    .map(|gp| {
                        matches!(
                            gp.kind(),
                            "if_statement"
                                | "while_statement"
                                | "do_statement"
                                | "for_statement"
                                | "switch_statement"
                        )
                    })
                    .unwrap_or(false);
                if is_condition_parens {
                    break;
                }
                current = parent;
            }
            "unary_expression" => {
                let op = parent
                    .child_by_field_name("operator")
                    .map(|o| unit.text_of(o))
                    .unwrap_or("");
                if op == "!" {
                    negated = !negated;
                    current = parent;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    (current, negated)
}

/// Walk outward from a reference to the nearest `if`/ternary whose
/// condition contains it. Statement boundaries and loop/switch frames
/// short-circuit the search: a reference inside a body, a loop condition,
/// or a function literal has no rewritable construct.
fn enclosing_condition<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let span = Span::of(node);
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "if_statement" | "ternary_expression" => {
                let cond = parent.child_by_field_name("condition")?;
                return if Span::of(cond).contains(span) {
                    Some(parent)
                } else {
                    None
                };
            }
            "statement_block"
            | "program"
            | "class_body"
            | "arrow_function"
            | "function_declaration"
            | "function_expression"
            | "generator_function"
            | "generator_function_declaration"
            | "method_definition" => return None,
            kind if kind.ends_with("_statement") || kind.ends_with("_declaration") => {
                return None;
            }
            _ => current = parent,
        }
    }
    None
}

/// Whether an identifier is the target of an assignment or update.
fn is_assignment_target(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "assignment_expression" | "augmented_assignment_expression" => parent
            .child_by_field_name("left")
            .map(|l| l.id() == node.id())
            .unwrap_or(false),
        "update_expression" => true,
        _ => false,
    }
}

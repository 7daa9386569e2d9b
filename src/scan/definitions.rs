//! Definition scanner.
//!
//! Locates declarations eligible for removal once their flag is retired:
//! top-level constants, class fields, enum members, and the flag-bound
//! local variables reported by the usage scanner. Each location carries
//! the byte range of the smallest statement-level region whose excision
//! leaves the surrounding block syntactically valid.

use tree_sitter::Node;

use crate::config::FlagConfig;
use crate::parse::{ParsedUnit, Span};
use crate::scan::usage::FlagVariableBinding;

/// What kind of declaration a removable definition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Constant,
    ClassField,
    EnumValue,
    Variable,
}

/// A declaration slated for removal.
#[derive(Debug, Clone)]
pub struct DefinitionLocation {
    pub flag_name: String,
    pub span: Span,
    pub kind: DefinitionKind,
}

/// Scan a fresh parse for removable flag definitions.
///
/// `bindings` must come from a usage scan over the same parse; stale
/// offsets from an earlier tree are exactly the bug this signature
/// prevents.
pub fn scan_definitions(
    unit: &ParsedUnit,
    config: &FlagConfig,
    bindings: &[FlagVariableBinding],
) -> Vec<DefinitionLocation> {
    let mut out = Vec::new();
    collect(unit.root(), unit, config, &mut out);

    for binding in bindings {
        let removable = config
            .resolve(&binding.flag_name)
            .map(|def| def.remove_definition)
            .unwrap_or(false);
        if removable && !binding.declaration.is_empty() {
            out.push(DefinitionLocation {
                flag_name: binding.flag_name.clone(),
                span: binding.declaration,
                kind: DefinitionKind::Variable,
            });
        }
    }

    // A flag-bound local can coincide with a matched top-level constant;
    // keep one location per byte range.
    out.sort_by_key(|d| (d.span.start, d.span.end));
    out.dedup_by_key(|d| d.span);
    out
}

fn collect(node: Node, unit: &ParsedUnit, config: &FlagConfig, out: &mut Vec<DefinitionLocation>) {
    match node.kind() {
        "lexical_declaration" | "variable_declaration" if is_top_level(node) => {
            collect_declaration(node, unit, config, out);
        }
        "public_field_definition" | "field_definition" => {
            if let Some((flag, _)) = matching_name(node, "name", unit, config) {
                out.push(DefinitionLocation {
                    flag_name: flag,
                    span: with_trailing_semicolon(Span::of(node), &unit.source),
                    kind: DefinitionKind::ClassField,
                });
            }
        }
        "enum_body" => {
            collect_enum_members(node, unit, config, out);
        }
        _ => {}
    }

    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect(child, unit, config, out);
        }
    }
}

/// Whether a declaration sits at module scope (directly or via `export`).
fn is_top_level(node: Node) -> bool {
    match node.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => parent
            .parent()
            .map(|g| g.kind() == "program")
            .unwrap_or(false),
        _ => false,
    }
}

fn collect_declaration(
    node: Node,
    unit: &ParsedUnit,
    config: &FlagConfig,
    out: &mut Vec<DefinitionLocation>,
) {
    let mut cursor = node.walk();
    let declarators: Vec<Node> = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "variable_declarator")
        .collect();

    for declarator in &declarators {
        let Some((flag, _)) = matching_name(*declarator, "name", unit, config) else {
            continue;
        };

        // A lone declarator takes the whole statement (and its `export`
        // wrapper); one of several takes just itself plus a separator.
        let span = if declarators.len() == 1 {
            let statement = match node.parent() {
                Some(p) if p.kind() == "export_statement" => p,
                _ => node,
            };
            Span::of(statement)
        } else {
            with_adjacent_comma(*declarator)
        };

        out.push(DefinitionLocation {
            flag_name: flag,
            span,
            kind: DefinitionKind::Constant,
        });
    }
}

fn collect_enum_members(
    body: Node,
    unit: &ParsedUnit,
    config: &FlagConfig,
    out: &mut Vec<DefinitionLocation>,
) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let flag = match member.kind() {
            "property_identifier" => {
                let name = unit.text_of(member);
                resolve_removable(name, config)
            }
            "enum_assignment" => member
                .child_by_field_name("name")
                .map(|n| unit.text_of(n))
                .and_then(|name| resolve_removable(name, config)),
            _ => None,
        };
        if let Some(flag) = flag {
            out.push(DefinitionLocation {
                flag_name: flag,
                span: with_adjacent_comma(member),
                kind: DefinitionKind::EnumValue,
            });
        }
    }
}

/// Resolve a declared identifier against the config, honoring
/// `remove_definition`. Returns the canonical flag name.
fn resolve_removable(name: &str, config: &FlagConfig) -> Option<String> {
    config
        .resolve(name)
        .filter(|def| def.remove_definition)
        .map(|def| def.name.clone())
}

fn matching_name(
    node: Node,
    field: &str,
    unit: &ParsedUnit,
    config: &FlagConfig,
) -> Option<(String, Span)> {
    let name_node = node.child_by_field_name(field)?;
    if !matches!(name_node.kind(), "identifier" | "property_identifier") {
        return None;
    }
    let name = unit.text_of(name_node);
    resolve_removable(name, config).map(|flag| (flag, Span::of(name_node)))
}

/// Extend a member's span over its separating comma: the trailing one if
/// present, else the leading one (last member of a list).
fn with_adjacent_comma(node: Node) -> Span {
    let mut span = Span::of(node);
    if let Some(next) = node.next_sibling() {
        if next.kind() == "," {
            span.end = next.end_byte();
            return span;
        }
    }
    if let Some(prev) = node.prev_sibling() {
        if prev.kind() == "," {
            span.start = prev.start_byte();
        }
    }
    span
}

/// Extend a span over whitespace and a single trailing `;`.
///
/// Class-body members do not own their separator token.
fn with_trailing_semicolon(mut span: Span, source: &str) -> Span {
    let bytes = source.as_bytes();
    let mut end = span.end;
    while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b';' {
        span.end = end + 1;
    }
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use crate::pattern::PatternSet;
    use crate::scan::usage::scan_usages;

    const CONFIG: &str = "\
patterns:
  methods: ['*.isEnabled']
flags:
  new_ui:
    value: true
    aliases: [NEW_UI, newUi]
  keep_def:
    value: false
    remove_definition: false
    aliases: [KEEP_DEF]
";

    fn definitions(source: &str) -> Vec<DefinitionLocation> {
        let unit = parse_source(source, "a.ts").unwrap();
        let (config, _) = crate::config::FlagConfig::parse(CONFIG, false).unwrap();
        let patterns = PatternSet::from_config(&config.patterns.methods);
        let scan = scan_usages(&unit, &config, &patterns);
        scan_definitions(&unit, &config, &scan.bindings)
    }

    #[test]
    fn top_level_const_found() {
        let defs = definitions("const NEW_UI = true;\nconst other = 1;\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, DefinitionKind::Constant);
        assert_eq!(defs[0].flag_name, "new_ui");
    }

    #[test]
    fn exported_const_takes_export_statement() {
        let src = "export const NEW_UI = true;\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].span.start, 0);
        assert_eq!(defs[0].span.text(src), "export const NEW_UI = true;");
    }

    #[test]
    fn remove_definition_false_is_respected() {
        let defs = definitions("const KEEP_DEF = false;\n");
        assert!(defs.is_empty());
    }

    #[test]
    fn local_declaration_is_not_a_constant() {
        let defs = definitions("function f() { const NEW_UI = true; }\n");
        assert!(defs.is_empty());
    }

    #[test]
    fn class_field_with_semicolon() {
        let src = "class Flags {\n  newUi = true;\n  other = 1;\n}\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, DefinitionKind::ClassField);
        assert!(defs[0].span.text(src).ends_with(';'));
    }

    #[test]
    fn enum_member_takes_separator_comma() {
        let src = "enum Feature {\n  NEW_UI,\n  Other,\n}\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, DefinitionKind::EnumValue);
        assert!(defs[0].span.text(src).contains(','));
    }

    #[test]
    fn last_enum_member_takes_leading_comma() {
        let src = "enum Feature {\n  Other,\n  NEW_UI\n}\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        let text = defs[0].span.text(src);
        assert!(text.starts_with(','), "span text: {text:?}");
    }

    #[test]
    fn flag_bound_variable_reported() {
        let src = "const onNewUi = flags.isEnabled('new_ui');\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, DefinitionKind::Variable);
        assert_eq!(defs[0].span.text(src), "const onNewUi = flags.isEnabled('new_ui');");
    }

    #[test]
    fn multi_declarator_takes_declarator_and_comma() {
        let src = "const NEW_UI = true, other = 1;\n";
        let defs = definitions(src);
        assert_eq!(defs.len(), 1);
        let text = defs[0].span.text(src);
        assert!(text.contains("NEW_UI = true"), "span text: {text:?}");
        assert!(text.contains(','), "span text: {text:?}");
        assert!(!text.contains("other"), "span text: {text:?}");
    }
}

//! Import tracker.
//!
//! Records every import directive with the local bindings it introduces
//! (default import, namespace prefix, named imports) and counts how often
//! each binding is referenced outside import directives. The transformer
//! compares counts before and after branch elimination: a flag-service
//! import whose references all sat inside removed code drops to zero
//! surviving uses and becomes removable.

use rustc_hash::{FxHashMap, FxHashSet};
use tree_sitter::Node;

use crate::config::FlagConfig;
use crate::parse::{ParsedUnit, Span};

/// One import directive and its usage evidence.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    /// Byte range of the whole `import_statement`.
    pub span: Span,
    /// Module specifier, quotes stripped.
    pub uri: String,
    /// `import * as prefix from '...'`.
    pub prefix: Option<String>,
    /// `import Default from '...'`.
    pub default_name: Option<String>,
    /// Local names from `import { a, b as c } from '...'`.
    pub named: Vec<String>,
    /// References to any binding outside import directives.
    pub usage_count: usize,
}

impl ImportRecord {
    /// All local names this directive introduces.
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.prefix
            .as_deref()
            .into_iter()
            .chain(self.default_name.as_deref())
            .chain(self.named.iter().map(String::as_str))
    }

    /// Key identifying the same directive across re-parses, where byte
    /// offsets shift but the directive text does not.
    pub fn identity(&self) -> (String, Vec<String>) {
        let mut names: Vec<String> = self.bindings().map(str::to_string).collect();
        names.sort();
        (self.uri.clone(), names)
    }
}

/// Collect all import directives with usage counts.
pub fn scan_imports(unit: &ParsedUnit) -> Vec<ImportRecord> {
    let mut records = Vec::new();
    let root = unit.root();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "import_statement" {
            if let Some(record) = parse_import(child, unit) {
                records.push(record);
            }
        }
    }

    // One identifier walk serves every record.
    let mut wanted: FxHashSet<String> = FxHashSet::default();
    for record in &records {
        wanted.extend(record.bindings().map(str::to_string));
    }
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    count_identifiers(root, unit, &wanted, &mut counts);

    for record in &mut records {
        record.usage_count = record
            .bindings()
            .map(|name| counts.get(name).copied().unwrap_or(0))
            .sum();
    }
    records
}

/// Whether an import belongs to the flag service.
///
/// A configured class name matching the URI or one of the bindings takes
/// precedence; the `flag`/`feature` substring heuristic is the fallback.
pub fn is_flag_service(record: &ImportRecord, config: &FlagConfig) -> bool {
    for class in &config.patterns.classes {
        if record.uri.contains(class.as_str()) {
            return true;
        }
        if record.bindings().any(|b| b == class.as_str()) {
            return true;
        }
    }
    let uri = record.uri.to_ascii_lowercase();
    uri.contains("flag") || uri.contains("feature")
}

fn parse_import(node: Node, unit: &ParsedUnit) -> Option<ImportRecord> {
    let source_node = node.child_by_field_name("source")?;
    let uri = string_value(source_node, unit);

    let mut record = ImportRecord {
        span: Span::of(node),
        uri,
        prefix: None,
        default_name: None,
        named: Vec::new(),
        usage_count: 0,
    };

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = child.walk();
        for part in child.named_children(&mut clause_cursor) {
            match part.kind() {
                "identifier" => {
                    record.default_name = Some(unit.text_of(part).to_string());
                }
                "namespace_import" => {
                    let mut ns_cursor = part.walk();
                    let found = part
                        .named_children(&mut ns_cursor)
                        .find(|c| c.kind() == "identifier");
                    if let Some(name) = found {
                        record.prefix = Some(unit.text_of(name).to_string());
                    }
                }
                "named_imports" => {
                    let mut named_cursor = part.walk();
                    for spec in part.named_children(&mut named_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let local = spec
                            .child_by_field_name("alias")
                            .or_else(|| spec.child_by_field_name("name"));
                        if let Some(local) = local {
                            record.named.push(unit.text_of(local).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Some(record)
}

fn string_value(node: Node, unit: &ParsedUnit) -> String {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() == "string_fragment")
        .map(|c| unit.text_of(c))
        .collect()
}

/// Count identifier occurrences outside import directives.
fn count_identifiers(
    node: Node,
    unit: &ParsedUnit,
    wanted: &FxHashSet<String>,
    counts: &mut FxHashMap<String, usize>,
) {
    if node.kind() == "import_statement" {
        return;
    }
    if matches!(node.kind(), "identifier" | "type_identifier") {
        let name = unit.text_of(node);
        if wanted.contains(name) {
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            count_identifiers(child, unit, wanted, counts);
        }
    }
}

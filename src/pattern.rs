//! Flag-query call patterns.
//!
//! Config strings like `"FeatureFlagService.isEnabled"`, `"*.check"`,
//! `"isEnabled"`, or `"registry.read(flagOf"` are parsed once into a closed
//! [`CallPattern`] enum; call-expression nodes are then matched against the
//! parsed set in configured order, first match wins.
//!
//! Matching is purely syntactic: tree-sitter carries no type information,
//! so a `Class.method` pattern matches by receiver spelling. Instance
//! receivers are covered by `*.method` and bare-method patterns.

use tree_sitter::Node;

use crate::parse::ParsedUnit;

/// Method names matched when the configuration lists no patterns.
const DEFAULT_METHODS: &[&str] = &["isEnabled", "check", "isFeatureEnabled"];

/// One parsed call pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPattern {
    /// `Class.method` - receiver spelled exactly `Class`.
    ClassMethod { class: String, method: String },
    /// `*.method` - any receiver expression, method name equal.
    AnyReceiver { method: String },
    /// `method` - bare call or any receiver, method name equal.
    Bare { method: String },
    /// `Outer.method(inner` - the call matches `Outer.method` and its first
    /// argument is itself a call named `inner`; the inner call carries the
    /// flag key.
    Nested {
        receiver: Option<String>,
        method: String,
        inner: String,
    },
}

impl CallPattern {
    /// Parse a single configuration string. Returns `None` for strings the
    /// grammar cannot express (empty, stray separators).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some((outer, inner)) = raw.split_once('(') {
            let inner = inner.trim_end_matches(')').trim();
            if inner.is_empty() {
                return None;
            }
            let (receiver, method) = split_receiver(outer.trim())?;
            return Some(CallPattern::Nested {
                receiver,
                method,
                inner: inner.to_string(),
            });
        }

        match raw.split_once('.') {
            Some(("*", method)) if !method.is_empty() => Some(CallPattern::AnyReceiver {
                method: method.to_string(),
            }),
            Some((class, method)) if !class.is_empty() && !method.is_empty() => {
                Some(CallPattern::ClassMethod {
                    class: class.to_string(),
                    method: method.to_string(),
                })
            }
            Some(_) => None,
            None => Some(CallPattern::Bare {
                method: raw.to_string(),
            }),
        }
    }
}

/// Split `"Class.method"`, `"*.method"`, or `"method"` into an optional
/// receiver requirement and a method name.
fn split_receiver(s: &str) -> Option<(Option<String>, String)> {
    match s.split_once('.') {
        Some(("*", method)) if !method.is_empty() => Some((None, method.to_string())),
        Some((class, method)) if !class.is_empty() && !method.is_empty() => {
            Some((Some(class.to_string()), method.to_string()))
        }
        Some(_) => None,
        None if !s.is_empty() => Some((None, s.to_string())),
        None => None,
    }
}

/// The configured pattern list, parsed once per run.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<CallPattern>,
}

impl PatternSet {
    /// Build from configured strings, falling back to the default bare
    /// method names when none parse.
    pub fn from_config(methods: &[String]) -> Self {
        let mut patterns: Vec<CallPattern> =
            methods.iter().filter_map(|s| CallPattern::parse(s)).collect();
        if patterns.is_empty() {
            patterns = DEFAULT_METHODS
                .iter()
                .map(|m| CallPattern::Bare {
                    method: (*m).to_string(),
                })
                .collect();
        }
        Self { patterns }
    }

    /// Match a `call_expression` node. On success returns the node whose
    /// first argument carries the flag key: the call itself, or the nested
    /// inner call for container-style patterns.
    pub fn match_call<'t>(&self, call: Node<'t>, unit: &ParsedUnit) -> Option<Node<'t>> {
        if call.kind() != "call_expression" {
            return None;
        }
        let (receiver, method) = callee_parts(call, unit)?;

        for pattern in &self.patterns {
            match pattern {
                CallPattern::ClassMethod {
                    class,
                    method: want,
                } => {
                    if method == want.as_str() && receiver == Some(class.as_str()) {
                        return Some(call);
                    }
                }
                CallPattern::AnyReceiver { method: want } => {
                    if method == want.as_str() && receiver.is_some() {
                        return Some(call);
                    }
                }
                CallPattern::Bare { method: want } => {
                    if method == want.as_str() {
                        return Some(call);
                    }
                }
                CallPattern::Nested {
                    receiver: want_recv,
                    method: want,
                    inner,
                } => {
                    if method != want.as_str() {
                        continue;
                    }
                    if let Some(want_recv) = want_recv {
                        if receiver != Some(want_recv.as_str()) {
                            continue;
                        }
                    }
                    let Some(arg) = first_argument(call) else {
                        continue;
                    };
                    if arg.kind() != "call_expression" {
                        continue;
                    }
                    if let Some((_, inner_method)) = callee_parts(arg, unit) {
                        if inner_method == inner.as_str() {
                            return Some(arg);
                        }
                    }
                }
            }
        }
        None
    }
}

/// Dissect a call's callee into `(receiver text, method name)`.
///
/// `flags.isEnabled(..)` yields `(Some("flags"), "isEnabled")`;
/// `isEnabled(..)` yields `(None, "isEnabled")`.
pub fn callee_parts<'t, 'u>(
    call: Node<'t>,
    unit: &'u ParsedUnit,
) -> Option<(Option<&'u str>, &'u str)> {
    let callee = call.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some((None, unit.text_of(callee))),
        "member_expression" => {
            let object = callee.child_by_field_name("object")?;
            let property = callee.child_by_field_name("property")?;
            Some((Some(unit.text_of(object)), unit.text_of(property)))
        }
        _ => None,
    }
}

/// First named argument of a call, skipping comments.
pub fn first_argument(call: Node) -> Option<Node> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let found = args
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment");
    found
}

/// Extract the flag key from a matched flag-name node.
///
/// Accepts a plain string literal or a substitution-free template string
/// as the first argument; a bare identifier argument is accepted as its
/// spelling. A zero-argument call (provider style, `releaseFlag()`) falls
/// back to the callee's own method name.
pub fn extract_flag_key(key_node: Node, unit: &ParsedUnit) -> Option<String> {
    match first_argument(key_node) {
        Some(arg) => literal_text(arg, unit),
        None => callee_parts(key_node, unit).map(|(_, method)| method.to_string()),
    }
}

/// Literal text of a string, template string, or identifier argument.
fn literal_text(node: Node, unit: &ParsedUnit) -> Option<String> {
    match node.kind() {
        "string" => Some(concat_fragments(node, unit)),
        "template_string" => {
            let mut cursor = node.walk();
            let has_substitution = node
                .named_children(&mut cursor)
                .any(|c| c.kind() == "template_substitution");
            if has_substitution {
                None
            } else {
                Some(concat_fragments(node, unit))
            }
        }
        "identifier" => Some(unit.text_of(node).to_string()),
        _ => None,
    }
}

fn concat_fragments(node: Node, unit: &ParsedUnit) -> String {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() == "string_fragment")
        .map(|c| unit.text_of(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;

    fn first_call<'t>(unit: &'t ParsedUnit) -> Node<'t> {
        fn find(node: Node) -> Option<Node> {
            if node.kind() == "call_expression" {
                return Some(node);
            }
            for i in 0..node.named_child_count() {
                if let Some(found) = node.named_child(i).and_then(find) {
                    return Some(found);
                }
            }
            None
        }
        find(unit.root()).expect("no call expression in fixture")
    }

    fn patterns(specs: &[&str]) -> PatternSet {
        PatternSet::from_config(&specs.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn parse_all_pattern_forms() {
        assert_eq!(
            CallPattern::parse("Svc.isEnabled"),
            Some(CallPattern::ClassMethod {
                class: "Svc".into(),
                method: "isEnabled".into()
            })
        );
        assert_eq!(
            CallPattern::parse("*.check"),
            Some(CallPattern::AnyReceiver {
                method: "check".into()
            })
        );
        assert_eq!(
            CallPattern::parse("check"),
            Some(CallPattern::Bare {
                method: "check".into()
            })
        );
        assert_eq!(
            CallPattern::parse("registry.read(flagOf)"),
            Some(CallPattern::Nested {
                receiver: Some("registry".into()),
                method: "read".into(),
                inner: "flagOf".into()
            })
        );
        assert_eq!(CallPattern::parse(""), None);
        assert_eq!(CallPattern::parse(".method"), None);
    }

    #[test]
    fn class_method_requires_exact_receiver() {
        let set = patterns(&["FeatureFlagService.isEnabled"]);
        let unit = parse_source("FeatureFlagService.isEnabled('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_some());

        let unit = parse_source("other.isEnabled('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_none());
    }

    #[test]
    fn any_receiver_matches_instances_but_not_bare() {
        let set = patterns(&["*.isEnabled"]);
        let unit = parse_source("flags.isEnabled('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_some());

        let unit = parse_source("isEnabled('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_none());
    }

    #[test]
    fn bare_matches_any_shape() {
        let set = patterns(&["isEnabled"]);
        for src in ["isEnabled('x');\n", "flags.isEnabled('x');\n"] {
            let unit = parse_source(src, "a.ts").unwrap();
            assert!(set.match_call(first_call(&unit), &unit).is_some(), "{src}");
        }
    }

    #[test]
    fn nested_pattern_returns_inner_call() {
        let set = patterns(&["registry.read(releaseFlag"]);
        let unit = parse_source("registry.read(releaseFlag());\n", "a.ts").unwrap();
        let key_node = set.match_call(first_call(&unit), &unit).unwrap();
        assert!(unit.text_of(key_node).starts_with("releaseFlag"));
        // Provider call has no argument: key falls back to the method name.
        assert_eq!(
            extract_flag_key(key_node, &unit).as_deref(),
            Some("releaseFlag")
        );
    }

    #[test]
    fn first_configured_pattern_wins() {
        let set = patterns(&["Svc.isEnabled", "*.isEnabled"]);
        let unit = parse_source("Svc.isEnabled('x');\n", "a.ts").unwrap();
        // Matches via the first, exact pattern; still a match either way.
        assert!(set.match_call(first_call(&unit), &unit).is_some());
    }

    #[test]
    fn default_patterns_when_unconfigured() {
        let set = PatternSet::from_config(&[]);
        let unit = parse_source("isFeatureEnabled('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_some());

        let unit = parse_source("lookup('x');\n", "a.ts").unwrap();
        assert!(set.match_call(first_call(&unit), &unit).is_none());
    }

    #[test]
    fn key_extraction_forms() {
        let set = patterns(&["*.isEnabled"]);

        let unit = parse_source("f.isEnabled('plain');\n", "a.ts").unwrap();
        let node = set.match_call(first_call(&unit), &unit).unwrap();
        assert_eq!(extract_flag_key(node, &unit).as_deref(), Some("plain"));

        let unit = parse_source("f.isEnabled(`tmpl`);\n", "a.ts").unwrap();
        let node = set.match_call(first_call(&unit), &unit).unwrap();
        assert_eq!(extract_flag_key(node, &unit).as_deref(), Some("tmpl"));

        let unit = parse_source("f.isEnabled(`has${x}`);\n", "a.ts").unwrap();
        let node = set.match_call(first_call(&unit), &unit).unwrap();
        assert_eq!(extract_flag_key(node, &unit), None);

        let unit = parse_source("f.isEnabled(FLAG_NAME);\n", "a.ts").unwrap();
        let node = set.match_call(first_call(&unit), &unit).unwrap();
        assert_eq!(extract_flag_key(node, &unit).as_deref(), Some("FLAG_NAME"));

        let unit = parse_source("f.isEnabled(compute());\n", "a.ts").unwrap();
        let node = set.match_call(first_call(&unit), &unit).unwrap();
        assert_eq!(extract_flag_key(node, &unit), None);
    }
}

//! Parser adapter over tree-sitter.
//!
//! Maps file extensions to the TypeScript or TSX grammar, parses source
//! text into a [`ParsedUnit`], and surfaces parse failures as structured
//! errors so callers can skip unparseable files instead of rewriting them.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{Result, UnflagError};

/// File extensions the engine accepts, with a leading dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

/// A half-open byte range `[start, end)` into the source text.
///
/// Node offsets come straight from tree-sitter, so both bounds always fall
/// on UTF-8 character boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span covering a tree-sitter node.
    pub fn of(node: Node) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether a single byte offset lies within this span.
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// The slice of `source` this span covers.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// A parsed source file: the text plus its syntax tree.
///
/// Byte offsets in the tree are only valid for this exact `source`; any
/// edit invalidates the tree and requires a re-parse.
#[derive(Debug)]
pub struct ParsedUnit {
    pub source: String,
    pub tree: Tree,
}

impl ParsedUnit {
    /// Root node of the syntax tree.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source bytes, for `Node::utf8_text`.
    pub fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    /// Text of a node, empty on (impossible) non-UTF-8 slices.
    pub fn text_of(&self, node: Node) -> &str {
        node.utf8_text(self.bytes()).unwrap_or("")
    }
}

/// Whether a path has an extension the engine can parse.
pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let dotted = format!(".{}", ext);
            SUPPORTED_EXTENSIONS.contains(&dotted.as_str())
        })
        .unwrap_or(false)
}

/// Get a parser configured for the given file name.
///
/// `.tsx`/`.jsx` files need the TSX grammar for JSX syntax; everything
/// else uses the TypeScript grammar, which also parses plain JavaScript.
pub fn parser_for_file(file_name: &str) -> Result<Parser> {
    let mut parser = Parser::new();
    let lang = if file_name.ends_with(".tsx") || file_name.ends_with(".jsx") {
        &tree_sitter_typescript::LANGUAGE_TSX
    } else {
        &tree_sitter_typescript::LANGUAGE_TYPESCRIPT
    };
    parser
        .set_language(&(*lang).into())
        .map_err(|e| UnflagError::TreeSitter(e.to_string()))?;
    Ok(parser)
}

/// Parse source text into a [`ParsedUnit`].
///
/// Returns `Parse` when tree-sitter reports syntax errors anywhere in the
/// tree; the engine never rewrites code it could not fully parse.
pub fn parse_source(source: &str, file_name: &str) -> Result<ParsedUnit> {
    let mut parser = parser_for_file(file_name)?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| UnflagError::Parse {
            file: file_name.to_string(),
            message: "parser returned no tree".to_string(),
        })?;

    if tree.root_node().has_error() {
        let message = describe_first_error(tree.root_node());
        return Err(UnflagError::Parse {
            file: file_name.to_string(),
            message,
        });
    }

    Ok(ParsedUnit {
        source: source.to_string(),
        tree,
    })
}

/// Locate the first ERROR or MISSING node and describe its position.
fn describe_first_error(root: Node) -> String {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return format!(
                "syntax error at line {}, column {}",
                pos.row + 1,
                pos.column + 1
            );
        }
        if node.has_error() {
            // Push children in reverse so the leftmost error is found first.
            for i in (0..node.child_count()).rev() {
                if let Some(child) = node.child(i) {
                    stack.push(child);
                }
            }
        }
    }
    "syntax error".to_string()
}

/// Strip redundant parentheses: descend through `parenthesized_expression`
/// nodes to the innermost wrapped expression.
pub fn strip_parens(node: Node) -> Node {
    let mut current = node;
    while current.kind() == "parenthesized_expression" {
        match current.named_child(0) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

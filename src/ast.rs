//! AST types produced by the template parser.
//!
//! A template parses into an ordered forest of [`Node`]s. One node type
//! covers every construct; the `kind` field discriminates, and the
//! per-kind fields are simply left empty on other kinds. Exactly one owner
//! holds each node: `children` and `related` never share.

use serde::{Deserialize, Serialize};

/// 1-based line/column of the first character of a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation { line: 1, column: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Text,
    Interpolation,
    EmbeddedCode,
    Directive,
    Element,
}

/// An element attribute value.
///
/// Bare flags parse as `Literal("true")`; parenthesized values parse as
/// `Expr` and are the only attribute form the compiler treats as carrying
/// an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttrValue {
    Literal(String),
    Expr(String),
}

impl AttrValue {
    pub fn is_expr(&self) -> bool {
        matches!(self, AttrValue::Expr(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            AttrValue::Literal(s) | AttrValue::Expr(s) => s,
        }
    }
}

/// One AST element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub kind: NodeKind,
    /// Raw text, interpolation expression, or embedded-code body.
    #[serde(default)]
    pub content: String,
    /// Directive name.
    #[serde(default)]
    pub name: String,
    /// Element tag name.
    #[serde(default)]
    pub tag_name: String,
    /// Directive arguments, split on top-level commas.
    #[serde(default)]
    pub args: Vec<String>,
    /// Element attributes, insertion order preserved.
    #[serde(default)]
    pub attributes: Vec<(String, AttrValue)>,
    #[serde(default)]
    pub children: Vec<Node>,
    /// Chained sibling clauses (`elseif` / `else` / `empty`) attached to the
    /// governing block.
    #[serde(default)]
    pub related: Vec<Node>,
    /// Interpolation only: raw (unescaped) variant.
    #[serde(default)]
    pub raw: bool,
    /// Element only: self-closing.
    #[serde(default)]
    pub void: bool,
    pub loc: SourceLocation,
}

impl Node {
    fn blank(kind: NodeKind, loc: SourceLocation) -> Self {
        Node {
            kind,
            content: String::new(),
            name: String::new(),
            tag_name: String::new(),
            args: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            related: Vec::new(),
            raw: false,
            void: false,
            loc,
        }
    }

    pub fn text(content: impl Into<String>, loc: SourceLocation) -> Self {
        let mut n = Node::blank(NodeKind::Text, loc);
        n.content = content.into();
        n
    }

    pub fn interpolation(content: impl Into<String>, raw: bool, loc: SourceLocation) -> Self {
        let mut n = Node::blank(NodeKind::Interpolation, loc);
        n.content = content.into();
        n.raw = raw;
        n
    }

    pub fn embedded(content: impl Into<String>, loc: SourceLocation) -> Self {
        let mut n = Node::blank(NodeKind::EmbeddedCode, loc);
        n.content = content.into();
        n
    }

    pub fn directive(name: impl Into<String>, args: Vec<String>, loc: SourceLocation) -> Self {
        let mut n = Node::blank(NodeKind::Directive, loc);
        n.name = name.into();
        n.args = args;
        n
    }

    pub fn element(tag_name: impl Into<String>, loc: SourceLocation) -> Self {
        let mut n = Node::blank(NodeKind::Element, loc);
        n.tag_name = tag_name.into();
        n
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// True for text nodes containing only whitespace.
    pub fn is_blank_text(&self) -> bool {
        self.kind == NodeKind::Text && self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let mut el = Node::element("x-link", SourceLocation::default());
        el.attributes
            .push(("href".to_string(), AttrValue::Literal("/home".to_string())));
        el.attributes
            .push(("label".to_string(), AttrValue::Expr("user.name".to_string())));

        assert_eq!(el.attribute("href").map(AttrValue::as_str), Some("/home"));
        assert!(el.attribute("label").unwrap().is_expr());
        assert_eq!(el.attribute("missing"), None);
    }

    #[test]
    fn test_blank_text() {
        let loc = SourceLocation::default();
        assert!(Node::text("  \n\t", loc).is_blank_text());
        assert!(!Node::text(" x ", loc).is_blank_text());
        assert!(!Node::element("div", loc).is_blank_text());
    }
}

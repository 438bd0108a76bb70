//! Template parser.
//!
//! A single forward cursor scan with priority-ordered checks at each
//! position: comment, interpolation (raw before escaped), escape prefix,
//! directive, embedded code, structural tag, plain text. The only state
//! carried across iterations is the block stack and the line/column
//! counters. Parsing never fails; malformed input degrades to best-effort
//! nodes, and unclosed blocks surface as a diagnostic list so partial ASTs
//! stay usable for editor tooling.

use serde::{Deserialize, Serialize};

use crate::ast::{AttrValue, Node, NodeKind, SourceLocation};
use crate::registry::{ChildrenMode, Registry};
use crate::scan::{balanced_block, split_top_level};

pub const SIGIL: char = '@';
const CLOSE_PREFIX: &str = "end";
const COMMENT_OPEN: &str = "{{--";
const COMMENT_CLOSE: &str = "--}}";
const RAW_OPEN: &str = "{{{";
const ESC_OPEN: &str = "{{";
const CODE_OPEN: &str = "{%";
const CODE_CLOSE: &str = "%}";

/// A block still open at end-of-input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnterminatedBlock {
    pub name: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub nodes: Vec<Node>,
    pub unterminated: Vec<UnterminatedBlock>,
}

pub struct Parser<'r> {
    registry: &'r Registry,
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Parser { registry }
    }

    pub fn parse(&self, source: &str) -> ParseOutcome {
        self.parse_at(source, 1, 1, false)
    }

    /// Parse with an explicit starting position (used when re-entering for
    /// verbatim-container tags) and an optional restricted mode in which only
    /// comments, interpolation, and escapes are structural.
    pub fn parse_at(&self, source: &str, line: u32, column: u32, verbatim: bool) -> ParseOutcome {
        let scanner = Scanner {
            registry: self.registry,
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
            nodes: Vec::new(),
            stack: Vec::new(),
            unterminated: Vec::new(),
            verbatim,
        };
        scanner.run()
    }
}

fn block_name(node: &Node) -> &str {
    match node.kind {
        NodeKind::Directive => &node.name,
        NodeKind::Element => &node.tag_name,
        _ => "",
    }
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Lexical lookahead for a generic `@end` or a name-qualified `@end<name>`,
/// used to decide whether an `Auto` directive opens a block.
fn find_close(chars: &[char], from: usize, name: &str) -> bool {
    let close: Vec<char> = CLOSE_PREFIX.chars().collect();
    let mut i = from;
    while i < chars.len() {
        if chars[i] == SIGIL
            && i + close.len() < chars.len()
            && chars[i + 1..].starts_with(close.as_slice())
        {
            let mut j = i + 1 + close.len();
            let mut tail = String::new();
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                tail.push(chars[j]);
                j += 1;
            }
            if tail.is_empty() || tail == name {
                return true;
            }
            i = j;
            continue;
        }
        i += 1;
    }
    false
}

struct Scanner<'r> {
    registry: &'r Registry,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    nodes: Vec<Node>,
    /// Open blocks, governing node per entry. Chained clauses live in the
    /// governing node's `related` list; the active clause is the last one.
    stack: Vec<Node>,
    unterminated: Vec<UnterminatedBlock>,
    verbatim: bool,
}

impl<'r> Scanner<'r> {
    fn run(mut self) -> ParseOutcome {
        while self.pos < self.chars.len() {
            if self.starts_with(COMMENT_OPEN) {
                self.scan_comment();
                continue;
            }
            if self.starts_with(RAW_OPEN) {
                let node = self.scan_interpolation(3);
                self.attach(node);
                continue;
            }
            if self.starts_with(ESC_OPEN) {
                let node = self.scan_interpolation(2);
                self.attach(node);
                continue;
            }
            if self.starts_with("@{{") {
                let loc = self.loc();
                self.advance(3);
                self.attach(Node::text("{{", loc));
                continue;
            }
            if self.starts_with("@@") {
                let loc = self.loc();
                self.advance(2);
                self.attach(Node::text("@", loc));
                continue;
            }
            if !self.verbatim {
                if self.chars[self.pos] == SIGIL && self.scan_directive() {
                    continue;
                }
                if self.starts_with(CODE_OPEN) {
                    self.scan_code();
                    continue;
                }
                if self.chars[self.pos] == '<' && self.scan_tag() {
                    continue;
                }
            }
            self.scan_text();
        }

        while let Some(top) = self.stack.pop() {
            self.unterminated.push(UnterminatedBlock {
                name: block_name(&top).to_string(),
                loc: top.loc,
            });
            self.attach(top);
        }
        if !self.unterminated.is_empty() {
            tracing::debug!(
                count = self.unterminated.len(),
                "parse completed with unterminated blocks"
            );
        }

        ParseOutcome {
            nodes: self.nodes,
            unterminated: self.unterminated,
        }
    }

    // ── cursor helpers ──────────────────────────────────────────────────────

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if self.pos >= self.chars.len() {
                break;
            }
            if self.chars[self.pos] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if i >= self.chars.len() || self.chars[i] != c {
                return false;
            }
            i += 1;
        }
        true
    }

    fn find_seq(&self, needle: &str, from: usize) -> Option<usize> {
        let needle: Vec<char> = needle.chars().collect();
        if needle.is_empty() || from >= self.chars.len() {
            return None;
        }
        (from..=self.chars.len().saturating_sub(needle.len()))
            .find(|&i| self.chars[i..].starts_with(needle.as_slice()))
    }

    // ── tree attachment ─────────────────────────────────────────────────────

    /// The list new children currently land in: the active clause of the
    /// innermost open block, or the root forest.
    fn active_list(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(top) => {
                if top.related.is_empty() {
                    &mut top.children
                } else {
                    &mut top.related.last_mut().unwrap().children
                }
            }
            None => &mut self.nodes,
        }
    }

    /// Attach a completed node, chaining element conditionals: when the
    /// previous non-blank sibling's tag name plus `:` prefixes this tag name
    /// (`x-if` then `x-if:else`), the node joins that sibling's `related`
    /// list instead of the sibling order.
    fn attach(&mut self, node: Node) {
        let list = self.active_list();
        if node.kind == NodeKind::Element {
            if let Some(idx) = list.iter().rposition(|n| !n.is_blank_text()) {
                let prev = &mut list[idx];
                if prev.kind == NodeKind::Element
                    && node.tag_name.len() > prev.tag_name.len() + 1
                    && node.tag_name.starts_with(prev.tag_name.as_str())
                    && node.tag_name[prev.tag_name.len()..].starts_with(':')
                {
                    prev.related.push(node);
                    return;
                }
            }
        }
        list.push(node);
    }

    /// Pop the block stack down to (and including) the entry named `target`.
    /// Entries passed over on the way are unterminated; they are attached
    /// where they stand and reported. An unknown target is ignored.
    fn close_named(&mut self, target: &str) {
        let Some(p) = self.stack.iter().rposition(|n| block_name(n) == target) else {
            return;
        };
        while self.stack.len() > p + 1 {
            let dangling = self.stack.pop().unwrap();
            self.unterminated.push(UnterminatedBlock {
                name: block_name(&dangling).to_string(),
                loc: dangling.loc,
            });
            self.attach(dangling);
        }
        let block = self.stack.pop().unwrap();
        self.attach(block);
    }

    // ── construct scanners ──────────────────────────────────────────────────

    fn scan_comment(&mut self) {
        match self.find_seq(COMMENT_CLOSE, self.pos + COMMENT_OPEN.len()) {
            Some(idx) => self.advance(idx + COMMENT_CLOSE.len() - self.pos),
            None => self.advance(self.chars.len() - self.pos),
        }
    }

    /// Scan `{{ ... }}` (`open_count` 2) or `{{{ ... }}}` (`open_count` 3),
    /// balancing interior braces and quoted strings so object literals close
    /// where they should. Unterminated input takes the rest of the source.
    fn scan_interpolation(&mut self, open_count: usize) -> Node {
        let loc = self.loc();
        let raw = open_count == 3;
        let start = self.pos + open_count;
        let mut depth = open_count;
        let mut quote: Option<char> = None;
        let mut i = start;
        let mut content_end = None;

        while i < self.chars.len() {
            let c = self.chars[i];
            if c == '\\' && i + 1 < self.chars.len() {
                i += 2;
                continue;
            }
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        content_end = Some(i + 1 - open_count);
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let content: String = match content_end {
            Some(e) => {
                let s: String = self.chars[start..e].iter().collect();
                self.advance(i + 1 - self.pos);
                s
            }
            None => {
                let s: String = self.chars[start..].iter().collect();
                self.advance(self.chars.len() - self.pos);
                s
            }
        };
        Node::interpolation(content.trim(), raw, loc)
    }

    fn scan_code(&mut self) {
        let loc = self.loc();
        let start = self.pos + CODE_OPEN.len();
        match self.find_seq(CODE_CLOSE, start) {
            Some(idx) => {
                let content: String = self.chars[start..idx].iter().collect();
                self.advance(idx + CODE_CLOSE.len() - self.pos);
                self.attach(Node::embedded(content, loc));
            }
            None => {
                let content: String = self.chars[start..].iter().collect();
                self.advance(self.chars.len() - self.pos);
                self.attach(Node::embedded(content, loc));
            }
        }
    }

    /// Returns false (consuming nothing) when the text after the sigil does
    /// not resolve to a registered directive; the text scanner then emits the
    /// sigil and the identifier as literal output.
    fn scan_directive(&mut self) -> bool {
        let len = self.chars.len();
        let mut j = self.pos + 1;
        if j >= len || !self.chars[j].is_ascii_alphabetic() {
            return false;
        }
        while j < len && (self.chars[j].is_ascii_alphanumeric() || self.chars[j] == '_') {
            j += 1;
        }
        let ident: String = self.chars[self.pos + 1..j].iter().collect();

        if let Some(target) = ident.strip_prefix(CLOSE_PREFIX) {
            let target = target.to_string();
            self.advance(j - self.pos);
            if target.is_empty() {
                if let Some(top) = self.stack.pop() {
                    self.attach(top);
                }
            } else {
                self.close_named(&target);
            }
            return true;
        }

        let Some(name) = self.registry.resolve_directive_name(&ident).map(str::to_string) else {
            return false;
        };
        let loc = self.loc();
        self.advance(1 + name.chars().count());

        let mut args = Vec::new();
        if self.pos < len && self.chars[self.pos] == '(' {
            let block = balanced_block(&self.chars, self.pos);
            args = split_top_level(&block.content, ',');
            self.advance(block.end - self.pos);
        }
        let node = Node::directive(&name, args, loc);

        // Chaining: an `else`-family clause joins the governing block's
        // related list and becomes the active clause; no extra stack entry.
        if let Some(top) = self.stack.last() {
            if top.kind == NodeKind::Directive && self.registry.is_chain(&top.name, &name) {
                self.stack.last_mut().unwrap().related.push(node);
                return true;
            }
        }

        let mode = self
            .registry
            .directive(&name)
            .map(|d| d.children)
            .unwrap_or(ChildrenMode::Leaf);
        match mode {
            ChildrenMode::Leaf => self.attach(node),
            ChildrenMode::Block => self.stack.push(node),
            ChildrenMode::Auto => {
                if find_close(&self.chars, self.pos, &name) {
                    self.stack.push(node);
                } else {
                    self.attach(node);
                }
            }
        }
        true
    }

    fn scan_tag(&mut self) -> bool {
        let len = self.chars.len();
        if self.pos + 1 >= len {
            return false;
        }

        if self.chars[self.pos + 1] == '/' {
            let mut j = self.pos + 2;
            let mut name = String::new();
            while j < len && is_tag_name_char(self.chars[j]) {
                name.push(self.chars[j]);
                j += 1;
            }
            while j < len && self.chars[j].is_whitespace() {
                j += 1;
            }
            if name.is_empty() || j >= len || self.chars[j] != '>' || !self.registry.is_element(&name)
            {
                return false;
            }
            self.advance(j + 1 - self.pos);
            self.close_named(&name);
            return true;
        }

        if !self.chars[self.pos + 1].is_ascii_alphabetic() {
            return false;
        }
        let mut j = self.pos + 1;
        let mut name = String::new();
        while j < len && is_tag_name_char(self.chars[j]) {
            name.push(self.chars[j]);
            j += 1;
        }
        if !self.registry.is_element(&name) {
            return false;
        }

        let loc = self.loc();
        self.advance(j - self.pos);
        let mut node = Node::element(&name, loc);

        loop {
            while self.pos < len && self.chars[self.pos].is_whitespace() {
                self.advance(1);
            }
            if self.pos >= len {
                break; // unterminated open tag: best-effort node
            }
            match self.chars[self.pos] {
                '>' => {
                    self.advance(1);
                    break;
                }
                '/' => {
                    if self.starts_with("/>") {
                        node.void = true;
                        self.advance(2);
                        break;
                    }
                    self.advance(1);
                }
                _ => {
                    let mut attr_name = String::new();
                    while self.pos < len
                        && !matches!(self.chars[self.pos], '=' | '>' | '/')
                        && !self.chars[self.pos].is_whitespace()
                    {
                        attr_name.push(self.chars[self.pos]);
                        self.advance(1);
                    }
                    if attr_name.is_empty() {
                        self.advance(1);
                        continue;
                    }
                    if self.pos < len && self.chars[self.pos] == '=' {
                        self.advance(1);
                        let value = self.scan_attr_value();
                        node.attributes.push((attr_name, value));
                    } else {
                        node.attributes
                            .push((attr_name, AttrValue::Literal("true".to_string())));
                    }
                }
            }
        }

        if self.registry.is_verbatim(&name) && !node.void {
            let close = self.find_close_tag(&name);
            let (inner_end, resume) = close.unwrap_or((len, len));
            let inner: String = self.chars[self.pos..inner_end].iter().collect();
            let outcome =
                Parser::new(self.registry).parse_at(&inner, self.line, self.column, true);
            node.children = outcome.nodes;
            self.unterminated.extend(outcome.unterminated);
            if close.is_none() {
                self.unterminated.push(UnterminatedBlock {
                    name: name.clone(),
                    loc: node.loc,
                });
            }
            self.advance(resume - self.pos);
            self.attach(node);
        } else if node.void {
            self.attach(node);
        } else {
            self.stack.push(node);
        }
        true
    }

    fn scan_attr_value(&mut self) -> AttrValue {
        let len = self.chars.len();
        if self.pos >= len {
            return AttrValue::Literal(String::new());
        }
        match self.chars[self.pos] {
            '(' => {
                let block = balanced_block(&self.chars, self.pos);
                self.advance(block.end - self.pos);
                AttrValue::Expr(block.content.trim().to_string())
            }
            q @ ('"' | '\'') => {
                let mut i = self.pos + 1;
                let mut value = String::new();
                while i < len {
                    let c = self.chars[i];
                    if c == '\\' && i + 1 < len {
                        value.push(self.chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if c == q {
                        i += 1;
                        break;
                    }
                    value.push(c);
                    i += 1;
                }
                self.advance(i - self.pos);
                AttrValue::Literal(value)
            }
            _ => {
                // Unquoted: same balanced/whitespace-stop discipline as
                // directive arguments.
                let mut i = self.pos;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut value = String::new();
                while i < len {
                    let c = self.chars[i];
                    if let Some(qc) = quote {
                        value.push(c);
                        if c == qc {
                            quote = None;
                        }
                        i += 1;
                        continue;
                    }
                    match c {
                        '"' | '\'' | '`' => {
                            quote = Some(c);
                            value.push(c);
                        }
                        '(' | '[' | '{' => {
                            depth += 1;
                            value.push(c);
                        }
                        ')' | ']' | '}' => {
                            depth = depth.saturating_sub(1);
                            value.push(c);
                        }
                        _ if depth == 0 && (c.is_whitespace() || c == '>' || c == '/') => break,
                        _ => value.push(c),
                    }
                    i += 1;
                }
                self.advance(i - self.pos);
                AttrValue::Literal(value)
            }
        }
    }

    /// Locate `</name>` (whitespace tolerated before `>`) from the cursor.
    /// Returns (index of `<`, index just past `>`).
    fn find_close_tag(&self, name: &str) -> Option<(usize, usize)> {
        let open: Vec<char> = format!("</{}", name).chars().collect();
        let mut i = self.pos;
        while i + open.len() <= self.chars.len() {
            if self.chars[i..].starts_with(open.as_slice()) {
                let mut j = i + open.len();
                while j < self.chars.len() && self.chars[j].is_whitespace() {
                    j += 1;
                }
                if j < self.chars.len() && self.chars[j] == '>' {
                    return Some((i, j + 1));
                }
            }
            i += 1;
        }
        None
    }

    /// Consume a run of plain characters up to the next position that could
    /// start any construct; at least one character, guaranteeing progress.
    fn scan_text(&mut self) {
        let loc = self.loc();
        let len = self.chars.len();
        let mut j = self.pos + 1;
        while j < len && !self.is_boundary(self.chars[j]) {
            j += 1;
        }
        let text: String = self.chars[self.pos..j].iter().collect();
        self.advance(j - self.pos);
        self.attach(Node::text(text, loc));
    }

    fn is_boundary(&self, c: char) -> bool {
        c == '{' || c == SIGIL || (!self.verbatim && c == '<')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Emit;
    use crate::registry::{DirectiveDefinition, ElementMatcher};
    use pretty_assertions::assert_eq;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.add_directive(
            DirectiveDefinition::new("if", |_: &mut Emit| Ok(()))
                .chain(DirectiveDefinition::marker("elseif"))
                .chain(DirectiveDefinition::marker("else")),
        );
        reg.add_directive(
            DirectiveDefinition::new("for", |_: &mut Emit| Ok(()))
                .chain(DirectiveDefinition::marker("empty")),
        );
        reg.add_directive(
            DirectiveDefinition::new("include", |_: &mut Emit| Ok(())).children(ChildrenMode::Leaf),
        );
        reg.add_directive(
            DirectiveDefinition::new("section", |_: &mut Emit| Ok(())).children(ChildrenMode::Auto),
        );
        reg.add_element(ElementMatcher::new("x-*", |_: &mut Emit| Ok(())));
        reg.add_verbatim_tag("script");
        reg
    }

    fn parse(src: &str) -> ParseOutcome {
        let reg = registry();
        Parser::new(&reg).parse(src)
    }

    #[test]
    fn test_plain_text() {
        let out = parse("just words, no markup");
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(out.nodes[0].kind, NodeKind::Text);
        assert_eq!(out.nodes[0].content, "just words, no markup");
        assert!(out.unterminated.is_empty());
    }

    #[test]
    fn test_interpolation_trimmed_and_raw() {
        let out = parse("a {{ name }} b {{{ html }}} c");
        let kinds: Vec<_> = out.nodes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Text,
                NodeKind::Interpolation,
                NodeKind::Text,
                NodeKind::Interpolation,
                NodeKind::Text
            ]
        );
        assert_eq!(out.nodes[1].content, "name");
        assert!(!out.nodes[1].raw);
        assert_eq!(out.nodes[3].content, "html");
        assert!(out.nodes[3].raw);
    }

    #[test]
    fn test_interpolation_with_object_literal() {
        let out = parse("{{ format({a: {b: 1}}) }}");
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(out.nodes[0].content, "format({a: {b: 1}})");
    }

    #[test]
    fn test_comment_produces_nothing() {
        let out = parse("a{{-- secret {{ x }} --}}b");
        assert_eq!(out.nodes.len(), 2);
        assert_eq!(out.nodes[0].content, "a");
        assert_eq!(out.nodes[1].content, "b");
    }

    #[test]
    fn test_escape_markers() {
        let out = parse("@{{ name }} and @@if");
        let text: String = out.nodes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(text, "{{ name }} and @if");
    }

    #[test]
    fn test_unknown_directive_stays_literal() {
        let out = parse("@foo(1)");
        assert!(out.nodes.iter().all(|n| n.kind == NodeKind::Text));
        let text: String = out.nodes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(text, "@foo(1)");
    }

    #[test]
    fn test_directive_args_balanced() {
        let out = parse(r#"@if(f(a, b), [c, d], "e,f")x@end"#);
        let node = &out.nodes[0];
        assert_eq!(node.kind, NodeKind::Directive);
        assert_eq!(node.args, vec!["f(a, b)", "[c, d]", r#""e,f""#]);
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_chained_conditional_single_block() {
        let out = parse("@if(a) A @elseif(b) B @else C @end tail");
        assert_eq!(out.nodes.len(), 2);
        let cond = &out.nodes[0];
        assert_eq!(cond.name, "if");
        assert_eq!(cond.related.len(), 2);
        assert_eq!(cond.related[0].name, "elseif");
        assert_eq!(cond.related[0].args, vec!["b"]);
        assert_eq!(cond.related[1].name, "else");
        assert_eq!(cond.children[0].content, " A ");
        assert_eq!(cond.related[0].children[0].content, " B ");
        assert_eq!(cond.related[1].children[0].content, " C ");
        assert!(out.unterminated.is_empty());
    }

    #[test]
    fn test_named_close() {
        let out = parse("@if(a)@for(x of xs)y@endfor z@endif");
        let cond = &out.nodes[0];
        assert_eq!(cond.name, "if");
        assert_eq!(cond.children.len(), 2);
        assert_eq!(cond.children[0].name, "for");
        assert!(out.unterminated.is_empty());
    }

    #[test]
    fn test_longest_name_truncation() {
        // No directive called `iframe`, but `if` is a registered prefix.
        let out = parse("@iframe x @end");
        assert_eq!(out.nodes[0].kind, NodeKind::Directive);
        assert_eq!(out.nodes[0].name, "if");
    }

    #[test]
    fn test_unterminated_block_diagnostic() {
        let out = parse("@if(a) open forever");
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(out.unterminated.len(), 1);
        assert_eq!(out.unterminated[0].name, "if");
        assert_eq!(out.unterminated[0].loc, SourceLocation::new(1, 1));
    }

    #[test]
    fn test_auto_children_mode() {
        // With a close ahead: a block.
        let out = parse("@section(head)x@end");
        assert_eq!(out.nodes[0].children.len(), 1);
        // Without: a leaf.
        let out = parse("@section(head) tail");
        assert_eq!(out.nodes[0].children.len(), 0);
        assert!(out.unterminated.is_empty());
    }

    #[test]
    fn test_embedded_code_verbatim() {
        let out = parse("{% let x = 1; %}done");
        assert_eq!(out.nodes[0].kind, NodeKind::EmbeddedCode);
        assert_eq!(out.nodes[0].content, " let x = 1; ");
        assert_eq!(out.nodes[1].content, "done");
    }

    #[test]
    fn test_element_attributes() {
        let out = parse(r#"<x-link href="/a" bold label=(user.name) width=12>t</x-link>"#);
        let el = &out.nodes[0];
        assert_eq!(el.kind, NodeKind::Element);
        assert_eq!(el.tag_name, "x-link");
        assert_eq!(
            el.attributes,
            vec![
                ("href".to_string(), AttrValue::Literal("/a".to_string())),
                ("bold".to_string(), AttrValue::Literal("true".to_string())),
                ("label".to_string(), AttrValue::Expr("user.name".to_string())),
                ("width".to_string(), AttrValue::Literal("12".to_string())),
            ]
        );
        assert_eq!(el.children.len(), 1);
        assert!(!el.void);
    }

    #[test]
    fn test_self_closing_element() {
        let out = parse("<x-rule width=3 />after");
        assert!(out.nodes[0].void);
        assert_eq!(out.nodes[1].content, "after");
    }

    #[test]
    fn test_unregistered_tag_is_text() {
        let out = parse("<div>{{ x }}</div>");
        assert_eq!(out.nodes[0].kind, NodeKind::Text);
        assert_eq!(out.nodes[0].content, "<div>");
        assert_eq!(out.nodes[1].kind, NodeKind::Interpolation);
        assert_eq!(out.nodes[2].content, "</div>");
    }

    #[test]
    fn test_verbatim_container_keeps_interpolation() {
        let out = parse("<script>var a = {{ x }}; @if(a) not structural @end</script>");
        let el = &out.nodes[0];
        assert_eq!(el.tag_name, "script");
        assert_eq!(el.children[0].content, "var a = ");
        assert_eq!(el.children[1].kind, NodeKind::Interpolation);
        assert_eq!(el.children[1].content, "x");
        // Directives are not structural inside a verbatim container.
        assert!(el.children[2..].iter().all(|n| n.kind == NodeKind::Text));
        assert!(out.unterminated.is_empty());
    }

    #[test]
    fn test_element_sibling_chaining() {
        let out = parse("<x-if cond=(a)>A</x-if> <x-if:else>B</x-if:else>");
        assert_eq!(out.nodes.len(), 2); // element plus the blank text after it
        let cond = &out.nodes[0];
        assert_eq!(cond.tag_name, "x-if");
        assert_eq!(cond.related.len(), 1);
        assert_eq!(cond.related[0].tag_name, "x-if:else");
    }

    #[test]
    fn test_locations() {
        let out = parse("line one\n  {{ name }}");
        assert_eq!(out.nodes[0].loc, SourceLocation::new(1, 1));
        assert_eq!(out.nodes[1].loc, SourceLocation::new(2, 3));
    }

    #[test]
    fn test_verbatim_reentry_carries_location() {
        let out = parse("<script>\n{{ x }}</script>");
        let el = &out.nodes[0];
        // The inner parse starts right after the open tag on line 1.
        assert_eq!(el.children[1].loc, SourceLocation::new(2, 1));
    }

    #[test]
    fn test_nested_blocks() {
        let out = parse("@if(a)@if(b)x@end@end");
        let outer = &out.nodes[0];
        assert_eq!(outer.children.len(), 1);
        assert_eq!(outer.children[0].name, "if");
        assert_eq!(outer.children[0].children[0].content, "x");
    }

    #[test]
    fn test_nested_block_inside_clause() {
        let out = parse("@if(a)x@else@if(b)y@end@end");
        let cond = &out.nodes[0];
        assert_eq!(cond.related.len(), 1);
        assert_eq!(cond.related[0].children[0].name, "if");
    }
}

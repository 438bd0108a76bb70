//! Code generation.
//!
//! Turns a parsed node forest into the body of a rendering function. The
//! enclosing scope is expected to provide `$env` (escape hook plus global
//! defaults) and `$data` (per-render locals and global overrides); everything
//! else the generated code needs is declared in the emitted header: the
//! runtime preamble, auto-bindings for free identifiers, inlined dependency
//! functions, and variable-provider injections.
//!
//! Directive and element semantics live in registry callbacks, which receive
//! an [`Emit`] handle scoped to the node being compiled. The compiler itself
//! only knows how to buffer text, place statements, and run the provider
//! fixed point.

use std::collections::{HashMap, HashSet};

use crate::ast::{AttrValue, Node, NodeKind, SourceLocation};
use crate::error::{CompileError, ERR_ARITY, ERR_CALLBACK, ERR_DEPENDENCY};
use crate::parse::Parser;
use crate::registry::{BindHint, ProviderFn, Registry};
use crate::scan::{
    blank_strings, collect_declarations, collect_identifiers, contains_await, iteration_bindings,
    JS_GLOBALS,
};
use crate::sourcemap::{encode_map, MapEntry};

/// Names the preamble itself introduces; never auto-bound.
const RUNTIME_NAMES: [&str; 6] = ["$env", "$data", "$locals", "$globals", "$out", "$esc"];

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Strips line markers and the trailing source-map comment.
    pub production: bool,
}

/// Result of compiling one template unit.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Function body text. The caller wraps it in `function ($env, $data)`
    /// (or the async equivalent when `is_async`).
    pub source: String,
    pub is_async: bool,
    /// Resolved dependency path to the inlined function identifier.
    pub dependencies: HashMap<String, String>,
}

/// Source text for a dependency path.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// Canonical path, used for deduplication.
    pub path: String,
    pub source: String,
}

pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<ResolvedSource, CompileError>;
}

/// Rejects every dependency request.
pub struct NullResolver;

impl DependencyResolver for NullResolver {
    fn resolve(&self, path: &str) -> Result<ResolvedSource, CompileError> {
        Err(CompileError::at(
            ERR_DEPENDENCY,
            &format!("no resolver configured, cannot load \"{}\"", path),
            1,
            1,
        ))
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub struct Compiler<'r> {
    registry: &'r Registry,
    resolver: &'r dyn DependencyResolver,
    options: CompileOptions,
    is_dependency: bool,

    /// Preamble, auto-bindings, inlined dependencies, provider injections.
    header: Vec<String>,
    /// Statements with the template position they came from.
    body: Vec<(String, SourceLocation)>,
    /// Teardown statements placed before the terminal return.
    footer: Vec<String>,
    text_buf: String,
    text_loc: Option<SourceLocation>,

    /// (resolved path, function identifier), insertion order.
    dependencies: Vec<(String, String)>,
    uid_counter: HashMap<String, usize>,

    free_idents: HashSet<String>,
    declared: HashSet<String>,
    is_async: bool,

    provider_fired: Vec<bool>,
    extra_providers: Vec<(String, bool, ProviderFn)>,
    extra_fired: Vec<bool>,
}

impl<'r> Compiler<'r> {
    pub fn new(
        registry: &'r Registry,
        resolver: &'r dyn DependencyResolver,
        options: CompileOptions,
    ) -> Self {
        Compiler {
            registry,
            resolver,
            options,
            is_dependency: false,
            header: Vec::new(),
            body: Vec::new(),
            footer: Vec::new(),
            text_buf: String::new(),
            text_loc: None,
            dependencies: Vec::new(),
            uid_counter: HashMap::new(),
            free_idents: HashSet::new(),
            declared: HashSet::new(),
            is_async: false,
            provider_fired: Vec::new(),
            extra_providers: Vec::new(),
            extra_fired: Vec::new(),
        }
    }

    fn nested(
        registry: &'r Registry,
        resolver: &'r dyn DependencyResolver,
        options: CompileOptions,
    ) -> Self {
        let mut cx = Compiler::new(registry, resolver, options);
        cx.is_dependency = true;
        cx
    }

    /// Compile a node forest into a rendering-function body. `extra_locals`
    /// are names the embedding scope promises to declare; they are treated as
    /// already bound.
    pub fn compile(
        &mut self,
        nodes: &[Node],
        extra_locals: &[String],
    ) -> Result<CompiledUnit, CompileError> {
        self.reset();
        for name in extra_locals {
            self.declared.insert(name.clone());
        }

        self.analyze(nodes);
        self.push_preamble();
        self.push_bindings();

        self.emit_nodes(nodes)?;
        self.flush_text();
        self.run_providers()?;

        // Callback-written statements can suspend too, so the final word on
        // the async flag is a scan over everything that made it into the
        // buffers, not just the pre-pass over node content.
        if contains_await(&self.buffers_text()) {
            self.is_async = true;
        }

        let source = self.assemble();
        Ok(CompiledUnit {
            source,
            is_async: self.is_async,
            dependencies: self.dependencies.iter().cloned().collect(),
        })
    }

    fn reset(&mut self) {
        self.header.clear();
        self.body.clear();
        self.footer.clear();
        self.text_buf.clear();
        self.text_loc = None;
        self.dependencies.clear();
        self.uid_counter.clear();
        self.free_idents.clear();
        self.declared.clear();
        self.is_async = false;
        self.provider_fired = vec![false; self.registry.providers().len()];
        self.extra_providers.clear();
        self.extra_fired.clear();
    }

    // ── analysis ────────────────────────────────────────────────────────────

    /// One pre-pass over the whole forest collecting free identifiers,
    /// declared names, and the async flag. Declarations are not scoped to
    /// their block; the generated `let` bindings tolerate the imprecision.
    fn analyze(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node.kind {
                NodeKind::Text => {}
                NodeKind::Interpolation => {
                    collect_identifiers(&node.content, &mut self.free_idents);
                    if contains_await(&node.content) {
                        self.is_async = true;
                    }
                }
                NodeKind::EmbeddedCode => {
                    collect_identifiers(&node.content, &mut self.free_idents);
                    collect_declarations(&node.content, &mut self.declared);
                    if contains_await(&node.content) {
                        self.is_async = true;
                    }
                }
                NodeKind::Directive => {
                    self.analyze_directive(node);
                }
                NodeKind::Element => {
                    for (_, value) in &node.attributes {
                        if let AttrValue::Expr(expr) = value {
                            collect_identifiers(expr, &mut self.free_idents);
                            if contains_await(expr) {
                                self.is_async = true;
                            }
                        }
                    }
                    // Iteration elements declare their binding attributes.
                    if node.attribute("each").map(AttrValue::is_expr) == Some(true) {
                        for key in ["as", "index"] {
                            if let Some(AttrValue::Literal(name)) = node.attribute(key) {
                                self.declared.insert(name.clone());
                            }
                        }
                    }
                }
            }
            self.analyze(&node.children);
            // Chain clauses carry the same expression surfaces as their
            // governing node (directive args, element attributes).
            for clause in &node.related {
                self.analyze(std::slice::from_ref(clause));
            }
        }
    }

    fn analyze_directive(&mut self, node: &Node) {
        self.analyze_directive_args(node);
        let hint = self
            .registry
            .directive(&node.name)
            .map(|d| d.binds)
            .unwrap_or(BindHint::None);
        let Some(first) = node.args.first() else {
            return;
        };
        match hint {
            BindHint::None => {}
            BindHint::Iteration => {
                if let Some(left) = iteration_bindings(first) {
                    let mut names = HashSet::new();
                    collect_identifiers(&left, &mut names);
                    self.declared.extend(names);
                }
            }
            BindHint::Local => {
                let blanked = blank_strings(first);
                let left = blanked.split('=').next().unwrap_or("");
                let mut names = HashSet::new();
                collect_identifiers(left, &mut names);
                self.declared.extend(names);
            }
        }
    }

    fn analyze_directive_args(&mut self, node: &Node) {
        for arg in &node.args {
            collect_identifiers(arg, &mut self.free_idents);
            if contains_await(arg) {
                self.is_async = true;
            }
        }
    }

    fn push_preamble(&mut self) {
        self.header.push(
            "const $globals = Object.assign(Object.create($env.globals), $data.globals || {});"
                .to_string(),
        );
        self.header.push("const $locals = $data.locals || {};".to_string());
        self.header.push("let $out = \"\";".to_string());
        self.header.push("const $esc = $env.escape.bind($env);".to_string());
    }

    /// One `let` per free identifier that nothing else accounts for, in
    /// sorted order so output is deterministic.
    fn push_bindings(&mut self) {
        let provider_names: HashSet<&str> = self
            .registry
            .providers()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let mut names: Vec<&String> = self
            .free_idents
            .iter()
            .filter(|n| {
                !n.starts_with('$')
                    && !self.declared.contains(n.as_str())
                    && !RUNTIME_NAMES.contains(&n.as_str())
                    && !JS_GLOBALS.contains(n.as_str())
                    && !provider_names.contains(n.as_str())
            })
            .collect();
        names.sort();
        for name in names {
            self.header.push(format!(
                "let {} = $locals.{} !== undefined ? $locals.{} : $globals.{};",
                name, name, name, name
            ));
        }
    }

    // ── emission ────────────────────────────────────────────────────────────

    fn buffer_text(&mut self, text: &str, loc: SourceLocation) {
        if self.text_buf.is_empty() {
            self.text_loc = Some(loc);
        }
        self.text_buf.push_str(text);
    }

    fn flush_text(&mut self) {
        if self.text_buf.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_buf);
        let loc = self.text_loc.take().unwrap_or_default();
        self.body.push((format!("$out += {};", js_string(&text)), loc));
    }

    fn push_stmt(&mut self, stmt: String, loc: SourceLocation) {
        self.flush_text();
        self.body.push((stmt, loc));
    }

    fn uid(&mut self, prefix: &str) -> String {
        let n = self.uid_counter.entry(prefix.to_string()).or_insert(0);
        *n += 1;
        format!("${}_{}", prefix, n)
    }

    fn emit_nodes(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        for node in nodes {
            self.emit_node(node)?;
        }
        Ok(())
    }

    fn emit_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Text => self.buffer_text(&node.content, node.loc),
            NodeKind::Interpolation => {
                let stmt = if node.raw {
                    format!("$out += ({});", node.content)
                } else {
                    format!("$out += $esc({});", node.content)
                };
                self.push_stmt(stmt, node.loc);
            }
            NodeKind::EmbeddedCode => {
                if self.options.production {
                    self.push_stmt(node.content.trim().to_string(), node.loc);
                } else {
                    for (i, line) in node.content.trim().lines().enumerate() {
                        let line_no = node.loc.line + i as u32;
                        let marked = format!("/*:{}*/ {}", line_no, line.trim());
                        let loc = SourceLocation {
                            line: line_no,
                            column: if i == 0 { node.loc.column } else { 1 },
                        };
                        self.push_stmt(marked, loc);
                    }
                }
            }
            NodeKind::Directive => {
                let registry = self.registry;
                // A chain clause reaching the walk on its own has no
                // governing block; it produces nothing.
                let Some(def) = registry.directive(&node.name) else {
                    return Ok(());
                };
                if let Some(spec) = def.params {
                    let n = node.args.len();
                    let too_many = spec.max.map(|m| n > m).unwrap_or(false);
                    if n < spec.min || too_many {
                        return Err(CompileError::new(
                            ERR_ARITY,
                            &format!(
                                "@{} expects {}{} argument(s), got {}",
                                node.name,
                                spec.min,
                                spec.max
                                    .map(|m| format!("..{}", m))
                                    .unwrap_or_else(|| "+".to_string()),
                                n
                            ),
                            node.loc,
                        ));
                    }
                }
                if let Some(on_call) = def.on_call.as_ref() {
                    self.flush_text();
                    let mut em = Emit { cx: self, node };
                    on_call(&mut em)?;
                }
            }
            NodeKind::Element => {
                let registry = self.registry;
                match registry.match_element(&node.tag_name) {
                    Some(matcher) => {
                        self.flush_text();
                        let mut em = Emit { cx: self, node };
                        (matcher.on_call)(&mut em)?;
                    }
                    // Verbatim containers with no matcher reproduce
                    // themselves literally.
                    None => self.emit_literal_element(node)?,
                }
            }
        }
        Ok(())
    }

    fn emit_literal_element(&mut self, node: &Node) -> Result<(), CompileError> {
        self.buffer_text(&format!("<{}", node.tag_name), node.loc);
        for (name, value) in &node.attributes {
            match value {
                AttrValue::Literal(v) => {
                    self.buffer_text(&format!(" {}=\"{}\"", name, v), node.loc);
                }
                AttrValue::Expr(expr) => {
                    self.buffer_text(&format!(" {}=\"", name), node.loc);
                    self.push_stmt(format!("$out += $esc({});", expr), node.loc);
                    self.buffer_text("\"", node.loc);
                }
            }
        }
        if node.void {
            self.buffer_text(" />", node.loc);
            return Ok(());
        }
        self.buffer_text(">", node.loc);
        self.emit_nodes(&node.children)?;
        self.buffer_text(&format!("</{}>", node.tag_name), node.loc);
        Ok(())
    }

    // ── variable providers ──────────────────────────────────────────────────

    fn buffers_text(&self) -> String {
        let mut out = String::new();
        for s in &self.header {
            out.push_str(s);
            out.push('\n');
        }
        for (s, _) in &self.body {
            out.push_str(s);
            out.push('\n');
        }
        for s in &self.footer {
            out.push_str(s);
            out.push('\n');
        }
        out
    }

    /// Rescan-until-stable provider pass. Each rescan activates at most one
    /// provider, then looks at the updated text again; injected code can
    /// therefore trigger further providers. Registered providers take
    /// priority over instance providers from [`Emit::exist_var`].
    fn run_providers(&mut self) -> Result<(), CompileError> {
        let registry = self.registry;
        let providers = registry.providers();
        loop {
            let text = self.buffers_text();
            let blanked = blank_strings(&text);
            let mut names = HashSet::new();
            collect_identifiers(&text, &mut names);

            let mut fired = false;
            for (i, provider) in providers.iter().enumerate() {
                if self.provider_fired[i] {
                    continue;
                }
                let name_hit = names.contains(provider.name.as_str());
                let pattern_hit = provider
                    .pattern
                    .as_ref()
                    .map(|re| re.is_match(&blanked))
                    .unwrap_or(false);
                if !name_hit && !pattern_hit {
                    continue;
                }
                self.provider_fired[i] = true;
                if provider.unique && self.is_dependency {
                    // The enclosing unit injects; the inlined function sees
                    // the name through closure scope.
                    tracing::debug!(provider = %provider.name, "unique provider skipped in dependency");
                    fired = true;
                    break;
                }
                let on_call = provider.on_call.clone();
                let name = provider.name.clone();
                tracing::debug!(provider = %name, "variable provider activated");
                let mut hoist = Hoist {
                    cx: self,
                    name: name.as_str(),
                };
                on_call(&mut hoist)?;
                fired = true;
                break;
            }

            if !fired {
                let next = self
                    .extra_providers
                    .iter()
                    .enumerate()
                    .find(|(i, (name, _, _))| {
                        !self.extra_fired[*i] && names.contains(name.as_str())
                    })
                    .map(|(i, _)| i);
                if let Some(i) = next {
                    self.extra_fired[i] = true;
                    let (name, unique, on_call) = {
                        let (n, u, f) = &self.extra_providers[i];
                        (n.clone(), *u, f.clone())
                    };
                    if unique && self.is_dependency {
                        tracing::debug!(provider = %name, "unique provider skipped in dependency");
                    } else {
                        let mut hoist = Hoist {
                            cx: self,
                            name: name.as_str(),
                        };
                        on_call(&mut hoist)?;
                    }
                    fired = true;
                }
            }

            if !fired {
                return Ok(());
            }
        }
    }

    // ── assembly ────────────────────────────────────────────────────────────

    fn assemble(&self) -> String {
        let mut mappings = Vec::new();
        let mut out = String::new();
        let mut line = 1u32;
        for s in &self.header {
            out.push_str(s);
            out.push('\n');
            line += s.matches('\n').count() as u32 + 1;
        }
        for (s, loc) in &self.body {
            mappings.push(MapEntry {
                generated_line: line,
                line: loc.line,
                column: loc.column,
            });
            out.push_str(s);
            out.push('\n');
            line += s.matches('\n').count() as u32 + 1;
        }
        for s in &self.footer {
            out.push_str(s);
            out.push('\n');
        }
        out.push_str("return $out;");
        if !self.options.production && !self.is_dependency {
            out.push('\n');
            out.push_str(&encode_map(&mappings));
        }
        out
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// CALLBACK HANDLES
// ═════════════════════════════════════════════════════════════════════════════

/// Compiler handle passed to directive and element callbacks, scoped to the
/// node being compiled. Accessors return data borrowed from the node rather
/// than from the handle, so callers can hold clause lists across `write`
/// calls.
pub struct Emit<'a, 'r> {
    cx: &'a mut Compiler<'r>,
    node: &'a Node,
}

impl<'a, 'r> Emit<'a, 'r> {
    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn args(&self) -> &'a [String] {
        &self.node.args
    }

    pub fn argument(&self, index: usize) -> Option<&'a str> {
        self.node.args.get(index).map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&'a AttrValue> {
        self.node.attribute(name)
    }

    /// Attribute value normalized to an expression: `Expr` values pass
    /// through, literals become JS string literals.
    pub fn attribute_expr(&self, name: &str) -> Option<String> {
        match self.node.attribute(name) {
            Some(AttrValue::Expr(expr)) => Some(expr.clone()),
            Some(AttrValue::Literal(v)) => Some(js_string(v)),
            None => None,
        }
    }

    pub fn children(&self) -> &'a [Node] {
        &self.node.children
    }

    /// Chained clauses (`elseif`, `else`, `empty`) of this block.
    pub fn related(&self) -> &'a [Node] {
        &self.node.related
    }

    pub fn is_dependency(&self) -> bool {
        self.cx.is_dependency
    }

    /// Place a statement at the current output position.
    pub fn write(&mut self, code: &str) {
        self.cx.push_stmt(code.to_string(), self.node.loc);
    }

    /// Place a declaration in the emitted header.
    pub fn prologue(&mut self, code: &str) {
        self.cx.header.push(code.to_string());
    }

    /// Place a teardown statement before the terminal return.
    pub fn epilogue(&mut self, code: &str) {
        self.cx.footer.push(code.to_string());
    }

    /// Buffer literal output text.
    pub fn append_text(&mut self, text: &str) {
        self.cx.buffer_text(text, self.node.loc);
    }

    /// Append an expression's value to the output, escaped or raw.
    pub fn append_expr(&mut self, expr: &str, escaped: bool) {
        let stmt = if escaped {
            format!("$out += $esc({});", expr)
        } else {
            format!("$out += ({});", expr)
        };
        self.cx.push_stmt(stmt, self.node.loc);
    }

    pub fn render_children(&mut self) -> Result<(), CompileError> {
        self.cx.emit_nodes(&self.node.children)
    }

    pub fn render_nodes(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        self.cx.emit_nodes(nodes)
    }

    pub fn uid(&mut self, prefix: &str) -> String {
        self.cx.uid(prefix)
    }

    pub fn mark_async(&mut self) {
        self.cx.is_async = true;
    }

    /// Resolve, compile, and inline a dependency template, returning the
    /// identifier of the inlined function. Repeated requests for the same
    /// resolved path reuse the first inline.
    pub fn depend(&mut self, path: &str) -> Result<String, CompileError> {
        let resolved = self.cx.resolver.resolve(path)?;
        if let Some((_, id)) = self
            .cx
            .dependencies
            .iter()
            .find(|(p, _)| *p == resolved.path)
        {
            return Ok(id.clone());
        }

        let id = self.cx.uid("dep");
        let parsed = Parser::new(self.cx.registry).parse(&resolved.source);
        let mut nested =
            Compiler::nested(self.cx.registry, self.cx.resolver, self.cx.options.clone());
        let unit = nested.compile(&parsed.nodes, &[])?;
        tracing::debug!(path = %resolved.path, id = %id, "dependency inlined");

        if unit.is_async {
            self.cx.is_async = true;
        }
        let keyword = if unit.is_async { "async function" } else { "function" };
        self.cx.header.push(format!(
            "const {} = {} ($data) {{\n{}\n}};",
            id, keyword, unit.source
        ));
        self.cx.dependencies.push((resolved.path, id.clone()));
        Ok(id)
    }

    /// Register an instance provider: when `name` is referenced anywhere in
    /// the generated code, the callback runs once during the provider pass.
    /// A `unique` provider injects in top-level units only.
    pub fn exist_var<F>(&mut self, name: &str, unique: bool, on_call: F)
    where
        F: Fn(&mut Hoist) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        self.cx
            .extra_providers
            .push((name.to_string(), unique, std::sync::Arc::new(on_call)));
        self.cx.extra_fired.push(false);
    }

    /// A fatal error positioned at this node.
    pub fn error(&self, message: &str) -> CompileError {
        CompileError::new(ERR_CALLBACK, message, self.node.loc)
    }
}

/// Reduced handle passed to variable providers: header placement only, no
/// node context.
pub struct Hoist<'a, 'r> {
    cx: &'a mut Compiler<'r>,
    name: &'a str,
}

impl<'a, 'r> Hoist<'a, 'r> {
    /// The name whose reference triggered this provider.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Place a declaration in the emitted header.
    pub fn write(&mut self, code: &str) {
        self.cx.header.push(code.to_string());
    }

    /// Place a teardown statement before the terminal return.
    pub fn epilogue(&mut self, code: &str) {
        self.cx.footer.push(code.to_string());
    }

    pub fn uid(&mut self, prefix: &str) -> String {
        self.cx.uid(prefix)
    }

    pub fn mark_async(&mut self) {
        self.cx.is_async = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChildrenMode, DirectiveDefinition};
    use crate::sourcemap::decode_source_map;
    use pretty_assertions::assert_eq;

    fn compile_src(src: &str, options: CompileOptions) -> CompiledUnit {
        let registry = Registry::new();
        let parsed = Parser::new(&registry).parse(src);
        Compiler::new(&registry, &NullResolver, options)
            .compile(&parsed.nodes, &[])
            .unwrap()
    }

    fn prod(src: &str) -> CompiledUnit {
        compile_src(src, CompileOptions { production: true })
    }

    #[test]
    fn test_text_only_unit() {
        let unit = prod("hello <b>world</b>\n");
        assert!(unit.source.contains(r#"$out += "hello <b>world</b>\n";"#));
        assert!(unit.source.ends_with("return $out;"));
        assert!(!unit.is_async);
        assert!(unit.dependencies.is_empty());
    }

    #[test]
    fn test_adjacent_text_coalesces() {
        // The `@@` escape splits the source into several text nodes.
        let unit = prod("a@@b@@c");
        let stores = unit.source.matches("$out += ").count();
        assert_eq!(stores, 1);
        assert!(unit.source.contains(r#"$out += "a@b@c";"#));
    }

    #[test]
    fn test_interpolation_binds_and_escapes() {
        let unit = prod("Hello {{ name }}!");
        assert!(unit
            .source
            .contains("let name = $locals.name !== undefined ? $locals.name : $globals.name;"));
        assert!(unit.source.contains("$out += $esc(name);"));
    }

    #[test]
    fn test_raw_interpolation_never_escapes() {
        let unit = prod("{{{ html }}}");
        assert!(unit.source.contains("$out += (html);"));
        assert!(!unit.source.contains("$esc(html)"));
    }

    #[test]
    fn test_bindings_sorted() {
        let unit = prod("{{ zebra }}{{ apple }}{{ mango }}");
        let a = unit.source.find("let apple").unwrap();
        let m = unit.source.find("let mango").unwrap();
        let z = unit.source.find("let zebra").unwrap();
        assert!(a < m && m < z);
    }

    #[test]
    fn test_globals_and_runtime_names_not_bound() {
        let unit = prod("{{ JSON.stringify($out) }}{{ Math.max(a, b) }}");
        assert!(!unit.source.contains("let JSON"));
        assert!(!unit.source.contains("let Math"));
        assert!(!unit.source.contains("let $out = $locals"));
        assert!(unit.source.contains("let a ="));
        assert!(unit.source.contains("let b ="));
    }

    #[test]
    fn test_embedded_declarations_not_bound() {
        let unit = prod("{% let total = base * 2; %}{{ total }}");
        assert!(!unit.source.contains("let total = $locals"));
        assert!(unit.source.contains("let base = $locals.base"));
    }

    #[test]
    fn test_async_from_embedded_await() {
        let unit = prod("{% const rows = await fetchRows(); %}");
        assert!(unit.is_async);
        let quoted = prod("{% const s = \"await\"; %}");
        assert!(!quoted.is_async);
    }

    #[test]
    fn test_dev_mode_markers_and_map() {
        let unit = compile_src("a\n{% let x = 1;\nlet y = 2; %}", CompileOptions::default());
        assert!(unit.source.contains("/*:2*/ let x = 1;"));
        assert!(unit.source.contains("/*:3*/ let y = 2;"));
        assert!(unit.source.contains("//# quillMap="));
        let stripped = prod("a\n{% let x = 1; %}");
        assert!(!stripped.source.contains("/*:"));
        assert!(!stripped.source.contains("//# quillMap="));
    }

    #[test]
    fn test_map_follows_multiline_embedded_code() {
        let unit = compile_src("a\n{% let x = 1;\nlet y = 2; %}", CompileOptions::default());
        let entries = decode_source_map(&unit.source).unwrap();
        // Every marked line maps back to its own template line.
        for entry in entries.iter().filter(|e| e.line >= 2) {
            let line = unit
                .source
                .lines()
                .nth(entry.generated_line as usize - 1)
                .unwrap();
            assert!(line.starts_with(&format!("/*:{}*/", entry.line)));
        }
        assert!(entries.iter().any(|e| e.line == 2));
        assert!(entries.iter().any(|e| e.line == 3));
    }

    #[test]
    fn test_async_from_callback_written_code() {
        let mut registry = Registry::new();
        registry.add_directive(
            DirectiveDefinition::new("defer", |em: &mut Emit| {
                em.write("await $env.flush();");
                Ok(())
            })
            .children(ChildrenMode::Leaf),
        );
        let parsed = Parser::new(&registry).parse("@defer");
        let unit = Compiler::new(&registry, &NullResolver, CompileOptions { production: true })
            .compile(&parsed.nodes, &[])
            .unwrap();
        assert!(unit.source.contains("await $env.flush();"));
        assert!(unit.is_async);

        // A quoted occurrence in written code still does not count.
        let mut registry = Registry::new();
        registry.add_directive(
            DirectiveDefinition::new("label", |em: &mut Emit| {
                em.write("$out += \"await\";");
                Ok(())
            })
            .children(ChildrenMode::Leaf),
        );
        let parsed = Parser::new(&registry).parse("@label");
        let unit = Compiler::new(&registry, &NullResolver, CompileOptions { production: true })
            .compile(&parsed.nodes, &[])
            .unwrap();
        assert!(!unit.is_async);
    }

    #[test]
    fn test_extra_locals_suppress_binding() {
        let registry = Registry::new();
        let parsed = Parser::new(&registry).parse("{{ ctx }}{{ other }}");
        let unit = Compiler::new(&registry, &NullResolver, CompileOptions { production: true })
            .compile(&parsed.nodes, &["ctx".to_string()])
            .unwrap();
        assert!(!unit.source.contains("let ctx ="));
        assert!(unit.source.contains("let other ="));
    }

    #[test]
    fn test_null_resolver_rejects() {
        let err = NullResolver.resolve("partials/head").unwrap_err();
        assert_eq!(err.code, ERR_DEPENDENCY);
    }
}

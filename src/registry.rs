//! Directive, element-matcher, and variable-provider registry.
//!
//! The registry is populated once during engine setup and then shared by
//! reference into every parser and compiler instance. Nothing here mutates
//! after setup, so concurrent compiles over the same registry are safe; all
//! callback types are `Send + Sync`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::codegen::{Emit, Hoist};
use crate::error::CompileError;

pub type DirectiveFn = Box<dyn Fn(&mut Emit) -> Result<(), CompileError> + Send + Sync>;
pub type ElementFn = Box<dyn Fn(&mut Emit) -> Result<(), CompileError> + Send + Sync>;
pub type ProviderFn = Arc<dyn Fn(&mut Hoist) -> Result<(), CompileError> + Send + Sync>;

/// Whether a directive opens a block during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildrenMode {
    /// Always a block; a close directive ends it.
    Block,
    /// Never a block; the directive is a leaf.
    Leaf,
    /// A block only when a matching close can be found ahead in the source.
    Auto,
}

/// Scope hint consumed by the compiler's declaration analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindHint {
    #[default]
    None,
    /// First argument is an iteration head; names left of `of`/`in` are
    /// declared inside the block.
    Iteration,
    /// First argument is a local binding; names left of `=` are declared.
    Local,
}

/// Declared argument arity, enforced at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub min: usize,
    pub max: Option<usize>,
}

pub struct DirectiveDefinition {
    pub name: String,
    pub params: Option<ParamSpec>,
    pub children: ChildrenMode,
    /// Sub-directives that chain onto this block (`elseif`, `else`, `empty`).
    pub chains: Vec<DirectiveDefinition>,
    pub binds: BindHint,
    pub on_call: Option<DirectiveFn>,
}

impl DirectiveDefinition {
    pub fn new<F>(name: &str, on_call: F) -> Self
    where
        F: Fn(&mut Emit) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        DirectiveDefinition {
            name: name.to_string(),
            params: None,
            children: ChildrenMode::Block,
            chains: Vec::new(),
            binds: BindHint::None,
            on_call: Some(Box::new(on_call)),
        }
    }

    /// A definition with no callback of its own, used for chain clauses the
    /// governing directive renders itself.
    pub fn marker(name: &str) -> Self {
        DirectiveDefinition {
            name: name.to_string(),
            params: None,
            children: ChildrenMode::Leaf,
            chains: Vec::new(),
            binds: BindHint::None,
            on_call: None,
        }
    }

    pub fn children(mut self, mode: ChildrenMode) -> Self {
        self.children = mode;
        self
    }

    pub fn params(mut self, min: usize, max: Option<usize>) -> Self {
        self.params = Some(ParamSpec { min, max });
        self
    }

    pub fn chain(mut self, def: DirectiveDefinition) -> Self {
        self.chains.push(def);
        self
    }

    pub fn binds(mut self, hint: BindHint) -> Self {
        self.binds = hint;
        self
    }
}

impl fmt::Debug for DirectiveDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveDefinition")
            .field("name", &self.name)
            .field("children", &self.children)
            .field("chains", &self.chains.iter().map(|c| &c.name).collect::<Vec<_>>())
            .finish()
    }
}

/// How an element matcher recognizes tag names.
#[derive(Debug, Clone)]
pub enum MatcherName {
    Exact(String),
    /// Trailing-wildcard form (`x-*` matches every tag starting with `x-`).
    Wildcard(String),
    Pattern(Regex),
}

pub struct ElementMatcher {
    pub name: MatcherName,
    pub on_call: ElementFn,
}

impl ElementMatcher {
    pub fn new<F>(name: &str, on_call: F) -> Self
    where
        F: Fn(&mut Emit) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        let name = match name.strip_suffix('*') {
            Some(prefix) => MatcherName::Wildcard(prefix.to_string()),
            None => MatcherName::Exact(name.to_string()),
        };
        ElementMatcher {
            name,
            on_call: Box::new(on_call),
        }
    }

    pub fn pattern<F>(pattern: Regex, on_call: F) -> Self
    where
        F: Fn(&mut Emit) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        ElementMatcher {
            name: MatcherName::Pattern(pattern),
            on_call: Box::new(on_call),
        }
    }

    fn matches(&self, tag: &str) -> bool {
        match &self.name {
            MatcherName::Exact(n) => n == tag,
            MatcherName::Wildcard(prefix) => tag.starts_with(prefix.as_str()),
            MatcherName::Pattern(re) => re.is_match(tag),
        }
    }
}

impl fmt::Debug for ElementMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementMatcher").field("name", &self.name).finish()
    }
}

/// A lazily activated code injector; see the compiler's fixed-point pass.
pub struct VariableProvider {
    pub name: String,
    /// Optional extra trigger pattern matched against the string-blanked
    /// generated code; a reference to the name triggers either way.
    pub pattern: Option<Regex>,
    /// Activates in top-level units only; marked triggered-but-skipped inside
    /// dependencies.
    pub unique: bool,
    pub on_call: ProviderFn,
}

impl VariableProvider {
    pub fn new<F>(name: &str, on_call: F) -> Self
    where
        F: Fn(&mut Hoist) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        VariableProvider {
            name: name.to_string(),
            pattern: None,
            unique: false,
            on_call: Arc::new(on_call),
        }
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl fmt::Debug for VariableProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableProvider")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .finish()
    }
}

/// Read-mostly tables of directive and element-matcher definitions.
#[derive(Debug, Default)]
pub struct Registry {
    directives: HashMap<String, DirectiveDefinition>,
    /// Every structural directive name, top-level and chained, for the
    /// parser's longest-prefix resolution.
    known_names: HashSet<String>,
    matchers: Vec<ElementMatcher>,
    providers: Vec<VariableProvider>,
    verbatim_tags: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn add_directive(&mut self, def: DirectiveDefinition) -> &mut Self {
        self.known_names.insert(def.name.clone());
        for chain in &def.chains {
            self.known_names.insert(chain.name.clone());
        }
        self.directives.insert(def.name.clone(), def);
        self
    }

    pub fn add_element(&mut self, matcher: ElementMatcher) -> &mut Self {
        self.matchers.push(matcher);
        self
    }

    pub fn add_provider(&mut self, provider: VariableProvider) -> &mut Self {
        self.providers.push(provider);
        self
    }

    /// Mark a tag as a verbatim container: its inner text is not tag-parsed,
    /// but interpolation still works inside it.
    pub fn add_verbatim_tag(&mut self, tag: &str) -> &mut Self {
        self.verbatim_tags.insert(tag.to_string());
        self
    }

    pub fn directive(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directives.get(name)
    }

    pub fn providers(&self) -> &[VariableProvider] {
        &self.providers
    }

    /// Resolve a scanned identifier to the longest registered directive name,
    /// truncating trailing characters until a registered prefix is found.
    /// Disambiguates directives whose names are prefixes of longer
    /// identifiers (`@endif` vs. an `@end` in front of `if`-looking text).
    pub fn resolve_directive_name<'a>(&self, ident: &'a str) -> Option<&'a str> {
        let mut candidate = ident;
        while !candidate.is_empty() {
            if self.known_names.contains(candidate) {
                return Some(candidate);
            }
            let mut iter = candidate.char_indices();
            let (last, _) = iter.next_back()?;
            candidate = &candidate[..last];
        }
        None
    }

    /// Does `name` chain onto a block opened by `parent`?
    pub fn is_chain(&self, parent: &str, name: &str) -> bool {
        self.directives
            .get(parent)
            .map(|def| def.chains.iter().any(|c| c.name == name))
            .unwrap_or(false)
    }

    /// Is this tag structural at all (matched or verbatim)?
    pub fn is_element(&self, tag: &str) -> bool {
        self.verbatim_tags.contains(tag) || self.matchers.iter().any(|m| m.matches(tag))
    }

    pub fn is_verbatim(&self, tag: &str) -> bool {
        self.verbatim_tags.contains(tag)
    }

    /// Matcher lookup in priority order: exact name, then trailing-wildcard,
    /// then pattern.
    pub fn match_element(&self, tag: &str) -> Option<&ElementMatcher> {
        self.matchers
            .iter()
            .find(|m| matches!(&m.name, MatcherName::Exact(n) if n == tag))
            .or_else(|| {
                self.matchers.iter().find(
                    |m| matches!(&m.name, MatcherName::Wildcard(p) if tag.starts_with(p.as_str())),
                )
            })
            .or_else(|| {
                self.matchers
                    .iter()
                    .find(|m| matches!(&m.name, MatcherName::Pattern(re) if re.is_match(tag)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_registry() -> Registry {
        let mut reg = Registry::new();
        reg.add_directive(
            DirectiveDefinition::new("if", |_: &mut Emit| Ok(()))
                .chain(DirectiveDefinition::marker("elseif"))
                .chain(DirectiveDefinition::marker("else")),
        );
        reg.add_directive(DirectiveDefinition::new("include", |_: &mut Emit| Ok(())).children(ChildrenMode::Leaf));
        reg
    }

    #[test]
    fn test_resolve_directive_name_truncation() {
        let reg = noop_registry();
        assert_eq!(reg.resolve_directive_name("if"), Some("if"));
        // `@iframe`-style text: truncates back to the registered prefix.
        assert_eq!(reg.resolve_directive_name("iffy"), Some("if"));
        assert_eq!(reg.resolve_directive_name("elseif"), Some("elseif"));
        assert_eq!(reg.resolve_directive_name("unknown"), None);
    }

    #[test]
    fn test_is_chain() {
        let reg = noop_registry();
        assert!(reg.is_chain("if", "elseif"));
        assert!(reg.is_chain("if", "else"));
        assert!(!reg.is_chain("if", "empty"));
        assert!(!reg.is_chain("include", "else"));
    }

    #[test]
    fn test_match_element_priority() {
        let mut reg = Registry::new();
        reg.add_element(ElementMatcher::pattern(
            Regex::new("^x-.*ink$").unwrap(),
            |em: &mut Emit| {
                em.write("pattern");
                Ok(())
            },
        ));
        reg.add_element(ElementMatcher::new("x-*", |em: &mut Emit| {
            em.write("wildcard");
            Ok(())
        }));
        reg.add_element(ElementMatcher::new("x-link", |em: &mut Emit| {
            em.write("exact");
            Ok(())
        }));

        assert!(matches!(
            reg.match_element("x-link").unwrap().name,
            MatcherName::Exact(_)
        ));
        assert!(matches!(
            reg.match_element("x-button").unwrap().name,
            MatcherName::Wildcard(_)
        ));
        assert!(reg.match_element("div").is_none());
        assert!(reg.is_element("x-anything"));
    }

    #[test]
    fn test_verbatim_tags() {
        let mut reg = Registry::new();
        reg.add_verbatim_tag("script");
        assert!(reg.is_verbatim("script"));
        assert!(reg.is_element("script"));
        assert!(reg.match_element("script").is_none());
    }
}

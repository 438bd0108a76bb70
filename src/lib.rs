//! Quill template compiler core.
//!
//! Two cooperating halves:
//!
//! - [`parse`]: a single-pass scanner turning template source into a forest
//!   of [`ast::Node`]s. Directives, structural elements, and verbatim
//!   containers are all defined by the caller through a [`registry::Registry`];
//!   the parser itself knows only the delimiter grammar.
//! - [`codegen`]: walks the forest and emits the body of a rendering
//!   function, handing each directive and matched element to its registry
//!   callback. Scope analysis auto-binds free identifiers from render data,
//!   dependencies are compiled and inlined as nested functions, and variable
//!   providers inject declarations on demand until the output is stable.
//!
//! Parsing never fails; all fatal conditions surface as
//! [`error::CompileError`] during compilation.

mod ast;
mod codegen;
mod error;
mod parse;
mod registry;
mod scan;
mod sourcemap;


pub use ast::{AttrValue, Node, NodeKind, SourceLocation};
pub use codegen::{
    CompileOptions, CompiledUnit, Compiler, DependencyResolver, Emit, Hoist, NullResolver,
    ResolvedSource,
};
pub use error::{CompileError, ERR_ARITY, ERR_CALLBACK, ERR_DEPENDENCY};
pub use parse::{ParseOutcome, Parser, UnterminatedBlock};
pub use registry::{
    BindHint, ChildrenMode, DirectiveDefinition, ElementMatcher, MatcherName, ParamSpec, Registry,
    VariableProvider,
};
pub use sourcemap::{decode_source_map, MapEntry};

//! Library operations
//!
//! Built-in operations are not special-cased by the lowering code. Each one
//! implements [`LibraryOp`] (or [`ChainLink`] for fluent chains) and is looked
//! up by name in a [`LibraryRegistry`] that is built once and passed by
//! reference to every lowering pass.
//!
//! Operations receive their executor and arguments already lowered to atoms.
//! They may only allocate through the [`SmtModule`] entry points and may emit
//! any [`SmtCmd`], including their own [`LibraryCmd`] implementations.

pub mod entities;
pub mod random;
pub mod text;

use crate::smt::{FuncId, Linker, SmtAtom, SmtCmd, SmtError, SmtModule};
use std::collections::HashMap;
use std::fmt;

/// Commands and result atom produced by a library operation
pub type Lowered = (Vec<SmtCmd>, SmtAtom);

/// A command only a library operation knows how to render
pub trait LibraryCmd: fmt::Debug {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError>;

    /// Constants and variables the command reads
    fn atoms(&self) -> Vec<&SmtAtom>;
}

/// A named built-in operation, e.g. `print` or `kill`
pub trait LibraryOp {
    fn name(&self) -> &'static str;

    /// `params` are the positional arguments, `extra` the variadic tail
    fn lower(
        &self,
        executor: SmtAtom,
        params: Vec<SmtAtom>,
        extra: Vec<SmtAtom>,
        module: &mut SmtModule,
        func: FuncId,
    ) -> Result<Lowered, SmtError>;
}

/// State accumulated while walking a fluent chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainData {
    pub executor: SmtAtom,
    /// Set once a link has chosen what the chain selects from
    pub source: Option<&'static str>,
    pub tags: Vec<String>,
    pub limit: Option<i64>,
}

impl ChainData {
    pub fn new(executor: SmtAtom) -> Self {
        ChainData {
            executor,
            source: None,
            tags: Vec::new(),
            limit: None,
        }
    }
}

/// One step of a fluent chain. Intermediate links only record data; the
/// terminal link turns the accumulated data into commands.
pub trait ChainLink {
    fn name(&self) -> &'static str;

    fn is_terminal(&self) -> bool {
        false
    }

    fn apply(&self, data: &mut ChainData, args: &[SmtAtom]) -> Result<(), SmtError>;

    fn lower(
        &self,
        data: ChainData,
        _module: &mut SmtModule,
        _func: FuncId,
    ) -> Result<Lowered, SmtError> {
        Err(SmtError::Representation(format!(
            "chain link `{}` cannot end a chain (data: {:?})",
            self.name(),
            data
        )))
    }
}

/// Every operation and chain link available to lowering
pub struct LibraryRegistry {
    ops: HashMap<&'static str, Box<dyn LibraryOp>>,
    links: HashMap<&'static str, Box<dyn ChainLink>>,
}

impl fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ops: Vec<&str> = self.ops.keys().copied().collect();
        ops.sort_unstable();
        let mut links: Vec<&str> = self.links.keys().copied().collect();
        links.sort_unstable();
        f.debug_struct("LibraryRegistry")
            .field("ops", &ops)
            .field("links", &links)
            .finish()
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl LibraryRegistry {
    /// A registry with nothing in it
    pub fn empty() -> Self {
        LibraryRegistry {
            ops: HashMap::new(),
            links: HashMap::new(),
        }
    }

    /// The standard library shipped with the compiler
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(text::Print));
        registry.register(Box::new(random::RandomInt));
        registry.register(Box::new(entities::Kill));
        registry.register(Box::new(entities::TagEdit::Add));
        registry.register(Box::new(entities::TagEdit::Remove));
        registry.register_link(Box::new(entities::GetEntities));
        registry.register_link(Box::new(entities::WithTag));
        registry.register_link(Box::new(entities::Limit));
        registry.register_link(Box::new(entities::Select::Find));
        registry.register_link(Box::new(entities::Select::First));
        registry
    }

    /// Add an operation; a later registration replaces an earlier one
    pub fn register(&mut self, op: Box<dyn LibraryOp>) {
        self.ops.insert(op.name(), op);
    }

    pub fn register_link(&mut self, link: Box<dyn ChainLink>) {
        self.links.insert(link.name(), link);
    }

    pub fn op(&self, name: &str) -> Result<&dyn LibraryOp, SmtError> {
        self.ops.get(name).map(|op| op.as_ref()).ok_or_else(|| {
            SmtError::Representation(format!("unknown library operation `{}`", name))
        })
    }

    pub fn link(&self, name: &str) -> Result<&dyn ChainLink, SmtError> {
        self.links.get(name).map(|link| link.as_ref()).ok_or_else(|| {
            SmtError::Representation(format!("unknown chain link `{}`", name))
        })
    }
}

/// The constant string an argument must be, e.g. a tag name
pub(crate) fn constant_str<'a>(op: &str, atom: &'a SmtAtom) -> Result<&'a str, SmtError> {
    match atom {
        SmtAtom::Str(s) => Ok(s),
        other => Err(SmtError::Representation(format!(
            "`{}` needs a constant string, got {:?}",
            op, other
        ))),
    }
}

pub(crate) fn constant_int(op: &str, atom: &SmtAtom) -> Result<i64, SmtError> {
    match atom {
        SmtAtom::Int(v) => Ok(*v),
        other => Err(SmtError::Representation(format!(
            "`{}` needs a constant integer, got {:?}",
            op, other
        ))),
    }
}

/// Check a positional argument count
pub(crate) fn expect_args(op: &str, args: &[SmtAtom], count: usize) -> Result<(), SmtError> {
    if args.len() != count {
        return Err(SmtError::Representation(format!(
            "`{}` takes {} argument(s), got {}",
            op,
            count,
            args.len()
        )));
    }
    Ok(())
}

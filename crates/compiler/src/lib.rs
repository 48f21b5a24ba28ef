//! Cascade Compiler Library
//!
//! Lowers a validated contextual tree into a datapack: structured control flow
//! becomes route-addressed command fragments, and every variable gets one
//! address per stack level so recursive calls never share state.
//!
//! # Pipeline
//!
//! ```text
//! CtxModule --lower_module--> SmtModule --Linker::link--> addresses
//!           --render_datapack--> Vec<DatapackFile> --write_datapack--> disk
//! ```
//!
//! # Extending the Compiler
//!
//! Library operations live in a [`LibraryRegistry`]; register additional
//! [`library::LibraryOp`]s and lower with [`compile_module_with_library`]:
//!
//! ```rust,ignore
//! use cascadec::{CompilerConfig, LibraryRegistry, compile_module_with_library};
//!
//! let mut library = LibraryRegistry::standard();
//! library.register(Box::new(MyOp));
//! let files = compile_module_with_library(&ctx, &CompilerConfig::new(), &library)?;
//! ```

pub mod call_graph;
pub mod config;
pub mod ctx;
pub mod datapack;
pub mod library;
pub mod smt;
pub mod types;

pub use call_graph::CallGraph;
pub use config::CompilerConfig;
pub use ctx::{CtxExpr, CtxFunc, CtxModule, CtxStmnt};
pub use datapack::{DatapackFile, render_datapack, write_datapack};
pub use library::LibraryRegistry;
pub use smt::{Linker, SmtError, SmtModule, lower_module};
pub use types::Type;

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Compile a contextual tree into datapack files with the standard library
pub fn compile_module(ctx: &CtxModule, config: &CompilerConfig) -> Result<Vec<DatapackFile>, String> {
    compile_module_with_library(ctx, config, &LibraryRegistry::standard())
}

/// Compile a contextual tree into datapack files with a custom library
pub fn compile_module_with_library(
    ctx: &CtxModule,
    config: &CompilerConfig,
    library: &LibraryRegistry,
) -> Result<Vec<DatapackFile>, String> {
    config.validate()?;
    let module = lower_module(ctx, library)?;
    let linker = Linker::link(&module, config)?;
    Ok(render_datapack(&module, &linker, config)?)
}

/// Read a contextual tree from a JSON file
pub fn load_tree(path: &Path) -> Result<CtxModule, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&source).map_err(|e| format!("Invalid tree in {}: {}", path.display(), e))
}

/// Compile a JSON tree file into a datapack directory; returns the file count
pub fn compile_file(input: &Path, out_dir: &Path, config: &CompilerConfig) -> Result<usize, String> {
    let ctx = load_tree(input)?;
    let files = compile_module(&ctx, config)?;
    write_datapack(&files, out_dir)?;
    Ok(files.len())
}

/// Human-readable listing of every function's fragment graph
pub fn describe_fragments(ctx: &CtxModule) -> Result<String, String> {
    let module = lower_module(ctx, &LibraryRegistry::standard())?;
    let mut out = String::new();
    for func in module.functions() {
        let _ = writeln!(out, "{}", func.name());
        for (_, fragment) in func.graph().iter() {
            let depth = fragment.route().len();
            let _ = writeln!(
                out,
                "{}{} ({} commands)",
                "  ".repeat(depth + 1),
                fragment.name(),
                fragment.commands().len()
            );
        }
    }
    Ok(out)
}

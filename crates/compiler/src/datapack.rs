//! Datapack output
//!
//! Turns a linked module into the files of a datapack:
//!
//! - `pack.mcmeta`
//! - a `load` function that creates the objectives, fills the constant
//!   registers and runs the script at stack level 0
//! - the stack-overflow handler
//! - one alias per public function, callable by name from outside the pack
//! - one file per (function, reachable stack level, fragment)

use crate::config::CompilerConfig;
use crate::smt::atom::{SmtAtom, Slot};
use crate::smt::command::SmtCmd;
use crate::smt::linker::sanitize;
use crate::smt::{Address, FragmentId, Linker, SmtError, SmtFunc, SmtModule};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One output file, relative to the datapack root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatapackFile {
    pub path: String,
    pub contents: String,
}

impl DatapackFile {
    fn function(namespace: &str, resource: &str, lines: Vec<String>) -> Self {
        let mut contents = lines.join("\n");
        contents.push('\n');
        DatapackFile {
            path: format!("data/{}/function/{}.mcfunction", namespace, resource),
            contents,
        }
    }
}

#[derive(Serialize)]
struct PackMeta<'a> {
    pack: PackInfo<'a>,
}

#[derive(Serialize)]
struct PackInfo<'a> {
    pack_format: u32,
    description: &'a str,
}

#[derive(Serialize)]
struct FunctionTag {
    values: Vec<String>,
}

const LOAD_RESOURCE: &str = "load";

/// Render every file of the datapack, in a stable order
pub fn render_datapack(
    module: &SmtModule,
    linker: &Linker,
    config: &CompilerConfig,
) -> Result<Vec<DatapackFile>, SmtError> {
    let ns = linker.namespace();
    let mut files = vec![
        DatapackFile {
            path: "pack.mcmeta".to_string(),
            contents: to_json(&PackMeta {
                pack: PackInfo {
                    pack_format: config.pack_format,
                    description: &config.pack_description,
                },
            })?,
        },
        DatapackFile {
            path: "data/minecraft/tags/function/load.json".to_string(),
            contents: to_json(&FunctionTag {
                values: vec![linker.function_id(LOAD_RESOURCE)],
            })?,
        },
        DatapackFile::function(ns, LOAD_RESOURCE, load_lines(linker)?),
        DatapackFile::function(
            ns,
            &linker.overflow_resource(),
            vec![format!(
                "tellraw @a {}",
                serde_json::json!({
                    "text": format!(
                        "{}: stack overflow (maximum recursion depth {} exceeded)",
                        ns,
                        linker.max_depth()
                    ),
                    "color": "red"
                })
            )],
        ),
    ];

    let mut aliases: HashMap<String, &str> = HashMap::new();
    for func in module.functions().filter(|f| f.is_public() && !f.is_script()) {
        let resource = sanitize(func.name());
        if resource == LOAD_RESOURCE || resource == "gen" {
            return Err(SmtError::Virtualization(format!(
                "public function `{}` would shadow a generated function",
                func.name()
            )));
        }
        if let Some(other) = aliases.insert(resource.clone(), func.name()) {
            return Err(SmtError::Virtualization(format!(
                "public functions `{}` and `{}` share the name `{}`",
                other,
                func.name(),
                resource
            )));
        }
        files.push(DatapackFile::function(ns, &resource, alias_lines(func, linker)?));
    }

    let mut fragments = 0;
    for func in module.functions() {
        let levels = linker.levels(func.id());
        if levels.is_empty() {
            debug!("{} is unreachable, nothing emitted", func.name());
            continue;
        }
        for level in levels {
            for (id, fragment) in func.graph().iter() {
                let mut lines = Vec::new();
                for cmd in fragment.commands() {
                    lines.extend(cmd.render(linker, level)?);
                }
                let resource = linker.fragment_resource(func.id(), level, id)?;
                files.push(DatapackFile::function(ns, &resource, lines));
                fragments += 1;
            }
        }
    }

    info!(
        "Rendered {} fragment files ({} files total)",
        fragments,
        files.len()
    );
    Ok(files)
}

/// Objectives, constant registers, then the script
fn load_lines(linker: &Linker) -> Result<Vec<String>, SmtError> {
    let mut lines = vec![
        format!("scoreboard objectives add {} dummy", linker.objective()),
        format!("scoreboard objectives add {} dummy", linker.const_objective()),
    ];
    for (value, address) in linker.constants() {
        lines.push(format!(
            "scoreboard players set {} {}",
            address.score_ref()?,
            value
        ));
    }
    lines.push(format!(
        "function {}",
        linker.fragment_target(SmtModule::SCRIPT, 0, FragmentId(0))?
    ));
    Ok(lines)
}

/// Entry point for calls from outside the pack: bind defaults and `@s` at
/// level 0, then run the level-0 entry
fn alias_lines(func: &SmtFunc, linker: &Linker) -> Result<Vec<String>, SmtError> {
    let mut lines = Vec::new();
    if let Some(slots) = func.slots() {
        for (param, default) in slots.params.iter().zip(&slots.defaults) {
            if let Some(default) = default {
                let bind = SmtCmd::assign(Slot::current(param.clone()), SmtAtom::var(default.clone()));
                lines.extend(bind.render(linker, 0)?);
            }
        }
        if let Address::Tag { tag, .. } = linker.address(&Slot::current(slots.executor.clone()), 0)? {
            lines.push(format!("tag @e[tag={}] remove {}", tag, tag));
            lines.push(format!("tag @s add {}", tag));
        }
    }
    lines.push(format!(
        "function {}",
        linker.fragment_target(func.id(), 0, FragmentId(0))?
    ));
    Ok(lines)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, SmtError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SmtError::Virtualization(format!("cannot serialize JSON: {}", e)))
}

/// Write rendered files below `out_dir`, creating directories as needed
pub fn write_datapack(files: &[DatapackFile], out_dir: &Path) -> Result<(), String> {
    for file in files {
        let path = out_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        fs::write(&path, &file.contents)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    }
    info!("Wrote {} files to {}", files.len(), out_dir.display());
    Ok(())
}

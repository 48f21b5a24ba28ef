//! Linker
//!
//! Runs exactly once, after every function has been lowered. It walks the
//! whole module and assigns:
//!
//! - every variable a table of concrete addresses, one per stack level
//! - every function the set of stack levels it is reachable at
//! - every integer constant a read-only register
//!
//! Addresses embed the stack level, so two activations of the same function
//! at different depths never share state. Variables owned by the script always
//! resolve at level 0: the script only ever runs at the bottom of the stack.

use super::atom::{FuncId, SmtAtom, Slot, SmtVar, VarId};
use super::error::SmtError;
use super::fragment::FragmentId;
use super::module::SmtModule;
use crate::call_graph::CallGraph;
use crate::config::CompilerConfig;
use crate::types::TypeFamily;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// A concrete location on the target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Scoreboard score: `<holder> <objective>`
    Score { holder: String, objective: String },
    /// Entity tag; solitary executors select at most one entity
    Tag { tag: String, solitary: bool },
    /// Command storage: `<namespace:name> <path>`
    Storage { storage: String, path: String },
    /// The world has no address; reads and writes are no-ops
    World,
}

impl Address {
    /// `<holder> <objective>`, as used by scoreboard commands
    pub fn score_ref(&self) -> Result<String, SmtError> {
        match self {
            Address::Score { holder, objective } => Ok(format!("{} {}", holder, objective)),
            other => Err(SmtError::Virtualization(format!(
                "{} is not a score address",
                other
            ))),
        }
    }

    /// `storage <namespace:name> <path>`, as used by `data` commands
    pub fn storage_ref(&self) -> Result<String, SmtError> {
        match self {
            Address::Storage { storage, path } => Ok(format!("storage {} {}", storage, path)),
            other => Err(SmtError::Virtualization(format!(
                "{} is not a storage address",
                other
            ))),
        }
    }

    /// Entity selector for a tag address
    pub fn selector(&self) -> Option<String> {
        match self {
            Address::Tag {
                tag,
                solitary: true,
            } => Some(format!("@e[tag={},limit=1]", tag)),
            Address::Tag {
                tag,
                solitary: false,
            } => Some(format!("@e[tag={}]", tag)),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Score { holder, objective } => write!(f, "score {} {}", holder, objective),
            Address::Tag { tag, .. } => write!(f, "tag {}", tag),
            Address::Storage { storage, path } => write!(f, "storage {} {}", storage, path),
            Address::World => write!(f, "world"),
        }
    }
}

/// The addresses of one variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarLinkage {
    /// Owned by the script: one address, whatever the level
    Root(Address),
    /// One address per stack level, `0..=max_depth + 1`
    Levels(Vec<Address>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    namespace: String,
    objective: String,
    const_objective: String,
    storage: String,
    max_depth: usize,
    vars: BTreeMap<VarId, VarLinkage>,
    /// Directory name per function, indexed by `FuncId`
    dirs: Vec<String>,
    /// Fragment names per function, indexed by `FragmentId`
    fragments: Vec<Vec<String>>,
    levels: BTreeMap<FuncId, BTreeSet<usize>>,
    constants: BTreeSet<i64>,
}

impl Linker {
    /// Link a fully lowered module
    pub fn link(module: &SmtModule, config: &CompilerConfig) -> Result<Linker, SmtError> {
        let max_depth = config.max_recursion_depth;
        let mut linker = Linker {
            namespace: config.namespace.clone(),
            objective: config.objective.clone(),
            const_objective: config.const_objective.clone(),
            storage: format!("{}:{}", config.namespace, config.storage),
            max_depth,
            vars: BTreeMap::new(),
            dirs: Vec::new(),
            fragments: Vec::new(),
            levels: BTreeMap::new(),
            constants: BTreeSet::from([0, 1]),
        };

        for func in module.functions() {
            let dir = if func.is_script() {
                "script".to_string()
            } else {
                format!("f{}_{}", func.id().0, sanitize(func.name()))
            };
            linker.dirs.push(dir);
            linker
                .fragments
                .push(func.graph().iter().map(|(_, f)| f.name()).collect());

            for var in func.vars() {
                let linkage = if func.is_script() {
                    VarLinkage::Root(linker.var_address(&var, 0, config))
                } else {
                    VarLinkage::Levels(
                        (0..=max_depth + 1)
                            .map(|level| linker.var_address(&var, level, config))
                            .collect(),
                    )
                };
                linker.vars.insert(var.id, linkage);
            }

            for (_, fragment) in func.graph().iter() {
                for cmd in fragment.commands() {
                    for atom in cmd.atoms() {
                        if let SmtAtom::Int(v) = atom {
                            linker.constants.insert(*v);
                        }
                    }
                }
            }
        }

        let roots: Vec<String> = module
            .functions()
            .filter(|f| f.is_public())
            .map(|f| f.name().to_string())
            .collect();
        let reachable = CallGraph::from_module(module).reachable_levels(&roots, max_depth);
        for func in module.functions() {
            if let Some(levels) = reachable.get(func.name()) {
                linker.levels.insert(func.id(), levels.clone());
            }
        }

        debug!(
            "Linked {} variables, {} constants, {} reachable functions",
            linker.vars.len(),
            linker.constants.len(),
            linker.levels.len()
        );
        Ok(linker)
    }

    fn var_address(&self, var: &SmtVar, level: usize, config: &CompilerConfig) -> Address {
        let name = format!(
            "f{}.{}{}.s{}",
            var.id.owner.0,
            var.id.kind.token(),
            var.id.index,
            level
        );
        match var.ty.family() {
            TypeFamily::IntCoercible => Address::Score {
                holder: format!(
                    "$f{}_{}{}_s{}",
                    var.id.owner.0,
                    var.id.kind.token(),
                    var.id.index,
                    level
                ),
                objective: config.objective.clone(),
            },
            TypeFamily::Executor if var.ty.is_world() => Address::World,
            TypeFamily::Executor => Address::Tag {
                tag: format!("{}.{}", config.tag_prefix, name),
                solitary: !var.ty.is_group(),
            },
            TypeFamily::OtherScalar | TypeFamily::Struct => Address::Storage {
                storage: self.storage.clone(),
                path: name,
            },
        }
    }

    /// Address of `slot` when its command renders at `level`
    pub fn address(&self, slot: &Slot, level: usize) -> Result<Address, SmtError> {
        let linkage = self.vars.get(&slot.var.id).ok_or_else(|| {
            SmtError::Virtualization(format!("variable {:?} was never linked", slot.var.id))
        })?;
        match linkage {
            VarLinkage::Root(address) => Ok(address.clone()),
            VarLinkage::Levels(levels) => {
                let effective = level + slot.frame.offset();
                levels.get(effective).cloned().ok_or_else(|| {
                    SmtError::Virtualization(format!(
                        "variable {:?} has no address at stack level {}",
                        slot.var.id, effective
                    ))
                })
            }
        }
    }

    /// Read-only register holding `value`
    pub fn constant(&self, value: i64) -> Result<Address, SmtError> {
        if !self.constants.contains(&value) {
            return Err(SmtError::Virtualization(format!(
                "constant {} was not collected while linking",
                value
            )));
        }
        Ok(self.constant_address(value))
    }

    fn constant_address(&self, value: i64) -> Address {
        Address::Score {
            holder: format!("#c{}", value),
            objective: self.const_objective.clone(),
        }
    }

    /// Every constant register with its value, in ascending order
    pub fn constants(&self) -> impl Iterator<Item = (i64, Address)> + '_ {
        self.constants
            .iter()
            .map(|&value| (value, self.constant_address(value)))
    }

    /// Shared scratch location for commands that need a temporary
    pub fn scratch(&self, name: &str) -> Address {
        Address::Storage {
            storage: self.storage.clone(),
            path: format!("scratch.{}", name),
        }
    }

    /// Stack levels `func` is emitted at; empty when unreachable
    pub fn levels(&self, func: FuncId) -> Vec<usize> {
        self.levels
            .get(&func)
            .map(|levels| levels.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn const_objective(&self) -> &str {
        &self.const_objective
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    /// Path of a fragment file inside the namespace's function directory
    pub fn fragment_resource(
        &self,
        func: FuncId,
        level: usize,
        fragment: FragmentId,
    ) -> Result<String, SmtError> {
        if !self.levels.get(&func).is_some_and(|l| l.contains(&level)) {
            return Err(SmtError::Virtualization(format!(
                "function {:?} is not reachable at stack level {}",
                func, level
            )));
        }
        let dir = self.dirs.get(func.0).ok_or_else(|| {
            SmtError::Virtualization(format!("function {:?} was never linked", func))
        })?;
        let name = self
            .fragments
            .get(func.0)
            .and_then(|names| names.get(fragment.0))
            .ok_or_else(|| {
                SmtError::Virtualization(format!(
                    "fragment {:?} of function {:?} was never linked",
                    fragment, func
                ))
            })?;
        Ok(format!("gen/{}/s{}/{}", dir, level, name))
    }

    /// Function id of a fragment, for `function` commands
    pub fn fragment_target(
        &self,
        func: FuncId,
        level: usize,
        fragment: FragmentId,
    ) -> Result<String, SmtError> {
        Ok(format!(
            "{}:{}",
            self.namespace,
            self.fragment_resource(func, level, fragment)?
        ))
    }

    /// Function id a call made at `level` invokes: the callee's entry one
    /// level deeper, or the overflow handler past the maximum depth
    pub fn call_target(&self, func: FuncId, level: usize) -> Result<String, SmtError> {
        if level + 1 > self.max_depth {
            return Ok(self.function_id(&self.overflow_resource()));
        }
        self.fragment_target(func, level + 1, FragmentId(0))
    }

    pub fn overflow_resource(&self) -> String {
        "gen/stack_overflow".to_string()
    }

    /// Fully qualified function id for a resource path
    pub fn function_id(&self, resource: &str) -> String {
        format!("{}:{}", self.namespace, resource)
    }
}

/// Lowercase a name and replace everything a resource path cannot hold
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::atom::Frame;
    use crate::smt::invoke::call;
    use crate::types::Type;
    use std::collections::HashSet;

    /// `main` (public) calls `rec`, which calls itself
    fn recursive_module() -> (SmtModule, FuncId, FuncId) {
        let mut module = SmtModule::new();
        let main = module
            .declare_function("main", Type::world(), &[], None, true)
            .unwrap();
        let rec = module
            .declare_function(
                "rec",
                Type::entity(),
                &[("n".to_string(), Type::int()), ("s".to_string(), Type::str())],
                Some(Type::int()),
                false,
            )
            .unwrap();
        let entry = module.func(main).unwrap().entry();
        module
            .func_mut(main)
            .unwrap()
            .push(entry, vec![call(rec, SmtAtom::World)])
            .unwrap();
        let entry = module.func(rec).unwrap().entry();
        module
            .func_mut(rec)
            .unwrap()
            .push(entry, vec![call(rec, SmtAtom::World)])
            .unwrap();
        (module, main, rec)
    }

    fn config(depth: usize) -> CompilerConfig {
        CompilerConfig::new()
            .with_namespace("demo")
            .with_max_recursion_depth(depth)
    }

    #[test]
    fn test_addresses_are_unique_across_levels() {
        let (mut module, _, _) = recursive_module();
        module.new_pseudo(SmtModule::SCRIPT, Type::int()).unwrap();
        let max = 4;
        let linker = Linker::link(&module, &config(max)).unwrap();

        let mut seen = HashSet::new();
        for func in module.functions() {
            for var in func.vars() {
                let levels = if func.is_script() { 0..=0 } else { 0..=max + 1 };
                for level in levels {
                    let address = linker.address(&Slot::current(var.clone()), level).unwrap();
                    if address == Address::World {
                        continue;
                    }
                    assert!(seen.insert(address.clone()), "duplicate {}", address);
                }
            }
        }
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_linking_is_deterministic() {
        let (module, _, _) = recursive_module();
        let a = Linker::link(&module, &config(3)).unwrap();
        let b = Linker::link(&module, &config(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_address_kinds_follow_type_family() {
        let (module, _, rec) = recursive_module();
        let linker = Linker::link(&module, &config(2)).unwrap();
        let slots = module.func(rec).unwrap().slots().unwrap().clone();

        let n = linker.address(&Slot::current(slots.params[0].clone()), 1).unwrap();
        assert_eq!(n.score_ref().unwrap(), "$f2_v0_s1 cascade");

        let s = linker.address(&Slot::current(slots.params[1].clone()), 1).unwrap();
        assert_eq!(s.storage_ref().unwrap(), "storage demo:vars f2.v1.s1");

        let this = linker.address(&Slot::current(slots.executor.clone()), 2).unwrap();
        assert_eq!(this.selector().unwrap(), "@e[tag=cascade.f2.p1.s2,limit=1]");
    }

    #[test]
    fn test_callee_frame_is_one_level_deeper() {
        let (module, _, rec) = recursive_module();
        let linker = Linker::link(&module, &config(2)).unwrap();
        let n = module.func(rec).unwrap().slots().unwrap().params[0].clone();
        let at_callee = linker
            .address(
                &Slot {
                    var: n.clone(),
                    frame: Frame::Callee,
                },
                1,
            )
            .unwrap();
        assert_eq!(at_callee, linker.address(&Slot::current(n.clone()), 2).unwrap());
        // The overflow frame exists, one past the maximum
        assert!(linker.address(&Slot::callee(n.clone()), 2).is_ok());
        assert!(linker.address(&Slot::callee(n), 3).is_err());
    }

    #[test]
    fn test_script_variables_resolve_at_level_zero() {
        let mut module = SmtModule::new();
        let var = module.new_pseudo(SmtModule::SCRIPT, Type::int()).unwrap();
        let linker = Linker::link(&module, &config(3)).unwrap();
        let at0 = linker.address(&Slot::current(var.clone()), 0).unwrap();
        assert_eq!(linker.address(&Slot::current(var.clone()), 3).unwrap(), at0);
        assert_eq!(linker.address(&Slot::callee(var), 2).unwrap(), at0);
    }

    #[test]
    fn test_reachable_levels_and_overflow() {
        let (module, main, rec) = recursive_module();
        let linker = Linker::link(&module, &config(3)).unwrap();
        assert_eq!(linker.levels(SmtModule::SCRIPT), vec![0]);
        assert_eq!(linker.levels(main), vec![0]);
        assert_eq!(linker.levels(rec), vec![1, 2, 3]);

        assert_eq!(
            linker.call_target(rec, 2).unwrap(),
            "demo:gen/f2_rec/s3/entry"
        );
        assert_eq!(linker.call_target(rec, 3).unwrap(), "demo:gen/stack_overflow");
        assert!(linker.fragment_target(rec, 0, FragmentId(0)).is_err());
    }

    #[test]
    fn test_constants_are_collected() {
        let mut module = SmtModule::new();
        let var = module.new_pseudo(SmtModule::SCRIPT, Type::int()).unwrap();
        let entry = module.script().entry();
        module
            .func_mut(SmtModule::SCRIPT)
            .unwrap()
            .push(
                entry,
                vec![crate::smt::command::SmtCmd::Arith {
                    op: crate::smt::command::ArithOp::Add,
                    out: Slot::current(var.clone()),
                    left: SmtAtom::var(var),
                    right: SmtAtom::Int(-7),
                }],
            )
            .unwrap();
        let linker = Linker::link(&module, &config(1)).unwrap();
        let values: Vec<i64> = linker.constants().map(|(v, _)| v).collect();
        assert_eq!(values, vec![-7, 0, 1]);
        assert_eq!(
            linker.constant(-7).unwrap().score_ref().unwrap(),
            "#c-7 cascade.const"
        );
        assert!(linker.constant(42).is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Add1"), "add1");
        assert_eq!(sanitize("a-b.c"), "a_b_c");
    }
}

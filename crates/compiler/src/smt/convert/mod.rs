//! Statement conversion
//!
//! Walks the contextual tree once per function, allocating fragments and
//! variables and emitting commands. Nothing is addressed here: commands only
//! reference [`Slot`]s and fragments, and the [`Linker`](super::Linker) runs
//! after every function has been converted.
//!
//! # Module Structure
//!
//! - `mod.rs`: the converter, module and function entry points, blocks
//! - `control_flow.rs`: if chains, while and for loops, return
//! - `expr.rs`: expression lowering, dispatched by type family
//! - `calls.rs`: user function calls, library operations and chains
//!
//! # Control flow
//!
//! The target has no jumps, only "invoke this fragment if every condition
//! holds". Each control-flow statement creates new child fragments of the
//! fragment it appears in and returns the fragment that later statements are
//! appended to.
//!
//! A `return` nested inside such a statement cannot stop the fragments that
//! invoked it. Functions that contain one get a halt flag: it is cleared on
//! entry, set by `return`, and every fragment invocation in the function
//! requires it to be clear.

mod calls;
mod control_flow;
mod expr;

use super::atom::{FuncId, SmtAtom, SmtVar, Slot};
use super::cleanup;
use super::command::SmtCmd;
use super::error::SmtError;
use super::fragment::{Flavour, FragmentId};
use super::function::SmtFunc;
use super::invoke::{self, Condition};
use super::module::SmtModule;
use crate::call_graph::CallGraph;
use crate::ctx::{CtxFunc, CtxModule, CtxStmnt, Scope, VarRef};
use crate::library::LibraryRegistry;
use crate::types::Type;
use tracing::{debug, info};

/// Lower a whole contextual module.
///
/// The script's prelude evaluates every parameter default once, then the
/// script body runs; user functions are lowered afterwards so they can see
/// every top-level variable.
pub fn lower_module(ctx: &CtxModule, library: &LibraryRegistry) -> Result<SmtModule, SmtError> {
    let graph = CallGraph::build(ctx);
    let self_calls = graph.unconditional_self_calls();
    if !self_calls.is_empty() {
        return Err(SmtError::Representation(format!(
            "unconditional self-recursion in {}: it can never return",
            self_calls.join(", ")
        )));
    }
    for cycle in graph.recursive_cycles() {
        let mut names: Vec<&str> = cycle.iter().map(String::as_str).collect();
        names.sort_unstable();
        debug!("Recursive cycle: {}", names.join(" -> "));
    }

    let mut module = SmtModule::new();
    let mut ids = Vec::with_capacity(ctx.functions.len());
    for func in &ctx.functions {
        let params: Vec<(String, Type)> = func
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .collect();
        let id = module.declare_function(
            &func.name,
            func.executor.clone(),
            &params,
            func.return_type.clone(),
            func.public,
        )?;
        ids.push(id);
    }

    let mut script = Converter::new(&mut module, library, SmtModule::SCRIPT);
    let entry = script.entry()?;
    script.lower_defaults(ctx, &ids, entry)?;
    script.lower_body(&ctx.script, entry)?;

    for (func, id) in ctx.functions.iter().zip(ids) {
        lower_function(&mut module, library, func, id)?;
    }

    info!(
        "Lowered {} functions into {} fragments",
        module.functions().count(),
        module.functions().map(|f| f.graph().len()).sum::<usize>()
    );
    Ok(module)
}

/// Lower the body of a declared user function
pub fn lower_function(
    module: &mut SmtModule,
    library: &LibraryRegistry,
    func: &CtxFunc,
    id: FuncId,
) -> Result<(), SmtError> {
    let mut converter = Converter::new(module, library, id);
    let entry = converter.entry()?;
    converter.lower_body(&func.body, entry)?;
    debug!(
        "Lowered {} into {} fragments",
        func.name,
        converter.func()?.graph().len()
    );
    Ok(())
}

/// Per-function lowering state
pub struct Converter<'a> {
    module: &'a mut SmtModule,
    library: &'a LibraryRegistry,
    func: FuncId,
    /// Set when the function has a `return` nested inside a fragment
    halt: Option<SmtVar>,
}

impl<'a> Converter<'a> {
    pub fn new(module: &'a mut SmtModule, library: &'a LibraryRegistry, func: FuncId) -> Self {
        Converter {
            module,
            library,
            func,
            halt: None,
        }
    }

    fn func(&self) -> Result<&SmtFunc, SmtError> {
        self.module.func(self.func)
    }

    fn func_mut(&mut self) -> Result<&mut SmtFunc, SmtError> {
        self.module.func_mut(self.func)
    }

    fn entry(&self) -> Result<FragmentId, SmtError> {
        Ok(self.func()?.entry())
    }

    fn new_pseudo(&mut self, ty: Type) -> Result<SmtVar, SmtError> {
        self.module.new_pseudo(self.func, ty)
    }

    fn add_fragment(&mut self, parent: FragmentId, flavour: Flavour) -> Result<FragmentId, SmtError> {
        self.func_mut()?.add_fragment(parent, flavour)
    }

    fn push(&mut self, fragment: FragmentId, cmds: Vec<SmtCmd>) -> Result<(), SmtError> {
        self.func_mut()?.push(fragment, cmds)
    }

    /// Lower a function or script body, then close its frame
    fn lower_body(&mut self, body: &[CtxStmnt], active: FragmentId) -> Result<(), SmtError> {
        if needs_halt(body) {
            let halt = self.new_pseudo(Type::bool())?;
            self.push(
                active,
                vec![SmtCmd::assign(Slot::current(halt.clone()), SmtAtom::bool(false))],
            )?;
            self.halt = Some(halt);
        }
        let last = self.convert_block(body, active)?;
        self.push(last, vec![SmtCmd::FrameCleanup])?;
        cleanup::expand(self.func_mut()?);
        Ok(())
    }

    /// Evaluate every parameter default into a script-owned register
    fn lower_defaults(
        &mut self,
        ctx: &CtxModule,
        ids: &[FuncId],
        active: FragmentId,
    ) -> Result<(), SmtError> {
        for (func, &id) in ctx.functions.iter().zip(ids) {
            for (index, param) in func.params.iter().enumerate() {
                let Some(default) = &param.default else {
                    continue;
                };
                let (mut cmds, atom) = self.convert_expr(default)?;
                let register = self.new_pseudo(param.ty.clone())?;
                cmds.push(SmtCmd::assign(Slot::current(register.clone()), atom));
                self.push(active, cmds)?;
                self.module.func_mut(id)?.set_default(index, register)?;
            }
        }
        Ok(())
    }

    /// Lower statements in order; returns the fragment control ends up in
    pub fn convert_block(
        &mut self,
        body: &[CtxStmnt],
        mut active: FragmentId,
    ) -> Result<FragmentId, SmtError> {
        for stmt in body {
            let (cmds, next) = self.convert_stmnt(stmt, active)?;
            self.push(active, cmds)?;
            active = next;
        }
        Ok(active)
    }

    /// Lower a block whose declarations end with it
    fn convert_scoped_block(
        &mut self,
        body: &[CtxStmnt],
        active: FragmentId,
    ) -> Result<FragmentId, SmtError> {
        let mark = self.func()?.mark_scope();
        let result = self.convert_block(body, active);
        self.func_mut()?.restore_scope(mark);
        result
    }

    /// Lower one statement appearing in `active`.
    ///
    /// Returns the commands to append to `active` and the fragment the next
    /// statement belongs in.
    pub fn convert_stmnt(
        &mut self,
        stmt: &CtxStmnt,
        active: FragmentId,
    ) -> Result<(Vec<SmtCmd>, FragmentId), SmtError> {
        match stmt {
            CtxStmnt::Assign { target, value } => {
                let (mut cmds, atom) = self.convert_expr(value)?;
                let var = self.lookup(target)?;
                cmds.push(SmtCmd::assign(Slot::current(var), atom));
                Ok((cmds, active))
            }
            CtxStmnt::Expr { expr } => {
                let (cmds, _) = self.convert_expr(expr)?;
                Ok((cmds, active))
            }
            CtxStmnt::VarDecl { var, value } => {
                // The initializer may still read a shadowed variable of the same name
                let init = value.as_ref().map(|v| self.convert_expr(v)).transpose()?;
                let declared = self.declare(var)?;
                let mut cmds = Vec::new();
                match init {
                    Some((init_cmds, atom)) => {
                        cmds.extend(init_cmds);
                        cmds.push(SmtCmd::assign(Slot::current(declared), atom));
                    }
                    None if declared.ty.is_nullable() => {
                        cmds.push(SmtCmd::assign(Slot::current(declared), SmtAtom::Null));
                    }
                    None => {}
                }
                Ok((cmds, active))
            }
            CtxStmnt::Block { body } => {
                let next = self.convert_scoped_block(body, active)?;
                Ok((Vec::new(), next))
            }
            CtxStmnt::Return { value } => self.convert_return(value.as_ref(), active),
            CtxStmnt::If {
                branches,
                else_body,
            } => self.convert_if(branches, else_body.as_deref(), active),
            CtxStmnt::While { cond, body } => self.convert_while(cond, body, active),
            CtxStmnt::For {
                index,
                start,
                end,
                inclusive,
                body,
            } => self.convert_for(index, start, end, *inclusive, body, active),
        }
    }

    /// Resolve a named variable reference
    fn lookup(&self, var: &VarRef) -> Result<SmtVar, SmtError> {
        let owner = match var.scope {
            Scope::Local => self.func()?,
            Scope::Script => self.module.script(),
        };
        owner.public_var(&var.name).ok_or_else(|| {
            SmtError::Representation(format!(
                "variable `{}` is not declared in {}",
                var.name,
                owner.name()
            ))
        })
    }

    fn declare(&mut self, var: &VarRef) -> Result<SmtVar, SmtError> {
        match var.scope {
            Scope::Local => Ok(self.func_mut()?.declare_public(&var.name, var.ty.clone())),
            Scope::Script => Err(SmtError::Representation(format!(
                "cannot declare script variable `{}` from {}",
                var.name,
                self.func()?.name()
            ))),
        }
    }

    /// The function's `this`; the world for the script
    fn this(&self) -> Result<SmtAtom, SmtError> {
        Ok(match self.func()?.slots() {
            Some(slots) => SmtAtom::var(slots.executor.clone()),
            None => SmtAtom::World,
        })
    }

    /// Invoke a fragment of this function when every condition holds.
    /// Functions with a halt flag also require it to be clear.
    fn branch(&self, conditions: Vec<Condition>, target: FragmentId) -> SmtCmd {
        let mut all = Vec::with_capacity(conditions.len() + 1);
        if let Some(halt) = &self.halt {
            all.push(Condition::fails(SmtAtom::var(halt.clone())));
        }
        all.extend(conditions);
        invoke::branch(all, self.func, target)
    }

    fn jump(&self, target: FragmentId) -> SmtCmd {
        self.branch(Vec::new(), target)
    }
}

/// True when a `return` sits inside an if, while or for body
fn needs_halt(body: &[CtxStmnt]) -> bool {
    body.iter().any(|stmt| match stmt {
        CtxStmnt::Block { body } => needs_halt(body),
        CtxStmnt::If {
            branches,
            else_body,
        } => {
            branches.iter().any(|b| contains_return(&b.body))
                || else_body.as_deref().is_some_and(contains_return)
        }
        CtxStmnt::While { body, .. } | CtxStmnt::For { body, .. } => contains_return(body),
        _ => false,
    })
}

fn contains_return(body: &[CtxStmnt]) -> bool {
    body.iter().any(|stmt| match stmt {
        CtxStmnt::Return { .. } => true,
        CtxStmnt::Block { body } | CtxStmnt::While { body, .. } | CtxStmnt::For { body, .. } => {
            contains_return(body)
        }
        CtxStmnt::If {
            branches,
            else_body,
        } => {
            branches.iter().any(|b| contains_return(&b.body))
                || else_body.as_deref().is_some_and(contains_return)
        }
        _ => false,
    })
}

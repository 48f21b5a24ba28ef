//! Call lowering
//!
//! User calls write their arguments into the callee's frame, one stack level
//! deeper, then invoke it. Library operations and chains delegate to the
//! registry.

use super::Converter;
use crate::ctx::{CtxExpr, CtxLink};
use crate::library::{ChainData, Lowered};
use crate::smt::atom::{SmtAtom, Slot};
use crate::smt::command::SmtCmd;
use crate::smt::error::SmtError;
use crate::smt::invoke;

impl Converter<'_> {
    /// Call a user function.
    ///
    /// ```text
    /// <evaluate executor and every argument, left to right>
    /// callee.param_i@N+1 = arg_i          (or the default register)
    /// callee.this@N+1    = executor
    /// invoke callee at N+1
    /// result@N           = callee.ret@N+1
    /// ```
    ///
    /// Every argument is evaluated before the first one is written, so a
    /// nested call to the same callee cannot clobber an earlier argument.
    pub(super) fn convert_call(
        &mut self,
        name: &str,
        executor: Option<&CtxExpr>,
        args: &[Option<CtxExpr>],
    ) -> Result<Lowered, SmtError> {
        let callee = self.module.lookup(name).ok_or_else(|| {
            SmtError::Representation(format!("call to undeclared function `{}`", name))
        })?;
        let slots = self
            .module
            .func(callee)?
            .slots()
            .cloned()
            .ok_or_else(|| SmtError::Representation(format!("`{}` cannot be called", name)))?;
        if args.len() > slots.params.len() {
            return Err(SmtError::Representation(format!(
                "`{}` takes {} argument(s), got {}",
                name,
                slots.params.len(),
                args.len()
            )));
        }

        let mut cmds = Vec::new();
        let exec = match executor {
            Some(expr) => {
                let (exec_cmds, atom) = self.convert_expr(expr)?;
                cmds.extend(exec_cmds);
                atom
            }
            None if slots.executor.ty.is_world() => SmtAtom::World,
            None => self.this()?,
        };

        let mut bound = Vec::with_capacity(slots.params.len());
        for (index, param) in slots.params.iter().enumerate() {
            let atom = match args.get(index).and_then(Option::as_ref) {
                Some(arg) => {
                    let (arg_cmds, atom) = self.convert_expr(arg)?;
                    cmds.extend(arg_cmds);
                    atom
                }
                None => match &slots.defaults[index] {
                    Some(default) => SmtAtom::var(default.clone()),
                    None => {
                        return Err(SmtError::Representation(format!(
                            "argument #{} of `{}` is unbound and has no default",
                            index, name
                        )));
                    }
                },
            };
            bound.push(SmtCmd::assign(Slot::callee(param.clone()), atom));
        }
        cmds.extend(bound);
        cmds.push(SmtCmd::assign(
            Slot::callee(slots.executor.clone()),
            exec.clone(),
        ));
        cmds.push(invoke::call(callee, exec));

        let Some(ret) = slots.ret else {
            return Ok((cmds, SmtAtom::Null));
        };
        let result = self.new_pseudo(ret.ty.clone())?;
        cmds.push(SmtCmd::assign(
            Slot::current(result.clone()),
            SmtAtom::Var(Slot::callee(ret.clone())),
        ));
        if ret.ty.is_taggable() {
            // The caller's copy now carries the tag; the callee frame may be reused
            cmds.push(SmtCmd::RemoveTag {
                var: Slot::callee(ret),
            });
        }
        Ok((cmds, SmtAtom::var(result)))
    }

    pub(super) fn convert_library(
        &mut self,
        name: &str,
        executor: Option<&CtxExpr>,
        args: &[CtxExpr],
        extra: &[CtxExpr],
    ) -> Result<Lowered, SmtError> {
        let library = self.library;
        let op = library.op(name)?;
        let mut cmds = Vec::new();
        let exec = match executor {
            Some(expr) => {
                let (exec_cmds, atom) = self.convert_expr(expr)?;
                cmds.extend(exec_cmds);
                atom
            }
            None => self.this()?,
        };
        let params = self.convert_args(args, &mut cmds)?;
        let extra = self.convert_args(extra, &mut cmds)?;

        let (op_cmds, result) = op.lower(exec, params, extra, self.module, self.func)?;
        cmds.extend(op_cmds);
        Ok((cmds, result))
    }

    /// Lower a fluent chain. Every link but the last only records data.
    pub(super) fn convert_chain(
        &mut self,
        executor: &CtxExpr,
        links: &[CtxLink],
    ) -> Result<Lowered, SmtError> {
        let library = self.library;
        let (mut cmds, exec) = self.convert_expr(executor)?;
        let mut data = ChainData::new(exec);

        let Some((last, rest)) = links.split_last() else {
            return Err(SmtError::Representation("empty chain".to_string()));
        };
        for link in rest {
            let step = library.link(&link.name)?;
            if step.is_terminal() {
                return Err(SmtError::Representation(format!(
                    "`{}` must end its chain",
                    link.name
                )));
            }
            let args = self.convert_args(&link.args, &mut cmds)?;
            step.apply(&mut data, &args)?;
        }

        let terminal = library.link(&last.name)?;
        if !terminal.is_terminal() {
            return Err(SmtError::Representation(format!(
                "chain ends with `{}`, which does not produce a value",
                last.name
            )));
        }
        let args = self.convert_args(&last.args, &mut cmds)?;
        terminal.apply(&mut data, &args)?;
        let (link_cmds, result) = terminal.lower(data, self.module, self.func)?;
        cmds.extend(link_cmds);
        Ok((cmds, result))
    }

    fn convert_args(
        &mut self,
        args: &[CtxExpr],
        cmds: &mut Vec<SmtCmd>,
    ) -> Result<Vec<SmtAtom>, SmtError> {
        let mut atoms = Vec::with_capacity(args.len());
        for arg in args {
            let (arg_cmds, atom) = self.convert_expr(arg)?;
            cmds.extend(arg_cmds);
            atoms.push(atom);
        }
        Ok(atoms)
    }
}

//! Control flow lowering
//!
//! If chains, while and for loops, and return. None of these emit a native
//! loop or jump: each creates child fragments of the fragment it appears in
//! and wires them together with conditional invocations.

use super::Converter;
use crate::ctx::{CtxBranch, CtxExpr, CtxStmnt, VarRef};
use crate::smt::atom::{SmtAtom, SmtVar, Slot, VarKind};
use crate::smt::command::{ArithOp, CmpOp, SmtCmd};
use crate::smt::error::SmtError;
use crate::smt::fragment::{Flavour, FragmentId};
use crate::smt::invoke::{Condition, Guard, chain_guard};
use crate::types::{Type, TypeFamily};

impl Converter<'_> {
    /// Lower an if/elif/else chain.
    ///
    /// ```text
    /// parent: taken = 0
    ///         <cond 1>
    ///         if !taken && c1             -> IF1
    ///         <cond 2, only while !taken>
    ///         if !taken && !c1 && c2      -> IF2
    ///         if !taken && !c1 && !c2     -> IF3 (else)
    ///         -> TOP
    /// IFn:    taken = 1; <body>
    /// TOP:    <statements after the chain>
    /// ```
    pub(super) fn convert_if(
        &mut self,
        branches: &[CtxBranch],
        else_body: Option<&[CtxStmnt]>,
        active: FragmentId,
    ) -> Result<(Vec<SmtCmd>, FragmentId), SmtError> {
        let taken = self.new_pseudo(Type::bool())?;
        let taken_atom = SmtAtom::var(taken.clone());
        let mut cmds = vec![SmtCmd::assign(
            Slot::current(taken.clone()),
            SmtAtom::bool(false),
        )];

        let mut earlier: Vec<SmtAtom> = Vec::with_capacity(branches.len());
        for (i, branch) in branches.iter().enumerate() {
            let (cond_cmds, cond) = self.convert_condition(&branch.cond)?;
            if i == 0 {
                cmds.extend(cond_cmds);
            } else {
                // Later conditions must not run once a branch was taken
                let guard = Guard::resolve(vec![Condition::fails(taken_atom.clone())]);
                cmds.extend(cond_cmds.into_iter().map(|cmd| SmtCmd::Guarded {
                    guard: guard.clone(),
                    cmd: Box::new(cmd),
                }));
            }

            let body = self.add_fragment(active, Flavour::If)?;
            self.convert_branch_body(&branch.body, body, &taken)?;
            cmds.push(self.branch(chain_guard(&taken_atom, &earlier, Some(&cond)), body));
            earlier.push(cond);
        }

        if let Some(else_body) = else_body {
            let body = self.add_fragment(active, Flavour::If)?;
            self.convert_branch_body(else_body, body, &taken)?;
            cmds.push(self.branch(chain_guard(&taken_atom, &earlier, None), body));
        }

        let top = self.add_fragment(active, Flavour::Top)?;
        cmds.push(self.jump(top));
        Ok((cmds, top))
    }

    fn convert_branch_body(
        &mut self,
        body: &[CtxStmnt],
        fragment: FragmentId,
        taken: &SmtVar,
    ) -> Result<(), SmtError> {
        self.push(
            fragment,
            vec![SmtCmd::assign(
                Slot::current(taken.clone()),
                SmtAtom::bool(true),
            )],
        )?;
        self.convert_scoped_block(body, fragment)?;
        Ok(())
    }

    /// Lower a while loop.
    ///
    /// ```text
    /// parent: -> COND
    /// COND:   <cond>; if !c -> TOP; if c -> LOOP
    /// LOOP:   <body>; -> COND
    /// ```
    ///
    /// The exit is checked first: TOP may run arbitrary code, and `c` is a
    /// snapshot it cannot change, so LOOP never runs after TOP.
    pub(super) fn convert_while(
        &mut self,
        cond: &CtxExpr,
        body: &[CtxStmnt],
        active: FragmentId,
    ) -> Result<(Vec<SmtCmd>, FragmentId), SmtError> {
        let check = self.add_fragment(active, Flavour::Cond)?;
        let looped = self.add_fragment(active, Flavour::Loop)?;
        let top = self.add_fragment(active, Flavour::Top)?;

        let (mut cond_cmds, c) = self.convert_condition(cond)?;
        cond_cmds.push(self.branch(vec![Condition::fails(c.clone())], top));
        cond_cmds.push(self.branch(vec![Condition::holds(c)], looped));
        self.push(check, cond_cmds)?;

        let end = self.convert_scoped_block(body, looped)?;
        let back = self.jump(check);
        self.push(end, vec![back])?;

        Ok((vec![self.jump(check)], top))
    }

    /// Lower `for index in start..end` (or `..=`).
    ///
    /// The index is a fresh variable scoped to the loop. `end` is evaluated
    /// once, before the first iteration.
    pub(super) fn convert_for(
        &mut self,
        index: &VarRef,
        start: &CtxExpr,
        end: &CtxExpr,
        inclusive: bool,
        body: &[CtxStmnt],
        active: FragmentId,
    ) -> Result<(Vec<SmtCmd>, FragmentId), SmtError> {
        let (mut cmds, lo) = self.convert_expr(start)?;
        let (hi_cmds, hi) = self.convert_expr(end)?;
        cmds.extend(hi_cmds);
        let (snapshot, hi) = self.snapshot(hi, Type::int())?;
        cmds.extend(snapshot);

        let mark = self.func()?.mark_scope();
        let var = self.declare(index)?;
        cmds.push(SmtCmd::assign(Slot::current(var.clone()), lo));

        let check = self.add_fragment(active, Flavour::Cond)?;
        let looped = self.add_fragment(active, Flavour::Loop)?;
        let top = self.add_fragment(active, Flavour::Top)?;

        let c = self.new_pseudo(Type::bool())?;
        let c_atom = SmtAtom::var(c.clone());
        let check_cmds = vec![
            SmtCmd::Compare {
                op: if inclusive { CmpOp::Le } else { CmpOp::Lt },
                out: Slot::current(c),
                left: SmtAtom::var(var.clone()),
                right: hi,
            },
            self.branch(vec![Condition::fails(c_atom.clone())], top),
            self.branch(vec![Condition::holds(c_atom)], looped),
        ];
        self.push(check, check_cmds)?;

        let result = self.convert_scoped_block(body, looped);
        self.func_mut()?.restore_scope(mark);
        let end = result?;
        let step = vec![
            SmtCmd::Arith {
                op: ArithOp::Add,
                out: Slot::current(var.clone()),
                left: SmtAtom::var(var),
                right: SmtAtom::Int(1),
            },
            self.jump(check),
        ];
        self.push(end, step)?;

        cmds.push(self.jump(check));
        Ok((cmds, top))
    }

    /// Lower `return`: fill the return slot, stop the function and send every
    /// later statement to a fragment that is never invoked.
    pub(super) fn convert_return(
        &mut self,
        value: Option<&CtxExpr>,
        active: FragmentId,
    ) -> Result<(Vec<SmtCmd>, FragmentId), SmtError> {
        let ret = self.func()?.slots().and_then(|s| s.ret.clone());
        let mut cmds = Vec::new();
        match (value, ret) {
            (Some(value), Some(ret)) => {
                let (value_cmds, atom) = self.convert_expr(value)?;
                cmds.extend(value_cmds);
                cmds.push(SmtCmd::assign(Slot::current(ret), atom));
            }
            (Some(_), None) => {
                return Err(SmtError::Representation(format!(
                    "{} returns a value but has no return type",
                    self.func()?.name()
                )));
            }
            (None, _) => {}
        }
        if let Some(halt) = &self.halt {
            cmds.push(SmtCmd::assign(
                Slot::current(halt.clone()),
                SmtAtom::bool(true),
            ));
        }
        cmds.push(SmtCmd::FrameCleanup);

        let dead = self.add_fragment(active, Flavour::Dead)?;
        Ok((cmds, dead))
    }

    /// Lower a condition into an atom that code run by an earlier guarded
    /// invocation in the same fragment cannot change
    pub(super) fn convert_condition(
        &mut self,
        cond: &CtxExpr,
    ) -> Result<(Vec<SmtCmd>, SmtAtom), SmtError> {
        let (mut cmds, atom) = self.convert_expr(cond)?;
        let (snapshot, atom) = self.snapshot(atom, Type::bool())?;
        cmds.extend(snapshot);
        Ok((cmds, atom))
    }

    /// Copy `atom` into a fresh register unless it already is a numeric
    /// register only this frame's own commands write
    pub(super) fn snapshot(
        &mut self,
        atom: SmtAtom,
        ty: Type,
    ) -> Result<(Vec<SmtCmd>, SmtAtom), SmtError> {
        match &atom {
            SmtAtom::Int(_) | SmtAtom::Null => Ok((Vec::new(), atom)),
            SmtAtom::Var(slot)
                if slot.var.id.kind == VarKind::Pseudo
                    && slot.var.owner() == self.func
                    && slot.var.ty.family() == TypeFamily::IntCoercible =>
            {
                Ok((Vec::new(), atom))
            }
            SmtAtom::Var(slot) if slot.var.ty.family() != TypeFamily::Executor => {
                let register = self.new_pseudo(ty)?;
                Ok((
                    vec![SmtCmd::assign(Slot::current(register.clone()), atom.clone())],
                    SmtAtom::var(register),
                ))
            }
            other => Err(SmtError::Representation(format!(
                "{:?} cannot be used as a numeric condition",
                other
            ))),
        }
    }
}

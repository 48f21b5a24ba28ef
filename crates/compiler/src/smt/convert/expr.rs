//! Expression lowering
//!
//! Every expression lowers to the commands that compute it plus an atom that
//! holds the result. Expressions never create fragments. Dispatch happens on
//! the resolved type family first, then on the node kind: the family decides
//! which operators have a representation at all.

use super::Converter;
use crate::ctx::{BinOp, CtxExpr, ExprKind, UnaryOp};
use crate::library::Lowered;
use crate::smt::atom::{SmtAtom, Slot};
use crate::smt::command::{ArithOp, CmpOp, LogicOp, SmtCmd};
use crate::smt::error::SmtError;
use crate::smt::invoke::{Condition, Guard};
use crate::types::{Type, TypeFamily};

/// Largest literal exponent `**` unrolls
const MAX_UNROLLED_EXPONENT: i64 = 64;

impl Converter<'_> {
    pub fn convert_expr(&mut self, expr: &CtxExpr) -> Result<Lowered, SmtError> {
        match expr.ty.family() {
            TypeFamily::IntCoercible => self.convert_int_expr(expr),
            TypeFamily::OtherScalar => self.convert_scalar_expr(expr),
            TypeFamily::Executor | TypeFamily::Struct => self.convert_common(expr),
        }
    }

    /// Non-nullable ints and bools: every operator lives here
    fn convert_int_expr(&mut self, expr: &CtxExpr) -> Result<Lowered, SmtError> {
        match &expr.kind {
            ExprKind::Binary { op, left, right } => match op {
                BinOp::Add => self.convert_arith(ArithOp::Add, left, right, &expr.ty),
                BinOp::Sub => self.convert_arith(ArithOp::Sub, left, right, &expr.ty),
                BinOp::Mul => self.convert_arith(ArithOp::Mul, left, right, &expr.ty),
                BinOp::Div => self.convert_arith(ArithOp::Div, left, right, &expr.ty),
                BinOp::Mod => self.convert_arith(ArithOp::Mod, left, right, &expr.ty),
                BinOp::Pow => self.convert_pow(left, right, &expr.ty),
                BinOp::Eq => self.convert_equality(false, left, right),
                BinOp::Ne => self.convert_equality(true, left, right),
                BinOp::Lt => self.convert_compare(CmpOp::Lt, left, right),
                BinOp::Le => self.convert_compare(CmpOp::Le, left, right),
                BinOp::Gt => self.convert_compare(CmpOp::Gt, left, right),
                BinOp::Ge => self.convert_compare(CmpOp::Ge, left, right),
                BinOp::And => self.convert_logic(LogicOp::And, left, right),
                BinOp::Or => self.convert_logic(LogicOp::Or, left, right),
                BinOp::NullCoalesce => self.convert_coalesce(left, right, &expr.ty),
            },
            ExprKind::Unary { op, operand } => {
                let (mut cmds, value) = self.convert_expr(operand)?;
                let out = self.new_pseudo(expr.ty.clone())?;
                cmds.push(match op {
                    UnaryOp::Not => SmtCmd::Not {
                        out: Slot::current(out.clone()),
                        operand: value,
                    },
                    UnaryOp::Neg => SmtCmd::Arith {
                        op: ArithOp::Sub,
                        out: Slot::current(out.clone()),
                        left: SmtAtom::Int(0),
                        right: value,
                    },
                });
                Ok((cmds, SmtAtom::var(out)))
            }
            _ => self.convert_common(expr),
        }
    }

    /// Floats, strings and nullable values live in storage, where only
    /// null-coalescing has a representation
    fn convert_scalar_expr(&mut self, expr: &CtxExpr) -> Result<Lowered, SmtError> {
        match &expr.kind {
            ExprKind::Binary {
                op: BinOp::NullCoalesce,
                left,
                right,
            } => self.convert_coalesce(left, right, &expr.ty),
            _ => self.convert_common(expr),
        }
    }

    /// Kinds shared by every family: literals, variables and calls
    fn convert_common(&mut self, expr: &CtxExpr) -> Result<Lowered, SmtError> {
        let atom = match &expr.kind {
            ExprKind::Int { value } => SmtAtom::Int(*value),
            ExprKind::Bool { value } => SmtAtom::bool(*value),
            ExprKind::Float { value } => SmtAtom::Float(*value),
            ExprKind::Str { value } => SmtAtom::Str(value.clone()),
            ExprKind::Null => SmtAtom::Null,
            ExprKind::Var { var } => SmtAtom::var(self.lookup(var)?),
            ExprKind::This => self.this()?,
            ExprKind::World => SmtAtom::World,
            ExprKind::Call {
                func,
                executor,
                args,
            } => return self.convert_call(func, executor.as_deref(), args),
            ExprKind::Library {
                name,
                executor,
                args,
                extra,
            } => return self.convert_library(name, executor.as_deref(), args, extra),
            ExprKind::Chain { executor, links } => return self.convert_chain(executor, links),
            ExprKind::Binary { op, .. } => {
                return Err(SmtError::Representation(format!(
                    "operator {:?} has no representation for {}",
                    op, expr.ty
                )));
            }
            ExprKind::Unary { op, .. } => {
                return Err(SmtError::Representation(format!(
                    "operator {:?} has no representation for {}",
                    op, expr.ty
                )));
            }
        };
        Ok((Vec::new(), atom))
    }

    /// Lower both operands of a binary operator, left first
    fn convert_operands(&mut self, left: &CtxExpr, right: &CtxExpr) -> Result<(Vec<SmtCmd>, SmtAtom, SmtAtom), SmtError> {
        let (mut cmds, l) = self.convert_expr(left)?;
        let (right_cmds, r) = self.convert_expr(right)?;
        cmds.extend(right_cmds);
        Ok((cmds, l, r))
    }

    fn convert_arith(
        &mut self,
        op: ArithOp,
        left: &CtxExpr,
        right: &CtxExpr,
        ty: &Type,
    ) -> Result<Lowered, SmtError> {
        let (mut cmds, l, r) = self.convert_operands(left, right)?;
        let out = self.new_pseudo(ty.clone())?;
        cmds.push(SmtCmd::Arith {
            op,
            out: Slot::current(out.clone()),
            left: l,
            right: r,
        });
        Ok((cmds, SmtAtom::var(out)))
    }

    /// `base ** n` unrolls into `n` multiplications; `n` must be a literal
    fn convert_pow(&mut self, base: &CtxExpr, exponent: &CtxExpr, ty: &Type) -> Result<Lowered, SmtError> {
        let n = match exponent.kind {
            ExprKind::Int { value } if (0..=MAX_UNROLLED_EXPONENT).contains(&value) => value,
            _ => {
                return Err(SmtError::Representation(format!(
                    "exponent must be an integer literal in 0..={}, got {:?}",
                    MAX_UNROLLED_EXPONENT, exponent.kind
                )));
            }
        };
        let (mut cmds, base) = self.convert_expr(base)?;
        let out = self.new_pseudo(ty.clone())?;
        cmds.push(SmtCmd::assign(Slot::current(out.clone()), SmtAtom::Int(1)));
        for _ in 0..n {
            cmds.push(SmtCmd::Arith {
                op: ArithOp::Mul,
                out: Slot::current(out.clone()),
                left: SmtAtom::var(out.clone()),
                right: base.clone(),
            });
        }
        Ok((cmds, SmtAtom::var(out)))
    }

    fn convert_compare(&mut self, op: CmpOp, left: &CtxExpr, right: &CtxExpr) -> Result<Lowered, SmtError> {
        let (mut cmds, l, r) = self.convert_operands(left, right)?;
        let out = self.new_pseudo(Type::bool())?;
        cmds.push(SmtCmd::Compare {
            op,
            out: Slot::current(out.clone()),
            left: l,
            right: r,
        });
        Ok((cmds, SmtAtom::var(out)))
    }

    fn convert_logic(&mut self, op: LogicOp, left: &CtxExpr, right: &CtxExpr) -> Result<Lowered, SmtError> {
        let (mut cmds, l, r) = self.convert_operands(left, right)?;
        let out = self.new_pseudo(Type::bool())?;
        cmds.push(SmtCmd::Logic {
            op,
            out: Slot::current(out.clone()),
            left: l,
            right: r,
        });
        Ok((cmds, SmtAtom::var(out)))
    }

    /// `==` / `!=`.
    ///
    /// Plain numbers compare directly. Anything that may be null compares
    /// value and nullness separately: two nulls are equal, a null and a value
    /// are not, and a null source makes the value comparison meaningless.
    fn convert_equality(&mut self, negate: bool, left: &CtxExpr, right: &CtxExpr) -> Result<Lowered, SmtError> {
        let (mut cmds, l, r) = self.convert_operands(left, right)?;
        let out = self.new_pseudo(Type::bool())?;

        let numeric = |ty: &Type| ty.family() == TypeFamily::IntCoercible;
        if numeric(&left.ty) && numeric(&right.ty) {
            cmds.push(SmtCmd::Compare {
                op: if negate { CmpOp::Ne } else { CmpOp::Eq },
                out: Slot::current(out.clone()),
                left: l,
                right: r,
            });
            return Ok((cmds, SmtAtom::var(out)));
        }
        if left.ty.family() == TypeFamily::Executor || right.ty.family() == TypeFamily::Executor {
            return Err(SmtError::Representation(format!(
                "equality between {} and {} has no representation",
                left.ty, right.ty
            )));
        }

        let value_match = self.new_pseudo(Type::bool())?;
        let null_match = self.new_pseudo(Type::bool())?;
        if l.is_null() || r.is_null() {
            cmds.push(SmtCmd::assign(
                Slot::current(value_match.clone()),
                SmtAtom::bool(true),
            ));
        } else {
            cmds.push(SmtCmd::ValueMatch {
                out: Slot::current(value_match.clone()),
                left: l.clone(),
                right: r.clone(),
            });
        }
        cmds.push(SmtCmd::NullMatch {
            out: Slot::current(null_match.clone()),
            left: l,
            right: r,
        });
        cmds.push(SmtCmd::Logic {
            op: LogicOp::And,
            out: Slot::current(out.clone()),
            left: SmtAtom::var(value_match),
            right: SmtAtom::var(null_match),
        });
        if negate {
            cmds.push(SmtCmd::Not {
                out: Slot::current(out.clone()),
                operand: SmtAtom::var(out.clone()),
            });
        }
        Ok((cmds, SmtAtom::var(out)))
    }

    /// `a ?? b`: `b` is only evaluated when `a` is null
    fn convert_coalesce(&mut self, left: &CtxExpr, right: &CtxExpr, ty: &Type) -> Result<Lowered, SmtError> {
        let (mut cmds, a) = self.convert_expr(left)?;
        let is_null = self.new_pseudo(Type::bool())?;
        let out = self.new_pseudo(ty.clone())?;
        cmds.push(SmtCmd::IsNull {
            out: Slot::current(is_null.clone()),
            operand: a.clone(),
        });
        if !a.is_null() {
            cmds.push(SmtCmd::assign(Slot::current(out.clone()), a));
        }

        let when_null = Guard::resolve(vec![Condition::holds(SmtAtom::var(is_null))]);
        let (right_cmds, b) = self.convert_expr(right)?;
        let fallback = right_cmds
            .into_iter()
            .chain(std::iter::once(SmtCmd::assign(Slot::current(out.clone()), b)));
        cmds.extend(fallback.map(|cmd| SmtCmd::Guarded {
            guard: when_null.clone(),
            cmd: Box::new(cmd),
        }));
        Ok((cmds, SmtAtom::var(out)))
    }
}

//! Invocation emitter
//!
//! The target has exactly one control-transfer primitive: "if every condition
//! holds, invoke F". Every branch and every loop is built from the helpers in
//! this module; nothing else emits control flow.

use super::atom::{FuncId, SmtAtom};
use super::command::SmtCmd;
use super::error::SmtError;
use super::fragment::FragmentId;
use super::linker::Linker;

/// `atom` must read as `expected`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub atom: SmtAtom,
    pub expected: bool,
}

impl Condition {
    pub fn holds(atom: SmtAtom) -> Self {
        Condition {
            atom,
            expected: true,
        }
    }

    pub fn fails(atom: SmtAtom) -> Self {
        Condition {
            atom,
            expected: false,
        }
    }
}

/// A list of conditions with compile-time constants already folded away
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Always,
    /// Some constant can never match; still rendered as a valid, false guard
    Never,
    When(Vec<Condition>),
}

impl Guard {
    pub fn resolve(conditions: Vec<Condition>) -> Guard {
        let mut remaining = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition.atom.truthiness() {
                Some(value) if value != condition.expected => return Guard::Never,
                Some(_) => {}
                None => remaining.push(condition),
            }
        }
        if remaining.is_empty() {
            Guard::Always
        } else {
            Guard::When(remaining)
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        match self {
            Guard::When(conditions) => conditions,
            Guard::Always | Guard::Never => &[],
        }
    }

    /// The `execute` sub-commands for this guard; `None` when unconditional
    pub(crate) fn render(&self, linker: &Linker, level: usize) -> Result<Option<String>, SmtError> {
        match self {
            Guard::Always => Ok(None),
            Guard::Never => Ok(Some(static_false(linker)?)),
            Guard::When(conditions) => {
                let mut clauses = Vec::with_capacity(conditions.len());
                for condition in conditions {
                    clauses.push(render_condition(condition, linker, level)?);
                }
                Ok(Some(clauses.join(" ")))
            }
        }
    }
}

fn static_false(linker: &Linker) -> Result<String, SmtError> {
    let zero = linker.constant(0)?;
    Ok(format!("if score {} matches 1", zero.score_ref()?))
}

fn render_condition(
    condition: &Condition,
    linker: &Linker,
    level: usize,
) -> Result<String, SmtError> {
    match &condition.atom {
        SmtAtom::Var(slot) => {
            let address = linker.address(slot, level)?;
            let score = address.score_ref().map_err(|_| {
                SmtError::Virtualization(format!(
                    "condition on {:?} needs a score address, found {}",
                    slot.var.id, address
                ))
            })?;
            if condition.expected {
                Ok(format!("unless score {} matches 0", score))
            } else {
                Ok(format!("if score {} matches 0", score))
            }
        }
        constant => match constant.truthiness() {
            // Folded constants only reach here when a guard was built by hand
            Some(value) if value == condition.expected => {
                let one = linker.constant(1)?;
                Ok(format!("if score {} matches 1", one.score_ref()?))
            }
            Some(_) => static_false(linker),
            None => Err(SmtError::Virtualization(format!(
                "constant {:?} cannot be used as a condition",
                constant
            ))),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvokeTarget {
    /// A fragment of the invoking function, at the same stack level
    Fragment { func: FuncId, fragment: FragmentId },
    /// The entry of a user function, one stack level deeper, run as `executor`
    Function { func: FuncId, executor: SmtAtom },
}

/// Unconditional transfer to a fragment
pub fn jump(func: FuncId, fragment: FragmentId) -> SmtCmd {
    branch(Vec::new(), func, fragment)
}

pub fn branch(conditions: Vec<Condition>, func: FuncId, fragment: FragmentId) -> SmtCmd {
    SmtCmd::Invoke {
        guard: Guard::resolve(conditions),
        target: InvokeTarget::Fragment { func, fragment },
    }
}

pub fn call(func: FuncId, executor: SmtAtom) -> SmtCmd {
    SmtCmd::Invoke {
        guard: Guard::Always,
        target: InvokeTarget::Function { func, executor },
    }
}

/// Guard for one branch of an if chain: not yet taken, every earlier
/// condition false, and (unless this is the `else`) this condition true.
pub fn chain_guard(
    taken: &SmtAtom,
    earlier: &[SmtAtom],
    this: Option<&SmtAtom>,
) -> Vec<Condition> {
    let mut conditions = vec![Condition::fails(taken.clone())];
    conditions.extend(earlier.iter().cloned().map(Condition::fails));
    if let Some(atom) = this {
        conditions.push(Condition::holds(atom.clone()));
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::atom::{SmtVar, VarId, VarKind};
    use crate::types::Type;

    fn flag(index: usize) -> SmtAtom {
        SmtAtom::var(SmtVar {
            id: VarId {
                owner: FuncId(0),
                kind: VarKind::Pseudo,
                index,
            },
            ty: Type::bool(),
        })
    }

    #[test]
    fn test_satisfied_constants_are_dropped() {
        let guard = Guard::resolve(vec![
            Condition::holds(SmtAtom::Int(1)),
            Condition::fails(SmtAtom::Null),
        ]);
        assert_eq!(guard, Guard::Always);
    }

    #[test]
    fn test_unsatisfiable_constant_keeps_a_false_guard() {
        let guard = Guard::resolve(vec![
            Condition::holds(flag(0)),
            Condition::fails(SmtAtom::Int(1)),
        ]);
        assert_eq!(guard, Guard::Never);
        assert!(guard.conditions().is_empty());
    }

    #[test]
    fn test_variables_are_kept_in_order() {
        let guard = Guard::resolve(vec![
            Condition::fails(flag(0)),
            Condition::holds(SmtAtom::Int(5)),
            Condition::holds(flag(1)),
        ]);
        assert_eq!(
            guard,
            Guard::When(vec![Condition::fails(flag(0)), Condition::holds(flag(1))])
        );
    }

    #[test]
    fn test_chain_guard_shape() {
        let taken = flag(0);
        let earlier = [flag(1), flag(2)];
        let this = flag(3);
        let conditions = chain_guard(&taken, &earlier, Some(&this));
        assert_eq!(
            conditions,
            vec![
                Condition::fails(flag(0)),
                Condition::fails(flag(1)),
                Condition::fails(flag(2)),
                Condition::holds(flag(3)),
            ]
        );

        let else_guard = chain_guard(&taken, &earlier, None);
        assert_eq!(else_guard.len(), 3);
        assert!(else_guard.iter().all(|c| !c.expected));
    }

    #[test]
    fn test_jump_is_unconditional() {
        match jump(FuncId(2), FragmentId(4)) {
            SmtCmd::Invoke { guard, target } => {
                assert_eq!(guard, Guard::Always);
                assert_eq!(
                    target,
                    InvokeTarget::Fragment {
                        func: FuncId(2),
                        fragment: FragmentId(4)
                    }
                );
            }
            other => panic!("expected an invoke, got {:?}", other),
        }
    }
}

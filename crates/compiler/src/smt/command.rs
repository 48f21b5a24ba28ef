//! Commands
//!
//! The closed set of abstract commands lowering can emit. Commands reference
//! variables through [`Slot`]s only; the concrete text is produced by
//! [`SmtCmd::render`] once the module is linked, and a command renders once per
//! stack level its function is reachable at.

use super::atom::{FuncId, SmtAtom, Slot};
use super::error::SmtError;
use super::invoke::{Guard, InvokeTarget};
use super::linker::{Address, Linker};
use crate::library::LibraryCmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn operator(self) -> &'static str {
        match self {
            ArithOp::Add => "+=",
            ArithOp::Sub => "-=",
            ArithOp::Mul => "*=",
            ArithOp::Div => "/=",
            ArithOp::Mod => "%=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn operator(self) -> &'static str {
        match self {
            CmpOp::Eq | CmpOp::Ne => "=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug)]
pub enum SmtCmd {
    Assign {
        target: Slot,
        source: SmtAtom,
    },
    /// `out = left; out op= right`
    Arith {
        op: ArithOp,
        out: Slot,
        left: SmtAtom,
        right: SmtAtom,
    },
    Compare {
        op: CmpOp,
        out: Slot,
        left: SmtAtom,
        right: SmtAtom,
    },
    Logic {
        op: LogicOp,
        out: Slot,
        left: SmtAtom,
        right: SmtAtom,
    },
    Not {
        out: Slot,
        operand: SmtAtom,
    },
    /// `out` is true when both values are equal. Two nulls match, and so does a
    /// value compared against a null source, so this is only meaningful when
    /// AND-ed with a [`SmtCmd::NullMatch`].
    ValueMatch {
        out: Slot,
        left: SmtAtom,
        right: SmtAtom,
    },
    /// `out` is true when both operands are null or both are non-null
    NullMatch {
        out: Slot,
        left: SmtAtom,
        right: SmtAtom,
    },
    IsNull {
        out: Slot,
        operand: SmtAtom,
    },
    /// A single command that only runs when `guard` holds
    Guarded {
        guard: Guard,
        cmd: Box<SmtCmd>,
    },
    Invoke {
        guard: Guard,
        target: InvokeTarget,
    },
    RemoveTag {
        var: Slot,
    },
    /// Placeholder for the frame teardown; expanded once the function's
    /// variable set is final
    FrameCleanup,
    Library(Box<dyn LibraryCmd>),
}

impl SmtCmd {
    pub fn assign(target: Slot, source: SmtAtom) -> Self {
        SmtCmd::Assign { target, source }
    }

    /// Constants and variables read by this command
    pub fn atoms(&self) -> Vec<&SmtAtom> {
        match self {
            SmtCmd::Assign { source, .. } => vec![source],
            SmtCmd::Arith { left, right, .. }
            | SmtCmd::Compare { left, right, .. }
            | SmtCmd::Logic { left, right, .. }
            | SmtCmd::ValueMatch { left, right, .. }
            | SmtCmd::NullMatch { left, right, .. } => vec![left, right],
            SmtCmd::Not { operand, .. } | SmtCmd::IsNull { operand, .. } => vec![operand],
            SmtCmd::Guarded { guard, cmd } => {
                let mut atoms: Vec<&SmtAtom> = guard.conditions().iter().map(|c| &c.atom).collect();
                atoms.extend(cmd.atoms());
                atoms
            }
            SmtCmd::Invoke { guard, target } => {
                let mut atoms: Vec<&SmtAtom> = guard.conditions().iter().map(|c| &c.atom).collect();
                if let InvokeTarget::Function { executor, .. } = target {
                    atoms.push(executor);
                }
                atoms
            }
            SmtCmd::RemoveTag { .. } | SmtCmd::FrameCleanup => Vec::new(),
            SmtCmd::Library(cmd) => cmd.atoms(),
        }
    }

    /// The user function this command invokes, if any
    pub fn callee(&self) -> Option<FuncId> {
        match self {
            SmtCmd::Invoke {
                target: InvokeTarget::Function { func, .. },
                ..
            } => Some(*func),
            SmtCmd::Guarded { cmd, .. } => cmd.callee(),
            _ => None,
        }
    }

    pub fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        match self {
            SmtCmd::Assign { target, source } => {
                if source.as_slot() == Some(target) {
                    return Ok(Vec::new());
                }
                let address = linker.address(target, level)?;
                assign_lines(linker, &address, source, level)
            }
            SmtCmd::Arith {
                op,
                out,
                left,
                right,
            } => {
                let address = linker.address(out, level)?;
                let mut lines = if left.as_slot() == Some(out) {
                    Vec::new()
                } else {
                    assign_lines(linker, &address, left, level)?
                };
                lines.push(format!(
                    "scoreboard players operation {} {} {}",
                    address.score_ref()?,
                    op.operator(),
                    score_operand(linker, right, level)?
                ));
                Ok(lines)
            }
            SmtCmd::Compare {
                op,
                out,
                left,
                right,
            } => {
                let target = linker.address(out, level)?.score_ref()?;
                let test = if *op == CmpOp::Ne { "unless" } else { "if" };
                Ok(vec![format!(
                    "execute store result score {} {} score {} {} {}",
                    target,
                    test,
                    score_operand(linker, left, level)?,
                    op.operator(),
                    score_operand(linker, right, level)?
                )])
            }
            SmtCmd::Logic {
                op,
                out,
                left,
                right,
            } => {
                let target = linker.address(out, level)?.score_ref()?;
                let l = score_operand(linker, left, level)?;
                let r = score_operand(linker, right, level)?;
                let mut lines = vec![format!("scoreboard players set {} 0", target)];
                match op {
                    LogicOp::And => lines.push(format!(
                        "execute unless score {} matches 0 unless score {} matches 0 run scoreboard players set {} 1",
                        l, r, target
                    )),
                    LogicOp::Or => {
                        lines.push(format!(
                            "execute unless score {} matches 0 run scoreboard players set {} 1",
                            l, target
                        ));
                        lines.push(format!(
                            "execute unless score {} matches 0 run scoreboard players set {} 1",
                            r, target
                        ));
                    }
                }
                Ok(lines)
            }
            SmtCmd::Not { out, operand } => {
                let target = linker.address(out, level)?.score_ref()?;
                Ok(vec![format!(
                    "execute store result score {} if score {} matches 0",
                    target,
                    score_operand(linker, operand, level)?
                )])
            }
            SmtCmd::ValueMatch { out, left, right } => {
                let target = linker.address(out, level)?.score_ref()?;
                let lhs = linker.scratch("lhs");
                let rhs = linker.scratch("rhs");
                let mut lines = assign_lines(linker, &lhs, left, level)?;
                lines.extend(assign_lines(linker, &rhs, right, level)?);
                lines.push(format!(
                    "execute store success score {} run data modify {} set from {}",
                    target,
                    lhs.storage_ref()?,
                    rhs.storage_ref()?
                ));
                lines.push(format!(
                    "execute store result score {} if score {} matches 0",
                    target, target
                ));
                Ok(lines)
            }
            SmtCmd::NullMatch { out, left, right } => {
                let target = linker.address(out, level)?.score_ref()?;
                let l = nullness(linker, left, level)?;
                let r = nullness(linker, right, level)?;
                Ok(render_null_match(&target, l, r))
            }
            SmtCmd::IsNull { out, operand } => {
                let target = linker.address(out, level)?.score_ref()?;
                let line = match nullness(linker, operand, level)? {
                    Nullness::Always => format!("scoreboard players set {} 1", target),
                    Nullness::Never => format!("scoreboard players set {} 0", target),
                    Nullness::Dynamic(data) => {
                        format!("execute store result score {} unless data {}", target, data)
                    }
                };
                Ok(vec![line])
            }
            SmtCmd::Guarded { guard, cmd } => {
                let prefix = guard.render(linker, level)?;
                let inner = cmd.render(linker, level)?;
                Ok(match prefix {
                    None => inner,
                    Some(prefix) => inner
                        .into_iter()
                        .map(|line| format!("execute {} run {}", prefix, line))
                        .collect(),
                })
            }
            SmtCmd::Invoke { guard, target } => {
                let mut clauses = Vec::new();
                if let Some(prefix) = guard.render(linker, level)? {
                    clauses.push(prefix);
                }
                let function = match target {
                    InvokeTarget::Fragment { func, fragment } => {
                        linker.fragment_target(*func, level, *fragment)?
                    }
                    InvokeTarget::Function { func, executor } => {
                        // Group executors are reached through the callee's
                        // executor slot; `as` would run the body once per entity
                        if let SmtAtom::Var(slot) = executor {
                            let address = linker.address(slot, level)?;
                            if let Address::Tag { solitary: true, .. } = address {
                                if let Some(selector) = address.selector() {
                                    clauses.push(format!("as {}", selector));
                                }
                            }
                        }
                        linker.call_target(*func, level)?
                    }
                };
                if clauses.is_empty() {
                    Ok(vec![format!("function {}", function)])
                } else {
                    Ok(vec![format!(
                        "execute {} run function {}",
                        clauses.join(" "),
                        function
                    )])
                }
            }
            SmtCmd::RemoveTag { var } => match linker.address(var, level)? {
                Address::Tag { tag, .. } => Ok(vec![format!("tag @e[tag={}] remove {}", tag, tag)]),
                Address::World => Ok(Vec::new()),
                other => Err(SmtError::Virtualization(format!(
                    "cannot remove a tag from {:?}: it is linked to {}",
                    var.var.id, other
                ))),
            },
            SmtCmd::FrameCleanup => Err(SmtError::Virtualization(
                "frame cleanup placeholder was never expanded".to_string(),
            )),
            SmtCmd::Library(cmd) => cmd.render(linker, level),
        }
    }
}

/// Commands that make `target` hold the value of `source`
pub(crate) fn assign_lines(
    linker: &Linker,
    target: &Address,
    source: &SmtAtom,
    level: usize,
) -> Result<Vec<String>, SmtError> {
    match target {
        Address::World => match source {
            SmtAtom::World => Ok(Vec::new()),
            SmtAtom::Var(slot) if slot.var.ty.is_world() => Ok(Vec::new()),
            other => Err(SmtError::Virtualization(format!(
                "cannot store {:?} in the world",
                other
            ))),
        },
        Address::Score { .. } => {
            let t = target.score_ref()?;
            match source {
                SmtAtom::Int(v) => Ok(vec![format!("scoreboard players set {} {}", t, v)]),
                SmtAtom::Var(slot) => match linker.address(slot, level)? {
                    from @ Address::Score { .. } => Ok(vec![format!(
                        "scoreboard players operation {} = {}",
                        t,
                        from.score_ref()?
                    )]),
                    from @ Address::Storage { .. } => Ok(vec![format!(
                        "execute store result score {} run data get {}",
                        t,
                        from.storage_ref()?
                    )]),
                    from => Err(SmtError::Virtualization(format!(
                        "cannot read a score from {}",
                        from
                    ))),
                },
                other => Err(SmtError::Virtualization(format!(
                    "{:?} has no score representation",
                    other
                ))),
            }
        }
        Address::Storage { .. } => {
            let t = target.storage_ref()?;
            match source {
                SmtAtom::Null => Ok(vec![format!("data remove {}", t)]),
                SmtAtom::Var(slot) => match linker.address(slot, level)? {
                    from @ Address::Score { .. } => Ok(vec![format!(
                        "execute store result {} int 1 run scoreboard players get {}",
                        t,
                        from.score_ref()?
                    )]),
                    from @ Address::Storage { .. } => Ok(vec![
                        format!("data remove {}", t),
                        format!("data modify {} set from {}", t, from.storage_ref()?),
                    ]),
                    from => Err(SmtError::Virtualization(format!(
                        "cannot copy {} into storage",
                        from
                    ))),
                },
                constant => {
                    let literal = storage_literal(constant)?;
                    Ok(vec![format!("data modify {} set value {}", t, literal)])
                }
            }
        }
        Address::Tag { tag, .. } => match source {
            SmtAtom::Var(slot) => {
                let from = linker.address(slot, level)?;
                let selector = from.selector().ok_or_else(|| {
                    SmtError::Virtualization(format!("cannot select entities from {}", from))
                })?;
                Ok(vec![
                    format!("tag @e[tag={}] remove {}", tag, tag),
                    format!("tag {} add {}", selector, tag),
                ])
            }
            other => Err(SmtError::Virtualization(format!(
                "cannot tag {:?} as an executor",
                other
            ))),
        },
    }
}

/// An atom usable on the right-hand side of a scoreboard operation
pub(crate) fn score_operand(
    linker: &Linker,
    atom: &SmtAtom,
    level: usize,
) -> Result<String, SmtError> {
    match atom {
        SmtAtom::Var(slot) => linker.address(slot, level)?.score_ref(),
        SmtAtom::Int(v) => linker.constant(*v)?.score_ref(),
        other => Err(SmtError::Virtualization(format!(
            "{:?} cannot be used as a score",
            other
        ))),
    }
}

/// Entity selector for an executor atom; `None` for the world
pub(crate) fn selector(
    linker: &Linker,
    atom: &SmtAtom,
    level: usize,
) -> Result<Option<String>, SmtError> {
    match atom {
        SmtAtom::World => Ok(None),
        SmtAtom::Var(slot) => match linker.address(slot, level)? {
            Address::World => Ok(None),
            address => address.selector().map(Some).ok_or_else(|| {
                SmtError::Virtualization(format!("{} is not an executor address", address))
            }),
        },
        other => Err(SmtError::Virtualization(format!(
            "{:?} is not an executor",
            other
        ))),
    }
}

fn storage_literal(atom: &SmtAtom) -> Result<String, SmtError> {
    match atom {
        SmtAtom::Int(v) => Ok(v.to_string()),
        SmtAtom::Float(v) if v.is_finite() => Ok(format!("{}d", v)),
        SmtAtom::Float(v) => Err(SmtError::Virtualization(format!(
            "{} has no storage literal",
            v
        ))),
        SmtAtom::Str(s) => serde_json::to_string(s)
            .map_err(|e| SmtError::Virtualization(format!("cannot quote string: {}", e))),
        other => Err(SmtError::Virtualization(format!(
            "{:?} has no storage literal",
            other
        ))),
    }
}

/// What is known about an operand being null when the command runs
enum Nullness {
    Always,
    Never,
    /// Null exactly when this `storage <id> <path>` is missing
    Dynamic(String),
}

fn nullness(linker: &Linker, atom: &SmtAtom, level: usize) -> Result<Nullness, SmtError> {
    match atom {
        SmtAtom::Null => Ok(Nullness::Always),
        SmtAtom::Var(slot) => match linker.address(slot, level)? {
            address @ Address::Storage { .. } => Ok(Nullness::Dynamic(address.storage_ref()?)),
            _ => Ok(Nullness::Never),
        },
        SmtAtom::Int(_) | SmtAtom::Float(_) | SmtAtom::Str(_) | SmtAtom::World => Ok(Nullness::Never),
    }
}

fn render_null_match(target: &str, left: Nullness, right: Nullness) -> Vec<String> {
    use Nullness::*;
    match (left, right) {
        (Always, Always) | (Never, Never) => vec![format!("scoreboard players set {} 1", target)],
        (Always, Never) | (Never, Always) => vec![format!("scoreboard players set {} 0", target)],
        (Dynamic(data), Always) | (Always, Dynamic(data)) => vec![format!(
            "execute store result score {} unless data {}",
            target, data
        )],
        (Dynamic(data), Never) | (Never, Dynamic(data)) => vec![format!(
            "execute store result score {} if data {}",
            target, data
        )],
        (Dynamic(l), Dynamic(r)) => vec![
            format!("scoreboard players set {} 0", target),
            format!(
                "execute if data {} if data {} run scoreboard players set {} 1",
                l, r, target
            ),
            format!(
                "execute unless data {} unless data {} run scoreboard players set {} 1",
                l, r, target
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::smt::fragment::Flavour;
    use crate::smt::atom::SmtVar;
    use crate::smt::invoke::{Condition, branch, call};
    use crate::smt::module::SmtModule;
    use crate::types::Type;

    /// Push `cmds` into the script entry, link, and render every line
    fn render_script(mut module: SmtModule, cmds: Vec<SmtCmd>) -> Vec<String> {
        let entry = module.script().entry();
        module
            .func_mut(SmtModule::SCRIPT)
            .unwrap()
            .push(entry, cmds)
            .unwrap();
        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        module
            .script()
            .fragment(entry)
            .unwrap()
            .commands()
            .iter()
            .flat_map(|cmd| cmd.render(&linker, 0).unwrap())
            .collect()
    }

    fn script_var(module: &mut SmtModule, ty: Type) -> SmtVar {
        module.new_pseudo(SmtModule::SCRIPT, ty).unwrap()
    }

    #[test]
    fn test_assign_and_arith() {
        let mut module = SmtModule::new();
        let a = script_var(&mut module, Type::int());
        let b = script_var(&mut module, Type::int());
        let lines = render_script(
            module,
            vec![
                SmtCmd::assign(Slot::current(a.clone()), SmtAtom::Int(5)),
                SmtCmd::assign(Slot::current(a.clone()), SmtAtom::var(a.clone())),
                SmtCmd::Arith {
                    op: ArithOp::Add,
                    out: Slot::current(a.clone()),
                    left: SmtAtom::var(b.clone()),
                    right: SmtAtom::Int(3),
                },
                SmtCmd::Arith {
                    op: ArithOp::Mul,
                    out: Slot::current(a.clone()),
                    left: SmtAtom::var(a),
                    right: SmtAtom::var(b),
                },
            ],
        );
        assert_eq!(
            lines,
            vec![
                "scoreboard players set $f0_p0_s0 cascade 5",
                "scoreboard players operation $f0_p0_s0 cascade = $f0_p1_s0 cascade",
                "scoreboard players operation $f0_p0_s0 cascade += #c3 cascade.const",
                "scoreboard players operation $f0_p0_s0 cascade *= $f0_p1_s0 cascade",
            ]
        );
    }

    #[test]
    fn test_compare_and_logic() {
        let mut module = SmtModule::new();
        let a = script_var(&mut module, Type::int());
        let b = script_var(&mut module, Type::int());
        let out = script_var(&mut module, Type::bool());
        let lines = render_script(
            module,
            vec![
                SmtCmd::Compare {
                    op: CmpOp::Ne,
                    out: Slot::current(out.clone()),
                    left: SmtAtom::var(a.clone()),
                    right: SmtAtom::var(b.clone()),
                },
                SmtCmd::Logic {
                    op: LogicOp::Or,
                    out: Slot::current(out.clone()),
                    left: SmtAtom::var(a),
                    right: SmtAtom::var(b),
                },
            ],
        );
        assert_eq!(
            lines,
            vec![
                "execute store result score $f0_p2_s0 cascade unless score $f0_p0_s0 cascade = $f0_p1_s0 cascade",
                "scoreboard players set $f0_p2_s0 cascade 0",
                "execute unless score $f0_p0_s0 cascade matches 0 run scoreboard players set $f0_p2_s0 cascade 1",
                "execute unless score $f0_p1_s0 cascade matches 0 run scoreboard players set $f0_p2_s0 cascade 1",
            ]
        );
    }

    #[test]
    fn test_storage_values_and_nullness() {
        let mut module = SmtModule::new();
        let s = script_var(&mut module, Type::str());
        let flag = script_var(&mut module, Type::bool());
        let lines = render_script(
            module,
            vec![
                SmtCmd::assign(Slot::current(s.clone()), SmtAtom::Str("hi \"you\"".into())),
                SmtCmd::assign(Slot::current(s.clone()), SmtAtom::Null),
                SmtCmd::IsNull {
                    out: Slot::current(flag.clone()),
                    operand: SmtAtom::var(s.clone()),
                },
                SmtCmd::IsNull {
                    out: Slot::current(flag.clone()),
                    operand: SmtAtom::Int(3),
                },
                SmtCmd::NullMatch {
                    out: Slot::current(flag),
                    left: SmtAtom::var(s),
                    right: SmtAtom::Null,
                },
            ],
        );
        assert_eq!(
            lines,
            vec![
                r#"data modify storage cascade:vars f0.p0.s0 set value "hi \"you\"""#,
                "data remove storage cascade:vars f0.p0.s0",
                "execute store result score $f0_p1_s0 cascade unless data storage cascade:vars f0.p0.s0",
                "scoreboard players set $f0_p1_s0 cascade 0",
                "execute store result score $f0_p1_s0 cascade unless data storage cascade:vars f0.p0.s0",
            ]
        );
    }

    #[test]
    fn test_float_storage_literals() {
        let mut module = SmtModule::new();
        let x = script_var(&mut module, Type::float());
        let lines = render_script(
            module,
            vec![SmtCmd::assign(Slot::current(x), SmtAtom::Float(2.5))],
        );
        assert_eq!(lines, vec!["data modify storage cascade:vars f0.p0.s0 set value 2.5d"]);

        let mut module = SmtModule::new();
        let x = script_var(&mut module, Type::float());
        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let cmd = SmtCmd::assign(Slot::current(x.clone()), SmtAtom::Float(v));
            assert!(matches!(
                cmd.render(&linker, 0),
                Err(SmtError::Virtualization(_))
            ));
        }
    }

    #[test]
    fn test_invocations() {
        let mut module = SmtModule::new();
        let f = module
            .declare_function("f", Type::entity(), &[], None, false)
            .unwrap();
        let mob = script_var(&mut module, Type::entity());
        let flag = script_var(&mut module, Type::bool());
        let entry = module.script().entry();
        let child = module
            .func_mut(SmtModule::SCRIPT)
            .unwrap()
            .add_fragment(entry, Flavour::If)
            .unwrap();
        let lines = render_script(
            module,
            vec![
                branch(vec![Condition::holds(SmtAtom::var(flag))], SmtModule::SCRIPT, child),
                call(f, SmtAtom::var(mob.clone())),
                call(f, SmtAtom::World),
                SmtCmd::RemoveTag {
                    var: Slot::current(mob),
                },
            ],
        );
        assert_eq!(
            lines,
            vec![
                "execute unless score $f0_p1_s0 cascade matches 0 run function cascade:gen/script/s0/if1",
                "execute as @e[tag=cascade.f0.p0.s0,limit=1] run function cascade:gen/f1_f/s1/entry",
                "function cascade:gen/f1_f/s1/entry",
                "tag @e[tag=cascade.f0.p0.s0] remove cascade.f0.p0.s0",
            ]
        );
    }

    #[test]
    fn test_guarded_prefixes_every_line() {
        let mut module = SmtModule::new();
        let out = script_var(&mut module, Type::bool());
        let flag = script_var(&mut module, Type::bool());
        let lines = render_script(
            module,
            vec![SmtCmd::Guarded {
                guard: Guard::resolve(vec![Condition::fails(SmtAtom::var(flag))]),
                cmd: Box::new(SmtCmd::Logic {
                    op: LogicOp::And,
                    out: Slot::current(out),
                    left: SmtAtom::Int(1),
                    right: SmtAtom::Int(1),
                }),
            }],
        );
        assert_eq!(lines.len(), 2);
        assert!(
            lines
                .iter()
                .all(|l| l.starts_with("execute if score $f0_p1_s0 cascade matches 0 run "))
        );
    }

    #[test]
    fn test_unexpanded_cleanup_fails_to_render() {
        let module = SmtModule::new();
        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        assert!(matches!(
            SmtCmd::FrameCleanup.render(&linker, 0),
            Err(SmtError::Virtualization(_))
        ));
    }
}

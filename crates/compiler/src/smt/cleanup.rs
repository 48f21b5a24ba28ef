//! Frame cleanup
//!
//! Executor variables are entity tags, and a tag outlives the activation that
//! set it. Every exit of a function therefore removes the tags of the
//! executor variables it owns at the current level. Lowering only emits a
//! [`SmtCmd::FrameCleanup`] placeholder; [`expand`] replaces it once the
//! function's variable set is final.

use super::atom::{Slot, SmtVar};
use super::command::SmtCmd;
use super::function::SmtFunc;
use tracing::trace;

/// Variables whose tags are removed when the function exits.
///
/// The world has no tag, and the return slot is still read by the caller
/// after the function exits; the caller removes that one instead.
fn tagged_vars(func: &SmtFunc) -> Vec<SmtVar> {
    let ret = func.slots().and_then(|s| s.ret.as_ref()).map(|v| v.id);
    func.vars()
        .into_iter()
        .filter(|var| var.ty.is_taggable() && Some(var.id) != ret)
        .collect()
}

/// Commands that tear down the current frame
fn remove_tags(vars: &[SmtVar]) -> impl Iterator<Item = SmtCmd> + '_ {
    vars.iter().cloned().map(|var| SmtCmd::RemoveTag {
        var: Slot::current(var),
    })
}

/// Replace every cleanup placeholder in `func` with the real teardown
pub fn expand(func: &mut SmtFunc) {
    let vars = tagged_vars(func);
    let mut expanded = 0;
    for fragment in func.graph_mut().iter_mut() {
        let cmds = std::mem::take(fragment.commands_mut());
        let mut out = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            if matches!(cmd, SmtCmd::FrameCleanup) {
                expanded += 1;
                out.extend(remove_tags(&vars));
            } else {
                out.push(cmd);
            }
        }
        *fragment.commands_mut() = out;
    }
    trace!(
        "Expanded {} cleanup placeholders in {} ({} tags each)",
        expanded,
        func.name(),
        vars.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smt::atom::FuncId;
    use crate::types::Type;

    fn func_with_executors() -> SmtFunc {
        let mut func = SmtFunc::new_user(
            FuncId(1),
            "f",
            Type::entity(),
            &[("target".to_string(), Type::player())],
            Some(Type::entity()),
            false,
        );
        func.new_pseudo(Type::int());
        func.new_pseudo(Type::world());
        func.declare_public("mob", Type::entities());
        func
    }

    #[test]
    fn test_cleanup_skips_world_and_return_slot() {
        let func = func_with_executors();
        let removed: Vec<Type> = remove_tags(&tagged_vars(&func))
            .map(|cmd| match cmd {
                SmtCmd::RemoveTag { var } => var.var.ty,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        // executor slot, parameter, declared group
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&Type::player()));
        assert!(removed.contains(&Type::entities()));
    }

    #[test]
    fn test_expand_replaces_every_placeholder() {
        let mut func = func_with_executors();
        let entry = func.entry();
        let dead = func
            .add_fragment(entry, crate::smt::fragment::Flavour::Dead)
            .unwrap();
        func.push(entry, vec![SmtCmd::FrameCleanup]).unwrap();
        func.push(dead, vec![SmtCmd::FrameCleanup]).unwrap();

        expand(&mut func);

        for (_, fragment) in func.graph().iter() {
            assert!(fragment
                .commands()
                .iter()
                .all(|c| matches!(c, SmtCmd::RemoveTag { .. })));
            assert_eq!(fragment.commands().len(), 3);
        }
    }
}

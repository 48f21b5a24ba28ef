//! Entity operations
//!
//! Executor methods (`kill`, `tag_add`, `tag_remove`) and the entity query
//! chain `world.get_entities().with_tag(name).limit(n).find()`. A query
//! result is itself an executor variable: the selected entities receive that
//! variable's tag.

use super::{
    ChainData, ChainLink, LibraryCmd, LibraryOp, Lowered, constant_int, constant_str, expect_args,
};
use crate::smt::command::selector;
use crate::smt::{Address, FuncId, Linker, SmtAtom, SmtCmd, SmtError, SmtModule, Slot};
use crate::types::Type;

/// Characters the target accepts in a tag name
fn validate_tag(op: &str, tag: &str) -> Result<(), SmtError> {
    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'));
    if valid {
        Ok(())
    } else {
        Err(SmtError::Representation(format!(
            "`{}`: '{}' is not a valid tag name",
            op, tag
        )))
    }
}

fn expect_entity(op: &str, executor: &SmtAtom) -> Result<(), SmtError> {
    if executor.ty().is_taggable() {
        Ok(())
    } else {
        Err(SmtError::Representation(format!(
            "`{}` must run on an entity, not {}",
            op,
            executor.ty()
        )))
    }
}

fn entity_selector(linker: &Linker, atom: &SmtAtom, level: usize) -> Result<String, SmtError> {
    selector(linker, atom, level)?
        .ok_or_else(|| SmtError::Virtualization("the world has no entity selector".to_string()))
}

/// `entity.kill()`
pub struct Kill;

impl LibraryOp for Kill {
    fn name(&self) -> &'static str {
        "kill"
    }

    fn lower(
        &self,
        executor: SmtAtom,
        params: Vec<SmtAtom>,
        _extra: Vec<SmtAtom>,
        _module: &mut SmtModule,
        _func: FuncId,
    ) -> Result<Lowered, SmtError> {
        expect_args(self.name(), &params, 0)?;
        expect_entity(self.name(), &executor)?;
        Ok((
            vec![SmtCmd::Library(Box::new(KillCmd { target: executor }))],
            SmtAtom::Null,
        ))
    }
}

#[derive(Debug)]
pub struct KillCmd {
    target: SmtAtom,
}

impl LibraryCmd for KillCmd {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        Ok(vec![format!(
            "kill {}",
            entity_selector(linker, &self.target, level)?
        )])
    }

    fn atoms(&self) -> Vec<&SmtAtom> {
        vec![&self.target]
    }
}

/// `entity.tag_add(name)` and `entity.tag_remove(name)`
pub enum TagEdit {
    Add,
    Remove,
}

impl LibraryOp for TagEdit {
    fn name(&self) -> &'static str {
        match self {
            TagEdit::Add => "tag_add",
            TagEdit::Remove => "tag_remove",
        }
    }

    fn lower(
        &self,
        executor: SmtAtom,
        params: Vec<SmtAtom>,
        _extra: Vec<SmtAtom>,
        _module: &mut SmtModule,
        _func: FuncId,
    ) -> Result<Lowered, SmtError> {
        expect_args(self.name(), &params, 1)?;
        expect_entity(self.name(), &executor)?;
        let tag = constant_str(self.name(), &params[0])?.to_string();
        validate_tag(self.name(), &tag)?;
        Ok((
            vec![SmtCmd::Library(Box::new(TagCmd {
                target: executor,
                tag,
                add: matches!(self, TagEdit::Add),
            }))],
            SmtAtom::Null,
        ))
    }
}

#[derive(Debug)]
pub struct TagCmd {
    target: SmtAtom,
    tag: String,
    add: bool,
}

impl LibraryCmd for TagCmd {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        Ok(vec![format!(
            "tag {} {} {}",
            entity_selector(linker, &self.target, level)?,
            if self.add { "add" } else { "remove" },
            self.tag
        )])
    }

    fn atoms(&self) -> Vec<&SmtAtom> {
        vec![&self.target]
    }
}

/// `world.get_entities()`: starts an entity query
pub struct GetEntities;

impl ChainLink for GetEntities {
    fn name(&self) -> &'static str {
        "get_entities"
    }

    fn apply(&self, data: &mut ChainData, args: &[SmtAtom]) -> Result<(), SmtError> {
        expect_args(self.name(), args, 0)?;
        if !data.executor.ty().is_world() {
            return Err(SmtError::Representation(format!(
                "`get_entities` is a world method, called on {}",
                data.executor.ty()
            )));
        }
        if data.source.is_some() {
            return Err(SmtError::Representation(
                "`get_entities` used twice in one chain".to_string(),
            ));
        }
        data.source = Some("entities");
        Ok(())
    }
}

/// `.with_tag(name)`: keep only entities carrying `name`
pub struct WithTag;

impl ChainLink for WithTag {
    fn name(&self) -> &'static str {
        "with_tag"
    }

    fn apply(&self, data: &mut ChainData, args: &[SmtAtom]) -> Result<(), SmtError> {
        expect_args(self.name(), args, 1)?;
        let tag = constant_str(self.name(), &args[0])?;
        validate_tag(self.name(), tag)?;
        data.tags.push(tag.to_string());
        Ok(())
    }
}

/// `.limit(n)`: select at most `n` entities
pub struct Limit;

impl ChainLink for Limit {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn apply(&self, data: &mut ChainData, args: &[SmtAtom]) -> Result<(), SmtError> {
        expect_args(self.name(), args, 1)?;
        let n = constant_int(self.name(), &args[0])?;
        if n < 1 {
            return Err(SmtError::Representation(format!(
                "`limit` must be at least 1, got {}",
                n
            )));
        }
        data.limit = Some(n);
        Ok(())
    }
}

/// Terminal links of an entity query
pub enum Select {
    /// `.find()`: every match, as a group
    Find,
    /// `.first()`: at most one match
    First,
}

impl ChainLink for Select {
    fn name(&self) -> &'static str {
        match self {
            Select::Find => "find",
            Select::First => "first",
        }
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn apply(&self, _data: &mut ChainData, args: &[SmtAtom]) -> Result<(), SmtError> {
        expect_args(self.name(), args, 0)
    }

    fn lower(
        &self,
        data: ChainData,
        module: &mut SmtModule,
        func: FuncId,
    ) -> Result<Lowered, SmtError> {
        if data.source.is_none() {
            return Err(SmtError::Representation(format!(
                "`{}` needs a query source such as `get_entities()`",
                self.name()
            )));
        }
        let (ty, limit) = match self {
            Select::Find => (Type::entities(), data.limit),
            Select::First => (Type::entity(), Some(1)),
        };
        let out = module.new_pseudo(func, ty)?;
        Ok((
            vec![SmtCmd::Library(Box::new(SelectCmd {
                out: Slot::current(out.clone()),
                tags: data.tags,
                limit,
            }))],
            SmtAtom::var(out),
        ))
    }
}

#[derive(Debug)]
pub struct SelectCmd {
    out: Slot,
    tags: Vec<String>,
    limit: Option<i64>,
}

impl LibraryCmd for SelectCmd {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        let tag = match linker.address(&self.out, level)? {
            Address::Tag { tag, .. } => tag,
            other => {
                return Err(SmtError::Virtualization(format!(
                    "query result is linked to {}, not a tag",
                    other
                )));
            }
        };
        let mut filters: Vec<String> = self.tags.iter().map(|t| format!("tag={}", t)).collect();
        if let Some(limit) = self.limit {
            filters.push(format!("limit={}", limit));
        }
        let query = if filters.is_empty() {
            "@e".to_string()
        } else {
            format!("@e[{}]", filters.join(","))
        };
        Ok(vec![
            format!("tag @e[tag={}] remove {}", tag, tag),
            format!("tag {} add {}", query, tag),
        ])
    }

    fn atoms(&self) -> Vec<&SmtAtom> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    type Step<'a> = (&'a dyn ChainLink, Vec<SmtAtom>);

    fn step(link: &dyn ChainLink, args: Vec<SmtAtom>) -> Step<'_> {
        (link, args)
    }

    fn run_chain(links: &[Step<'_>]) -> Result<(SmtModule, Lowered), SmtError> {
        let mut module = SmtModule::new();
        let mut data = ChainData::new(SmtAtom::World);
        let (last, rest) = links.split_last().expect("non-empty chain");
        for (link, args) in rest {
            link.apply(&mut data, args)?;
        }
        last.0.apply(&mut data, &last.1)?;
        let lowered = last.0.lower(data, &mut module, SmtModule::SCRIPT)?;
        Ok((module, lowered))
    }

    #[test]
    fn test_find_with_tag_and_limit() {
        let (module, (cmds, result)) = run_chain(&[
            step(&GetEntities, vec![]),
            step(&WithTag, vec![SmtAtom::Str("boss".into())]),
            step(&Limit, vec![SmtAtom::Int(3)]),
            step(&Select::Find, vec![]),
        ])
        .unwrap();
        assert_eq!(result.ty(), Type::entities());

        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        assert_eq!(
            cmds[0].render(&linker, 0).unwrap(),
            vec![
                "tag @e[tag=cascade.f0.p0.s0] remove cascade.f0.p0.s0",
                "tag @e[tag=boss,limit=3] add cascade.f0.p0.s0",
            ]
        );
    }

    #[test]
    fn test_first_is_solitary() {
        let (_, (_, result)) =
            run_chain(&[step(&GetEntities, vec![]), step(&Select::First, vec![])]).unwrap();
        assert_eq!(result.ty(), Type::entity());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let err = run_chain(&[
            step(&WithTag, vec![SmtAtom::Str("a".into())]),
            step(&Select::Find, vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, SmtError::Representation(_)));
    }

    #[test]
    fn test_non_terminal_link_cannot_end_a_chain() {
        let mut module = SmtModule::new();
        let data = ChainData::new(SmtAtom::World);
        assert!(Limit.lower(data, &mut module, SmtModule::SCRIPT).is_err());
    }

    #[test]
    fn test_kill_and_tag_need_an_entity() {
        let mut module = SmtModule::new();
        let mob = module
            .new_pseudo(SmtModule::SCRIPT, Type::entity())
            .unwrap();
        let (cmds, _) = Kill
            .lower(
                SmtAtom::var(mob.clone()),
                vec![],
                vec![],
                &mut module,
                SmtModule::SCRIPT,
            )
            .unwrap();
        let (tag_cmds, _) = TagEdit::Add
            .lower(
                SmtAtom::var(mob),
                vec![SmtAtom::Str("marked".into())],
                vec![],
                &mut module,
                SmtModule::SCRIPT,
            )
            .unwrap();
        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        assert_eq!(
            cmds[0].render(&linker, 0).unwrap(),
            vec!["kill @e[tag=cascade.f0.p0.s0,limit=1]"]
        );
        assert_eq!(
            tag_cmds[0].render(&linker, 0).unwrap(),
            vec!["tag @e[tag=cascade.f0.p0.s0,limit=1] add marked"]
        );

        assert!(Kill
            .lower(SmtAtom::World, vec![], vec![], &mut module, SmtModule::SCRIPT)
            .is_err());
        assert!(TagEdit::Remove
            .lower(
                SmtAtom::World,
                vec![SmtAtom::Str("bad tag".into())],
                vec![],
                &mut module,
                SmtModule::SCRIPT
            )
            .is_err());
    }
}

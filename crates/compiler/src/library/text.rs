//! Text output: `print(...)`

use super::{LibraryCmd, LibraryOp, Lowered};
use crate::smt::{Address, FuncId, Linker, SmtAtom, SmtCmd, SmtError, SmtModule};
use serde_json::{Value, json};

/// `print(a, b, ...)`: every value, space separated, to every player
pub struct Print;

impl LibraryOp for Print {
    fn name(&self) -> &'static str {
        "print"
    }

    fn lower(
        &self,
        _executor: SmtAtom,
        params: Vec<SmtAtom>,
        extra: Vec<SmtAtom>,
        _module: &mut SmtModule,
        _func: FuncId,
    ) -> Result<Lowered, SmtError> {
        let parts = params.into_iter().chain(extra).collect();
        Ok((
            vec![SmtCmd::Library(Box::new(PrintCmd { parts }))],
            SmtAtom::Null,
        ))
    }
}

#[derive(Debug)]
pub struct PrintCmd {
    parts: Vec<SmtAtom>,
}

impl LibraryCmd for PrintCmd {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        let mut components = vec![json!("")];
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                components.push(json!(" "));
            }
            components.push(component(linker, part, level)?);
        }
        Ok(vec![format!("tellraw @a {}", Value::Array(components))])
    }

    fn atoms(&self) -> Vec<&SmtAtom> {
        self.parts.iter().collect()
    }
}

/// Text component showing the current value of `atom`
fn component(linker: &Linker, atom: &SmtAtom, level: usize) -> Result<Value, SmtError> {
    Ok(match atom {
        SmtAtom::Int(v) => json!({ "text": v.to_string() }),
        SmtAtom::Float(v) => json!({ "text": v.to_string() }),
        SmtAtom::Str(s) => json!({ "text": s }),
        SmtAtom::Null => json!({ "text": "null" }),
        SmtAtom::World => json!({ "text": "world" }),
        SmtAtom::Var(slot) => match linker.address(slot, level)? {
            Address::Score { holder, objective } => {
                json!({ "score": { "name": holder, "objective": objective } })
            }
            Address::Storage { storage, path } => json!({ "nbt": path, "storage": storage }),
            tag @ Address::Tag { .. } => json!({ "selector": tag.selector() }),
            Address::World => json!({ "text": "world" }),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::types::Type;

    #[test]
    fn test_print_renders_tellraw() {
        let mut module = SmtModule::new();
        let var = module.new_pseudo(SmtModule::SCRIPT, Type::int()).unwrap();
        let (cmds, result) = Print
            .lower(
                SmtAtom::World,
                Vec::new(),
                vec![SmtAtom::Str("x is \"".into()), SmtAtom::var(var)],
                &mut module,
                SmtModule::SCRIPT,
            )
            .unwrap();
        assert_eq!(result, SmtAtom::Null);
        assert_eq!(cmds.len(), 1);

        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        let lines = cmds[0].render(&linker, 0).unwrap();
        assert_eq!(
            lines,
            vec![
                r#"tellraw @a ["",{"text":"x is \""}," ",{"score":{"name":"$f0_p0_s0","objective":"cascade"}}]"#
                    .to_string()
            ]
        );
    }
}

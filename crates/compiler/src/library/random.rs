//! `random_int(min, max)`

use super::{LibraryCmd, LibraryOp, Lowered, constant_int, expect_args};
use crate::smt::{FuncId, Linker, SmtAtom, SmtCmd, SmtError, SmtModule, Slot};
use crate::types::Type;

/// Uniform integer in `min..=max`. Bounds must be compile-time constants.
pub struct RandomInt;

impl LibraryOp for RandomInt {
    fn name(&self) -> &'static str {
        "random_int"
    }

    fn lower(
        &self,
        _executor: SmtAtom,
        params: Vec<SmtAtom>,
        _extra: Vec<SmtAtom>,
        module: &mut SmtModule,
        func: FuncId,
    ) -> Result<Lowered, SmtError> {
        expect_args(self.name(), &params, 2)?;
        let min = constant_int(self.name(), &params[0])?;
        let max = constant_int(self.name(), &params[1])?;
        if min > max {
            return Err(SmtError::Representation(format!(
                "random_int bounds are reversed: {}..={}",
                min, max
            )));
        }
        let out = module.new_pseudo(func, Type::int())?;
        Ok((
            vec![SmtCmd::Library(Box::new(RandomCmd {
                out: Slot::current(out.clone()),
                min,
                max,
            }))],
            SmtAtom::var(out),
        ))
    }
}

#[derive(Debug)]
pub struct RandomCmd {
    out: Slot,
    min: i64,
    max: i64,
}

impl LibraryCmd for RandomCmd {
    fn render(&self, linker: &Linker, level: usize) -> Result<Vec<String>, SmtError> {
        Ok(vec![format!(
            "execute store result score {} run random value {}..{}",
            linker.address(&self.out, level)?.score_ref()?,
            self.min,
            self.max
        )])
    }

    fn atoms(&self) -> Vec<&SmtAtom> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;

    fn lower(params: Vec<SmtAtom>) -> Result<(SmtModule, Lowered), SmtError> {
        let mut module = SmtModule::new();
        let lowered = RandomInt.lower(
            SmtAtom::World,
            params,
            Vec::new(),
            &mut module,
            SmtModule::SCRIPT,
        )?;
        Ok((module, lowered))
    }

    #[test]
    fn test_random_int_renders_range() {
        let (module, (cmds, result)) = lower(vec![SmtAtom::Int(1), SmtAtom::Int(6)]).unwrap();
        assert_eq!(result.ty(), Type::int());
        let linker = Linker::link(&module, &CompilerConfig::new()).unwrap();
        assert_eq!(
            cmds[0].render(&linker, 0).unwrap(),
            vec!["execute store result score $f0_p0_s0 cascade run random value 1..6"]
        );
    }

    #[test]
    fn test_random_int_needs_constant_bounds() {
        let mut module = SmtModule::new();
        let var = module.new_pseudo(SmtModule::SCRIPT, Type::int()).unwrap();
        assert!(lower(vec![SmtAtom::var(var), SmtAtom::Int(3)]).is_err());
        assert!(lower(vec![SmtAtom::Int(3)]).is_err());
        assert!(lower(vec![SmtAtom::Int(3), SmtAtom::Int(1)]).is_err());
    }
}

//! SMT module
//!
//! The module owns every function of a compilation unit. Function 0 is always
//! the top-level script. Library operations allocate through
//! [`SmtModule::new_pseudo`] and never touch the pools directly.

use super::atom::{FuncId, SmtVar};
use super::error::SmtError;
use super::function::SmtFunc;
use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug)]
pub struct SmtModule {
    funcs: Vec<SmtFunc>,
    by_name: HashMap<String, FuncId>,
}

impl Default for SmtModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtModule {
    pub const SCRIPT: FuncId = FuncId(0);

    pub fn new() -> Self {
        SmtModule {
            funcs: vec![SmtFunc::new_script(Self::SCRIPT)],
            by_name: HashMap::from([(SmtFunc::SCRIPT_NAME.to_string(), Self::SCRIPT)]),
        }
    }

    /// Declare a user function; bodies are lowered later, so calls may refer
    /// to functions declared after them.
    pub fn declare_function(
        &mut self,
        name: &str,
        executor: Type,
        params: &[(String, Type)],
        ret: Option<Type>,
        public: bool,
    ) -> Result<FuncId, SmtError> {
        if self.by_name.contains_key(name) {
            return Err(SmtError::Representation(format!(
                "function `{}` declared twice",
                name
            )));
        }
        let id = FuncId(self.funcs.len());
        self.funcs
            .push(SmtFunc::new_user(id, name, executor, params, ret, public));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn script(&self) -> &SmtFunc {
        &self.funcs[Self::SCRIPT.0]
    }

    pub fn func(&self, id: FuncId) -> Result<&SmtFunc, SmtError> {
        self.funcs
            .get(id.0)
            .ok_or_else(|| SmtError::Representation(format!("no function with id {:?}", id)))
    }

    pub fn func_mut(&mut self, id: FuncId) -> Result<&mut SmtFunc, SmtError> {
        self.funcs
            .get_mut(id.0)
            .ok_or_else(|| SmtError::Representation(format!("no function with id {:?}", id)))
    }

    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = &SmtFunc> {
        self.funcs.iter()
    }

    pub(crate) fn functions_mut(&mut self) -> impl Iterator<Item = &mut SmtFunc> {
        self.funcs.iter_mut()
    }

    /// Allocation entry point for library operations
    pub fn new_pseudo(&mut self, func: FuncId, ty: Type) -> Result<SmtVar, SmtError> {
        Ok(self.func_mut(func)?.new_pseudo(ty))
    }
}

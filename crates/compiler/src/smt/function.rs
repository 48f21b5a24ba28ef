//! Function table
//!
//! Every function owns two variable pools (pseudo registers and public named
//! variables) and its fragment graph. User-defined functions additionally own
//! the slots a caller writes into before invoking them.

use super::atom::{FuncId, SmtVar, VarId, VarKind};
use super::command::SmtCmd;
use super::error::SmtError;
use super::fragment::{Flavour, Fragment, FragmentGraph, FragmentId};
use crate::types::Type;
use std::collections::HashMap;

/// Calling-convention slots of a user-defined function
#[derive(Debug, Clone)]
pub struct UserSlots {
    /// One public variable per parameter, in declaration order
    pub params: Vec<SmtVar>,
    /// Pre-lowered default value per parameter. Default registers are owned by
    /// the script, which evaluates them once at load time.
    pub defaults: Vec<Option<SmtVar>>,
    pub ret: Option<SmtVar>,
    /// The function's `this`
    pub executor: SmtVar,
}

#[derive(Debug)]
pub struct SmtFunc {
    id: FuncId,
    name: String,
    public: bool,
    graph: FragmentGraph,
    pseudo: Vec<Type>,
    named: Vec<(String, Type)>,
    /// Name -> index into `named` for the innermost visible declaration
    bindings: HashMap<String, usize>,
    slots: Option<UserSlots>,
}

/// Saved name bindings, restored when a lexical block ends
#[derive(Debug, Clone)]
pub struct ScopeMark(HashMap<String, usize>);

impl SmtFunc {
    /// Name of the top-level script; not a valid identifier, so it never
    /// collides with a user function
    pub const SCRIPT_NAME: &'static str = "<script>";

    pub(crate) fn new_script(id: FuncId) -> Self {
        SmtFunc {
            id,
            name: Self::SCRIPT_NAME.to_string(),
            public: true,
            graph: FragmentGraph::new(),
            pseudo: Vec::new(),
            named: Vec::new(),
            bindings: HashMap::new(),
            slots: None,
        }
    }

    pub(crate) fn new_user(
        id: FuncId,
        name: &str,
        executor: Type,
        params: &[(String, Type)],
        ret: Option<Type>,
        public: bool,
    ) -> Self {
        let mut func = SmtFunc {
            id,
            name: name.to_string(),
            public,
            graph: FragmentGraph::new(),
            pseudo: Vec::new(),
            named: Vec::new(),
            bindings: HashMap::new(),
            slots: None,
        };
        let params: Vec<SmtVar> = params
            .iter()
            .map(|(name, ty)| func.declare_public(name, ty.clone()))
            .collect();
        let ret = ret.map(|ty| func.new_pseudo(ty));
        let executor = func.new_pseudo(executor);
        func.slots = Some(UserSlots {
            defaults: vec![None; params.len()],
            params,
            ret,
            executor,
        });
        func
    }

    pub fn id(&self) -> FuncId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public functions (and the script) are entered from outside at level 0
    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_script(&self) -> bool {
        self.slots.is_none()
    }

    pub fn slots(&self) -> Option<&UserSlots> {
        self.slots.as_ref()
    }

    pub(crate) fn set_default(&mut self, param: usize, register: SmtVar) -> Result<(), SmtError> {
        let slots = self.slots.as_mut().ok_or_else(|| {
            SmtError::Representation(format!("`{}` has no parameters", self.name))
        })?;
        let slot = slots.defaults.get_mut(param).ok_or_else(|| {
            SmtError::Representation(format!(
                "`{}` has no parameter #{}",
                self.name, param
            ))
        })?;
        *slot = Some(register);
        Ok(())
    }

    /// Type of `this` inside the body; the script runs as the world
    pub fn executor_type(&self) -> Type {
        self.slots
            .as_ref()
            .map_or_else(Type::world, |s| s.executor.ty.clone())
    }

    // ------------------------------------------------------------------
    // Variable pools
    // ------------------------------------------------------------------

    pub fn new_pseudo(&mut self, ty: Type) -> SmtVar {
        let index = self.pseudo.len();
        self.pseudo.push(ty.clone());
        SmtVar {
            id: VarId {
                owner: self.id,
                kind: VarKind::Pseudo,
                index,
            },
            ty,
        }
    }

    /// Declare a named variable. Redeclaring a name creates a fresh variable
    /// that shadows the previous one until the enclosing scope ends.
    pub fn declare_public(&mut self, name: &str, ty: Type) -> SmtVar {
        let index = self.named.len();
        self.named.push((name.to_string(), ty.clone()));
        self.bindings.insert(name.to_string(), index);
        SmtVar {
            id: VarId {
                owner: self.id,
                kind: VarKind::Public,
                index,
            },
            ty,
        }
    }

    pub fn public_var(&self, name: &str) -> Option<SmtVar> {
        self.bindings.get(name).map(|&index| SmtVar {
            id: VarId {
                owner: self.id,
                kind: VarKind::Public,
                index,
            },
            ty: self.named[index].1.clone(),
        })
    }

    /// Name a public variable was declared with
    pub fn public_name(&self, index: usize) -> Option<&str> {
        self.named.get(index).map(|(name, _)| name.as_str())
    }

    pub(crate) fn mark_scope(&self) -> ScopeMark {
        ScopeMark(self.bindings.clone())
    }

    pub(crate) fn restore_scope(&mut self, mark: ScopeMark) {
        self.bindings = mark.0;
    }

    /// Every variable the function owns: pseudo registers first, then named ones
    pub fn vars(&self) -> Vec<SmtVar> {
        let pseudo = self.pseudo.iter().enumerate().map(|(index, ty)| SmtVar {
            id: VarId {
                owner: self.id,
                kind: VarKind::Pseudo,
                index,
            },
            ty: ty.clone(),
        });
        let named = self.named.iter().enumerate().map(|(index, (_, ty))| SmtVar {
            id: VarId {
                owner: self.id,
                kind: VarKind::Public,
                index,
            },
            ty: ty.clone(),
        });
        pseudo.chain(named).collect()
    }

    // ------------------------------------------------------------------
    // Fragments
    // ------------------------------------------------------------------

    pub fn graph(&self) -> &FragmentGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut FragmentGraph {
        &mut self.graph
    }

    pub fn entry(&self) -> FragmentId {
        self.graph.entry()
    }

    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.graph.get(id)
    }

    pub fn add_fragment(
        &mut self,
        parent: FragmentId,
        flavour: Flavour,
    ) -> Result<FragmentId, SmtError> {
        self.graph.add_fragment(parent, flavour)
    }

    pub fn push(&mut self, fragment: FragmentId, cmds: Vec<SmtCmd>) -> Result<(), SmtError> {
        self.graph.push(fragment, cmds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_are_dense_and_separate() {
        let mut func = SmtFunc::new_script(FuncId(0));
        let a = func.new_pseudo(Type::int());
        let b = func.new_pseudo(Type::str());
        let x = func.declare_public("x", Type::bool());
        assert_eq!(a.id.index, 0);
        assert_eq!(b.id.index, 1);
        assert_eq!(x.id.index, 0);
        assert_eq!(x.id.kind, VarKind::Public);
        assert_eq!(func.vars().len(), 3);
        assert!(func.is_script());
        assert_eq!(func.executor_type(), Type::world());
    }

    #[test]
    fn test_shadowing_and_scope_restore() {
        let mut func = SmtFunc::new_script(FuncId(0));
        let outer = func.declare_public("x", Type::int());
        let mark = func.mark_scope();
        let inner = func.declare_public("x", Type::str());
        assert_eq!(func.public_var("x"), Some(inner.clone()));
        func.restore_scope(mark);
        assert_eq!(func.public_var("x"), Some(outer));
        assert_ne!(inner.id.index, 0);
        assert_eq!(func.public_name(inner.id.index), Some("x"));
    }

    #[test]
    fn test_user_function_slots() {
        let func = SmtFunc::new_user(
            FuncId(3),
            "add1",
            Type::entity(),
            &[("n".to_string(), Type::int())],
            Some(Type::int()),
            false,
        );
        let slots = func.slots().unwrap();
        assert_eq!(slots.params.len(), 1);
        assert_eq!(func.public_var("n"), Some(slots.params[0].clone()));
        assert_eq!(slots.ret.as_ref().unwrap().ty, Type::int());
        assert_eq!(slots.executor.ty, Type::entity());
        assert_eq!(slots.defaults, vec![None]);
        assert_eq!(func.executor_type(), Type::entity());
        assert!(!func.is_public());
    }

    #[test]
    fn test_set_default_checks_bounds() {
        let mut script = SmtFunc::new_script(FuncId(0));
        let reg = script.new_pseudo(Type::int());
        assert!(script.set_default(0, reg.clone()).is_err());

        let mut func = SmtFunc::new_user(
            FuncId(1),
            "f",
            Type::world(),
            &[("a".to_string(), Type::int())],
            None,
            false,
        );
        assert!(func.set_default(1, reg.clone()).is_err());
        func.set_default(0, reg.clone()).unwrap();
        assert_eq!(func.slots().unwrap().defaults[0], Some(reg));
    }
}

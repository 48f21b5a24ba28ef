//! Contextual tree for Cascade
//!
//! The contextual tree is the output of the type checker and constant folder:
//! every node is already validated and carries its resolved [`Type`]. It is the
//! only input the lowering layer consumes. Trees are usually built in memory by
//! the front end, but they can also be loaded from JSON (see `cascadec build`).

use crate::types::Type;
use serde::Deserialize;

/// A whole compilation unit: the top-level script plus every user function
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtxModule {
    #[serde(default)]
    pub functions: Vec<CtxFunc>,
    /// Top-level statements, run once when the pack loads
    #[serde(default)]
    pub script: Vec<CtxStmnt>,
}

/// A user-defined function
#[derive(Debug, Clone, Deserialize)]
pub struct CtxFunc {
    pub name: String,
    /// Type of `this` inside the body
    #[serde(default = "Type::world")]
    pub executor: Type,
    #[serde(default)]
    pub params: Vec<CtxParam>,
    /// `None` for functions that return nothing
    #[serde(default)]
    pub return_type: Option<Type>,
    pub body: Vec<CtxStmnt>,
    /// Public functions may be invoked from outside the pack, at stack level 0
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CtxParam {
    pub name: String,
    pub ty: Type,
    /// Default value used when a call site leaves the argument unbound
    #[serde(default)]
    pub default: Option<CtxExpr>,
}

/// Lexical owner of a named variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Declared by the function being lowered
    #[default]
    Local,
    /// Declared by the top-level script
    Script,
}

/// Reference to a named (public) variable
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VarRef {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub scope: Scope,
}

impl VarRef {
    pub fn local(name: impl Into<String>, ty: Type) -> Self {
        VarRef {
            name: name.into(),
            ty,
            scope: Scope::Local,
        }
    }

    pub fn script(name: impl Into<String>, ty: Type) -> Self {
        VarRef {
            name: name.into(),
            ty,
            scope: Scope::Script,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum CtxStmnt {
    Assign {
        target: VarRef,
        value: CtxExpr,
    },
    Expr {
        expr: CtxExpr,
    },
    Return {
        #[serde(default)]
        value: Option<CtxExpr>,
    },
    While {
        cond: CtxExpr,
        body: Vec<CtxStmnt>,
    },
    /// `if`/`elif` chain with an optional `else`
    If {
        branches: Vec<CtxBranch>,
        #[serde(default)]
        else_body: Option<Vec<CtxStmnt>>,
    },
    /// `for index in start..end` (or `..=` when `inclusive`)
    For {
        index: VarRef,
        start: CtxExpr,
        end: CtxExpr,
        #[serde(default)]
        inclusive: bool,
        body: Vec<CtxStmnt>,
    },
    /// Declaration marker; `value` is the optional initializer
    VarDecl {
        var: VarRef,
        #[serde(default)]
        value: Option<CtxExpr>,
    },
    Block {
        body: Vec<CtxStmnt>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CtxBranch {
    pub cond: CtxExpr,
    pub body: Vec<CtxStmnt>,
}

/// An expression together with its resolved type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CtxExpr {
    pub ty: Type,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    NullCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprKind {
    Int {
        value: i64,
    },
    Bool {
        value: bool,
    },
    Float {
        value: f64,
    },
    Str {
        value: String,
    },
    Null,
    Var {
        var: VarRef,
    },
    /// The executor of the current function
    This,
    World,
    Binary {
        op: BinOp,
        left: Box<CtxExpr>,
        right: Box<CtxExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<CtxExpr>,
    },
    /// Call to a user-defined function; `None` arguments use the parameter default
    Call {
        func: String,
        #[serde(default)]
        executor: Option<Box<CtxExpr>>,
        #[serde(default)]
        args: Vec<Option<CtxExpr>>,
    },
    /// Call to a library operation
    Library {
        name: String,
        #[serde(default)]
        executor: Option<Box<CtxExpr>>,
        #[serde(default)]
        args: Vec<CtxExpr>,
        #[serde(default)]
        extra: Vec<CtxExpr>,
    },
    /// Fluent chain of library links, e.g. `world.get_entities().with_tag("a").find()`
    Chain {
        executor: Box<CtxExpr>,
        links: Vec<CtxLink>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CtxLink {
    pub name: String,
    #[serde(default)]
    pub args: Vec<CtxExpr>,
}

impl CtxExpr {
    pub fn new(ty: Type, kind: ExprKind) -> Self {
        CtxExpr { ty, kind }
    }

    pub fn int(value: i64) -> Self {
        CtxExpr::new(Type::int(), ExprKind::Int { value })
    }

    pub fn bool(value: bool) -> Self {
        CtxExpr::new(Type::bool(), ExprKind::Bool { value })
    }

    pub fn str(value: impl Into<String>) -> Self {
        CtxExpr::new(
            Type::str(),
            ExprKind::Str {
                value: value.into(),
            },
        )
    }

    pub fn null() -> Self {
        CtxExpr::new(Type::null(), ExprKind::Null)
    }

    pub fn var(var: VarRef) -> Self {
        CtxExpr::new(var.ty.clone(), ExprKind::Var { var })
    }

    pub fn binary(op: BinOp, left: CtxExpr, right: CtxExpr, ty: Type) -> Self {
        CtxExpr::new(
            ty,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    pub fn call(func: impl Into<String>, args: Vec<Option<CtxExpr>>, ty: Type) -> Self {
        CtxExpr::new(
            ty,
            ExprKind::Call {
                func: func.into(),
                executor: None,
                args,
            },
        )
    }

    /// Library call whose arguments are all variadic extras (e.g. `print`)
    pub fn library(name: impl Into<String>, extra: Vec<CtxExpr>, ty: Type) -> Self {
        CtxExpr::new(
            ty,
            ExprKind::Library {
                name: name.into(),
                executor: None,
                args: Vec::new(),
                extra,
            },
        )
    }
}

//! Semantic types for Cascade
//!
//! Types arrive fully resolved from the type checker. The lowering layer only
//! cares about which *family* a type belongs to: the family decides both how an
//! expression is lowered and what kind of address its variables are linked to.

use serde::Deserialize;
use std::fmt;

/// Plain data kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InertKind {
    Int,
    Bool,
    Float,
    Str,
    /// The type of the `null` literal
    Null,
}

/// Executor kinds: the implicit subject a command runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    Entity,
    Player,
    /// The world itself; never tagged
    World,
}

/// A resolved semantic type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Type {
    Inert {
        kind: InertKind,
        #[serde(default)]
        nullable: bool,
    },
    Exec {
        kind: ExecKind,
        /// Group executors may select many targets; solitary ones at most one
        #[serde(default)]
        group: bool,
    },
    Struct {
        name: String,
    },
}

/// Coarse classification that drives both lowering and linking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// Non-nullable int and bool: live in numeric registers
    IntCoercible,
    /// Floats, strings, null and every nullable scalar: live in storage
    OtherScalar,
    /// Entities, players and the world
    Executor,
    /// Compound values: live in storage
    Struct,
}

impl Type {
    pub fn int() -> Self {
        Type::Inert {
            kind: InertKind::Int,
            nullable: false,
        }
    }

    pub fn bool() -> Self {
        Type::Inert {
            kind: InertKind::Bool,
            nullable: false,
        }
    }

    pub fn float() -> Self {
        Type::Inert {
            kind: InertKind::Float,
            nullable: false,
        }
    }

    pub fn str() -> Self {
        Type::Inert {
            kind: InertKind::Str,
            nullable: false,
        }
    }

    pub fn null() -> Self {
        Type::Inert {
            kind: InertKind::Null,
            nullable: true,
        }
    }

    pub fn entity() -> Self {
        Type::Exec {
            kind: ExecKind::Entity,
            group: false,
        }
    }

    pub fn entities() -> Self {
        Type::Exec {
            kind: ExecKind::Entity,
            group: true,
        }
    }

    pub fn player() -> Self {
        Type::Exec {
            kind: ExecKind::Player,
            group: false,
        }
    }

    pub fn world() -> Self {
        Type::Exec {
            kind: ExecKind::World,
            group: false,
        }
    }

    /// The nullable version of an inert type; other types are returned unchanged
    pub fn nullable(self) -> Self {
        match self {
            Type::Inert { kind, .. } => Type::Inert {
                kind,
                nullable: true,
            },
            other => other,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Type::Inert {
                kind: InertKind::Int | InertKind::Bool,
                nullable: false,
            } => TypeFamily::IntCoercible,
            Type::Inert { .. } => TypeFamily::OtherScalar,
            Type::Exec { .. } => TypeFamily::Executor,
            Type::Struct { .. } => TypeFamily::Struct,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Inert { nullable: true, .. })
    }

    pub fn is_world(&self) -> bool {
        matches!(
            self,
            Type::Exec {
                kind: ExecKind::World,
                ..
            }
        )
    }

    /// Entity or player executors: the ones that are tracked with tags
    pub fn is_taggable(&self) -> bool {
        matches!(
            self,
            Type::Exec {
                kind: ExecKind::Entity | ExecKind::Player,
                ..
            }
        )
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Type::Exec { group: true, .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Inert { kind, nullable } => {
                let name = match kind {
                    InertKind::Int => "int",
                    InertKind::Bool => "bool",
                    InertKind::Float => "float",
                    InertKind::Str => "str",
                    InertKind::Null => return write!(f, "null"),
                };
                if *nullable {
                    write!(f, "{}?", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            Type::Exec { kind, group } => {
                let name = match kind {
                    ExecKind::Entity => "Entity",
                    ExecKind::Player => "Player",
                    ExecKind::World => "world",
                };
                if *group {
                    write!(f, "Group[{}]", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            Type::Struct { name } => write!(f, "{}", name),
        }
    }
}

//! Variables and atoms
//!
//! An [`SmtVar`] is an abstract handle: it has a type and an owner but no
//! address. Addresses only exist after linking, and they are always looked up
//! through a [`Slot`], which pairs the variable with the frame it is accessed in.

use crate::types::Type;

/// Index of a function inside its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKind {
    /// Anonymous compiler register, densely indexed
    Pseudo,
    /// Named, user-declared variable (parameters included)
    Public,
}

impl VarKind {
    pub(crate) fn token(self) -> &'static str {
        match self {
            VarKind::Pseudo => "p",
            VarKind::Public => "v",
        }
    }
}

/// Identity of a variable: unique across the whole module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId {
    pub owner: FuncId,
    pub kind: VarKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SmtVar {
    pub id: VarId,
    pub ty: Type,
}

impl SmtVar {
    pub fn owner(&self) -> FuncId {
        self.id.owner
    }
}

/// Stack frame a slot is resolved in, relative to the rendering level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    /// Level N: the activation executing the command
    Current,
    /// Level N+1: the activation about to be (or just) invoked
    Callee,
}

impl Frame {
    pub fn offset(self) -> usize {
        match self {
            Frame::Current => 0,
            Frame::Callee => 1,
        }
    }
}

/// A variable reference inside a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub var: SmtVar,
    pub frame: Frame,
}

impl Slot {
    pub fn current(var: SmtVar) -> Self {
        Slot {
            var,
            frame: Frame::Current,
        }
    }

    pub fn callee(var: SmtVar) -> Self {
        Slot {
            var,
            frame: Frame::Callee,
        }
    }
}

/// The result of lowering an expression: a variable or a compile-time constant
#[derive(Debug, Clone, PartialEq)]
pub enum SmtAtom {
    Var(Slot),
    /// Integer constant; booleans lower to 0 and 1
    Int(i64),
    Float(f64),
    Str(String),
    Null,
    World,
}

impl SmtAtom {
    pub fn var(var: SmtVar) -> Self {
        SmtAtom::Var(Slot::current(var))
    }

    pub fn bool(value: bool) -> Self {
        SmtAtom::Int(i64::from(value))
    }

    pub fn ty(&self) -> Type {
        match self {
            SmtAtom::Var(slot) => slot.var.ty.clone(),
            SmtAtom::Int(_) => Type::int(),
            SmtAtom::Float(_) => Type::float(),
            SmtAtom::Str(_) => Type::str(),
            SmtAtom::Null => Type::null(),
            SmtAtom::World => Type::world(),
        }
    }

    pub fn as_slot(&self) -> Option<&Slot> {
        match self {
            SmtAtom::Var(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SmtAtom::Null)
    }

    pub fn is_constant(&self) -> bool {
        !matches!(self, SmtAtom::Var(_))
    }

    /// Compile-time truth value of a constant; `None` for variables and
    /// constants with no boolean reading
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            SmtAtom::Int(v) => Some(*v != 0),
            SmtAtom::Null => Some(false),
            SmtAtom::Var(_) | SmtAtom::Float(_) | SmtAtom::Str(_) | SmtAtom::World => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(kind: VarKind, index: usize, ty: Type) -> SmtVar {
        SmtVar {
            id: VarId {
                owner: FuncId(1),
                kind,
                index,
            },
            ty,
        }
    }

    #[test]
    fn test_atom_types() {
        assert_eq!(SmtAtom::bool(true), SmtAtom::Int(1));
        assert_eq!(SmtAtom::Null.ty(), Type::null());
        let v = var(VarKind::Pseudo, 0, Type::str());
        assert_eq!(SmtAtom::var(v).ty(), Type::str());
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(SmtAtom::Int(0).truthiness(), Some(false));
        assert_eq!(SmtAtom::Int(-3).truthiness(), Some(true));
        assert_eq!(SmtAtom::Null.truthiness(), Some(false));
        let v = var(VarKind::Public, 2, Type::bool());
        assert_eq!(SmtAtom::var(v).truthiness(), None);
    }

    #[test]
    fn test_slot_frames() {
        let v = var(VarKind::Public, 0, Type::int());
        assert_eq!(Slot::current(v.clone()).frame.offset(), 0);
        assert_eq!(Slot::callee(v).frame.offset(), 1);
    }
}

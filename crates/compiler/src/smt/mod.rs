//! Statement representation (SMT)
//!
//! Lowers the contextual tree into a flat graph of command fragments and
//! links it to concrete addresses:
//!
//! ```text
//! CtxModule --convert--> SmtModule (fragments, abstract vars)
//!           --link-----> Linker (addresses per stack level)
//!           --render---> text, one copy per reachable stack level
//! ```
//!
//! # Module Structure
//!
//! - `atom.rs`: variables, slots and atoms
//! - `fragment.rs`: route-addressed fragment graph
//! - `function.rs` / `module.rs`: variable pools and the function table
//! - `command.rs`: the closed command set and its rendering
//! - `invoke.rs`: conditional invocation, the only control transfer
//! - `convert/`: statement and expression lowering
//! - `cleanup.rs`: per-frame tag teardown
//! - `linker.rs`: address assignment

pub mod atom;
pub mod cleanup;
pub mod command;
pub mod convert;
pub mod error;
pub mod fragment;
pub mod function;
pub mod invoke;
pub mod linker;
pub mod module;

pub use atom::{Frame, FuncId, SmtAtom, SmtVar, Slot, VarId, VarKind};
pub use command::{ArithOp, CmpOp, LogicOp, SmtCmd};
pub use convert::lower_module;
pub use error::SmtError;
pub use fragment::{Flavour, Fragment, FragmentGraph, FragmentId, RouteNode};
pub use function::{SmtFunc, UserSlots};
pub use invoke::{Condition, Guard, InvokeTarget};
pub use linker::{Address, Linker, VarLinkage};
pub use module::SmtModule;

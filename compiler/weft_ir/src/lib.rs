//! Program representation for the Weft middle end.
//!
//! This crate provides:
//!
//! - **Arenas** ([`Program`]): types, symbols, statements, and functions
//!   addressed by stable 32-bit handles ([`TypeId`], [`SymId`], [`StmtId`],
//!   [`FnId`]).
//! - **Statement trees** ([`StmtKind`], [`Expr`], [`Operand`]): flat
//!   three-address statements nested through blocks and conditionals, with
//!   parent links so passes can splice code anywhere.
//! - **Iterator metadata** ([`IteratorInfo`], [`TypeFlags`], [`FnFlags`]) :
//!   what iterator lowering needs to find an iterator's body, its instance
//!   types, its protocol operations, and its runtime subtypes.
//! - **Construction helpers** ([`IrBuilder`], [`SymbolMap`]): cursor-based
//!   emission and substituting deep copies.
//!
//! # Design
//!
//! Mutation is handle-based: `insert_before`, `insert_after`,
//! `insert_at_head`, `insert_at_tail`, `remove`, and `replace` all take
//! statement handles and keep parent links consistent. Nothing is freed;
//! detached statements become unreachable.

mod builder;
mod copy;
mod function;
mod ids;
mod name;
mod pretty;
mod program;
mod span;
mod stmt;
mod symbol;
mod types;
mod visit;

pub use builder::IrBuilder;
pub use copy::SymbolMap;
pub use function::{FnDef, FnFlags, IteratorInfo, ProtocolOp};
pub use ids::{FnId, StmtId, SymId, TypeId};
pub use name::{Name, StringInterner};
pub use program::{FunctionTable, IrError, Program};
pub use span::Span;
pub use stmt::{BlockInfo, Expr, FieldRef, Lit, Operand, ParallelKind, PrimOp, Stmt, StmtKind};
pub use symbol::{SymFlags, SymKind, Symbol};
pub use types::{FieldDef, RangeBoundedness, TypeDef, TypeFlags, TypeKind};

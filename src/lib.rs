//! Structural type inference for tensor IR operators.
//!
//! # About struct info
//!
//! Values in a tensor IR carry _struct info_, a compile-time description of
//! their structure. For tensors this is the element type (dtype) and the
//! shape. Either may be only partially known: a shape may have known sizes
//! for every dimension, a known rank but unknown sizes, or an unknown rank.
//! Dimension sizes may be integers or symbolic expressions such as `"batch"`
//! or `"seq" * 2` whose values are only known at runtime.
//!
//! Given the struct info of an operator's operands, this crate computes the
//! struct info of its result. As an example, adding tensors with shapes
//! `("batch", 1, 64)` and `(16, 64)` produces a tensor with shape `("batch",
//! 16, 64)`. When sizes cannot be compared at compile time, inference degrades
//! to a less certain result rather than failing. For example adding tensors
//! of shapes `("m",)` and `("n",)` produces a tensor whose rank is 1 but whose
//! size is unknown.
//!
//! # Inference and normalization
//!
//! Inference happens in two phases. [`infer`] computes a result together with
//! a list of deferred [`Check`]s, such as "these dimension sizes must be
//! equal". Normalization evaluates these checks using a [`ProveEqual`] oracle
//! and reports the first failure as a [`NormalizeError`]. Problems which can
//! be detected from an operator's literal parameters alone, such as the wrong
//! number of operands, are reported when a call is constructed as a
//! [`ConstructError`].
//!
//! # Crate overview
//!
//! - [`StructInfo`] and [`TensorStructInfo`] describe values, using [`Shape`]
//!   and [`DataType`].
//! - [`SymExpr`] represents symbolic dimension sizes and [`SymbolGen`] creates
//!   symbols and shape variables.
//! - [`InferStructInfo`] is implemented by each operator in [`ops`], and [`Op`]
//!   wraps all operators.
//! - [`Builder`] holds a graph of operator calls and normalizes their results.

mod broadcast;
mod builder;
mod dtype;
mod env;
mod infer;
mod iter_util;
mod normalize;
pub mod ops;
mod prove;
mod shape;
mod struct_info;
mod sym_expr;
mod sym_gen;

pub use broadcast::{broadcast_dims, broadcast_shapes};
pub use builder::{Builder, Node, NodeId};
pub use dtype::{DataType, OpClass, ParseDataTypeError, resolve_dtype};
pub use infer::{Check, InferCtx, InferError, InferStructInfo, Inferred, infer};
pub use normalize::{
    NormalizeError, NormalizeErrorKind, NormalizeOptions, normalize_op, structural_equal,
};
pub use ops::{Arity, ConstructError, Op};
pub use prove::{ProveEqual, StructuralProver};
pub use shape::{Shape, ShapeVar};
pub use struct_info::{FuncStructInfo, StructInfo, TensorStructInfo};
pub use sym_expr::{SymExpr, Symbol};
pub use sym_gen::SymbolGen;

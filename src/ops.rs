//! Operators and their struct info inference rules.
//!
//! Each operator type implements [`InferStructInfo`]. The [`Op`] enum wraps
//! all of them so that graphs can hold operators of any kind, and performs the
//! checks on operand counts and literal parameters that happen when a call is
//! constructed.

use std::error::Error;
use std::fmt;

use crate::dtype::{DataType, OpClass, resolve_dtype};
use crate::infer::{
    InferCtx, InferError, InferStructInfo, Inferred, infer, resolve_axes, resolve_axis,
    tensor_input,
};
use crate::prove::ProveEqual;
use crate::shape::Shape;
use crate::struct_info::{StructInfo, TensorStructInfo};
use crate::sym_expr::SymExpr;

mod binary;
mod layout;
mod matmul;
mod split;

pub use binary::{BinaryOp, ParseBinaryOpError};
pub use layout::{BroadcastTo, Flatten, PermuteDims, Reshape, Squeeze, TargetShape};
pub use matmul::MatMul;
pub use split::{Split, SplitSpec};

/// Concatenate tensors along an axis.
///
/// The operands are either several tensors, or a single tuple of tensors.
/// All operands must have the same rank and the same sizes in every dimension
/// except `axis`. If `axis` is `None`, operands must be vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct Concat {
    pub axis: Option<i32>,
}

impl Default for Concat {
    fn default() -> Self {
        Concat { axis: Some(0) }
    }
}

impl InferStructInfo for Concat {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let tensors: Vec<&TensorStructInfo> = match inputs {
            [] => return Err(InferError::IncorrectInputCount),
            [StructInfo::Tuple(elements)] => elements
                .iter()
                .enumerate()
                .map(|(index, el)| {
                    el.as_tensor().ok_or(InferError::WrongInputType {
                        index,
                        expected: "Tensor",
                        actual: el.kind_name(),
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => (0..inputs.len())
                .map(|i| tensor_input(inputs, i))
                .collect::<Result<_, _>>()?,
        };
        let Some(first) = tensors.first() else {
            return Err(InferError::IncorrectInputCount);
        };

        let known_dtypes: Vec<DataType> = tensors.iter().filter_map(|t| t.dtype).collect();
        if let Some(pair) = known_dtypes.windows(2).find(|pair| pair[0] != pair[1]) {
            return Err(InferError::DtypeMismatch {
                lhs: pair[0],
                rhs: pair[1],
            });
        }
        let dtype = if known_dtypes.len() == tensors.len() {
            first.dtype
        } else {
            None
        };
        let output = |shape: Shape| Ok(TensorStructInfo::new(shape, dtype).into());

        let ndims: Vec<usize> = tensors.iter().filter_map(|t| t.ndim()).collect();
        if let Some(pair) = ndims.windows(2).find(|pair| pair[0] != pair[1]) {
            return Err(InferError::ShapeMismatch(format!(
                "cannot concatenate tensors with {} and {} dims",
                pair[0], pair[1]
            )));
        }

        let Some(&ndim) = ndims.first() else {
            let shape = match self.axis {
                Some(_) => Shape::unknown(),
                None => Shape::from_rank(1),
            };
            return output(shape);
        };

        let axis = match self.axis {
            Some(axis) => resolve_axis(ndim, axis)?,
            None if ndim == 1 => 0,
            None => {
                return Err(InferError::ShapeMismatch(format!(
                    "concat without an axis requires 1D inputs but inputs have {} dims",
                    ndim
                )));
            }
        };

        let Some(all_dims) = tensors
            .iter()
            .map(|t| t.shape.dims())
            .collect::<Option<Vec<_>>>()
        else {
            return output(Shape::from_rank(ndim));
        };

        // Sizes of non-concatenated dimensions must match exactly.
        let mut resolved = true;
        for dims in &all_dims[1..] {
            for (i, (size, first_size)) in dims.iter().zip(all_dims[0]).enumerate() {
                if i != axis && !ctx.dims_equal(first_size, size, "concat dimension") {
                    resolved = false;
                }
            }
        }
        if !resolved {
            return output(Shape::from_rank(ndim));
        }

        let mut out_dims = all_dims[0].to_vec();
        out_dims[axis] = SymExpr::sum(all_dims.iter().map(|dims| &dims[axis]));
        output(Shape::from_dims(out_dims))
    }
}

/// Insert dimensions of size 1 into a tensor.
///
/// Each entry in `axes` is a position in the output, in the range
/// `[-out_ndim, out_ndim)`, where `out_ndim` is the input rank plus the
/// number of axes.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandDims {
    pub axes: Vec<i32>,
}

impl InferStructInfo for ExpandDims {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        _ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [_] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        let Some(ndim) = data.ndim() else {
            return Ok(TensorStructInfo::new(Shape::unknown(), dtype).into());
        };
        let out_ndim = ndim + self.axes.len();
        let mut axes = resolve_axes(out_ndim, &self.axes)?;
        axes.sort_unstable();

        let shape = match data.shape.dims() {
            Some(dims) => {
                let mut out_dims = dims.to_vec();
                for axis in axes {
                    out_dims.insert(axis, SymExpr::Value(1));
                }
                Shape::from_dims(out_dims)
            }
            None => Shape::from_rank(out_ndim),
        };

        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

/// Number of operands an operator accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(expected) => n == expected,
            Arity::AtLeast(min) => n >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Errors reported when constructing an operator call.
///
/// Unlike [`InferError`]s, which are reported when a call is normalized,
/// these are reported immediately.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstructError {
    /// The number of operands is not supported by the operator.
    WrongArity {
        op: &'static str,
        expected: Arity,
        actual: usize,
    },

    /// A literal parameter of the operator is invalid.
    InvalidParam { op: &'static str, reason: String },

    /// An operand does not refer to an existing node.
    InvalidArg { index: usize },
}

impl fmt::Display for ConstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongArity {
                op,
                expected,
                actual,
            } => write!(
                f,
                "operator \"{}\" expects {} operands but got {}",
                op, expected, actual
            ),
            Self::InvalidParam { op, reason } => {
                write!(f, "invalid parameter for operator \"{}\": {}", op, reason)
            }
            Self::InvalidArg { index } => write!(f, "operand {} is not a valid node", index),
        }
    }
}

impl Error for ConstructError {}

/// Any of the supported operators.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Binary(BinaryOp),
    BroadcastTo(BroadcastTo),
    Concat(Concat),
    ExpandDims(ExpandDims),
    Flatten(Flatten),
    MatMul(MatMul),
    PermuteDims(PermuteDims),
    Reshape(Reshape),
    Split(Split),
    Squeeze(Squeeze),
}

macro_rules! impl_from_op {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Op {
                fn from(op: $variant) -> Op {
                    Op::$variant(op)
                }
            }
        )*
    };
}

impl_from_op!(
    BroadcastTo,
    Concat,
    ExpandDims,
    Flatten,
    MatMul,
    PermuteDims,
    Reshape,
    Split,
    Squeeze
);

impl From<BinaryOp> for Op {
    fn from(op: BinaryOp) -> Op {
        Op::Binary(op)
    }
}

/// Return the first literal axis which appears more than once.
fn find_repeated_axis(axes: &[i32]) -> Option<i32> {
    axes.iter()
        .enumerate()
        .find(|(i, axis)| axes[..*i].contains(axis))
        .map(|(_, axis)| *axis)
}

impl Op {
    /// Return the operator's name, as used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Binary(op) => op.name(),
            Op::BroadcastTo(_) => "broadcast_to",
            Op::Concat(_) => "concat",
            Op::ExpandDims(_) => "expand_dims",
            Op::Flatten(_) => "flatten",
            Op::MatMul(_) => "matmul",
            Op::PermuteDims(_) => "permute_dims",
            Op::Reshape(_) => "reshape",
            Op::Split(_) => "split",
            Op::Squeeze(_) => "squeeze",
        }
    }

    /// Return the number of operands this operator accepts.
    pub fn arity(&self) -> Arity {
        match self {
            Op::Binary(_) | Op::MatMul(_) => Arity::Exactly(2),
            Op::Concat(_) => Arity::AtLeast(1),
            Op::BroadcastTo(BroadcastTo { shape }) | Op::Reshape(Reshape { shape }) => {
                Arity::Exactly(shape.n_inputs())
            }
            Op::ExpandDims(_)
            | Op::Flatten(_)
            | Op::PermuteDims(_)
            | Op::Split(_)
            | Op::Squeeze(_) => Arity::Exactly(1),
        }
    }

    /// Check the operand count and literal parameters of a call to this
    /// operator with `n_inputs` operands.
    pub fn validate(&self, n_inputs: usize) -> Result<(), ConstructError> {
        let arity = self.arity();
        if !arity.accepts(n_inputs) {
            return Err(ConstructError::WrongArity {
                op: self.name(),
                expected: arity,
                actual: n_inputs,
            });
        }

        let invalid = |reason: String| {
            Err(ConstructError::InvalidParam {
                op: self.name(),
                reason,
            })
        };

        match self {
            Op::Reshape(Reshape {
                shape: TargetShape::Dims(shape),
            }) => {
                let n_inferred = shape.iter().filter(|d| d.as_value() == Some(-1)).count();
                if n_inferred > 1 {
                    return invalid("at most one dimension can be -1".into());
                }
                if let Some(size) = shape.iter().find_map(|d| d.as_value().filter(|&v| v < -1)) {
                    return invalid(format!("invalid dimension size {}", size));
                }
            }
            Op::BroadcastTo(BroadcastTo {
                shape: TargetShape::Dims(shape),
            }) => {
                if let Some(size) = shape.iter().find_map(|d| d.as_value().filter(|&v| v < 0)) {
                    return invalid(format!("invalid dimension size {}", size));
                }
            }
            Op::Split(Split {
                indices_or_sections,
                ..
            }) => match indices_or_sections {
                SplitSpec::Sections(0) => {
                    return invalid("number of sections must be positive".into());
                }
                SplitSpec::Sections(_) => {}
                SplitSpec::Indices(points) => {
                    if let Some(point) =
                        points.iter().find_map(|p| p.as_value().filter(|&v| v < 0))
                    {
                        return invalid(format!("invalid split index {}", point));
                    }
                }
            },
            Op::Squeeze(Squeeze { axes: Some(axes) })
            | Op::PermuteDims(PermuteDims { axes: Some(axes) })
            | Op::ExpandDims(ExpandDims { axes }) => {
                if let Some(axis) = find_repeated_axis(axes) {
                    return invalid(format!("axis {} is repeated", axis));
                }
            }
            Op::Binary(_)
            | Op::BroadcastTo(_)
            | Op::Concat(_)
            | Op::Flatten(_)
            | Op::MatMul(_)
            | Op::Reshape(_)
            | Op::Squeeze(_)
            | Op::PermuteDims(_) => {}
        }

        Ok(())
    }

    /// Infer the result of applying this operator to `inputs`.
    pub fn infer(
        &self,
        inputs: &[StructInfo],
        prover: &dyn ProveEqual,
    ) -> Result<Inferred, InferError> {
        infer(self, inputs, prover)
    }
}

impl InferStructInfo for Op {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        match self {
            Op::Binary(op) => op.infer_struct_info(inputs, ctx),
            Op::BroadcastTo(op) => op.infer_struct_info(inputs, ctx),
            Op::Concat(op) => op.infer_struct_info(inputs, ctx),
            Op::ExpandDims(op) => op.infer_struct_info(inputs, ctx),
            Op::Flatten(op) => op.infer_struct_info(inputs, ctx),
            Op::MatMul(op) => op.infer_struct_info(inputs, ctx),
            Op::PermuteDims(op) => op.infer_struct_info(inputs, ctx),
            Op::Reshape(op) => op.infer_struct_info(inputs, ctx),
            Op::Split(op) => op.infer_struct_info(inputs, ctx),
            Op::Squeeze(op) => op.infer_struct_info(inputs, ctx),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

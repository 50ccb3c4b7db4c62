//! Traits for struct info inference and common helpers.

use std::error::Error;
use std::fmt;

use smallvec::SmallVec;

use crate::dtype::DataType;
use crate::prove::ProveEqual;
use crate::struct_info::{StructInfo, TensorStructInfo};
use crate::sym_expr::SymExpr;

/// Errors reported when inferring an operator's result.
#[derive(Clone, Debug, PartialEq)]
pub enum InferError {
    /// Too many or too few inputs were provided for this operator.
    IncorrectInputCount,

    /// An input's struct info is not the variant the operator requires (eg. a
    /// shape was passed where a tensor was expected).
    WrongInputType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// Two operands of an arithmetic operator have different known dtypes.
    DtypeMismatch { lhs: DataType, rhs: DataType },

    /// Input shapes are incompatible with each other or operator parameters.
    ShapeMismatch(String),

    /// A size which must be known to produce a result could not be
    /// determined.
    UnresolvableInference(String),

    /// Axis parameters are out of range, repeated or not a permutation.
    InvalidAxes {
        axes: Vec<i32>,
        ndim: usize,
        reason: &'static str,
    },
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectInputCount => write!(f, "incorrect number of inputs"),
            Self::WrongInputType {
                index,
                expected,
                actual,
            } => write!(
                f,
                "input {} has wrong type: expected {} but got {}",
                index, expected, actual
            ),
            Self::DtypeMismatch { lhs, rhs } => {
                write!(f, "data types {} and {} do not match", lhs, rhs)
            }
            Self::ShapeMismatch(details) => write!(f, "shape mismatch: {}", details),
            Self::UnresolvableInference(details) => {
                write!(f, "cannot infer result: {}", details)
            }
            Self::InvalidAxes { axes, ndim, reason } => write!(
                f,
                "invalid axes {:?} for tensor with {} dims: {}",
                axes, ndim, reason
            ),
        }
    }
}

impl Error for InferError {}

/// A check recorded during inference and evaluated during normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum Check {
    /// A failure which was detected during inference.
    ///
    /// Inference continues after these so that later failures and the result
    /// can still be computed.
    Fail(InferError),

    /// Two dimension sizes must be equal.
    ///
    /// This fails only if the sizes are proven to be different.
    DimsEqual {
        lhs: SymExpr,
        rhs: SymExpr,
        what: &'static str,
    },
}

impl Check {
    /// Evaluate this check using a given prover.
    pub fn evaluate(&self, prover: &dyn ProveEqual) -> Result<(), InferError> {
        match self {
            Self::Fail(err) => Err(err.clone()),
            Self::DimsEqual { lhs, rhs, what } => match prover.prove_equal(lhs, rhs) {
                Some(false) => Err(InferError::ShapeMismatch(format!(
                    "{} {} and {} are not equal",
                    what, lhs, rhs
                ))),
                Some(true) | None => Ok(()),
            },
        }
    }
}

/// Context passed to [`InferStructInfo::infer_struct_info`].
///
/// This provides access to the proof oracle and collects the checks which
/// are evaluated when the result is normalized.
pub struct InferCtx<'a> {
    prover: &'a dyn ProveEqual,
    checks: Vec<Check>,
}

impl<'a> InferCtx<'a> {
    pub fn new(prover: &'a dyn ProveEqual) -> Self {
        Self {
            prover,
            checks: Vec::new(),
        }
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn into_checks(self) -> Vec<Check> {
        self.checks
    }

    /// Record a failure to be reported at normalization.
    pub fn fail(&mut self, err: InferError) {
        self.checks.push(Check::Fail(err));
    }

    pub fn prove_equal(&self, lhs: &SymExpr, rhs: &SymExpr) -> Option<bool> {
        self.prover.prove_equal(lhs, rhs)
    }

    /// Require two dimension sizes to be equal.
    ///
    /// Returns true if the sizes are known to be equal now. If both are
    /// constants and differ, a failure is recorded. If equality cannot be
    /// decided yet, a [`Check::DimsEqual`] is recorded and false is returned.
    pub fn dims_equal(&mut self, lhs: &SymExpr, rhs: &SymExpr, what: &'static str) -> bool {
        if let (Some(lhs_val), Some(rhs_val)) = (lhs.as_value(), rhs.as_value()) {
            if lhs_val != rhs_val {
                self.fail(InferError::ShapeMismatch(format!(
                    "{} {} and {} are not equal",
                    what, lhs_val, rhs_val
                )));
            }
            return lhs_val == rhs_val;
        }

        if self.prove_equal(lhs, rhs) == Some(true) {
            return true;
        }

        self.checks.push(Check::DimsEqual {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            what,
        });
        false
    }
}

/// Infer the struct info of an operator's result given its inputs.
pub trait InferStructInfo {
    /// Infer the result struct info of this operator.
    ///
    /// Failures which make it impossible to produce a result are returned as
    /// errors. Failures which still allow a result, and conditions that can
    /// only be decided later, are recorded in `ctx`.
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError>;
}

/// Result of inference before deferred checks are evaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct Inferred {
    pub struct_info: StructInfo,
    pub checks: Vec<Check>,
}

/// Run inference for an operator and collect its deferred checks.
pub fn infer<Op: InferStructInfo + ?Sized>(
    op: &Op,
    inputs: &[StructInfo],
    prover: &dyn ProveEqual,
) -> Result<Inferred, InferError> {
    let mut ctx = InferCtx::new(prover);
    let struct_info = op.infer_struct_info(inputs, &mut ctx)?;
    Ok(Inferred {
        struct_info,
        checks: ctx.into_checks(),
    })
}

/// Return the tensor struct info of the index'th input, or an error if it is
/// not a tensor.
pub(crate) fn tensor_input(
    inputs: &[StructInfo],
    index: usize,
) -> Result<&TensorStructInfo, InferError> {
    let input = inputs.get(index).ok_or(InferError::IncorrectInputCount)?;
    input.as_tensor().ok_or(InferError::WrongInputType {
        index,
        expected: "Tensor",
        actual: input.kind_name(),
    })
}

/// Resolve an index given as a value in `[-len, len-1]` to a positive index in
/// `[0, len)`, or return None if the index is out of bounds.
fn resolve_index(len: usize, index: i32) -> Option<usize> {
    let len = len.min(i32::MAX as usize) as i32;
    if index < -len || index >= len {
        return None;
    }

    if index >= 0 {
        Some(index as usize)
    } else {
        Some((len + index) as usize)
    }
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
///
/// Negative axis values count backwards from the last dimension.
pub(crate) fn resolve_axis(ndim: usize, axis: i32) -> Result<usize, InferError> {
    resolve_index(ndim, axis).ok_or_else(|| InferError::InvalidAxes {
        axes: vec![axis],
        ndim,
        reason: "axis out of range",
    })
}

/// Resolve a sequence of axes values in `[-ndim, ndim-1]` to zero-based dimension
/// indexes in a tensor with `ndim` dimensions.
///
/// Each axis may appear only once after resolution.
pub(crate) fn resolve_axes(ndim: usize, axes: &[i32]) -> Result<SmallVec<[usize; 4]>, InferError> {
    let mut resolved_axes: SmallVec<[usize; 4]> = SmallVec::with_capacity(axes.len());
    for &axis in axes {
        let resolved = resolve_index(ndim, axis).ok_or_else(|| InferError::InvalidAxes {
            axes: axes.to_vec(),
            ndim,
            reason: "axis out of range",
        })?;
        if resolved_axes.contains(&resolved) {
            return Err(InferError::InvalidAxes {
                axes: axes.to_vec(),
                ndim,
                reason: "repeated axis",
            });
        }
        resolved_axes.push(resolved);
    }
    Ok(resolved_axes)
}

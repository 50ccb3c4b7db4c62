use smallvec::SmallVec;

use crate::dtype::{OpClass, resolve_dtype};
use crate::infer::{InferCtx, InferError, InferStructInfo, resolve_axes, tensor_input};
use crate::shape::Shape;
use crate::struct_info::{StructInfo, TensorStructInfo};
use crate::sym_expr::SymExpr;

/// Target shape of a [`BroadcastTo`] or [`Reshape`].
#[derive(Clone, Debug, PartialEq)]
pub enum TargetShape {
    /// Dimension sizes given as literal parameters.
    Dims(Vec<SymExpr>),
    /// Shape given by the second operand, which must be a shape value.
    Operand,
}

impl TargetShape {
    /// Return the number of operands taken by an operator with this target.
    pub fn n_inputs(&self) -> usize {
        match self {
            Self::Dims(_) => 1,
            Self::Operand => 2,
        }
    }

    /// Resolve the target against the operands of a call.
    fn resolve(&self, inputs: &[StructInfo]) -> Result<Shape, InferError> {
        if inputs.len() != self.n_inputs() {
            return Err(InferError::IncorrectInputCount);
        }
        match self {
            Self::Dims(dims) => Ok(Shape::from_dims(dims.clone())),
            Self::Operand => match &inputs[1] {
                StructInfo::Shape(shape) => Ok(shape.clone()),
                other => Err(InferError::WrongInputType {
                    index: 1,
                    expected: "Shape",
                    actual: other.kind_name(),
                }),
            },
        }
    }
}

impl From<Vec<SymExpr>> for TargetShape {
    fn from(dims: Vec<SymExpr>) -> Self {
        Self::Dims(dims)
    }
}

/// Broadcast a tensor to a target shape.
///
/// Each dimension of the input, aligned from the right, must either equal the
/// corresponding target dimension or be 1.
#[derive(Clone, Debug, PartialEq)]
pub struct BroadcastTo {
    pub shape: TargetShape,
}

impl InferStructInfo for BroadcastTo {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let target = self.shape.resolve(inputs)?;
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        if let (Some(ndim), Some(target_ndim)) = (data.ndim(), target.ndim())
            && ndim > target_ndim
        {
            ctx.fail(InferError::ShapeMismatch(format!(
                "cannot broadcast tensor with {} dims to shape with {} dims",
                ndim, target_ndim
            )));
        } else if let (Some(dims), Some(target_dims)) = (data.shape.dims(), target.dims()) {
            let pad = target_dims.len() - dims.len();
            for (dim, target_dim) in dims.iter().zip(&target_dims[pad..]) {
                // Symbolic input sizes may be 1 at runtime, so only fixed
                // sizes can be checked.
                match dim {
                    SymExpr::Value(1) => {}
                    SymExpr::Value(_) => {
                        ctx.dims_equal(dim, target_dim, "broadcast dimension");
                    }
                    _ => {}
                }
            }
        }

        Ok(TensorStructInfo::new(target.simplify(), dtype).into())
    }
}

/// Collapse all dimensions of a tensor into one.
#[derive(Clone, Debug, PartialEq)]
pub struct Flatten;

impl InferStructInfo for Flatten {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        _ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [input] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        let shape = match data.ndim() {
            Some(0) => Shape::from_fixed_shape(&[1]),
            Some(1) => return Ok(input.clone()),
            Some(_) => match data.shape.num_elements() {
                Some(size) => Shape::from_dims(vec![size]),
                None => Shape::from_rank(1),
            },
            None => Shape::from_rank(1),
        };

        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

/// Permute the dimensions of a tensor.
///
/// If `axes` is not given, the order of dimensions is reversed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermuteDims {
    pub axes: Option<Vec<i32>>,
}

impl InferStructInfo for PermuteDims {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        _ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [input] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        let Some(ndim) = data.ndim() else {
            // If the input rank is unknown, but we have a permutation then
            // the output rank will match the permutation.
            let shape = match &self.axes {
                Some(axes) => Shape::from_rank(axes.len()),
                None => Shape::unknown(),
            };
            return Ok(TensorStructInfo::new(shape, dtype).into());
        };

        let perm: SmallVec<[usize; 4]> = match &self.axes {
            Some(axes) => {
                if axes.len() != ndim {
                    return Err(InferError::InvalidAxes {
                        axes: axes.clone(),
                        ndim,
                        reason: "axes must be a permutation of the input dimensions",
                    });
                }
                resolve_axes(ndim, axes)?
            }
            None => (0..ndim).rev().collect(),
        };

        if perm.iter().enumerate().all(|(i, &axis)| i == axis) {
            return Ok(input.clone());
        }

        let shape = match data.shape.dims() {
            Some(dims) => Shape::from_dims(perm.iter().map(|&axis| dims[axis].clone()).collect()),
            None => Shape::from_rank(ndim),
        };
        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

/// Change the shape of a tensor without changing its elements.
///
/// One entry of `shape` may be -1, in which case its size is inferred from
/// the number of elements in the input. If the target is a shape variable or
/// only its rank is known, it is used as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct Reshape {
    pub shape: TargetShape,
}

impl InferStructInfo for Reshape {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let target_shape = self.shape.resolve(inputs)?;
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        let Some(target) = target_shape.dims() else {
            return Ok(TensorStructInfo::new(target_shape, dtype).into());
        };
        let rank_only =
            || -> StructInfo { TensorStructInfo::new(Shape::from_rank(target.len()), dtype).into() };

        // Literal targets are checked at construction, but a shape operand
        // is only known here.
        let n_inferred = target.iter().filter(|d| d.as_value() == Some(-1)).count();
        if n_inferred > 1 || target.iter().any(|d| d.as_value().is_some_and(|v| v < -1)) {
            ctx.fail(InferError::ShapeMismatch(format!(
                "invalid reshape target {}",
                Shape::from_dims(target.to_vec())
            )));
            return Ok(rank_only());
        }

        let in_size = data.shape.num_elements();
        let infer_pos = target.iter().position(|d| d.as_value() == Some(-1));

        let Some(infer_pos) = infer_pos else {
            if let Some(in_size) = in_size {
                let out_size = SymExpr::product(target);
                ctx.dims_equal(&in_size, &out_size, "reshape element count");
            }
            let shape = Shape::from_dims(target.to_vec()).simplify();
            return Ok(TensorStructInfo::new(shape, dtype).into());
        };

        let Some(in_size) = in_size else {
            ctx.fail(InferError::UnresolvableInference(
                "size of -1 dimension in reshape requires an input of known shape".into(),
            ));
            return Ok(rank_only());
        };

        let known_size = SymExpr::product(
            target
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != infer_pos)
                .map(|(_, d)| d),
        );

        let inferred_size = match (in_size.as_value(), known_size.as_value()) {
            (Some(total), Some(known)) => {
                if known <= 0 || total % known != 0 {
                    ctx.fail(InferError::ShapeMismatch(format!(
                        "cannot reshape tensor with {} elements into {} parts",
                        total, known
                    )));
                    return Ok(rank_only());
                }
                SymExpr::Value(total / known)
            }
            _ => {
                let size = (in_size.clone() / known_size.clone()).simplify();
                if size.contains_div() {
                    ctx.fail(InferError::UnresolvableInference(format!(
                        "size of -1 dimension in reshape is not an exact division of {} by {}",
                        in_size, known_size
                    )));
                    return Ok(rank_only());
                }
                size
            }
        };

        let mut dims = target.to_vec();
        dims[infer_pos] = inferred_size;
        let shape = Shape::from_dims(dims).simplify();
        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

/// Remove dimensions of size 1 from a tensor.
///
/// If `axes` is not given, every dimension which is known to have size 1 is
/// removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Squeeze {
    pub axes: Option<Vec<i32>>,
}

impl InferStructInfo for Squeeze {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [_] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let data = tensor_input(inputs, 0)?;
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;

        let Some(ndim) = data.ndim() else {
            return Ok(TensorStructInfo::new(Shape::unknown(), dtype).into());
        };

        let shape = match &self.axes {
            Some(axes) => {
                let axes = resolve_axes(ndim, axes)?;
                let out_ndim = ndim - axes.len();

                if let Some(dims) = data.shape.dims() {
                    let mut all_ones = true;
                    for &axis in &axes {
                        if !ctx.dims_equal(&dims[axis], &SymExpr::Value(1), "squeezed dimension")
                        {
                            all_ones = false;
                        }
                    }

                    if all_ones {
                        let out_dims = dims
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| !axes.contains(i))
                            .map(|(_, d)| d.clone())
                            .collect();
                        Shape::from_dims(out_dims)
                    } else {
                        Shape::from_rank(out_ndim)
                    }
                } else {
                    Shape::from_rank(out_ndim)
                }
            }
            None => match data.shape.dims() {
                Some(dims) => Shape::from_dims(
                    dims.iter()
                        .filter(|d| d.as_value() != Some(1))
                        .cloned()
                        .collect(),
                ),
                // Without dimension sizes the number of removed dims is
                // unknown.
                None => Shape::unknown(),
            },
        };

        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

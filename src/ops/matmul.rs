use crate::broadcast::broadcast_dims;
use crate::dtype::{DataType, OpClass, resolve_dtype};
use crate::infer::{InferCtx, InferError, InferStructInfo, tensor_input};
use crate::shape::Shape;
use crate::struct_info::{StructInfo, TensorStructInfo};
use crate::sym_expr::SymExpr;

/// Matrix multiplication with broadcasting of batch dimensions.
///
/// 1D operands are treated as a row vector (LHS) or column vector (RHS), and
/// the corresponding dimension is removed from the result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatMul {
    /// Data type of the result. If not set, the operands must have the same
    /// dtype, which is also the result dtype.
    pub out_dtype: Option<DataType>,
}

impl InferStructInfo for MatMul {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [_, _] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let lhs = tensor_input(inputs, 0)?;
        let rhs = tensor_input(inputs, 1)?;

        let dtype = match self.out_dtype {
            Some(dtype) => Some(dtype),
            None => resolve_dtype(OpClass::Arithmetic, lhs.dtype, rhs.dtype)?,
        };
        let output = |shape: Shape| Ok(TensorStructInfo::new(shape, dtype).into());

        let (Some(lhs_ndim), Some(rhs_ndim)) = (lhs.ndim(), rhs.ndim()) else {
            return output(Shape::unknown());
        };

        if lhs_ndim == 0 || rhs_ndim == 0 {
            return Err(InferError::ShapeMismatch(
                "matmul operands must have at least one dimension".into(),
            ));
        }

        // Output shape is (broadcast(lhs_batch_dims, rhs_batch_dims), M, N),
        // where M or N is omitted if the LHS or RHS is a vector.
        let lhs_is_vector = lhs_ndim == 1;
        let rhs_is_vector = rhs_ndim == 1;
        let batch_ndim = lhs_ndim.saturating_sub(2).max(rhs_ndim.saturating_sub(2));
        let out_ndim = batch_ndim + !lhs_is_vector as usize + !rhs_is_vector as usize;

        let (Some(lhs_dims), Some(rhs_dims)) = (lhs.shape.dims(), rhs.shape.dims()) else {
            return output(Shape::from_rank(out_ndim));
        };

        let one = SymExpr::Value(1);
        let lhs_dims: Vec<&SymExpr> = if lhs_is_vector {
            vec![&one, &lhs_dims[0]]
        } else {
            lhs_dims.iter().collect()
        };
        let rhs_dims: Vec<&SymExpr> = if rhs_is_vector {
            vec![&rhs_dims[0], &one]
        } else {
            rhs_dims.iter().collect()
        };

        let [lhs_batch @ .., m, k_lhs] = lhs_dims.as_slice() else {
            return Err(InferError::IncorrectInputCount);
        };
        let [rhs_batch @ .., k_rhs, n] = rhs_dims.as_slice() else {
            return Err(InferError::IncorrectInputCount);
        };

        let lhs_batch: Vec<SymExpr> = lhs_batch.iter().map(|&d| d.clone()).collect();
        let rhs_batch: Vec<SymExpr> = rhs_batch.iter().map(|&d| d.clone()).collect();
        let mut out_dims = broadcast_dims(&lhs_batch, &rhs_batch, ctx);

        ctx.dims_equal(k_lhs, k_rhs, "matmul reduction dimension");

        if !lhs_is_vector {
            out_dims.push(Some((*m).clone()));
        }
        if !rhs_is_vector {
            out_dims.push(Some((*n).clone()));
        }

        output(Shape::from_resolved(out_dims))
    }
}

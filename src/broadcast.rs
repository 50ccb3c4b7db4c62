//! Broadcasting of shapes with symbolic dimensions.
//!
//! Shapes are broadcast following NumPy's rules: shapes are aligned from the
//! right, the shorter shape is padded with 1s, and each pair of dimensions
//! must either be equal or have one side equal to 1.
//!
//! When the sizes of a dimension pair are symbolic and cannot be proven equal,
//! broadcasting does not fail. Instead the result dimension is unresolved, and
//! the result shape degrades to one where only the rank is known.

use crate::infer::{InferCtx, InferError};
use crate::shape::Shape;
use crate::sym_expr::SymExpr;

/// Broadcast two shapes together.
///
/// Dimension pairs which are constants, differ and are not 1 are recorded as
/// failures in `ctx`.
pub fn broadcast_shapes(lhs: &Shape, rhs: &Shape, ctx: &mut InferCtx<'_>) -> Shape {
    // Shapes which refer to the same variable are equal.
    if let (Some(lhs_var), Some(rhs_var)) = (lhs.as_var(), rhs.as_var())
        && lhs_var == rhs_var
    {
        return lhs.clone();
    }

    let (Some(lhs_ndim), Some(rhs_ndim)) = (lhs.ndim(), rhs.ndim()) else {
        return Shape::unknown();
    };

    let (Some(lhs_dims), Some(rhs_dims)) = (lhs.dims(), rhs.dims()) else {
        return Shape::from_rank(lhs_ndim.max(rhs_ndim));
    };

    Shape::from_resolved(broadcast_dims(lhs_dims, rhs_dims, ctx))
}

/// Broadcast two lists of dimension sizes together.
///
/// Returns a list of the broadcast sizes, with `None` for dimensions whose
/// size cannot be determined.
pub fn broadcast_dims(
    lhs: &[SymExpr],
    rhs: &[SymExpr],
    ctx: &mut InferCtx<'_>,
) -> Vec<Option<SymExpr>> {
    let lhs_pad = rhs.len().saturating_sub(lhs.len());
    let rhs_pad = lhs.len().saturating_sub(rhs.len());
    let mut out_dims = Vec::with_capacity(lhs_pad + lhs.len());

    let one = SymExpr::Value(1);
    let lhs_iter = std::iter::repeat_n(&one, lhs_pad).chain(lhs);
    let rhs_iter = std::iter::repeat_n(&one, rhs_pad).chain(rhs);

    for (a, b) in lhs_iter.zip(rhs_iter) {
        let dim = match (a, b) {
            (SymExpr::Value(a_val), SymExpr::Value(b_val)) if a_val == b_val => Some(a.clone()),

            // If either size is 1, it will be broadcast against the other
            // size.
            (SymExpr::Value(1), b) => Some(b.clone()),
            (a, SymExpr::Value(1)) => Some(a.clone()),

            // If both sizes are fixed and different, we know execution
            // will fail.
            (SymExpr::Value(_), SymExpr::Value(_)) => {
                ctx.fail(InferError::ShapeMismatch(format!(
                    "cannot broadcast sizes {} and {}",
                    a, b
                )));
                None
            }

            // Symbolic sizes which are provably equal.
            (a, b) if ctx.prove_equal(a, b) == Some(true) => Some(a.clone()),

            // Otherwise the result could be either size, or execution may
            // fail, depending on the runtime values.
            _ => None,
        };
        out_dims.push(dim);
    }

    out_dims
}

#[cfg(test)]
mod tests {
    use struct_info_testing::TestCases;

    use super::broadcast_shapes;
    use crate::infer::{Check, InferCtx, InferError};
    use crate::prove::StructuralProver;
    use crate::shape::{Shape, dims};
    use crate::sym_expr::SymExpr;
    use crate::sym_gen::SymbolGen;

    #[test]
    fn test_broadcast_shapes() {
        #[derive(Debug)]
        struct Case {
            lhs: Shape,
            rhs: Shape,
            expected: Shape,
        }

        let cases = [
            Case {
                lhs: Shape::from_fixed_shape(&[2, 3]),
                rhs: Shape::from_fixed_shape(&[2, 3]),
                expected: Shape::from_fixed_shape(&[2, 3]),
            },
            Case {
                lhs: Shape::from_fixed_shape(&[1, 3]),
                rhs: Shape::from_fixed_shape(&[2, 3]),
                expected: Shape::from_fixed_shape(&[2, 3]),
            },
            Case {
                lhs: Shape::from_fixed_shape(&[1, 3]),
                rhs: Shape::from_fixed_shape(&[4, 3, 2, 1]),
                expected: Shape::from_fixed_shape(&[4, 3, 2, 3]),
            },
            Case {
                lhs: Shape::from_fixed_shape(&[]),
                rhs: Shape::from_fixed_shape(&[5]),
                expected: Shape::from_fixed_shape(&[5]),
            },
            Case {
                lhs: Shape::from_dims(dims!("m", "n")),
                rhs: Shape::from_dims(dims!("m", "n")),
                expected: Shape::from_dims(dims!("m", "n")),
            },
            Case {
                lhs: Shape::from_dims(dims!(1, "n")),
                rhs: Shape::from_dims(dims!("m", 1)),
                expected: Shape::from_dims(dims!("m", "n")),
            },
            Case {
                lhs: Shape::from_dims(dims!("m", 3)),
                rhs: Shape::from_dims(dims!(3)),
                expected: Shape::from_dims(dims!("m", 3)),
            },
            // Symbolic sizes which may differ.
            Case {
                lhs: Shape::from_dims(dims!("m", "n")),
                rhs: Shape::from_dims(vec!["m".into(), SymExpr::from("n") + SymExpr::from(2)]),
                expected: Shape::from_rank(2),
            },
            Case {
                lhs: Shape::from_dims(dims!("n")),
                rhs: Shape::from_dims(dims!(4)),
                expected: Shape::from_rank(1),
            },
            // Rank-only and unknown shapes.
            Case {
                lhs: Shape::from_rank(2),
                rhs: Shape::from_fixed_shape(&[4, 3, 2, 1]),
                expected: Shape::from_rank(4),
            },
            Case {
                lhs: Shape::unknown(),
                rhs: Shape::from_fixed_shape(&[2, 3]),
                expected: Shape::unknown(),
            },
            Case {
                lhs: Shape::from_rank(3),
                rhs: Shape::unknown(),
                expected: Shape::unknown(),
            },
        ];

        cases.test_each(|case| {
            let prover = StructuralProver;
            let mut ctx = InferCtx::new(&prover);
            let shape = broadcast_shapes(&case.lhs, &case.rhs, &mut ctx);
            assert_eq!(shape, case.expected);
            assert!(ctx.checks().is_empty());
        })
    }

    #[test]
    fn test_broadcast_constant_mismatch() {
        let prover = StructuralProver;
        let mut ctx = InferCtx::new(&prover);
        let shape = broadcast_shapes(
            &Shape::from_fixed_shape(&[2, 3]),
            &Shape::from_fixed_shape(&[2, 4]),
            &mut ctx,
        );
        assert_eq!(shape, Shape::from_rank(2));
        assert!(matches!(
            ctx.checks(),
            [Check::Fail(InferError::ShapeMismatch(_))]
        ));
    }

    #[test]
    fn test_broadcast_shape_vars() {
        let mut sym_gen = SymbolGen::new();
        let s0 = Shape::from_var(sym_gen.shape_var("s0", Some(2)));
        let s1 = Shape::from_var(sym_gen.shape_var("s1", Some(2)));
        let s2 = Shape::from_var(sym_gen.shape_var("s2", Some(4)));
        let s3 = Shape::from_var(sym_gen.shape_var("s3", Some(1)));
        let s4 = Shape::from_var(sym_gen.shape_var("s4", None));

        let prover = StructuralProver;
        let mut ctx = InferCtx::new(&prover);

        assert_eq!(broadcast_shapes(&s0, &s0, &mut ctx), s0);
        assert_eq!(broadcast_shapes(&s0, &s1, &mut ctx), Shape::from_rank(2));
        assert_eq!(broadcast_shapes(&s0, &s2, &mut ctx), Shape::from_rank(4));
        assert_eq!(broadcast_shapes(&s0, &s3, &mut ctx), Shape::from_rank(2));
        assert_eq!(broadcast_shapes(&s0, &s4, &mut ctx), Shape::unknown());
        assert_eq!(
            broadcast_shapes(&s0, &Shape::from_fixed_shape(&[2, 3]), &mut ctx),
            Shape::from_rank(2)
        );
        assert!(ctx.checks().is_empty());
    }
}

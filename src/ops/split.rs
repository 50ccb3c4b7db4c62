use crate::dtype::{OpClass, resolve_dtype};
use crate::infer::{InferCtx, InferError, InferStructInfo, resolve_axis, tensor_input};
use crate::shape::Shape;
use crate::struct_info::{StructInfo, TensorStructInfo};
use crate::sym_expr::SymExpr;

/// How a [`Split`] divides its input.
#[derive(Clone, Debug, PartialEq)]
pub enum SplitSpec {
    /// Split into this many parts of equal size, except for the last part
    /// which is smaller if the axis length is not divisible.
    Sections(usize),

    /// Split at these indices along the axis.
    Indices(Vec<SymExpr>),
}

impl SplitSpec {
    /// Return the number of parts the input is split into.
    pub fn num_outputs(&self) -> usize {
        match self {
            Self::Sections(n) => *n,
            Self::Indices(points) => points.len() + 1,
        }
    }
}

/// Split a tensor into a tuple of tensors along an axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    /// Axis to split the tensor along.
    pub axis: i32,
    pub indices_or_sections: SplitSpec,
}

/// Return the sizes of `n` sections of an axis of length `len`.
fn section_sizes(len: i64, n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let n = n as i64;
    let len = len.max(0);
    let chunk = len / n + i64::from(len % n != 0);
    (0..n)
        .map(|i| len.saturating_sub(i.saturating_mul(chunk)).clamp(0, chunk))
        .collect()
}

/// Return the sizes of the segments between split points.
///
/// Points outside the axis are clamped to it, as are the sizes of segments
/// whose end precedes their start.
fn segment_sizes(len: &SymExpr, points: &[SymExpr]) -> Vec<SymExpr> {
    let zero = SymExpr::Value(0);
    let bounds: Vec<&SymExpr> = std::iter::once(&zero)
        .chain(points)
        .chain(std::iter::once(len))
        .collect();

    bounds
        .windows(2)
        .map(|pair| {
            let (start, end) = (pair[0], pair[1]);
            match (start, end, len) {
                (SymExpr::Value(start), SymExpr::Value(end), SymExpr::Value(len)) => {
                    let start = (*start).clamp(0, *len);
                    let end = (*end).clamp(0, *len);
                    SymExpr::Value((end - start).max(0))
                }
                (SymExpr::Value(start), SymExpr::Value(end), _) => {
                    SymExpr::Value(end.saturating_sub(*start).max(0))
                }
                _ => (end.clone() - start.clone()).simplify(),
            }
        })
        .collect()
}

impl InferStructInfo for Split {
    fn infer_struct_info(
        &self,
        inputs: &[StructInfo],
        _ctx: &mut InferCtx<'_>,
    ) -> Result<StructInfo, InferError> {
        let [_] = inputs else {
            return Err(InferError::IncorrectInputCount);
        };
        let data = tensor_input(inputs, 0)?;
        let n_outputs = self.indices_or_sections.num_outputs();
        let dtype = resolve_dtype(OpClass::Identity, data.dtype, None)?;
        let output = |shape: Shape| StructInfo::from(TensorStructInfo::new(shape, dtype));

        let Some(ndim) = data.ndim() else {
            return Ok(StructInfo::Tuple(vec![output(Shape::unknown()); n_outputs]));
        };
        let axis = resolve_axis(ndim, self.axis)?;

        let Some(dims) = data.shape.dims() else {
            return Ok(StructInfo::Tuple(vec![output(Shape::from_rank(ndim)); n_outputs]));
        };
        let len = &dims[axis];

        let sizes: Vec<Option<SymExpr>> = match &self.indices_or_sections {
            SplitSpec::Sections(n) => match len {
                SymExpr::Value(len) => section_sizes(*len, *n)
                    .into_iter()
                    .map(|size| Some(SymExpr::Value(size)))
                    .collect(),
                _ if *n == 1 => vec![Some(len.clone())],
                _ => vec![None; *n],
            },
            SplitSpec::Indices(points) => segment_sizes(len, points)
                .into_iter()
                .map(Some)
                .collect(),
        };

        let outputs = sizes
            .into_iter()
            .map(|size| {
                let shape = match size {
                    Some(size) => {
                        let mut out_dims = dims.to_vec();
                        out_dims[axis] = size;
                        Shape::from_dims(out_dims)
                    }
                    None => Shape::from_rank(ndim),
                };
                output(shape)
            })
            .collect();

        Ok(StructInfo::Tuple(outputs))
    }
}

#[cfg(test)]
mod tests {
    use struct_info_testing::TestCases;

    use super::{Split, SplitSpec, section_sizes};
    use crate::dtype::DataType;
    use crate::dtype::{OpClass, resolve_dtype};
use crate::infer::{InferError, infer};
    use crate::prove::StructuralProver;
    use crate::shape::{Shape, dims};
    use crate::struct_info::{StructInfo, TensorStructInfo, tensor};
    use crate::sym_expr::SymExpr;

    #[test]
    fn test_section_sizes() {
        assert_eq!(section_sizes(12, 3), [4, 4, 4]);
        assert_eq!(section_sizes(10, 3), [4, 4, 2]);
        assert_eq!(section_sizes(2, 4), [1, 1, 0, 0]);
        assert_eq!(section_sizes(i64::MAX, 2), [i64::MAX / 2 + 1, i64::MAX / 2]);
    }

    #[test]
    fn test_split() {
        #[derive(Debug)]
        struct Case {
            input: StructInfo,
            axis: i32,
            spec: SplitSpec,
            expected: Vec<StructInfo>,
        }

        let cases = [
            Case {
                input: tensor!(["batch", "seq", 2304], "float32"),
                axis: 2,
                spec: SplitSpec::Sections(3),
                expected: vec![
                    tensor!(["batch", "seq", 768], "float32"),
                    tensor!(["batch", "seq", 768], "float32"),
                    tensor!(["batch", "seq", 768], "float32"),
                ],
            },
            Case {
                input: tensor!([10, 4], "float32"),
                axis: 0,
                spec: SplitSpec::Sections(3),
                expected: vec![
                    tensor!([4, 4], "float32"),
                    tensor!([4, 4], "float32"),
                    tensor!([2, 4], "float32"),
                ],
            },
            Case {
                input: tensor!([10, 4], "float32"),
                axis: -2,
                spec: SplitSpec::Indices(dims!(2, 5)),
                expected: vec![
                    tensor!([2, 4], "float32"),
                    tensor!([3, 4], "float32"),
                    tensor!([5, 4], "float32"),
                ],
            },
            // Split points past the end of the axis.
            Case {
                input: tensor!([4]),
                axis: 0,
                spec: SplitSpec::Indices(dims!(3, 6)),
                expected: vec![tensor!([3]), tensor!([1]), tensor!([0])],
            },
            // Symbolic axis length.
            Case {
                input: tensor!(["n", 4], "int32"),
                axis: 0,
                spec: SplitSpec::Indices(dims!(2)),
                expected: vec![
                    tensor!([2, 4], "int32"),
                    StructInfo::Tensor(TensorStructInfo::new(
                        Shape::from_dims(vec![SymExpr::from(-2) + SymExpr::from("n"), 4.into()]),
                        Some(DataType::Int32),
                    )),
                ],
            },
            Case {
                input: tensor!(["n", 4], "int32"),
                axis: 0,
                spec: SplitSpec::Sections(1),
                expected: vec![tensor!(["n", 4], "int32")],
            },
            Case {
                input: tensor!(["n", 4], "int32"),
                axis: 0,
                spec: SplitSpec::Sections(2),
                expected: vec![tensor!(ndim = 2, "int32"), tensor!(ndim = 2, "int32")],
            },
            // Unknown shapes.
            Case {
                input: tensor!(ndim = 3, "float32"),
                axis: 1,
                spec: SplitSpec::Sections(2),
                expected: vec![tensor!(ndim = 3, "float32"), tensor!(ndim = 3, "float32")],
            },
            Case {
                input: tensor!("float32"),
                axis: 1,
                spec: SplitSpec::Indices(dims!(1)),
                expected: vec![tensor!("float32"), tensor!("float32")],
            },
        ];

        cases.test_each(|case| {
            let op = Split {
                axis: case.axis,
                indices_or_sections: case.spec.clone(),
            };
            let result = infer(&op, &[case.input.clone()], &StructuralProver).unwrap();
            assert_eq!(result.struct_info, StructInfo::Tuple(case.expected.clone()));
            assert!(result.checks.is_empty());
        })
    }

    #[test]
    fn test_split_invalid_axis() {
        let op = Split {
            axis: 2,
            indices_or_sections: SplitSpec::Sections(2),
        };
        let err = infer(&op, &[tensor!([4, 4])], &StructuralProver)
            .err()
            .unwrap();
        assert!(matches!(err, InferError::InvalidAxes { .. }));
    }
}

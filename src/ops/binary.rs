use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::broadcast::broadcast_shapes;
use crate::dtype::{OpClass, resolve_dtype};
use crate::infer::{InferCtx, InferError, InferStructInfo, tensor_input};
use crate::struct_info::{StructInfo, TensorStructInfo};

/// Elementwise binary operators.
///
/// The operands' shapes are broadcast together. Arithmetic operators require
/// operands with matching dtypes. Comparison operators accept any dtypes and
/// produce a boolean result.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Power,
    Maximum,
    Minimum,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl BinaryOp {
    const ALL: [BinaryOp; 14] = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::FloorDivide,
        BinaryOp::Power,
        BinaryOp::Maximum,
        BinaryOp::Minimum,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::Greater,
        BinaryOp::GreaterEqual,
        BinaryOp::Less,
        BinaryOp::LessEqual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::FloorDivide => "floor_divide",
            BinaryOp::Power => "power",
            BinaryOp::Maximum => "maximum",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Equal => "equal",
            BinaryOp::NotEqual => "not_equal",
            BinaryOp::Greater => "greater",
            BinaryOp::GreaterEqual => "greater_equal",
            BinaryOp::Less => "less",
            BinaryOp::LessEqual => "less_equal",
        }
    }

    /// Return the rule used to combine operand dtypes.
    pub fn class(self) -> OpClass {
        match self {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::FloorDivide
            | BinaryOp::Power
            | BinaryOp::Maximum
            | BinaryOp::Minimum => OpClass::Arithmetic,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual => OpClass::Comparison,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an unrecognized binary operator name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseBinaryOpError(String);

impl fmt::Display for ParseBinaryOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown binary operator \"{}\"", self.0)
    }
}

impl Error for ParseBinaryOpError {}

impl FromStr for BinaryOp {
    type Err = ParseBinaryOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BinaryOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| ParseBinaryOpError(s.to_string()))
    }
}

impl InferStructInfo for BinaryOp {
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

        let dtype = resolve_dtype(self.class(), lhs.dtype, rhs.dtype)?;
        let shape = broadcast_shapes(&lhs.shape, &rhs.shape, ctx);

        Ok(TensorStructInfo::new(shape, dtype).into())
    }
}

#[cfg(test)]
mod tests {
    use struct_info_testing::TestCases;

    use super::BinaryOp;
    use crate::dtype::DataType;
    use crate::infer::{Check, InferError, infer};
    use crate::prove::StructuralProver;
    use crate::shape::Shape;
    use crate::struct_info::{FuncStructInfo, StructInfo, TensorStructInfo, tensor};
    use crate::sym_expr::SymExpr;
    use crate::sym_gen::SymbolGen;

    #[test]
    fn test_parse_name() {
        for op in BinaryOp::ALL {
            assert_eq!(op.name().parse::<BinaryOp>(), Ok(op));
        }
        assert_eq!("floor_divide".parse::<BinaryOp>(), Ok(BinaryOp::FloorDivide));
        assert!("add2".parse::<BinaryOp>().is_err());
    }

    #[test]
    fn test_binary_op() {
        #[derive(Debug)]
        struct Case {
            op: BinaryOp,
            lhs: StructInfo,
            rhs: StructInfo,
            expected: StructInfo,
        }

        let n_plus_2 = SymExpr::from("n") + SymExpr::from(2);

        let cases = [
            Case {
                op: BinaryOp::Add,
                lhs: tensor!([2, 3], "float32"),
                rhs: tensor!([2, 3], "float32"),
                expected: tensor!([2, 3], "float32"),
            },
            Case {
                op: BinaryOp::Multiply,
                lhs: tensor!([1, 3], "float32"),
                rhs: tensor!([2, 3], "float32"),
                expected: tensor!([2, 3], "float32"),
            },
            Case {
                op: BinaryOp::Subtract,
                lhs: tensor!([1, 3], "float32"),
                rhs: tensor!([4, 3, 2, 1], "float32"),
                expected: tensor!([4, 3, 2, 3], "float32"),
            },
            Case {
                op: BinaryOp::Maximum,
                lhs: tensor!(["m", "n"], "float32"),
                rhs: tensor!([1, "n"], "float32"),
                expected: tensor!(["m", "n"], "float32"),
            },
            // Comparisons produce booleans, whatever the input dtypes.
            Case {
                op: BinaryOp::Less,
                lhs: tensor!([2, 3], "float32"),
                rhs: tensor!([2, 3], "int32"),
                expected: tensor!([2, 3], "bool"),
            },
            Case {
                op: BinaryOp::Equal,
                lhs: tensor!(ndim = 2),
                rhs: tensor!(),
                expected: tensor!("bool"),
            },
            // Unknown dtypes and shapes.
            Case {
                op: BinaryOp::Add,
                lhs: tensor!([2, 3], "float32"),
                rhs: tensor!([2, 3]),
                expected: tensor!([2, 3]),
            },
            Case {
                op: BinaryOp::Add,
                lhs: tensor!("float32"),
                rhs: tensor!([2, 3], "float32"),
                expected: tensor!("float32"),
            },
            Case {
                op: BinaryOp::Add,
                lhs: tensor!(ndim = 2, "float32"),
                rhs: tensor!([4, 3, 2, 1], "float32"),
                expected: tensor!(ndim = 4, "float32"),
            },
            Case {
                op: BinaryOp::Add,
                lhs: tensor!(),
                rhs: tensor!([2, 3], "float32"),
                expected: tensor!(),
            },
            // Symbolic sizes which cannot be proven equal.
            Case {
                op: BinaryOp::Divide,
                lhs: tensor!(["m", "n"], "float32"),
                rhs: StructInfo::Tensor(TensorStructInfo::new(
                    Shape::from_dims(vec!["m".into(), n_plus_2]),
                    Some(DataType::Float32),
                )),
                expected: tensor!(ndim = 2, "float32"),
            },
        ];

        cases.test_each(|case| {
            let inputs = [case.lhs.clone(), case.rhs.clone()];
            let result = infer(&case.op, &inputs, &StructuralProver).unwrap();
            assert_eq!(result.struct_info, case.expected);
            assert!(result.checks.is_empty());
        })
    }

    #[test]
    fn test_binary_op_shape_vars() {
        let mut sym_gen = SymbolGen::new();
        let s0 = sym_gen.shape_var("s0", Some(2));
        let s1 = sym_gen.shape_var("s1", Some(2));
        let s2 = sym_gen.shape_var("s2", None);
        let x = |var| {
            StructInfo::Tensor(TensorStructInfo::new(
                Shape::from_var(var),
                Some(DataType::Float32),
            ))
        };

        let result = infer(&BinaryOp::Add, &[x(s0.clone()), x(s0.clone())], &StructuralProver)
            .unwrap();
        assert_eq!(result.struct_info, x(s0.clone()));

        let result = infer(&BinaryOp::Add, &[x(s0.clone()), x(s1)], &StructuralProver).unwrap();
        assert_eq!(result.struct_info, tensor!(ndim = 2, "float32"));

        let result = infer(&BinaryOp::Add, &[x(s0), x(s2)], &StructuralProver).unwrap();
        assert_eq!(result.struct_info, tensor!("float32"));
    }

    #[test]
    fn test_binary_op_invalid() {
        #[derive(Debug)]
        struct Case {
            op: BinaryOp,
            inputs: Vec<StructInfo>,
            expected: InferError,
        }

        let func = StructInfo::from(FuncStructInfo {
            params: None,
            ret: Box::new(tensor!()),
        });

        let cases = [
            Case {
                op: BinaryOp::Add,
                inputs: vec![tensor!([2, 3], "float32"), tensor!([2, 3], "int32")],
                expected: InferError::DtypeMismatch {
                    lhs: DataType::Float32,
                    rhs: DataType::Int32,
                },
            },
            Case {
                op: BinaryOp::Add,
                inputs: vec![StructInfo::Shape(Shape::from_rank(2)), tensor!([2, 3])],
                expected: InferError::WrongInputType {
                    index: 0,
                    expected: "Tensor",
                    actual: "Shape",
                },
            },
            Case {
                op: BinaryOp::Greater,
                inputs: vec![tensor!([2, 3]), func],
                expected: InferError::WrongInputType {
                    index: 1,
                    expected: "Tensor",
                    actual: "Func",
                },
            },
            Case {
                op: BinaryOp::Add,
                inputs: vec![tensor!([2, 3])],
                expected: InferError::IncorrectInputCount,
            },
        ];

        cases.test_each(|case| {
            let err = infer(&case.op, &case.inputs, &StructuralProver)
                .err()
                .unwrap();
            assert_eq!(err, case.expected);
        })
    }

    #[test]
    fn test_binary_op_incompatible_shapes() {
        let inputs = [tensor!([2, 3], "float32"), tensor!([2, 4], "float32")];
        let result = infer(&BinaryOp::Add, &inputs, &StructuralProver).unwrap();
        assert!(matches!(
            result.checks.as_slice(),
            [Check::Fail(InferError::ShapeMismatch(_))]
        ));
    }
}

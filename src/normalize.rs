//! Normalization: evaluating deferred checks and reporting failures.
//!
//! Inference produces a result together with checks that are only decided
//! when the result is needed. Normalizing an operator call runs inference,
//! evaluates each check in order and converts the first failure into a
//! [`NormalizeError`] which records the operator and its operands.

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::env::env_flag;
use crate::infer::InferError;
use crate::ops::Op;
use crate::prove::ProveEqual;
use crate::shape::Shape;
use crate::struct_info::StructInfo;

/// Options that control normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizeOptions {
    /// Whether to log each normalized operation and each failure to stderr.
    pub trace: bool,

    /// Whether [`Builder::normalize_all`](crate::Builder::normalize_all) may
    /// infer independent operations in parallel.
    pub parallel: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            trace: false,
            parallel: true,
        }
    }
}

impl NormalizeOptions {
    /// Read options from the `STRUCT_INFO_TRACE` and `STRUCT_INFO_PARALLEL`
    /// environment variables, using defaults for unset variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        NormalizeOptions {
            trace: env_flag("STRUCT_INFO_TRACE", default.trace),
            parallel: env_flag("STRUCT_INFO_PARALLEL", default.parallel),
        }
    }
}

/// Errors that occur when normalizing an operation.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizeError(NormalizeErrorImpl);

impl NormalizeError {
    /// Return the general category of error.
    pub fn kind(&self) -> NormalizeErrorKind {
        self.0.kind()
    }

    /// Name of the operator whose normalization failed.
    pub fn op_name(&self) -> Option<&str> {
        match &self.0 {
            NormalizeErrorImpl::InvalidNodeId => None,
            NormalizeErrorImpl::OperatorError { op, .. } => Some(op),
        }
    }

    /// Struct info of the failed operator's operands.
    pub fn inputs(&self) -> &[StructInfo] {
        match &self.0 {
            NormalizeErrorImpl::InvalidNodeId => &[],
            NormalizeErrorImpl::OperatorError { inputs, .. } => inputs,
        }
    }

    /// Return the inference failure which caused this error.
    pub fn infer_error(&self) -> Option<&InferError> {
        match &self.0 {
            NormalizeErrorImpl::InvalidNodeId => None,
            NormalizeErrorImpl::OperatorError { error, .. } => Some(error),
        }
    }

    pub(crate) fn invalid_node_id() -> Self {
        NormalizeErrorImpl::InvalidNodeId.into()
    }

    pub(crate) fn op_error(op: &Op, inputs: &[StructInfo], error: InferError) -> Self {
        NormalizeErrorImpl::OperatorError {
            op: op.name(),
            inputs: inputs.to_vec(),
            error,
        }
        .into()
    }
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for NormalizeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.infer_error().map(|err| err as &(dyn Error + 'static))
    }
}

impl From<NormalizeErrorImpl> for NormalizeError {
    fn from(inner: NormalizeErrorImpl) -> Self {
        Self(inner)
    }
}

/// The category of normalization error. See [`NormalizeError::kind`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum NormalizeErrorKind {
    /// A node ID does not refer to a node.
    NodeNotFound,
    /// The operator was given the wrong number of operands.
    IncorrectInputCount,
    /// An operand is not the kind of value the operator requires.
    WrongInputType,
    /// Operands have incompatible data types.
    DtypeMismatch,
    /// Operand shapes are incompatible.
    ShapeMismatch,
    /// A size required to produce a result could not be determined.
    UnresolvableInference,
    /// Axis parameters are invalid for the operand.
    InvalidAxes,
}

/// Internal implementation of [`NormalizeError`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum NormalizeErrorImpl {
    /// A node ID is invalid.
    InvalidNodeId,

    /// Inference for an operator failed.
    OperatorError {
        /// Name of the operator.
        op: &'static str,

        /// Struct info of the operands.
        inputs: Vec<StructInfo>,

        error: InferError,
    },
}

impl NormalizeErrorImpl {
    fn kind(&self) -> NormalizeErrorKind {
        type Kind = NormalizeErrorKind;

        match self {
            Self::InvalidNodeId => Kind::NodeNotFound,
            Self::OperatorError { error, .. } => match error {
                InferError::IncorrectInputCount => Kind::IncorrectInputCount,
                InferError::WrongInputType { .. } => Kind::WrongInputType,
                InferError::DtypeMismatch { .. } => Kind::DtypeMismatch,
                InferError::ShapeMismatch(_) => Kind::ShapeMismatch,
                InferError::UnresolvableInference(_) => Kind::UnresolvableInference,
                InferError::InvalidAxes { .. } => Kind::InvalidAxes,
            },
        }
    }
}

impl Display for NormalizeErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeId => write!(f, "node ID is invalid"),
            Self::OperatorError { op, inputs, error } => {
                write!(f, "operator \"{}\" failed: {}. Inputs were (", op, error)?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", input)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Infer the result of an operator call and evaluate its deferred checks.
///
/// The first failure, either from inference itself or from a check, is
/// returned as an error.
pub fn normalize_op(
    op: &Op,
    inputs: &[StructInfo],
    prover: &dyn ProveEqual,
    opts: &NormalizeOptions,
) -> Result<StructInfo, NormalizeError> {
    let result = op.infer(inputs, prover).and_then(|inferred| {
        for check in &inferred.checks {
            check.evaluate(prover)?;
        }
        Ok(inferred.struct_info)
    });

    match result {
        Ok(struct_info) => {
            if opts.trace {
                eprintln!("normalize {} -> {}", op.name(), struct_info);
            }
            Ok(struct_info)
        }
        Err(err) => {
            let err = NormalizeError::op_error(op, inputs, err);
            if opts.trace {
                eprintln!("normalize {} failed: {}", op.name(), err);
            }
            Err(err)
        }
    }
}

/// Return true if two shapes are structurally equal.
fn shapes_equal(lhs: &Shape, rhs: &Shape, prover: &dyn ProveEqual) -> bool {
    match (lhs.as_var(), rhs.as_var()) {
        (Some(lhs_var), Some(rhs_var)) => return lhs_var == rhs_var,
        (Some(_), None) | (None, Some(_)) => return false,
        (None, None) => {}
    }

    if lhs.ndim() != rhs.ndim() {
        return false;
    }

    match (lhs.dims(), rhs.dims()) {
        (Some(lhs_dims), Some(rhs_dims)) => lhs_dims
            .iter()
            .zip(rhs_dims)
            .all(|(a, b)| prover.prove_equal(a, b) == Some(true)),
        (None, None) => true,
        _ => false,
    }
}

/// Return true if two struct infos are structurally equal.
///
/// Values must be the same variant with equal contents. Dimension sizes are
/// equal if `prover` proves them equal. Shape variables are only equal to
/// themselves.
pub fn structural_equal(lhs: &StructInfo, rhs: &StructInfo, prover: &dyn ProveEqual) -> bool {
    let all_equal = |lhs: &[StructInfo], rhs: &[StructInfo]| {
        lhs.len() == rhs.len()
            && lhs
                .iter()
                .zip(rhs)
                .all(|(a, b)| structural_equal(a, b, prover))
    };

    match (lhs, rhs) {
        (StructInfo::Object, StructInfo::Object) => true,
        (StructInfo::Prim(a), StructInfo::Prim(b)) => a == b,
        (StructInfo::Shape(a), StructInfo::Shape(b)) => shapes_equal(a, b, prover),
        (StructInfo::Tensor(a), StructInfo::Tensor(b)) => {
            a.dtype == b.dtype && shapes_equal(&a.shape, &b.shape, prover)
        }
        (StructInfo::Tuple(a), StructInfo::Tuple(b)) => all_equal(a, b),
        (StructInfo::Func(a), StructInfo::Func(b)) => {
            let params_equal = match (&a.params, &b.params) {
                (Some(a_params), Some(b_params)) => all_equal(a_params, b_params),
                (None, None) => true,
                _ => false,
            };
            params_equal && structural_equal(&a.ret, &b.ret, prover)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use struct_info_testing::TestCases;

    use super::{NormalizeErrorKind, NormalizeOptions, normalize_op, structural_equal};
    use crate::dtype::DataType;
    use crate::infer::InferError;
    use crate::ops::{BinaryOp, MatMul, Op, Reshape, Squeeze};
    use crate::prove::{ProveEqual, StructuralProver};
    use crate::shape::{Shape, dims};
    use crate::struct_info::{FuncStructInfo, StructInfo, TensorStructInfo, tensor};
    use crate::sym_expr::SymExpr;
    use crate::sym_gen::SymbolGen;

    /// Prover which treats all symbols as having the value 1.
    struct AllOnesProver;

    impl ProveEqual for AllOnesProver {
        fn prove_equal(&self, lhs: &SymExpr, rhs: &SymExpr) -> Option<bool> {
            let value = |expr: &SymExpr| expr.as_value().unwrap_or(1);
            Some(value(lhs) == value(rhs))
        }
    }

    #[test]
    fn test_normalize_options() {
        let opts = NormalizeOptions::default();
        assert!(!opts.trace);
        assert!(opts.parallel);
    }

    #[test]
    fn test_normalize_op() {
        #[derive(Debug)]
        struct Case {
            op: Op,
            inputs: Vec<StructInfo>,
            expected: Result<StructInfo, NormalizeErrorKind>,
        }

        let cases = [
            Case {
                op: BinaryOp::Add.into(),
                inputs: vec![tensor!([2, 3], "float32"), tensor!([2, 3], "float32")],
                expected: Ok(tensor!([2, 3], "float32")),
            },
            Case {
                op: BinaryOp::Add.into(),
                inputs: vec![tensor!([2, 3], "float32"), tensor!([2, 4], "float32")],
                expected: Err(NormalizeErrorKind::ShapeMismatch),
            },
            Case {
                op: BinaryOp::Add.into(),
                inputs: vec![tensor!([2, 3], "float32"), tensor!([2, 3], "int32")],
                expected: Err(NormalizeErrorKind::DtypeMismatch),
            },
            Case {
                op: BinaryOp::Add.into(),
                inputs: vec![StructInfo::Shape(Shape::from_rank(2)), tensor!([2, 3])],
                expected: Err(NormalizeErrorKind::WrongInputType),
            },
            Case {
                op: Reshape {
                    shape: dims!(6, 1, -1).into(),
                }
                .into(),
                inputs: vec![tensor!([2, 3, 4], "float32")],
                expected: Ok(tensor!([6, 1, 4], "float32")),
            },
            Case {
                op: Reshape {
                    shape: dims!(5, -1).into(),
                }
                .into(),
                inputs: vec![tensor!([2, 3, 4], "float32")],
                expected: Err(NormalizeErrorKind::ShapeMismatch),
            },
            Case {
                op: Reshape {
                    shape: dims!(2, -1).into(),
                }
                .into(),
                inputs: vec![tensor!(ndim = 3, "float32")],
                expected: Err(NormalizeErrorKind::UnresolvableInference),
            },
            Case {
                op: Squeeze::default().into(),
                inputs: vec![tensor!([1, 3, 1], "float32")],
                expected: Ok(tensor!([3], "float32")),
            },
            Case {
                op: Squeeze {
                    axes: Some(vec![0]),
                }
                .into(),
                inputs: vec![tensor!([2, 3], "float32")],
                expected: Err(NormalizeErrorKind::ShapeMismatch),
            },
            Case {
                op: Squeeze {
                    axes: Some(vec![2]),
                }
                .into(),
                inputs: vec![tensor!([2, 3], "float32")],
                expected: Err(NormalizeErrorKind::InvalidAxes),
            },
            // Sizes which can't be proven different don't fail.
            Case {
                op: MatMul::default().into(),
                inputs: vec![tensor!(["m", "k"], "float32"), tensor!(["j", "n"], "float32")],
                expected: Ok(tensor!(["m", "n"], "float32")),
            },
            // Sizes which are proven different do.
            Case {
                op: MatMul::default().into(),
                inputs: vec![
                    tensor!(["m", "k"], "float32"),
                    StructInfo::from(TensorStructInfo::new(
                        Shape::from_dims(vec![SymExpr::from("k") + SymExpr::from(1), "n".into()]),
                        Some(DataType::Float32),
                    )),
                ],
                expected: Err(NormalizeErrorKind::ShapeMismatch),
            },
        ];

        cases.test_each(|case| {
            let result = normalize_op(
                &case.op,
                &case.inputs,
                &StructuralProver,
                &NormalizeOptions::default(),
            )
            .map_err(|err| err.kind());
            assert_eq!(result, case.expected);
        })
    }

    #[test]
    fn test_normalize_op_uses_prover() {
        let op = Op::from(Squeeze {
            axes: Some(vec![0]),
        });
        let inputs = [tensor!(["n", 3], "float32")];
        let opts = NormalizeOptions::default();

        // Squeezing a symbolic dim which can't be proven to be 1 produces a
        // rank-only result.
        let result = normalize_op(&op, &inputs, &StructuralProver, &opts).unwrap();
        assert_eq!(result, tensor!(ndim = 1, "float32"));

        // A prover which knows the size is 1 allows the full shape to be
        // inferred.
        let result = normalize_op(&op, &inputs, &AllOnesProver, &opts).unwrap();
        assert_eq!(result, tensor!([3], "float32"));
    }

    #[test]
    fn test_normalize_error() {
        let op = Op::from(BinaryOp::Add);
        let inputs = [tensor!([2, 3], "float32"), tensor!([2, 3], "int32")];
        let err = normalize_op(&op, &inputs, &StructuralProver, &NormalizeOptions::default())
            .err()
            .unwrap();

        assert_eq!(err.op_name(), Some("add"));
        assert_eq!(err.inputs(), &inputs);
        assert!(matches!(
            err.infer_error(),
            Some(InferError::DtypeMismatch { .. })
        ));
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "operator \"add\" failed: data types float32 and int32 do not match. \
             Inputs were (Tensor((2, 3), \"float32\"), Tensor((2, 3), \"int32\"))"
        );
    }

    #[test]
    fn test_structural_equal() {
        let mut sym_gen = SymbolGen::new();
        let s0 = Shape::from_var(sym_gen.shape_var("s0", Some(2)));
        let s1 = Shape::from_var(sym_gen.shape_var("s1", Some(2)));
        let func = |ret: StructInfo| {
            StructInfo::from(FuncStructInfo {
                params: Some(vec![tensor!([2], "int64")]),
                ret: Box::new(ret),
            })
        };
        let n_plus_2 = StructInfo::from(TensorStructInfo::new(
            Shape::from_dims(vec![SymExpr::from("n") + SymExpr::from(2)]),
            None,
        ));
        let two_plus_n = StructInfo::from(TensorStructInfo::new(
            Shape::from_dims(vec![SymExpr::from(2) + SymExpr::from("n")]),
            None,
        ));

        let equal = |a: &StructInfo, b: &StructInfo| structural_equal(a, b, &StructuralProver);

        assert!(equal(&StructInfo::Object, &StructInfo::Object));
        assert!(equal(&tensor!([2, 3], "float32"), &tensor!([2, 3], "float32")));
        assert!(equal(&tensor!(["n", 3]), &tensor!(["n", 3])));
        assert!(equal(&n_plus_2, &two_plus_n));
        assert!(equal(&tensor!(ndim = 2), &tensor!(ndim = 2)));
        assert!(equal(&tensor!(), &tensor!()));
        assert!(equal(&StructInfo::Shape(s0.clone()), &StructInfo::Shape(s0.clone())));
        assert!(equal(&func(tensor!("bool")), &func(tensor!("bool"))));
        assert!(equal(
            &StructInfo::Tuple(vec![tensor!([1]), StructInfo::Object]),
            &StructInfo::Tuple(vec![tensor!([1]), StructInfo::Object])
        ));

        assert!(!equal(&tensor!([2, 3], "float32"), &tensor!([2, 3])));
        assert!(!equal(&tensor!([2, 3]), &tensor!([3, 2])));
        assert!(!equal(&tensor!(["n", 3]), &tensor!(["m", 3])));
        assert!(!equal(&tensor!(ndim = 2), &tensor!([2, 3])));
        assert!(!equal(&tensor!(ndim = 2), &tensor!()));
        assert!(!equal(&StructInfo::Shape(s0.clone()), &StructInfo::Shape(s1)));
        assert!(!equal(
            &StructInfo::Shape(s0),
            &StructInfo::Shape(Shape::from_rank(2))
        ));
        assert!(!equal(&func(tensor!("bool")), &func(tensor!("int8"))));
        assert!(!equal(
            &StructInfo::Tuple(vec![tensor!([1])]),
            &StructInfo::Tuple(vec![tensor!([1]), tensor!([1])])
        ));
        assert!(!equal(&StructInfo::Object, &tensor!()));
    }
}

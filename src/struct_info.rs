//! Structural type information for values in a tensor IR.

use std::fmt;

use crate::dtype::DataType;
use crate::shape::Shape;

/// Structural information about a tensor: its element type and shape.
///
/// Either part may be unknown. A tensor with unknown dtype and unknown rank
/// carries no information beyond being a tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorStructInfo {
    pub shape: Shape,
    pub dtype: Option<DataType>,
}

impl TensorStructInfo {
    pub fn new(shape: Shape, dtype: Option<DataType>) -> Self {
        Self { shape, dtype }
    }

    /// Create a tensor struct info with unknown shape and dtype.
    pub fn unknown() -> Self {
        Self::new(Shape::unknown(), None)
    }

    /// Return the number of dimensions, if known.
    pub fn ndim(&self) -> Option<usize> {
        self.shape.ndim()
    }
}

impl fmt::Display for TensorStructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(")?;
        let shape_known = self.shape.ndim().is_some() || self.shape.as_var().is_some();
        match (shape_known, self.dtype) {
            (false, None) => {}
            (false, Some(dtype)) => write!(f, "\"{}\"", dtype)?,
            (true, None) => write!(f, "{}", self.shape)?,
            (true, Some(dtype)) => write!(f, "{}, \"{}\"", self.shape, dtype)?,
        }
        write!(f, ")")
    }
}

/// Structural information about a function.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncStructInfo {
    /// Parameter struct infos, or `None` if the signature is opaque.
    pub params: Option<Vec<StructInfo>>,
    pub ret: Box<StructInfo>,
}

/// Structural type of a value.
///
/// This is a closed set of variants. Operators which require a particular
/// variant report a [`WrongInputType`](crate::InferError::WrongInputType)
/// error when given another one.
///
/// ```
/// use struct_info::{DataType, Shape, StructInfo, TensorStructInfo};
///
/// let x = StructInfo::from(TensorStructInfo::new(
///     Shape::from_fixed_shape(&[2, 3]),
///     Some(DataType::Float32),
/// ));
/// assert_eq!(x.to_string(), "Tensor((2, 3), \"float32\")");
/// assert_eq!(x.kind_name(), "Tensor");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum StructInfo {
    /// A value about which nothing is known.
    Object,
    /// A scalar of a primitive type.
    Prim(DataType),
    /// A shape value.
    Shape(Shape),
    Tensor(TensorStructInfo),
    Tuple(Vec<StructInfo>),
    Func(FuncStructInfo),
}

impl StructInfo {
    /// Return the name of this value's variant, for use in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Prim(_) => "Prim",
            Self::Shape(_) => "Shape",
            Self::Tensor(_) => "Tensor",
            Self::Tuple(_) => "Tuple",
            Self::Func(_) => "Func",
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorStructInfo> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[StructInfo]> {
        match self {
            Self::Tuple(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<TensorStructInfo> for StructInfo {
    fn from(val: TensorStructInfo) -> Self {
        Self::Tensor(val)
    }
}

impl From<FuncStructInfo> for StructInfo {
    fn from(val: FuncStructInfo) -> Self {
        Self::Func(val)
    }
}

impl From<Shape> for StructInfo {
    fn from(val: Shape) -> Self {
        Self::Shape(val)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[StructInfo]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

impl fmt::Display for StructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "Object"),
            Self::Prim(dtype) => write!(f, "Prim(\"{}\")", dtype),
            Self::Shape(shape) => write!(f, "Shape({})", shape),
            Self::Tensor(tensor) => write!(f, "{}", tensor),
            Self::Tuple(fields) => {
                write!(f, "Tuple(")?;
                write_list(f, fields)?;
                write!(f, ")")
            }
            Self::Func(func) => {
                write!(f, "Func(")?;
                match &func.params {
                    Some(params) => write_list(f, params)?,
                    None => write!(f, "...")?,
                }
                write!(f, ", {})", func.ret)
            }
        }
    }
}

#[cfg(test)]
pub(crate) use tests::tensor;

#[cfg(test)]
mod tests {
    use super::{FuncStructInfo, StructInfo, TensorStructInfo};
    use crate::dtype::DataType;
    use crate::shape::Shape;

    /// Create a [`StructInfo::Tensor`] from a dimension list and dtype name.
    ///
    /// `tensor!([2, "n"], "float32")` has known dimensions,
    /// `tensor!(ndim = 2, "float32")` has known rank only, `tensor!("float32")`
    /// has unknown rank and `tensor!()` is the fully unknown tensor. Omitting
    /// the dtype leaves it unknown.
    macro_rules! tensor {
        () => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::unknown())
        };
        ($dtype:literal) => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::new(
                $crate::Shape::unknown(),
                Some($dtype.parse::<$crate::DataType>().unwrap()),
            ))
        };
        (ndim = $ndim:expr) => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::new(
                $crate::Shape::from_rank($ndim),
                None,
            ))
        };
        (ndim = $ndim:expr, $dtype:literal) => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::new(
                $crate::Shape::from_rank($ndim),
                Some($dtype.parse::<$crate::DataType>().unwrap()),
            ))
        };
        ([$($dim:expr),* $(,)?]) => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::new(
                $crate::Shape::from_dims(vec![$($crate::SymExpr::from($dim)),*]),
                None,
            ))
        };
        ([$($dim:expr),* $(,)?], $dtype:literal) => {
            $crate::StructInfo::Tensor($crate::TensorStructInfo::new(
                $crate::Shape::from_dims(vec![$($crate::SymExpr::from($dim)),*]),
                Some($dtype.parse::<$crate::DataType>().unwrap()),
            ))
        };
    }

    pub(crate) use tensor;

    #[test]
    fn test_tensor_macro() {
        assert_eq!(
            tensor!([2, 3], "float32"),
            StructInfo::Tensor(TensorStructInfo::new(
                Shape::from_fixed_shape(&[2, 3]),
                Some(DataType::Float32)
            ))
        );
        assert_eq!(tensor!(ndim = 2).as_tensor().unwrap().ndim(), Some(2));
        assert_eq!(tensor!().as_tensor(), Some(&TensorStructInfo::unknown()));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            tensor!([2, 3], "float32").to_string(),
            "Tensor((2, 3), \"float32\")"
        );
        assert_eq!(
            tensor!(ndim = 2, "float32").to_string(),
            "Tensor(ndim=2, \"float32\")"
        );
        assert_eq!(tensor!("int8").to_string(), "Tensor(\"int8\")");
        assert_eq!(tensor!(["n", 4]).to_string(), "Tensor((n, 4))");
        assert_eq!(tensor!().to_string(), "Tensor()");
        assert_eq!(StructInfo::Prim(DataType::Bool).to_string(), "Prim(\"bool\")");
        assert_eq!(
            StructInfo::Shape(Shape::from_rank(2)).to_string(),
            "Shape(ndim=2)"
        );
        assert_eq!(
            StructInfo::Tuple(vec![tensor!([1], "bool"), StructInfo::Object]).to_string(),
            "Tuple([Tensor((1,), \"bool\"), Object])"
        );

        let func = StructInfo::from(FuncStructInfo {
            params: None,
            ret: Box::new(tensor!()),
        });
        assert_eq!(func.to_string(), "Func(..., Tensor())");
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(StructInfo::Object.kind_name(), "Object");
        assert_eq!(tensor!().kind_name(), "Tensor");
        assert_eq!(StructInfo::Tuple(vec![]).kind_name(), "Tuple");
    }
}

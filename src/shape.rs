//! Shapes with symbolic dimensions.

use std::fmt;
use std::sync::Arc;

use crate::sym_expr::SymExpr;

struct ShapeVarData {
    id: u32,
    name: String,
    ndim: Option<usize>,
}

/// Handle for a variable standing for an entire shape.
///
/// Shape variables are compared by identity. Two tensors whose shapes are the
/// same variable are known to have equal shapes without comparing dimensions.
/// Two different variables are never assumed to be equal, even if they have
/// the same name.
///
/// Shape variables are created with [`SymbolGen::shape_var`](crate::SymbolGen::shape_var).
#[derive(Clone)]
pub struct ShapeVar(Arc<ShapeVarData>);

impl ShapeVar {
    pub(crate) fn new(id: u32, name: &str, ndim: Option<usize>) -> Self {
        Self(Arc::new(ShapeVarData {
            id,
            name: name.to_string(),
            ndim,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Return the rank of shapes this variable stands for, if known.
    pub fn ndim(&self) -> Option<usize> {
        self.0.ndim
    }
}

impl PartialEq for ShapeVar {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ShapeVar {}

impl fmt::Debug for ShapeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

impl fmt::Display for ShapeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ShapeKind {
    /// Neither the rank nor the dimension sizes are known.
    Unknown,
    /// The rank is known but the dimension sizes are not.
    Rank(usize),
    /// The size of every dimension is known, either as a constant or a
    /// symbolic expression.
    Dims(Vec<SymExpr>),
    /// The shape is a reference to a shape variable.
    Var(ShapeVar),
}

/// Shape of a tensor, with varying degrees of certainty.
///
/// A shape can be fully known, with each dimension a constant or symbolic
/// expression, known only up to its rank, or completely unknown. It can also
/// refer to a [`ShapeVar`].
///
/// ```
/// use struct_info::{Shape, SymExpr};
///
/// let shape = Shape::from_dims(vec![SymExpr::from("batch"), SymExpr::from(16)]);
/// assert_eq!(shape.ndim(), Some(2));
/// assert_eq!(shape.size(1), Some(&SymExpr::from(16)));
/// assert_eq!(shape.to_string(), "(batch, 16)");
///
/// let rank_only = Shape::from_rank(3);
/// assert_eq!(rank_only.ndim(), Some(3));
/// assert_eq!(rank_only.dims(), None);
/// assert_eq!(rank_only.to_string(), "ndim=3");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Shape(ShapeKind);

impl Shape {
    /// Create a shape whose rank and dimensions are unknown.
    pub fn unknown() -> Self {
        Self(ShapeKind::Unknown)
    }

    /// Create a shape with known rank and unknown dimension sizes.
    pub fn from_rank(ndim: usize) -> Self {
        Self(ShapeKind::Rank(ndim))
    }

    /// Create a shape with known dimension sizes.
    pub fn from_dims(dims: Vec<SymExpr>) -> Self {
        Self(ShapeKind::Dims(dims))
    }

    /// Create a shape whose dimension sizes are all constants.
    pub fn from_fixed_shape(shape: &[usize]) -> Self {
        Self::from_dims(shape.iter().map(|&size| SymExpr::from(size)).collect())
    }

    /// Create a shape which refers to a shape variable.
    pub fn from_var(var: ShapeVar) -> Self {
        Self(ShapeKind::Var(var))
    }

    /// Create a shape from dimensions which may not all have been resolved.
    ///
    /// If any dimension is unresolved, the result keeps only the rank.
    pub fn from_resolved(dims: Vec<Option<SymExpr>>) -> Self {
        let ndim = dims.len();
        match dims.into_iter().collect::<Option<Vec<_>>>() {
            Some(dims) => Self::from_dims(dims),
            None => Self::from_rank(ndim),
        }
    }

    /// Return the number of dimensions, if known.
    pub fn ndim(&self) -> Option<usize> {
        match &self.0 {
            ShapeKind::Unknown => None,
            ShapeKind::Rank(ndim) => Some(*ndim),
            ShapeKind::Dims(dims) => Some(dims.len()),
            ShapeKind::Var(var) => var.ndim(),
        }
    }

    /// Return the dimension sizes, if known.
    pub fn dims(&self) -> Option<&[SymExpr]> {
        match &self.0 {
            ShapeKind::Dims(dims) => Some(dims),
            ShapeKind::Unknown | ShapeKind::Rank(_) | ShapeKind::Var(_) => None,
        }
    }

    /// Return the size of the index'th dimension.
    ///
    /// Returns `None` if the index is out of bounds or the dimension sizes
    /// are unknown.
    pub fn size(&self, index: usize) -> Option<&SymExpr> {
        self.dims().and_then(|dims| dims.get(index))
    }

    /// Return the shape variable this shape refers to, if any.
    pub fn as_var(&self) -> Option<&ShapeVar> {
        match &self.0 {
            ShapeKind::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Return the number of elements in a tensor with this shape, if the
    /// dimension sizes are known.
    pub fn num_elements(&self) -> Option<SymExpr> {
        self.dims().map(SymExpr::product)
    }

    /// Simplify symbolic expressions in this shape.
    ///
    /// See [`SymExpr::simplify`].
    pub fn simplify(self) -> Self {
        match self.0 {
            ShapeKind::Dims(dims) => {
                Self::from_dims(dims.into_iter().map(|d| d.simplify()).collect())
            }
            _ => self,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ShapeKind::Unknown => write!(f, "ndim=?"),
            ShapeKind::Rank(ndim) => write!(f, "ndim={}", ndim),
            ShapeKind::Var(var) => write!(f, "{}", var),
            ShapeKind::Dims(dims) => {
                write!(f, "(")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", dim)?;
                }
                if dims.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
pub(crate) use tests::dims;

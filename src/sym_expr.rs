//! Symbolic expressions representing dimension sizes.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

/// A named integer variable.
///
/// Two symbols are equal if they have the same name. Symbols created through a
/// [`SymbolGen`](crate::SymbolGen) are interned, so symbols with the same name
/// from the same generator also share the same allocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub name: String,
}

/// Symbolic expression representing an integer value.
///
/// Expressions can be known integer values, named symbols or composite
/// expressions. Dimension sizes in a [`Shape`](crate::Shape) are represented
/// using this type.
#[derive(Clone)]
pub enum SymExpr {
    /// Element with a known integer value.
    Value(i64),
    /// Symbolic value
    Var(Arc<Symbol>),
    /// Addition of two symbolic values
    Add(Arc<SymExpr>, Arc<SymExpr>),
    /// Subtraction of two symbolic values
    Sub(Arc<SymExpr>, Arc<SymExpr>),
    /// Multiplication of two symbolic values
    Mul(Arc<SymExpr>, Arc<SymExpr>),
    /// Flooring division of first expression by second.
    Div(Arc<SymExpr>, Arc<SymExpr>),
    /// Negation of a value
    Neg(Arc<SymExpr>),
}

impl SymExpr {
    /// Create a named symbol.
    ///
    /// The symbol is not interned. Use [`SymbolGen::var`](crate::SymbolGen::var)
    /// to create symbols which share identity with other uses of the name.
    pub fn var(name: &str) -> Self {
        SymExpr::Var(
            Symbol {
                name: name.to_string(),
            }
            .into(),
        )
    }

    /// Return the value of this expression if it is a known integer.
    pub fn as_value(&self) -> Option<i64> {
        match self {
            Self::Value(x) => Some(*x),
            _ => None,
        }
    }

    fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Return true if this expression contains a division.
    ///
    /// Divisions which survive simplification may not be exact, so
    /// expressions containing them cannot be used as dimension sizes.
    pub fn contains_div(&self) -> bool {
        match self {
            Self::Value(_) | Self::Var(_) => false,
            Self::Div(..) => true,
            Self::Neg(x) => x.contains_div(),
            Self::Add(lhs, rhs) | Self::Sub(lhs, rhs) | Self::Mul(lhs, rhs) => {
                lhs.contains_div() || rhs.contains_div()
            }
        }
    }

    /// Return the simplified product of a sequence of expressions.
    ///
    /// The product of an empty sequence is 1.
    pub fn product<'a>(terms: impl IntoIterator<Item = &'a SymExpr>) -> SymExpr {
        terms
            .into_iter()
            .fold(SymExpr::Value(1), |prod, x| prod * x.clone())
            .simplify()
    }

    /// Return the simplified sum of a sequence of expressions.
    ///
    /// The sum of an empty sequence is 0.
    pub fn sum<'a>(terms: impl IntoIterator<Item = &'a SymExpr>) -> SymExpr {
        terms
            .into_iter()
            .fold(SymExpr::Value(0), |sum, x| sum + x.clone())
            .simplify()
    }

    // Re-order and re-associate operands of commutative and associative
    // operations so that constants are on the left or "canonical order".
    //
    // For example `Mul(Mul(a, 2), Mul(b, 3))` becomes
    // `Mul(Mul(2, 3), Mul(a, b))`.
    fn canonicalize(&self) -> SymExpr {
        fn collect_terms(
            terms: &mut Vec<SymExpr>,
            term: &SymExpr,
            extract_lhs_rhs: &impl Fn(&SymExpr) -> Option<(&Arc<SymExpr>, &Arc<SymExpr>)>,
        ) {
            if let Some((lhs, rhs)) = extract_lhs_rhs(term) {
                collect_terms(terms, lhs, extract_lhs_rhs);
                collect_terms(terms, rhs, extract_lhs_rhs);
                return;
            }

            // Canonicalizing a leaf can produce a new expression of the kind
            // being collected (eg. `-(a + b)` becomes `-a + -b`).
            let term = term.canonicalize();
            if extract_lhs_rhs(&term).is_some() {
                collect_terms(terms, &term, extract_lhs_rhs);
            } else {
                terms.push(term);
            }
        }

        // Re-associate and simplify terms in a nested associative expression.
        //
        // 1. Collect all the terms in nested expressions of the same type
        // 2. Sort the terms in canonical order
        // 3. Simplify the result by removing any redundant terms
        // 4. Reduce the terms into a new expression, or return `default` if
        //    step (3) removed all the terms
        fn reassociate_terms(
            term: &SymExpr,
            extract_terms: &impl Fn(&SymExpr) -> Option<(&Arc<SymExpr>, &Arc<SymExpr>)>,
            simplify: impl Fn(Vec<SymExpr>) -> Vec<SymExpr>,
            default: SymExpr,
            reduce: impl Fn(SymExpr, SymExpr) -> SymExpr,
        ) -> SymExpr {
            let mut terms = Vec::new();
            collect_terms(&mut terms, term, extract_terms);
            terms.sort_by(cmp_values_first);
            let terms = simplify(terms);
            terms.into_iter().reduce(reduce).unwrap_or(default)
        }

        match self {
            Self::Value(_) | Self::Var(_) => self.clone(),
            Self::Neg(expr) => match expr.canonicalize() {
                Self::Value(x) => x
                    .checked_neg()
                    .map(Self::Value)
                    .unwrap_or_else(|| -Self::Value(x)),
                Self::Neg(inner) => (*inner).clone(),
                // Distribute negation over sums so that opposite terms in
                // an enclosing sum become adjacent and cancel.
                Self::Add(lhs, rhs) => {
                    (-(*lhs).clone() + -(*rhs).clone()).canonicalize()
                }
                expr => Self::Neg(expr.into()),
            },
            Self::Mul(..) => reassociate_terms(
                self,
                &|term| match term {
                    Self::Mul(lhs, rhs) => Some((lhs, rhs)),
                    _ => None,
                },
                |terms| terms,
                SymExpr::Value(1),
                |prod, x| prod * x,
            ),
            Self::Add(..) => {
                // Remove adjacent terms which cancel.
                let remove_adjacent_opposite_terms = |mut terms: Vec<SymExpr>| {
                    let mut idx = 0;
                    while idx < terms.len().saturating_sub(1) {
                        if terms[idx].is_negation_of(&terms[idx + 1]) {
                            terms.remove(idx);
                            terms.remove(idx);
                        } else {
                            idx += 1;
                        }
                    }
                    terms
                };

                reassociate_terms(
                    self,
                    &|term| match term {
                        Self::Add(lhs, rhs) => Some((lhs, rhs)),
                        _ => None,
                    },
                    remove_adjacent_opposite_terms,
                    SymExpr::Value(0),
                    |sum, x| sum + x,
                )
            }
            Self::Sub(lhs, rhs) => {
                // Rewrite `x - y` as `x + (-y)`. This makes it easier to
                // simplify expressions by canceling opposite terms.
                let lhs = lhs.canonicalize();
                let rhs = rhs.canonicalize();
                Self::Add(lhs.into(), (-rhs).into()).canonicalize()
            }
            Self::Div(lhs, rhs) => {
                let lhs = lhs.canonicalize();
                let rhs = rhs.canonicalize();
                Self::Div(lhs.into(), rhs.into())
            }
        }
    }

    /// Simplify an expression.
    ///
    /// This folds constants, removes identities (eg. `x + 0` becomes `x`),
    /// cancels opposite terms in sums and common factors in divisions.
    pub fn simplify(&self) -> SymExpr {
        self.canonicalize().simplify_canonical()
    }

    /// Simplify an expression which is assumed to have been put in canonical
    /// form by [`canonicalize`](Self::canonicalize).
    fn simplify_canonical(self) -> SymExpr {
        match self {
            Self::Value(_) | Self::Var(_) => self,
            Self::Neg(expr) => match Arc::unwrap_or_clone(expr).simplify_canonical() {
                SymExpr::Value(x) => x
                    .checked_neg()
                    .map(SymExpr::Value)
                    .unwrap_or_else(|| -SymExpr::Value(x)),
                expr => Self::Neg(expr.into()),
            },
            Self::Add(lhs, rhs) => {
                let lhs = Arc::unwrap_or_clone(lhs).simplify_canonical();
                let rhs = Arc::unwrap_or_clone(rhs).simplify_canonical();

                match (lhs, rhs) {
                    (SymExpr::Value(0), rhs) => rhs,
                    (lhs, SymExpr::Value(0)) => lhs,
                    (SymExpr::Value(x), SymExpr::Value(y)) => fold_values(x, y, i64::checked_add)
                        .unwrap_or_else(|| SymExpr::Value(x) + SymExpr::Value(y)),
                    (lhs, SymExpr::Neg(rhs)) if lhs == *rhs => SymExpr::Value(0),
                    (lhs, rhs) => lhs + rhs,
                }
            }
            Self::Sub(lhs, rhs) => {
                let lhs = Arc::unwrap_or_clone(lhs).simplify_canonical();
                let rhs = Arc::unwrap_or_clone(rhs).simplify_canonical();

                match (lhs, rhs) {
                    (lhs, SymExpr::Value(0)) => lhs,
                    (SymExpr::Value(x), SymExpr::Value(y)) => fold_values(x, y, i64::checked_sub)
                        .unwrap_or_else(|| SymExpr::Value(x) - SymExpr::Value(y)),
                    (lhs, rhs) if lhs == rhs => SymExpr::Value(0),
                    (lhs, rhs) => lhs - rhs,
                }
            }
            Self::Mul(lhs, rhs) => {
                let lhs = Arc::unwrap_or_clone(lhs).simplify_canonical();
                let rhs = Arc::unwrap_or_clone(rhs).simplify_canonical();

                match (lhs, rhs) {
                    (SymExpr::Value(1), rhs) => rhs,
                    (lhs, SymExpr::Value(1)) => lhs,
                    (SymExpr::Value(0), _) | (_, SymExpr::Value(0)) => SymExpr::Value(0),
                    (SymExpr::Value(x), SymExpr::Value(y)) => fold_values(x, y, i64::checked_mul)
                        .unwrap_or_else(|| SymExpr::Value(x) * SymExpr::Value(y)),
                    (lhs, rhs) => lhs * rhs,
                }
            }
            Self::Div(lhs, rhs) => {
                let lhs = Arc::unwrap_or_clone(lhs).simplify_canonical();
                let rhs = Arc::unwrap_or_clone(rhs).simplify_canonical();
                let (lhs, rhs) = remove_common_factors(lhs, rhs);

                match (lhs, rhs) {
                    (lhs, SymExpr::Value(1)) => lhs,
                    (SymExpr::Value(x), SymExpr::Value(y)) => {
                        fold_values(x, y, i64::checked_div_euclid)
                            .unwrap_or_else(|| SymExpr::Value(x) / SymExpr::Value(y))
                    }
                    // x / b / c => x / (b * c)
                    (SymExpr::Div(lhs, c1), c2) => match (&*c1, c2) {
                        (SymExpr::Value(c1), SymExpr::Value(c2))
                            if *c1 > 0 && c2 > 0 && c1.checked_mul(c2).is_some() =>
                        {
                            (*lhs).clone() / SymExpr::Value(c1 * c2)
                        }
                        (c1, c2) => (*lhs).clone() / (c1.clone() * c2),
                    },
                    (lhs, rhs) => lhs / rhs,
                }
            }
        }
    }

    /// Return the precedence of the operator.
    ///
    /// This is used to add parentheses when formatting an expression tree.
    fn precedence(&self) -> u8 {
        match self {
            Self::Value(_) | Self::Var(_) => 4,
            Self::Div(..) => 3,
            Self::Mul(..) => 2,
            Self::Add(..) => 1,
            Self::Sub(..) | Self::Neg(_) => 0,
        }
    }

    /// Return the name of the symbol in a unary expression.
    ///
    /// Returns `None` if the expression is not unary or has a fixed value.
    fn name(&self) -> Option<&str> {
        match self {
            SymExpr::Var(sym) => Some(&sym.name),
            SymExpr::Neg(x) => x.name(),
            SymExpr::Value(_)
            | SymExpr::Add(..)
            | SymExpr::Sub(..)
            | SymExpr::Mul(..)
            | SymExpr::Div(..) => None,
        }
    }

    /// Return true if `self` and `other` are negations of each other, meaning
    /// that adding the two terms together will produce zero.
    fn is_negation_of(&self, other: &SymExpr) -> bool {
        match (self, other) {
            (x, SymExpr::Neg(y)) if *x == **y => true,
            (SymExpr::Neg(x), y) if **x == *y => true,
            _ => false,
        }
    }
}

/// Fold two constants, or return `None` if the result is not representable.
///
/// Expressions whose constants overflow are left unfolded.
fn fold_values(x: i64, y: i64, op: fn(i64, i64) -> Option<i64>) -> Option<SymExpr> {
    op(x, y).map(SymExpr::Value)
}

/// Sort terms in an order that makes simplification easier, by making terms
/// which can be combined or eliminated adjacent.
fn cmp_values_first(a: &SymExpr, b: &SymExpr) -> Ordering {
    match (a.is_value(), b.is_value()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => match (a.name(), b.name()) {
            (Some(a_name), Some(b_name)) => a_name.cmp(b_name),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        },
    }
}

/// Remove common factors from `lhs` and `rhs`.
fn remove_common_factors(lhs: SymExpr, rhs: SymExpr) -> (SymExpr, SymExpr) {
    fn collect_terms(terms: &mut Vec<SymExpr>, term: &SymExpr) {
        if let SymExpr::Mul(lhs, rhs) = term {
            collect_terms(terms, lhs);
            collect_terms(terms, rhs);
        } else {
            terms.push(term.clone());
        }
    }

    let mut lhs_terms = Vec::new();
    collect_terms(&mut lhs_terms, &lhs);

    let mut rhs_terms = Vec::new();
    collect_terms(&mut rhs_terms, &rhs);

    let mut i = 0;
    while i < lhs_terms.len() {
        let k = rhs_terms.iter().position(|t| lhs_terms[i] == *t);
        if let Some(k) = k {
            lhs_terms.remove(i);
            rhs_terms.remove(k);
        } else {
            i += 1;
        }
    }

    let lhs = lhs_terms
        .into_iter()
        .reduce(|prod, x| prod * x)
        .unwrap_or(SymExpr::Value(1));
    let rhs = rhs_terms
        .into_iter()
        .reduce(|prod, x| prod * x)
        .unwrap_or(SymExpr::Value(1));
    (lhs, rhs)
}

impl PartialEq<SymExpr> for SymExpr {
    fn eq(&self, other: &SymExpr) -> bool {
        let commutative_eq = |self_lhs, self_rhs, other_lhs, other_rhs| {
            (self_lhs == other_lhs && self_rhs == other_rhs)
                || (self_lhs == other_rhs && self_rhs == other_lhs)
        };

        match (self, other) {
            (Self::Value(x), Self::Value(y)) => x == y,
            (Self::Var(x), Self::Var(y)) => Arc::ptr_eq(x, y) || x.name == y.name,
            (Self::Neg(x), Self::Neg(y)) => x == y,
            (Self::Add(a, b), Self::Add(c, d)) | (Self::Mul(a, b), Self::Mul(c, d)) => {
                commutative_eq(a, b, c, d)
            }
            (Self::Sub(a, b), Self::Sub(c, d)) | (Self::Div(a, b), Self::Div(c, d)) => {
                a == c && b == d
            }
            _ => false,
        }
    }
}

impl Add<SymExpr> for SymExpr {
    type Output = SymExpr;

    fn add(self, rhs: SymExpr) -> Self {
        Self::Add(self.into(), rhs.into())
    }
}

impl Sub<SymExpr> for SymExpr {
    type Output = SymExpr;

    fn sub(self, rhs: SymExpr) -> Self {
        Self::Sub(self.into(), rhs.into())
    }
}

impl Mul<SymExpr> for SymExpr {
    type Output = SymExpr;

    fn mul(self, rhs: SymExpr) -> Self {
        Self::Mul(self.into(), rhs.into())
    }
}

impl Div<SymExpr> for SymExpr {
    type Output = SymExpr;

    fn div(self, rhs: SymExpr) -> Self {
        Self::Div(self.into(), rhs.into())
    }
}

impl Neg for SymExpr {
    type Output = SymExpr;

    fn neg(self) -> Self {
        Self::Neg(self.into())
    }
}

impl From<Symbol> for SymExpr {
    fn from(val: Symbol) -> Self {
        Self::Var(val.into())
    }
}

impl<'a> From<&'a str> for SymExpr {
    fn from(name: &'a str) -> Self {
        SymExpr::var(name)
    }
}

impl From<i64> for SymExpr {
    fn from(val: i64) -> Self {
        SymExpr::Value(val)
    }
}

impl From<i32> for SymExpr {
    fn from(val: i32) -> Self {
        SymExpr::Value(val as i64)
    }
}

/// Sizes which do not fit in an `i64` saturate to `i64::MAX`.
impl From<usize> for SymExpr {
    fn from(val: usize) -> Self {
        SymExpr::Value(i64::try_from(val).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let add_parens = |f: &mut fmt::Formatter<'_>, expr: &SymExpr| {
            if expr.precedence() < self.precedence() {
                write!(f, "({:?})", expr)
            } else {
                write!(f, "{:?}", expr)
            }
        };
        let write_binop = |f: &mut fmt::Formatter<'_>, op, lhs, rhs| {
            add_parens(f, lhs)?;
            write!(f, " {op} ")?;
            add_parens(f, rhs)
        };
        match self {
            Self::Value(val) => write!(f, "{}", val),
            Self::Var(sym) => write!(f, "\"{}\"", sym.name),
            // nb. No space between "-" and expression to make formatting
            // distinct from subtraction.
            Self::Neg(expr) => write!(f, "-{:?}", expr),
            Self::Add(lhs, rhs) => write_binop(f, '+', lhs, rhs),
            Self::Sub(lhs, rhs) => write_binop(f, '-', lhs, rhs),
            Self::Mul(lhs, rhs) => write_binop(f, '*', lhs, rhs),
            Self::Div(lhs, rhs) => write_binop(f, '/', lhs, rhs),
        }
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let add_parens = |f: &mut fmt::Formatter<'_>, expr: &SymExpr| {
            if expr.precedence() < self.precedence() {
                write!(f, "({})", expr)
            } else {
                write!(f, "{}", expr)
            }
        };
        let write_binop = |f: &mut fmt::Formatter<'_>, op, lhs, rhs| {
            add_parens(f, lhs)?;
            write!(f, " {op} ")?;
            add_parens(f, rhs)
        };
        match self {
            Self::Value(val) => write!(f, "{}", val),
            Self::Var(sym) => write!(f, "{}", sym.name),
            Self::Neg(expr) => write!(f, "-{}", expr),
            Self::Add(lhs, rhs) => write_binop(f, '+', lhs, rhs),
            Self::Sub(lhs, rhs) => write_binop(f, '-', lhs, rhs),
            Self::Mul(lhs, rhs) => write_binop(f, '*', lhs, rhs),
            Self::Div(lhs, rhs) => write_binop(f, '/', lhs, rhs),
        }
    }
}

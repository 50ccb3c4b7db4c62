//! Proving equality of symbolic dimension sizes.

use crate::sym_expr::SymExpr;

/// Oracle which decides whether two dimension sizes are equal.
///
/// Returns `Some(true)` if the sizes are provably equal, `Some(false)` if they
/// are provably different and `None` if neither can be proven.
pub trait ProveEqual {
    fn prove_equal(&self, lhs: &SymExpr, rhs: &SymExpr) -> Option<bool>;
}

/// Prover which works by simplifying expressions and comparing their
/// structure.
///
/// Two expressions are equal if they simplify to the same expression. They
/// are different if their difference simplifies to a non-zero constant, as
/// is the case for linear offsets such as `n` and `n + 2`.
#[derive(Copy, Clone, Debug, Default)]
pub struct StructuralProver;

impl ProveEqual for StructuralProver {
    fn prove_equal(&self, lhs: &SymExpr, rhs: &SymExpr) -> Option<bool> {
        if let (Some(lhs), Some(rhs)) = (lhs.as_value(), rhs.as_value()) {
            return Some(lhs == rhs);
        }
        if lhs == rhs || lhs.simplify() == rhs.simplify() {
            return Some(true);
        }
        match (lhs.clone() - rhs.clone()).simplify() {
            SymExpr::Value(diff) => Some(diff == 0),
            _ => None,
        }
    }
}

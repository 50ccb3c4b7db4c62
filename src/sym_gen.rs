//! Symbol and shape variable generator.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::shape::ShapeVar;
use crate::sym_expr::{SymExpr, Symbol};

/// Creates named symbols and shape variables.
///
/// Symbols requested by name are interned, so every use of a name within a
/// generator refers to the same symbol. Shape variables are always fresh: two
/// shape variables created with the same name are distinct.
#[derive(Default)]
pub struct SymbolGen {
    symbols: FxHashMap<String, Arc<Symbol>>,
    shape_vars: Vec<ShapeVar>,
}

impl SymbolGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the symbol with a given name, creating it if needed.
    pub fn var(&mut self, name: &str) -> SymExpr {
        let sym = self
            .symbols
            .entry(name.to_string())
            .or_insert_with(|| {
                Symbol {
                    name: name.to_string(),
                }
                .into()
            })
            .clone();
        SymExpr::Var(sym)
    }

    /// Create a new shape variable.
    ///
    /// `ndim` is the rank of shapes the variable stands for, if known.
    pub fn shape_var(&mut self, name: &str, ndim: Option<usize>) -> ShapeVar {
        let var = ShapeVar::new(self.shape_vars.len() as u32, name, ndim);
        self.shape_vars.push(var.clone());
        var
    }

    /// Return the shape variables created so far, in creation order.
    pub fn shape_vars(&self) -> &[ShapeVar] {
        &self.shape_vars
    }
}

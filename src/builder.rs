//! A graph of operator calls whose results are inferred lazily.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::iter_util::MaybeParIter;
use crate::normalize::{NormalizeError, NormalizeOptions, normalize_op, structural_equal};
use crate::ops::{ConstructError, Op};
use crate::prove::{ProveEqual, StructuralProver};
use crate::shape::ShapeVar;
use crate::struct_info::StructInfo;
use crate::sym_expr::SymExpr;
use crate::sym_gen::SymbolGen;

/// ID of a node in a [`Builder`].
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    /// Return the underlying u32 value of the ID.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Return the underlying ID value as a usize, for slice indexing.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// A node in a [`Builder`].
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A value with declared struct info, such as a function parameter.
    Var { name: String, struct_info: StructInfo },

    /// A call to an operator. Operands refer to earlier nodes.
    Call { op: Op, args: Vec<NodeId> },
}

/// Builds a graph of operator calls and infers the struct info of their
/// results.
///
/// Calls are checked for operand counts and literal parameters when they are
/// added. Their results are only inferred when normalized, at which point any
/// failure is reported. Normalized results, including failures, are cached,
/// so checks for each node run once.
///
/// ```
/// use struct_info::ops::BinaryOp;
/// use struct_info::{Builder, DataType, Shape, TensorStructInfo};
///
/// let mut builder = Builder::new();
/// let n = builder.sym("n");
/// let x = builder.add_var(
///     "x",
///     TensorStructInfo::new(
///         Shape::from_dims(vec![n.clone(), 3.into()]),
///         Some(DataType::Float32),
///     )
///     .into(),
/// );
/// let y = builder.add_var(
///     "y",
///     TensorStructInfo::new(Shape::from_fixed_shape(&[3]), Some(DataType::Float32)).into(),
/// );
/// let sum = builder.add_call(BinaryOp::Add, &[x, y]).unwrap();
///
/// let result = builder.normalize(sum).unwrap();
/// assert_eq!(result.to_string(), "Tensor((n, 3), \"float32\")");
///
/// // Operand counts are checked immediately.
/// assert!(builder.add_call(BinaryOp::Add, &[x]).is_err());
/// ```
pub struct Builder {
    nodes: Vec<Node>,
    symbols: SymbolGen,
    normalized: FxHashMap<NodeId, Result<StructInfo, NormalizeError>>,
    prover: Arc<dyn ProveEqual + Send + Sync>,
    options: NormalizeOptions,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Create an empty builder which uses [`StructuralProver`] and default
    /// options.
    pub fn new() -> Self {
        Self::with_options(NormalizeOptions::default())
    }

    pub fn with_options(options: NormalizeOptions) -> Self {
        Builder {
            nodes: Vec::new(),
            symbols: SymbolGen::new(),
            normalized: FxHashMap::default(),
            prover: Arc::new(StructuralProver),
            options,
        }
    }

    /// Replace the prover used to decide equality of dimension sizes.
    pub fn with_prover<P: ProveEqual + Send + Sync + 'static>(mut self, prover: P) -> Self {
        self.prover = Arc::new(prover);
        self
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Return the symbol with a given name, creating it if needed.
    pub fn sym(&mut self, name: &str) -> SymExpr {
        self.symbols.var(name)
    }

    /// Create a new shape variable.
    pub fn shape_var(&mut self, name: &str, ndim: Option<usize>) -> ShapeVar {
        self.symbols.shape_var(name, ndim)
    }

    pub fn symbols(&self) -> &SymbolGen {
        &self.symbols
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Add a value with declared struct info.
    pub fn add_var(&mut self, name: &str, struct_info: StructInfo) -> NodeId {
        self.push_node(Node::Var {
            name: name.to_string(),
            struct_info,
        })
    }

    /// Add a call to an operator.
    ///
    /// Returns an error if the operand count or the operator's literal
    /// parameters are invalid, or if an operand is not an existing node.
    pub fn add_call(
        &mut self,
        op: impl Into<Op>,
        args: &[NodeId],
    ) -> Result<NodeId, ConstructError> {
        let op = op.into();
        op.validate(args.len())?;
        if let Some(index) = args.iter().position(|id| id.as_usize() >= self.nodes.len()) {
            return Err(ConstructError::InvalidArg { index });
        }
        Ok(self.push_node(Node::Call {
            op,
            args: args.to_vec(),
        }))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return the struct info of a node, if known.
    ///
    /// This is the declared struct info for variables, and the normalized
    /// result for calls which have been successfully normalized.
    pub fn struct_info(&self, id: NodeId) -> Option<&StructInfo> {
        match self.node(id)? {
            Node::Var { struct_info, .. } => Some(struct_info),
            Node::Call { .. } => self.normalized.get(&id)?.as_ref().ok(),
        }
    }

    /// Return the IDs of nodes which must be normalized to produce results
    /// for `ids`, in ascending order.
    fn pending_nodes(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut visited = FxHashSet::default();
        let mut stack: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| id.as_usize() < self.nodes.len())
            .collect();
        let mut pending = Vec::new();

        while let Some(id) = stack.pop() {
            if self.normalized.contains_key(&id) || !visited.insert(id) {
                continue;
            }
            pending.push(id);
            if let Some(Node::Call { args, .. }) = self.node(id) {
                stack.extend(args.iter().copied());
            }
        }

        // Operands always precede their users.
        pending.sort_unstable();
        pending
    }

    /// Normalize a node whose operands have all been normalized.
    fn normalize_node(&self, id: NodeId) -> Result<StructInfo, NormalizeError> {
        let Some(node) = self.node(id) else {
            return Err(NormalizeError::invalid_node_id());
        };
        match node {
            Node::Var { struct_info, .. } => Ok(struct_info.clone()),
            Node::Call { op, args } => {
                let mut inputs = Vec::with_capacity(args.len());
                for arg in args {
                    match self.normalized.get(arg) {
                        Some(Ok(struct_info)) => inputs.push(struct_info.clone()),
                        // Failures propagate to the users of a node.
                        Some(Err(err)) => return Err(err.clone()),
                        None => return Err(NormalizeError::invalid_node_id()),
                    }
                }
                normalize_op(op, &inputs, self.prover.as_ref(), &self.options)
            }
        }
    }

    fn cached_result(&self, id: NodeId) -> Result<StructInfo, NormalizeError> {
        self.normalized
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Err(NormalizeError::invalid_node_id()))
    }

    /// Return the normalized struct info of a node.
    ///
    /// This infers the results of the node and any operands which have not
    /// yet been normalized, and evaluates their deferred checks.
    pub fn normalize(&mut self, id: NodeId) -> Result<StructInfo, NormalizeError> {
        for node_id in self.pending_nodes(&[id]) {
            let result = self.normalize_node(node_id);
            self.normalized.insert(node_id, result);
        }
        self.cached_result(id)
    }

    /// Normalize several nodes.
    ///
    /// Nodes are processed in levels, where a node's level is one more than
    /// the deepest of its pending operands. Nodes within a level are
    /// independent and are inferred in parallel if
    /// [`NormalizeOptions::parallel`] is set.
    pub fn normalize_all(&mut self, ids: &[NodeId]) -> Vec<Result<StructInfo, NormalizeError>> {
        let mut node_levels: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut levels: Vec<Vec<NodeId>> = Vec::new();

        for id in self.pending_nodes(ids) {
            let level = match self.node(id) {
                Some(Node::Call { args, .. }) => args
                    .iter()
                    .filter_map(|arg| node_levels.get(arg).map(|level| level + 1))
                    .max()
                    .unwrap_or(0),
                _ => 0,
            };
            node_levels.insert(id, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
        }

        for level in levels {
            let results = level
                .maybe_par_iter(self.options.parallel)
                .map_collect(|id| (id, self.normalize_node(id)));
            self.normalized.extend(results);
        }

        ids.iter().map(|&id| self.cached_result(id)).collect()
    }

    /// Return true if two struct infos are structurally equal, using this
    /// builder's prover to compare dimension sizes.
    pub fn structural_equal(&self, lhs: &StructInfo, rhs: &StructInfo) -> bool {
        structural_equal(lhs, rhs, self.prover.as_ref())
    }
}

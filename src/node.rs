//! Reverse-mode differentiation on an explicitly built computational graph.
//!
//! Nodes are reference counted, so the same operand can feed any number of consumers and the
//! graph is a DAG rather than a tree. A pass has two halves:
//!
//! 1. [`Node::forward`] evaluates the graph from the leaves up and caches, in every operator
//!    node, the values of its operands.
//! 2. [`Node::seed_and_backward`] seeds the root gradient and calls [`Node::backward`] on every
//!    node in reverse topological order. Each step adds `local partial * own gradient` into the
//!    operands, so a node with several consumers ends up with the sum of their contributions.
//!
//! Gradients are never cleared implicitly. Call [`Node::zero_grad`] between passes, or use
//! [`Node::backprop`] which does all of the above.

use std::{
    cell::Cell,
    collections::{HashMap, HashSet},
    io::Write,
    ops::{Add, Mul, Sub},
    rc::Rc,
};

use log::{debug, trace};

use crate::{
    binary_fn::{BinaryFn, BinaryOp},
    error::{DomainError, StateError},
    unary_fn::{UnaryFn, UnaryOp},
};

#[derive(Debug)]
enum NodeKind {
    Constant(Cell<f64>),
    Binary {
        op: BinaryOp,
        lhs: Node,
        rhs: Node,
        cache: Cell<Option<(f64, f64)>>,
    },
    Unary {
        op: UnaryOp,
        operand: Node,
        cache: Cell<Option<f64>>,
    },
}

#[derive(Debug)]
struct NodePayload {
    name: String,
    kind: NodeKind,
    data: Cell<Option<f64>>,
    grad: Cell<f64>,
    /// Set once this node has pushed its gradient down to its operands.
    done: Cell<bool>,
}

impl NodePayload {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            data: Cell::new(None),
            grad: Cell::new(0.),
            done: Cell::new(false),
        }
    }

    fn take_operands(&mut self) -> Vec<Node> {
        match std::mem::replace(&mut self.kind, NodeKind::Constant(Cell::new(0.))) {
            NodeKind::Constant(_) => vec![],
            NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::Unary { operand, .. } => vec![operand],
        }
    }
}

impl Drop for NodePayload {
    /// Unlinks the operands with an explicit stack, so deep graphs drop without recursion.
    fn drop(&mut self) {
        let mut stack = self.take_operands();
        while let Some(node) = stack.pop() {
            // Only the last handle owns the payload; shared operands stay alive.
            if let Ok(mut payload) = Rc::try_unwrap(node.0) {
                stack.extend(payload.take_operands());
            }
        }
    }
}

/// A shared handle to a node of the computational graph.
///
/// Cloning the handle does not clone the node; both handles refer to the same value and
/// gradient.
#[derive(Clone, Debug)]
pub struct Node(Rc<NodePayload>);

impl Node {
    /// A named leaf. Leaves are constants of the graph: backpropagation stops at them, and the
    /// gradient they collect is the partial derivative with respect to them.
    pub fn new(name: impl Into<String>, value: f64) -> Node {
        Self(Rc::new(NodePayload::new(
            name.into(),
            NodeKind::Constant(Cell::new(value)),
        )))
    }

    pub fn constant(value: f64) -> Node {
        Self::new(value.to_string(), value)
    }

    pub fn binary(op: BinaryOp, lhs: &Node, rhs: &Node) -> Node {
        let name = if cfg!(feature = "expr_name") {
            format!("({} {} {})", lhs.name(), op.symbol(), rhs.name())
        } else {
            op.name().to_string()
        };
        Self(Rc::new(NodePayload::new(
            name,
            NodeKind::Binary {
                op,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                cache: Cell::new(None),
            },
        )))
    }

    pub fn unary(op: UnaryOp, operand: &Node) -> Node {
        let name = if cfg!(feature = "expr_name") {
            format!("{}({})", op.name(), operand.name())
        } else {
            op.name().to_string()
        };
        Self(Rc::new(NodePayload::new(
            name,
            NodeKind::Unary {
                op,
                operand: operand.clone(),
                cache: Cell::new(None),
            },
        )))
    }

    pub fn ln(&self) -> Node {
        Self::unary(UnaryOp::Ln, self)
    }

    pub fn sin(&self) -> Node {
        Self::unary(UnaryOp::Sin, self)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The value computed by the last forward pass, if any.
    pub fn data(&self) -> Option<f64> {
        self.0.data.get()
    }

    /// The gradient accumulated so far.
    pub fn grad(&self) -> f64 {
        self.0.grad.get()
    }

    /// Overwrites this node's gradient. Use it to seed the root when driving
    /// [`Node::backward`] by hand.
    pub fn seed(&self, grad: f64) {
        self.0.grad.set(grad);
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.kind, NodeKind::Constant(_))
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn operands(&self) -> Vec<&Node> {
        match &self.0.kind {
            NodeKind::Constant(_) => vec![],
            NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::Unary { operand, .. } => vec![operand],
        }
    }

    /// Replaces the value of a leaf, so the graph can be evaluated at another point.
    /// The caches of the consumers are stale until the next [`Node::forward`].
    pub fn set(&self, value: f64) -> Result<(), StateError> {
        if let NodeKind::Constant(ref rv) = self.0.kind {
            rv.set(value);
            Ok(())
        } else {
            Err(StateError::NotALeaf)
        }
    }

    /// Every node reachable from `self`, each exactly once, operands before their consumers.
    /// `self` is always the last element.
    ///
    /// The traversal is an explicit-stack post-order DFS visiting the left operand first, so
    /// the order is deterministic and deep graphs do not overflow the call stack.
    pub fn topological_order(&self) -> Vec<Node> {
        let mut order = vec![];
        let mut visited = HashSet::new();
        let mut stack = vec![(self.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            stack.push((node.clone(), true));
            for operand in node.operands().into_iter().rev() {
                if !visited.contains(&operand.id()) {
                    stack.push((operand.clone(), false));
                }
            }
        }
        order
    }

    fn value(&self) -> f64 {
        // Operands precede consumers in the evaluation order, so this is only NaN when the
        // node was never evaluated.
        self.0.data.get().unwrap_or(f64::NAN)
    }

    fn eval_local(&self, checked: bool) -> Result<f64, DomainError> {
        let value = match &self.0.kind {
            NodeKind::Constant(val) => val.get(),
            NodeKind::Binary { op, lhs, rhs, cache } => {
                let (l, r) = (lhs.value(), rhs.value());
                cache.set(Some((l, r)));
                op.f(l, r)
            }
            NodeKind::Unary { op, operand, cache } => {
                let x = operand.value();
                if checked {
                    op.check(x)?;
                }
                cache.set(Some(x));
                op.f(x)
            }
        };
        trace!("forward {}: {}", self.0.name, value);
        self.0.data.set(Some(value));
        Ok(value)
    }

    fn run_forward(&self, checked: bool) -> Result<f64, DomainError> {
        let order = self.topological_order();
        debug!("forward pass over {} nodes", order.len());
        let mut value = f64::NAN;
        for node in &order {
            value = node.eval_local(checked)?;
        }
        Ok(value)
    }

    /// Evaluates the graph and refreshes every cached value. It does not touch gradients.
    ///
    /// `ln` of a non-positive value evaluates to NaN, which then flows to the root.
    pub fn forward(&self) -> f64 {
        self.run_forward(false).unwrap_or(f64::NAN)
    }

    /// Like [`Node::forward`], but stops at the first domain error. Nodes evaluated before
    /// the failing one keep their refreshed caches.
    pub fn try_forward(&self) -> Result<f64, DomainError> {
        self.run_forward(true)
    }

    fn is_evaluated(&self) -> bool {
        match &self.0.kind {
            NodeKind::Constant(_) => true,
            NodeKind::Binary { cache, .. } => cache.get().is_some(),
            NodeKind::Unary { cache, .. } => cache.get().is_some(),
        }
    }

    fn not_evaluated(&self) -> StateError {
        StateError::NotEvaluated {
            node: self.0.name.clone(),
        }
    }

    fn accumulate(&self, grad: f64) -> Result<(), StateError> {
        if self.0.done.get() {
            return Err(StateError::OutOfOrder {
                node: self.0.name.clone(),
            });
        }
        self.0.grad.set(self.0.grad.get() + grad);
        Ok(())
    }

    /// One local step of backpropagation: adds this node's contribution into its operands.
    ///
    /// Every consumer of this node must already have run its own `backward`, and the caches
    /// must come from the latest [`Node::forward`]. On a leaf this only marks the node as done.
    pub fn backward(&self) -> Result<(), StateError> {
        let grad = self.0.grad.get();
        match &self.0.kind {
            NodeKind::Constant(_) => (),
            NodeKind::Binary { op, lhs, rhs, cache } => {
                let (l, r) = cache.get().ok_or_else(|| self.not_evaluated())?;
                let (dlhs, drhs) = op.grad(l, r);
                lhs.accumulate(dlhs * grad)?;
                rhs.accumulate(drhs * grad)?;
            }
            NodeKind::Unary { op, operand, cache } => {
                let x = cache.get().ok_or_else(|| self.not_evaluated())?;
                operand.accumulate(op.grad(x) * grad)?;
            }
        }
        trace!("backward {}: grad {}", self.0.name, grad);
        self.0.done.set(true);
        Ok(())
    }

    /// Seeds this node, the root, with `seed` and runs [`Node::backward`] over `order` in
    /// reverse.
    ///
    /// `order` must list operands before their consumers and end with the root; the
    /// [`Node::topological_order`] of the root always qualifies. The graph must hold no
    /// gradient from an earlier pass, and [`Node::forward`] must have run. Nothing is modified
    /// when either condition fails.
    pub fn seed_and_backward(&self, order: &[Node], seed: f64) -> Result<(), StateError> {
        if !order.last().is_some_and(|last| last.ptr_eq(self)) {
            return Err(StateError::RootNotLast);
        }
        let mut position = HashMap::new();
        for (i, node) in order.iter().enumerate() {
            if node.grad() != 0. || node.0.done.get() {
                return Err(StateError::StaleGradient {
                    node: node.0.name.clone(),
                });
            }
            if !node.is_evaluated() {
                return Err(node.not_evaluated());
            }
            if position.insert(node.id(), i).is_some() {
                return Err(StateError::OutOfOrder {
                    node: node.0.name.clone(),
                });
            }
        }
        for (i, node) in order.iter().enumerate() {
            for operand in node.operands() {
                match position.get(&operand.id()) {
                    None => {
                        return Err(StateError::MissingOperand {
                            node: operand.0.name.clone(),
                        })
                    }
                    Some(&j) if j >= i => {
                        return Err(StateError::OutOfOrder {
                            node: operand.0.name.clone(),
                        })
                    }
                    _ => (),
                }
            }
        }
        debug!("backward pass over {} nodes, seed {}", order.len(), seed);
        self.seed(seed);
        for node in order.iter().rev() {
            node.backward()?;
        }
        Ok(())
    }

    /// Resets the gradient of every node reachable from `self`.
    pub fn zero_grad(&self) {
        for node in self.topological_order() {
            node.0.grad.set(0.);
            node.0.done.set(false);
        }
    }

    /// The entry point to backpropagation. Clears old gradients, then seeds this node with 1
    /// and propagates in the graph's own topological order. [`Node::forward`] must have run.
    pub fn backprop(&self) -> Result<(), StateError> {
        self.zero_grad();
        let order = self.topological_order();
        self.seed_and_backward(&order, 1.)
    }

    /// Write graphviz dot file to the given writer.
    pub fn dot(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let order = self.topological_order();
        let index: HashMap<usize, usize> = order
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id(), i))
            .collect();
        writeln!(writer, "digraph G {{\nrankdir=\"LR\";")?;
        for (i, node) in order.iter().enumerate() {
            let data = node
                .data()
                .map_or_else(|| "-".to_string(), |data| data.to_string());
            let shape = if node.is_leaf() { "box" } else { "ellipse" };
            writeln!(
                writer,
                "a{} [label=\"{} \\ndata:{}, grad:{}\", shape={}];",
                i,
                node.name(),
                data,
                node.grad(),
                shape
            )?;
        }
        for (i, node) in order.iter().enumerate() {
            for operand in node.operands() {
                writeln!(writer, "a{} -> a{};", index[&operand.id()], i)?;
            }
        }
        writeln!(writer, "}}")?;
        Ok(())
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for &Node {
            type Output = Node;
            fn $method(self, rhs: Self) -> Self::Output {
                Node::binary($op, self, rhs)
            }
        }

        impl $trait<f64> for &Node {
            type Output = Node;
            fn $method(self, rhs: f64) -> Self::Output {
                Node::binary($op, self, &Node::constant(rhs))
            }
        }

        impl $trait<&Node> for f64 {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Self::Output {
                Node::binary($op, &Node::constant(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);

pub fn ln(operand: &Node) -> Node {
    operand.ln()
}

pub fn sin(operand: &Node) -> Node {
    operand.sin()
}

#[test]
fn test_topological_order() {
    let a = Node::new("a", 1.);
    let b = Node::new("b", 3.);
    let ab = &a * &b;
    let aab = &a + &ab;
    let order = aab.topological_order();
    assert_eq!(order.len(), 4);
    for (node, expected) in order.iter().zip([&a, &b, &ab, &aab]) {
        assert!(node.ptr_eq(expected));
    }
}

#[test]
fn test_deep_graph() {
    let x = Node::new("x", 1.);
    let mut y = x.clone();
    for _ in 0..200_000 {
        y = &y + 1f64;
    }
    assert_eq!(y.forward(), 200_001.);
    y.backprop().unwrap();
    assert_eq!(x.grad(), 1.);
    drop(y);
    assert_eq!(x.grad(), 1.);
}

#[test]
fn test_not_evaluated() {
    let a = Node::new("a", 2.);
    let z = &a.sin() * 2f64;
    assert!(matches!(z.backprop(), Err(StateError::NotEvaluated { .. })));
    assert_eq!(z.grad(), 0.);
}

#[test]
fn test_set() {
    let a = Node::new("a", 2.);
    let z = &a * &a;
    assert_eq!(z.forward(), 4.);
    a.set(3.).unwrap();
    assert_eq!(z.forward(), 9.);
    assert_eq!(z.set(1.), Err(StateError::NotALeaf));
}

#[test]
fn test_dot() {
    let a = Node::new("a", 2.);
    let b = Node::new("b", 3.);
    let z = &a * &b;
    z.forward();
    z.backprop().unwrap();
    let mut buf = vec![];
    z.dot(&mut buf).unwrap();
    let dot = String::from_utf8(buf).unwrap();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("a0 [label=\"a \\ndata:2, grad:3\", shape=box];"));
    assert!(dot.contains("a0 -> a2;"));
    assert!(dot.contains("a1 -> a2;"));
}

//! Lazy reactive property graph.
//!
//! A [`Prop`] is a shared handle to one node. Nodes are pull-evaluated and
//! cached: a read of a clean node returns the cached value, a read of a dirty
//! node recomputes it (pulling its operands) and marks it clean. Writes only
//! flag: [`Prop::set`] and [`Prop::set_formula`] mark the node dirty and
//! notify subscribers depth first, each clean subscriber turning dirty and
//! passing the notification on. Nothing is recomputed until somebody reads.
//!
//! Dependents are referenced weakly. A calculation owns its operands, so a
//! formula tree lives exactly as long as the expression holding it, and
//! subscriptions are released when the [`Subscription`] handle drops.

mod node;
mod subscription;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dispatch::Operation;
use crate::errors::{FormulaError, PropError};
use crate::scope::Scope;
use crate::value::Value;

use node::{Calculation, Constant, Evaluate, Expression, NodeKind, Variable};
use subscription::Listener;
pub use subscription::Subscription;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct PropCell {
    id: u64,
    node: NodeKind,
    cache: RefCell<Option<Value>>,
    dirty: Cell<bool>,
    evaluating: Cell<bool>,
    evaluations: Cell<u64>,
    subscribers: subscription::SubscriberList,
}

impl PropCell {
    fn new(node: NodeKind, cache: Option<Value>) -> Self {
        PropCell {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            node,
            dirty: Cell::new(cache.is_none()),
            cache: RefCell::new(cache),
            evaluating: Cell::new(false),
            evaluations: Cell::new(0),
            subscribers: Default::default(),
        }
    }

    /// Tell subscribers depth first; a dependent that was already dirty
    /// stops the walk along its branch.
    fn notify(&self) {
        let mut pending: Vec<Listener> = self.subscribers.snapshot();
        pending.reverse();
        while let Some(listener) = pending.pop() {
            match listener {
                Listener::Node(weak) => {
                    let Some(dependent) = weak.upgrade() else {
                        continue;
                    };
                    if !dependent.dirty.replace(true) {
                        pending.extend(dependent.subscribers.snapshot().into_iter().rev());
                    }
                }
                Listener::Callback(callback) => callback(),
            }
        }
    }
}

/// Shared handle to a node in the property graph
#[derive(Clone)]
pub struct Prop {
    cell: Rc<PropCell>,
}

impl Prop {
    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// A node whose value never changes
    pub fn constant(value: impl Into<Value>) -> Prop {
        let value = value.into();
        Prop {
            cell: Rc::new(PropCell::new(
                Constant {
                    value: value.clone(),
                }
                .into(),
                Some(value),
            )),
        }
    }

    /// A node set directly by the application
    pub fn variable(value: impl Into<Value>) -> Prop {
        let value = value.into();
        Prop {
            cell: Rc::new(PropCell::new(
                Variable {
                    value: RefCell::new(value.clone()),
                }
                .into(),
                Some(value),
            )),
        }
    }

    /// A formula-defined node resolving identifiers in `scope`.
    ///
    /// Parsing is deferred to the first read. The scope is held weakly so a
    /// record may own expressions that refer back into it.
    pub fn expression<S: Scope + 'static>(formula: impl Into<String>, scope: &Rc<S>) -> Prop {
        let weak: Weak<dyn Scope> = Rc::downgrade(scope) as Weak<dyn Scope>;
        Prop::expression_in(formula, weak)
    }

    /// Like [`Prop::expression`], for callers already holding a weak scope
    pub fn expression_in(formula: impl Into<String>, scope: Weak<dyn Scope>) -> Prop {
        Prop {
            cell: Rc::new(PropCell::new(
                Expression::new(formula.into(), scope).into(),
                None,
            )),
        }
    }

    /// An operation over `operands`, subscribed to each of them
    pub(crate) fn calculation(operation: Operation, operands: Vec<Prop>, offset: usize) -> Prop {
        let cell = Rc::new_cyclic(|weak: &Weak<PropCell>| {
            let subscriptions = operands
                .iter()
                .map(|operand| Subscription::new(&operand.cell, Listener::Node(weak.clone())))
                .collect();
            PropCell::new(
                Calculation {
                    operation,
                    operands,
                    offset,
                    _subscriptions: subscriptions,
                }
                .into(),
                None,
            )
        });
        Prop { cell }
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Current value, recomputing if dirty.
    ///
    /// Failed evaluations are not cached: the node stays dirty and the next
    /// read tries again.
    pub fn value(&self) -> Result<Value, FormulaError> {
        if let Some(value) = self.cached() {
            return Ok(value);
        }
        if self.cell.evaluating.get() {
            crate::log::debug!(id = self.cell.id, "cycle detected during evaluation");
            return Err(FormulaError::eval(0, "cyclic reference"));
        }
        self.settle_dependencies();
        self.evaluate()
    }

    fn cached(&self) -> Option<Value> {
        if self.cell.dirty.get() {
            return None;
        }
        self.cell.cache.borrow().clone()
    }

    /// Recompute dirty dependencies deepest first, so the pull in
    /// [`Prop::evaluate`] finds its operands clean instead of recursing down
    /// a long chain.
    ///
    /// The node counts as evaluating meanwhile: a dependency that reads it
    /// back is part of a cycle.
    fn settle_dependencies(&self) {
        let cell = &self.cell;
        cell.evaluating.set(true);

        let mut order = Vec::new();
        let mut seen = HashSet::from([cell.id]);
        let mut stack: Vec<(Prop, bool)> = self
            .settle_inputs()
            .into_iter()
            .map(|input| (input, false))
            .collect();
        while let Some((prop, expanded)) = stack.pop() {
            if expanded {
                order.push(prop);
                continue;
            }
            let node = &prop.cell;
            if !node.dirty.get() || node.evaluating.get() || !seen.insert(node.id) {
                continue;
            }
            let inputs = prop.settle_inputs();
            stack.push((prop, true));
            stack.extend(inputs.into_iter().map(|input| (input, false)));
        }

        for prop in order {
            if prop.cell.dirty.get() && prop.evaluate().is_err() {
                // The pull reports it again, with the reader's formula attached.
                break;
            }
        }
        cell.evaluating.set(false);
    }

    /// What a node reads: its operands, or for an expression awaiting a
    /// re-parse, the names its new formula refers to.
    fn settle_inputs(&self) -> Vec<Prop> {
        match &self.cell.node {
            NodeKind::Expression(expression) if expression.state.borrow().needs_reparse => {
                expression.referenced()
            }
            node => node.dependencies(),
        }
    }

    fn evaluate(&self) -> Result<Value, FormulaError> {
        let cell = &self.cell;
        if cell.evaluating.get() {
            crate::log::debug!(id = cell.id, "cycle detected during evaluation");
            return Err(FormulaError::eval(0, "cyclic reference"));
        }

        cell.evaluating.set(true);
        let result = cell.node.compute(self);
        cell.evaluating.set(false);
        cell.evaluations.set(cell.evaluations.get() + 1);

        crate::log::trace!(id = cell.id, kind = cell.node.label(), ok = result.is_ok(), "evaluated");
        if let Ok(value) = &result {
            *cell.cache.borrow_mut() = Some(value.clone());
            cell.dirty.set(false);
        }
        result
    }

    pub fn is_dirty(&self) -> bool {
        self.cell.dirty.get()
    }

    /// How many times this node has computed a value
    pub fn evaluations(&self) -> u64 {
        self.cell.evaluations.get()
    }

    /// Process-unique node id
    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// `"constant"`, `"variable"`, `"expression"` or `"calculation"`
    pub fn node_kind(&self) -> &'static str {
        self.cell.node.label()
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.cell.node, NodeKind::Variable(_))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.cell.node, NodeKind::Expression(_))
    }

    pub fn ptr_eq(&self, other: &Prop) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Whether reading this node may read `target` (or is `target`)
    pub fn depends_on(&self, target: &Prop) -> bool {
        self.reaches(target, &HashMap::new())
    }

    /// Like [`depends_on`](Self::depends_on), reading the expressions keyed
    /// in `replaced` through the given trees instead of their installed ones.
    fn reaches(&self, target: &Prop, replaced: &HashMap<u64, Prop>) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];
        while let Some(prop) = stack.pop() {
            if prop.ptr_eq(target) {
                return true;
            }
            if !seen.insert(prop.id()) {
                continue;
            }
            match replaced.get(&prop.id()) {
                Some(tree) => stack.push(tree.clone()),
                None => stack.extend(prop.cell.node.dependencies()),
            }
        }
        false
    }

    /// Nodes this one reads from directly
    pub fn dependencies(&self) -> Vec<Prop> {
        self.cell.node.dependencies()
    }

    /// Live observers: dependent nodes plus callbacks
    pub fn subscriber_count(&self) -> usize {
        self.cell.subscribers.len()
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Replace a variable's value, notifying only when it differs.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), PropError> {
        let NodeKind::Variable(variable) = &self.cell.node else {
            return Err(PropError::NotAVariable);
        };
        if variable.replace(value.into()) {
            self.touch();
        }
        Ok(())
    }

    /// Formula text of an expression; `None` for other node kinds
    pub fn formula(&self) -> Option<String> {
        match &self.cell.node {
            NodeKind::Expression(expression) => Some(expression.state.borrow().formula.clone()),
            _ => None,
        }
    }

    /// Replace an expression's formula.
    ///
    /// The text is parsed on the next read; if it is rejected there, the read
    /// returns the error and the previous formula stays installed.
    pub fn set_formula(&self, formula: impl Into<String>) -> Result<(), PropError> {
        let NodeKind::Expression(expression) = &self.cell.node else {
            return Err(PropError::NotAnExpression);
        };
        let formula = formula.into();
        {
            let mut state = expression.state.borrow_mut();
            if state.formula == formula {
                return Ok(());
            }
            state.formula = formula;
            state.needs_reparse = true;
        }
        self.touch();
        Ok(())
    }

    /// Validate `formula` against this expression's scope without installing it.
    pub fn check_formula(&self, formula: &str) -> Result<(), PropError> {
        let NodeKind::Expression(expression) = &self.cell.node else {
            return Err(PropError::NotAnExpression);
        };
        expression.build(self, formula)?;
        Ok(())
    }

    /// Validate formula edits meant to land together.
    ///
    /// Every formula must parse in its expression's scope, and the graph
    /// with all edits in place must be acyclic. Later edits to the same
    /// expression win, as they would when installed in order.
    pub fn check_formulas(edits: &[(Prop, String)]) -> Result<(), PropError> {
        let mut trees = HashMap::new();
        for (prop, formula) in edits {
            let NodeKind::Expression(expression) = &prop.cell.node else {
                return Err(PropError::NotAnExpression);
            };
            trees.insert(prop.id(), expression.parse_tree(formula)?);
        }
        for (prop, formula) in edits {
            let Some(tree) = trees.get(&prop.id()) else {
                continue;
            };
            if tree.reaches(prop, &trees) {
                crate::log::debug!(%formula, "edits form a cycle");
                return Err(FormulaError::eval(0, "cyclic reference")
                    .with_formula(formula)
                    .into());
            }
        }
        Ok(())
    }

    fn touch(&self) {
        self.cell.dirty.set(true);
        self.cell.notify();
    }

    // ------------------------------------------------------------------------
    // Observing
    // ------------------------------------------------------------------------

    /// Call `callback` whenever this node turns dirty.
    ///
    /// The callback runs synchronously inside the mutation that caused it and
    /// must not assume values have been recomputed.
    pub fn on_change(&self, callback: impl Fn() + 'static) -> Subscription {
        Subscription::new(&self.cell, Listener::Callback(Rc::new(callback)))
    }

    /// Subscribe `dependent` to this node's notifications.
    pub(crate) fn observe(&self, dependent: &Prop) -> Subscription {
        Subscription::new(&self.cell, Listener::Node(Rc::downgrade(&dependent.cell)))
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Prop");
        s.field("id", &self.cell.id)
            .field("kind", &self.cell.node.label())
            .field("dirty", &self.cell.dirty.get());
        if let Some(formula) = self.formula() {
            s.field("formula", &formula);
        }
        if let Some(value) = self.cell.cache.borrow().as_ref() {
            s.field("cached", value);
        }
        s.finish()
    }
}

//! The four node kinds of the property graph.

use std::cell::RefCell;
use std::rc::Weak;

use enum_dispatch::enum_dispatch;

use super::subscription::Subscription;
use super::Prop;
use crate::dispatch::Operation;
use crate::errors::FormulaError;
use crate::lexer::{TokenKind, tokenize};
use crate::parser;
use crate::scope::{self, Scope};
use crate::value::Value;

/// What a node does when a dirty read reaches it
#[enum_dispatch]
pub(crate) trait Evaluate {
    /// Produce a fresh value; `this` is the handle of the node being read.
    fn compute(&self, this: &Prop) -> Result<Value, FormulaError>;

    /// Nodes this one currently reads from
    fn dependencies(&self) -> Vec<Prop>;

    fn label(&self) -> &'static str;
}

#[enum_dispatch(Evaluate)]
pub(crate) enum NodeKind {
    Constant,
    Variable,
    Expression,
    Calculation,
}

// ============================================================================
// Constant / Variable
// ============================================================================

pub(crate) struct Constant {
    pub(crate) value: Value,
}

impl Evaluate for Constant {
    fn compute(&self, _this: &Prop) -> Result<Value, FormulaError> {
        Ok(self.value.clone())
    }

    fn dependencies(&self) -> Vec<Prop> {
        Vec::new()
    }

    fn label(&self) -> &'static str {
        "constant"
    }
}

pub(crate) struct Variable {
    pub(crate) value: RefCell<Value>,
}

impl Variable {
    /// Store `value`; false when it equals what was already there.
    pub(crate) fn replace(&self, value: Value) -> bool {
        let mut current = self.value.borrow_mut();
        if *current == value {
            return false;
        }
        *current = value;
        true
    }
}

impl Evaluate for Variable {
    fn compute(&self, _this: &Prop) -> Result<Value, FormulaError> {
        Ok(self.value.borrow().clone())
    }

    fn dependencies(&self) -> Vec<Prop> {
        Vec::new()
    }

    fn label(&self) -> &'static str {
        "variable"
    }
}

// ============================================================================
// Calculation
// ============================================================================

/// An operation applied to operand nodes, built by the parser
pub(crate) struct Calculation {
    pub(crate) operation: Operation,
    pub(crate) operands: Vec<Prop>,
    /// Formula offset of the operator, member or function name
    pub(crate) offset: usize,
    pub(crate) _subscriptions: Vec<Subscription>,
}

impl Evaluate for Calculation {
    fn compute(&self, _this: &Prop) -> Result<Value, FormulaError> {
        let values = self
            .operands
            .iter()
            .map(Prop::value)
            .collect::<Result<Vec<_>, _>>()?;
        self.operation
            .apply(&values)
            .map_err(|e| e.at(self.offset))
    }

    fn dependencies(&self) -> Vec<Prop> {
        self.operands.clone()
    }

    fn label(&self) -> &'static str {
        "calculation"
    }
}

// ============================================================================
// Expression
// ============================================================================

/// A node defined by formula text, re-parsed lazily after edits
pub(crate) struct Expression {
    pub(crate) state: RefCell<ExpressionState>,
    pub(crate) scope: Weak<dyn Scope>,
}

pub(crate) struct ExpressionState {
    /// Current text; may be ahead of the installed tree until the next read
    pub(crate) formula: String,
    /// Text of the installed tree
    pub(crate) installed: String,
    pub(crate) root: Option<Prop>,
    pub(crate) needs_reparse: bool,
    pub(crate) subscription: Option<Subscription>,
}

impl Expression {
    pub(crate) fn new(formula: String, scope: Weak<dyn Scope>) -> Self {
        Expression {
            state: RefCell::new(ExpressionState {
                formula,
                installed: String::new(),
                root: None,
                needs_reparse: true,
                subscription: None,
            }),
            scope,
        }
    }

    /// Parse `formula` against this expression's scope, rejecting trees that
    /// would read `this` back.
    pub(crate) fn build(&self, this: &Prop, formula: &str) -> Result<Prop, FormulaError> {
        let root = self.parse_tree(formula)?;
        if root.depends_on(this) {
            crate::log::debug!(formula, "cycle detected");
            return Err(FormulaError::eval(0, "cyclic reference").with_formula(formula));
        }
        Ok(root)
    }

    /// Parse without the cycle check.
    pub(crate) fn parse_tree(&self, formula: &str) -> Result<Prop, FormulaError> {
        let scope = self
            .scope
            .upgrade()
            .ok_or_else(|| FormulaError::parse(0, "formula scope no longer exists"))?;
        parser::parse(formula, scope.as_ref())
    }

    /// Scope properties named at the top level of the pending formula,
    /// found without parsing it. Members reached through `.` are not listed.
    pub(crate) fn referenced(&self) -> Vec<Prop> {
        let Some(scope) = self.scope.upgrade() else {
            return Vec::new();
        };
        let formula = self.state.borrow().formula.clone();
        let Ok(tokens) = tokenize(&formula) else {
            return Vec::new();
        };
        tokens
            .iter()
            .enumerate()
            .filter(|(i, token)| {
                token.kind == TokenKind::Identifier
                    && !(*i > 0 && tokens[*i - 1].is_operator("."))
            })
            .filter_map(|(_, token)| scope::resolve(scope.as_ref(), &token.text))
            .filter_map(|member| member.as_prop().cloned())
            .collect()
    }

    fn reparse(&self, this: &Prop) -> Result<(), FormulaError> {
        let formula = self.state.borrow().formula.clone();
        crate::log::trace!(%formula, "re-parsing expression");
        let built = self.build(this, &formula);

        let mut state = self.state.borrow_mut();
        match built {
            Ok(root) => {
                state.subscription = Some(root.observe(this));
                state.root = Some(root);
                state.installed = formula;
                state.needs_reparse = false;
                Ok(())
            }
            Err(err) => {
                crate::log::debug!(%formula, error = %err, "formula rejected");
                // Keep the previous tree; with none installed yet, retry on the
                // next read since the scope may have grown in the meantime.
                if state.root.is_some() {
                    state.formula = state.installed.clone();
                    state.needs_reparse = false;
                }
                Err(err)
            }
        }
    }
}

impl Evaluate for Expression {
    fn compute(&self, this: &Prop) -> Result<Value, FormulaError> {
        if self.state.borrow().needs_reparse {
            self.reparse(this)?;
        }
        let (root, installed) = {
            let state = self.state.borrow();
            (state.root.clone(), state.installed.clone())
        };
        match root {
            Some(root) => root.value().map_err(|e| e.with_formula(&installed)),
            None => Err(FormulaError::parse(0, "no value found")),
        }
    }

    fn dependencies(&self) -> Vec<Prop> {
        self.state.borrow().root.iter().cloned().collect()
    }

    fn label(&self) -> &'static str {
        "expression"
    }
}

//! Formula parser: operator precedence over two stacks.
//!
//! Operands are graph nodes, so parsing *is* building the graph. Every
//! calculation node is evaluated as soon as it is built, which both checks
//! that its operand kinds make sense and lets member lookups dispatch on the
//! receiver's current kind.

use std::rc::Rc;

use crate::dispatch::{self, Conversion, Function, Method, Operation};
use crate::errors::FormulaError;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::prop::Prop;
use crate::scope::{self, Member, Scope};
use crate::value::{BinaryOp, UnaryOp, Value};

/// Parse `text` into a node, resolving free identifiers in `scope`.
pub fn parse(text: &str, scope: &dyn Scope) -> Result<Prop, FormulaError> {
    let tokens = tokenize(text).map_err(|e| e.with_formula(text))?;
    Parser::new(scope)
        .run(&tokens)
        .map_err(|e| e.with_formula(text))
}

/// What sits on the operand stack
enum Operand {
    Value(Prop),
    Scope(Rc<dyn Scope>),
    List(Vec<Member>),
}

impl From<Member> for Operand {
    fn from(member: Member) -> Self {
        match member {
            Member::Prop(prop) => Operand::Value(prop),
            Member::Scope(scope) => Operand::Scope(scope),
            Member::List(items) => Operand::List(items),
        }
    }
}

struct Entry {
    operand: Operand,
    offset: usize,
    /// Source text, for "is not a value" messages
    name: String,
}

impl Entry {
    fn value(prop: Prop, offset: usize) -> Self {
        Entry {
            operand: Operand::Value(prop),
            offset,
            name: String::new(),
        }
    }

    fn into_prop(self) -> Result<Prop, FormulaError> {
        match self.operand {
            Operand::Value(prop) => Ok(prop),
            Operand::Scope(_) | Operand::List(_) => Err(FormulaError::parse(
                self.offset,
                format!("'{}' is not a value", self.name),
            )),
        }
    }
}

enum Callee {
    Function(Function),
    Method { receiver: Prop, method: Method },
}

enum Pending {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Paren,
    /// `base` is the operand stack height at `(`; `args` counts the
    /// argument slots already closed by a comma.
    Call {
        callee: Callee,
        base: usize,
        args: usize,
    },
}

impl Pending {
    /// Binding strength; barriers never yield to an incoming operator
    fn precedence(&self) -> u8 {
        match self {
            Pending::Binary(op) => binary_precedence(*op),
            Pending::Unary(_) => 7,
            Pending::Paren | Pending::Call { .. } => 0,
        }
    }

    fn symbol(&self) -> Option<&'static str> {
        match self {
            Pending::Binary(op) => Some(op.symbol()),
            Pending::Unary(op) => Some(op.symbol()),
            Pending::Paren | Pending::Call { .. } => None,
        }
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne => 3,
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div => 6,
    }
}

struct Parser<'s> {
    scope: &'s dyn Scope,
    operands: Vec<Entry>,
    operators: Vec<(Pending, usize)>,
    /// True where a prefix operator or operand may appear
    expect_operand: bool,
}

impl<'s> Parser<'s> {
    fn new(scope: &'s dyn Scope) -> Self {
        Parser {
            scope,
            operands: Vec::new(),
            operators: Vec::new(),
            expect_operand: true,
        }
    }

    fn run(mut self, tokens: &[Token]) -> Result<Prop, FormulaError> {
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let next = tokens.get(i + 1);
            i += 1;
            match token.kind {
                TokenKind::Number => {
                    let conversion = next
                        .filter(|t| t.kind == TokenKind::Identifier)
                        .and_then(|t| Conversion::from_suffix(&t.text));
                    let prop = self.number(token, conversion)?;
                    if conversion.is_some() {
                        i += 1;
                    }
                    self.push_value(prop, token.offset);
                }
                TokenKind::String => {
                    self.push_value(Prop::constant(token.text.as_str()), token.offset);
                }
                TokenKind::Identifier => {
                    if next.is_some_and(|t| t.is_operator("(")) {
                        self.open_call(token)?;
                        i += 1;
                    } else {
                        let entry = self.identifier(token)?;
                        self.operands.push(entry);
                        self.expect_operand = false;
                    }
                }
                TokenKind::Operator => {
                    i += self.operator(token, &tokens[i..])?;
                }
            }
        }
        self.finish()
    }

    // ------------------------------------------------------------------------
    // Operands
    // ------------------------------------------------------------------------

    fn push_value(&mut self, prop: Prop, offset: usize) {
        self.operands.push(Entry::value(prop, offset));
        self.expect_operand = false;
    }

    fn number(&self, token: &Token, conversion: Option<Conversion>) -> Result<Prop, FormulaError> {
        let n: f64 = token
            .text
            .parse()
            .map_err(|_| FormulaError::parse(token.offset, format!("invalid number '{}'", token.text)))?;
        let literal = Prop::constant(n);
        match conversion {
            Some(conversion) => {
                self.calculate(Operation::Convert(conversion), vec![literal], token.offset)
            }
            None => Ok(literal),
        }
    }

    fn identifier(&self, token: &Token) -> Result<Entry, FormulaError> {
        let name = token.text.as_str();
        let operand = match name {
            "true" => Operand::Value(Prop::constant(true)),
            "false" => Operand::Value(Prop::constant(false)),
            _ => match scope::resolve(self.scope, name) {
                Some(member) => member.into(),
                None => match dispatch::constant(name) {
                    Some(value) => Operand::Value(Prop::constant(value)),
                    None => {
                        return Err(FormulaError::parse(
                            token.offset,
                            format!("unknown identifier '{name}'"),
                        ));
                    }
                },
            },
        };
        Ok(Entry {
            operand,
            offset: token.offset,
            name: name.to_string(),
        })
    }

    /// Build a calculation and evaluate it once, so kind errors surface at
    /// the operator that caused them.
    fn calculate(
        &self,
        operation: Operation,
        operands: Vec<Prop>,
        offset: usize,
    ) -> Result<Prop, FormulaError> {
        let node = Prop::calculation(operation, operands, offset);
        node.value()?;
        Ok(node)
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    /// Handle one operator token; returns how many following tokens it consumed.
    fn operator(&mut self, token: &Token, rest: &[Token]) -> Result<usize, FormulaError> {
        let offset = token.offset;
        match token.text.as_str() {
            "(" => {
                self.operators.push((Pending::Paren, offset));
                self.expect_operand = true;
                Ok(0)
            }
            ")" => {
                self.close(offset)?;
                self.expect_operand = false;
                Ok(0)
            }
            "," => {
                if self.expect_operand {
                    return Err(self.missing_operand(offset, "missing argument before ','"));
                }
                self.reduce_to_barrier()?;
                let (base, slot) = match self.operators.last_mut() {
                    Some((Pending::Call { base, args, .. }, _)) => {
                        *args += 1;
                        (*base, *args - 1)
                    }
                    _ => return Err(FormulaError::parse(offset, "',' outside of a call")),
                };
                self.check_slot(base, slot, offset)?;
                self.expect_operand = true;
                Ok(0)
            }
            "." => self.member(offset, rest),
            "-" if self.expect_operand => {
                self.operators.push((Pending::Unary(UnaryOp::Neg), offset));
                Ok(0)
            }
            "!" => {
                if !self.expect_operand {
                    return Err(FormulaError::parse(offset, "unexpected '!'"));
                }
                self.operators.push((Pending::Unary(UnaryOp::Not), offset));
                Ok(0)
            }
            symbol => {
                let Some(op) = BinaryOp::from_symbol(symbol) else {
                    return Err(FormulaError::parse(offset, format!("unexpected '{symbol}'")));
                };
                if self.expect_operand {
                    return Err(FormulaError::parse(
                        offset,
                        format!("missing operand for '{symbol}'"),
                    ));
                }
                let precedence = binary_precedence(op);
                while self
                    .operators
                    .last()
                    .is_some_and(|(pending, _)| pending.precedence() >= precedence)
                {
                    self.reduce()?;
                }
                self.operators.push((Pending::Binary(op), offset));
                self.expect_operand = true;
                Ok(0)
            }
        }
    }

    /// Apply the top pending operator.
    fn reduce(&mut self) -> Result<(), FormulaError> {
        match self.operators.pop() {
            Some((pending, offset)) => self.apply(pending, offset),
            None => Ok(()),
        }
    }

    fn apply(&mut self, pending: Pending, offset: usize) -> Result<(), FormulaError> {
        let node = match pending {
            Pending::Binary(op) => {
                let rhs = self.pop_operand(offset, op.symbol())?;
                let lhs = self.pop_operand(offset, op.symbol())?;
                self.calculate(Operation::Binary(op), vec![lhs, rhs], offset)?
            }
            Pending::Unary(op) => {
                let operand = self.pop_operand(offset, op.symbol())?;
                self.calculate(Operation::Unary(op), vec![operand], offset)?
            }
            Pending::Paren | Pending::Call { .. } => {
                return Err(FormulaError::parse(offset, "unbalanced '('"));
            }
        };
        self.operands.push(Entry::value(node, offset));
        Ok(())
    }

    fn reduce_to_barrier(&mut self) -> Result<(), FormulaError> {
        while self
            .operators
            .last()
            .is_some_and(|(pending, _)| !matches!(pending, Pending::Paren | Pending::Call { .. }))
        {
            self.reduce()?;
        }
        Ok(())
    }

    /// Error for input that ended a slot while an operand was still due:
    /// blames the dangling operator if there is one.
    fn missing_operand(&self, offset: usize, otherwise: &str) -> FormulaError {
        match self.operators.last() {
            Some((pending, at)) => match pending.symbol() {
                Some(symbol) => FormulaError::parse(*at, format!("missing operand for '{symbol}'")),
                None => FormulaError::parse(offset, otherwise),
            },
            None => FormulaError::parse(offset, otherwise),
        }
    }

    /// Argument slot `slot` of a call opened at stack height `base` must hold
    /// exactly one operand.
    fn check_slot(&self, base: usize, slot: usize, offset: usize) -> Result<(), FormulaError> {
        let expected = base + slot + 1;
        match self.operands.get(expected) {
            Some(extra) => Err(FormulaError::parse(
                extra.offset,
                "expected ',' between arguments",
            )),
            None if self.operands.len() < expected => {
                Err(FormulaError::parse(offset, "missing argument"))
            }
            None => Ok(()),
        }
    }

    fn pop_operand(&mut self, offset: usize, symbol: &str) -> Result<Prop, FormulaError> {
        self.operands
            .pop()
            .ok_or_else(|| FormulaError::parse(offset, format!("missing operand for '{symbol}'")))?
            .into_prop()
    }

    // ------------------------------------------------------------------------
    // Brackets and calls
    // ------------------------------------------------------------------------

    fn open_call(&mut self, token: &Token) -> Result<(), FormulaError> {
        let function = Function::from_name(&token.text).ok_or_else(|| {
            FormulaError::parse(token.offset, format!("unknown function '{}'", token.text))
        })?;
        self.operators.push((
            Pending::Call {
                callee: Callee::Function(function),
                base: self.operands.len(),
                args: 0,
            },
            token.offset,
        ));
        self.expect_operand = true;
        Ok(())
    }

    fn close(&mut self, offset: usize) -> Result<(), FormulaError> {
        if self.expect_operand {
            match self.operators.last() {
                Some((Pending::Call { args, .. }, _)) if *args > 0 => {
                    return Err(FormulaError::parse(offset, "missing argument after ','"));
                }
                Some((Pending::Paren | Pending::Call { .. }, _)) => {}
                _ => return Err(self.missing_operand(offset, "unbalanced ')'")),
            }
        }
        loop {
            let Some((pending, at)) = self.operators.pop() else {
                return Err(FormulaError::parse(offset, "unbalanced ')'"));
            };
            match pending {
                Pending::Paren => {
                    if self.expect_operand {
                        return Err(FormulaError::parse(at, "empty parentheses"));
                    }
                    return Ok(());
                }
                Pending::Call { callee, base, args } => {
                    if !self.expect_operand {
                        self.check_slot(base, args, offset)?;
                    }
                    return self.finish_call(callee, base, at);
                }
                other => self.apply(other, at)?,
            }
        }
    }

    fn finish_call(&mut self, callee: Callee, base: usize, offset: usize) -> Result<(), FormulaError> {
        let args = self
            .operands
            .split_off(base.min(self.operands.len()))
            .into_iter()
            .map(Entry::into_prop)
            .collect::<Result<Vec<_>, _>>()?;

        let node = match callee {
            Callee::Function(function) => {
                if !function.arity().contains(&args.len()) {
                    return Err(FormulaError::parse(offset, function.arity_message(args.len())));
                }
                self.calculate(Operation::Function(function), args, offset)?
            }
            Callee::Method { receiver, method } => {
                if args.len() != method.arity() {
                    let plural = if method.arity() == 1 { "" } else { "s" };
                    return Err(FormulaError::parse(
                        offset,
                        format!(
                            "{} expects {} argument{plural}, got {}",
                            method.name(),
                            method.arity(),
                            args.len()
                        ),
                    ));
                }
                let mut operands = Vec::with_capacity(args.len() + 1);
                operands.push(receiver);
                operands.extend(args);
                self.calculate(Operation::Method(method), operands, offset)?
            }
        };
        self.operands.push(Entry::value(node, offset));
        Ok(())
    }

    /// `.` IDENT, optionally followed by `(` for a method call.
    fn member(&mut self, dot: usize, rest: &[Token]) -> Result<usize, FormulaError> {
        let Some(name) = rest.first().filter(|t| t.kind == TokenKind::Identifier) else {
            return Err(FormulaError::parse(dot, "expected a member name after '.'"));
        };
        if self.expect_operand {
            return Err(FormulaError::parse(dot, "unexpected '.'"));
        }
        let Some(receiver) = self.operands.pop() else {
            return Err(FormulaError::parse(dot, "unexpected '.'"));
        };
        let is_call = rest.get(1).is_some_and(|t| t.is_operator("("));
        let not_found = || FormulaError::eval(name.offset, format!("{} not found", name.text));

        match receiver.operand {
            Operand::Value(prop) => {
                let kind = prop.value()?.kind();
                if is_call {
                    let method = dispatch::method(kind, &name.text).ok_or_else(not_found)?;
                    self.operators.push((
                        Pending::Call {
                            callee: Callee::Method {
                                receiver: prop,
                                method,
                            },
                            base: self.operands.len(),
                            args: 0,
                        },
                        name.offset,
                    ));
                    self.expect_operand = true;
                    return Ok(2);
                }
                let field = dispatch::field(kind, &name.text).ok_or_else(not_found)?;
                let node = self.calculate(Operation::Field(field), vec![prop], name.offset)?;
                self.operands.push(Entry::value(node, name.offset));
            }
            Operand::Scope(inner) => {
                if is_call {
                    return Err(not_found());
                }
                let member = scope::resolve(inner.as_ref(), &name.text).ok_or_else(not_found)?;
                self.operands.push(Entry {
                    operand: member.into(),
                    offset: name.offset,
                    name: name.text.clone(),
                });
            }
            Operand::List(_) => return Err(not_found()),
        }
        Ok(1)
    }

    fn finish(mut self) -> Result<Prop, FormulaError> {
        if self.expect_operand {
            if let Some((pending, offset)) = self.operators.last() {
                if let Some(symbol) = pending.symbol() {
                    return Err(FormulaError::parse(
                        *offset,
                        format!("missing operand for '{symbol}'"),
                    ));
                }
            }
        }
        while let Some((pending, offset)) = self.operators.last() {
            if matches!(pending, Pending::Paren | Pending::Call { .. }) {
                return Err(FormulaError::parse(*offset, "unbalanced '('"));
            }
            self.reduce()?;
        }
        match self.operands.len() {
            0 => Err(FormulaError::parse(0, "no value found")),
            1 => match self.operands.pop() {
                Some(entry) => entry.into_prop(),
                None => Err(FormulaError::parse(0, "no value found")),
            },
            _ => {
                let offset = self.operands[1].offset;
                Err(FormulaError::parse(offset, "does not evaluate to a single value"))
            }
        }
    }
}

/// Evaluate `text` once in `scope`.
pub fn evaluate(text: &str, scope: &dyn Scope) -> Result<Value, FormulaError> {
    parse(text, scope)?.value()
}

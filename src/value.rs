//! Runtime values produced by formulas, and the operator table over them.
//!
//! The set of kinds is closed: adding one means extending [`Value`] and
//! [`Kind`], after which every non-exhaustive `match` below (and in
//! `dispatch`) points at what still needs an implementation.

use std::cmp::Ordering;
use std::fmt;

use glam::DVec2;

use crate::errors::ValueError;
use crate::types::{self, format_number};

/// A formula result
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Quantity(types::Quantity),
    /// 2-D position or size, one quantity per axis (`Dimension2(x, y)`)
    Point(types::Quantity, types::Quantity),
    /// Unitless 2-D direction or offset
    Vector(DVec2),
    Angle(types::Angle),
    Color(types::Color),
    Bool(bool),
    Text(String),
}

/// Payload-free discriminant of [`Value`], the key of every dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Scalar,
    Quantity,
    Point,
    Vector,
    Angle,
    Color,
    Bool,
    Text,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Scalar => "Scalar",
            Kind::Quantity => "Quantity",
            Kind::Point => "Point",
            Kind::Vector => "Vector",
            Kind::Angle => "Angle",
            Kind::Color => "Color",
            Kind::Bool => "Bool",
            Kind::Text => "Text",
        };
        write!(f, "{name}")
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Scalar(_) => Kind::Scalar,
            Value::Quantity(_) => Kind::Quantity,
            Value::Point(..) => Kind::Point,
            Value::Vector(_) => Kind::Vector,
            Value::Angle(_) => Kind::Angle,
            Value::Color(_) => Kind::Color,
            Value::Bool(_) => Kind::Bool,
            Value::Text(_) => Kind::Text,
        }
    }

    /// Numeric payload of a scalar or a dimensionless quantity
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Quantity(q) if q.is_dimensionless() => Some(q.magnitude),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<types::Quantity> {
        match self {
            Value::Quantity(q) => Some(*q),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_angle(&self) -> Option<types::Angle> {
        match self {
            Value::Angle(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality with floating point tolerance and unit conversion.
    ///
    /// `None` when the two kinds cannot be compared at all.
    pub fn approx_eq(&self, other: &Value) -> Option<bool> {
        use Value::*;
        Some(match (self, other) {
            (Quantity(a), Quantity(b)) => {
                if !a.same_dimension(*b) {
                    return None;
                }
                a.approx_eq(*b)
            }
            (Point(ax, ay), Point(bx, by)) => {
                if !ax.same_dimension(*bx) || !ay.same_dimension(*by) {
                    return None;
                }
                ax.approx_eq(*bx) && ay.approx_eq(*by)
            }
            (Vector(a), Vector(b)) => types::approx_eq(a.x, b.x) && types::approx_eq(a.y, b.y),
            (Angle(a), Angle(b)) => types::approx_eq(a.radians(), b.radians()),
            (Color(a), Color(b)) => a.approx_eq(*b),
            (Bool(a), Bool(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (a, b) => types::approx_eq(a.as_scalar()?, b.as_scalar()?),
        })
    }

    fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Quantity(a), Quantity(b)) if !(a.is_dimensionless() && b.is_dimensionless()) => {
                a.partial_cmp_value(*b)
            }
            (Angle(a), Angle(b)) => a.radians().partial_cmp(&b.radians()),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (a, b) => a.as_scalar()?.partial_cmp(&b.as_scalar()?),
        }
    }

    /// Formula text that parses back to an equal value.
    pub fn to_formula_string(&self) -> String {
        match self {
            Value::Scalar(s) => format_number(*s),
            Value::Quantity(q) => q.to_formula_string(),
            Value::Point(x, y) => format!(
                "Dimension2({}, {})",
                x.to_formula_string(),
                y.to_formula_string()
            ),
            Value::Vector(v) => format!("Vector({}, {})", format_number(v.x), format_number(v.y)),
            Value::Angle(a) => a.to_formula_string(),
            Value::Color(c) => c.to_formula_string(),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => quote(s),
        }
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", format_number(*s)),
            Value::Quantity(q) => write!(f, "{q}"),
            Value::Point(x, y) => write!(f, "({x}, {y})"),
            Value::Vector(v) => write!(f, "[{}, {}]", format_number(v.x), format_number(v.y)),
            Value::Angle(a) => write!(f, "{a}"),
            Value::Color(c) => write!(f, "{c}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(s: f64) -> Self {
        Value::Scalar(s)
    }
}

impl From<types::Quantity> for Value {
    fn from(q: types::Quantity) -> Self {
        Value::Quantity(q)
    }
}

impl From<types::Angle> for Value {
    fn from(a: types::Angle) -> Self {
        Value::Angle(a)
    }
}

impl From<types::Color> for Value {
    fn from(c: types::Color) -> Self {
        Value::Color(c)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

// ============================================================================
// Operators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> ValueError {
    ValueError::new(format!(
        "cannot apply {} to {} and {}",
        op.symbol(),
        lhs.kind(),
        rhs.kind()
    ))
}

fn division_by_zero() -> ValueError {
    ValueError::new("division by zero")
}

/// Apply a binary operator to two runtime values.
pub fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    let result = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, lhs, rhs)?
        }
        BinaryOp::Eq => Value::Bool(lhs.approx_eq(rhs).ok_or_else(|| mismatch(op, lhs, rhs))?),
        BinaryOp::Ne => Value::Bool(!lhs.approx_eq(rhs).ok_or_else(|| mismatch(op, lhs, rhs))?),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = lhs
                .partial_cmp_value(rhs)
                .ok_or_else(|| mismatch(op, lhs, rhs))?;
            Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        BinaryOp::And | BinaryOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            }),
            _ => return Err(mismatch(op, lhs, rhs)),
        },
    };
    check_finite(result)
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    use BinaryOp::*;
    use Value::*;

    Ok(match (lhs, rhs, op) {
        // Text concatenation accepts any right- or left-hand value
        (Text(a), b, Add) => Text(format!("{a}{b}")),
        (a, Text(b), Add) => Text(format!("{a}{b}")),

        (Scalar(a), Scalar(b), Add) => Scalar(a + b),
        (Scalar(a), Scalar(b), Sub) => Scalar(a - b),
        (Scalar(a), Scalar(b), Mul) => Scalar(a * b),
        (Scalar(a), Scalar(b), Div) => {
            if *b == 0.0 {
                return Err(division_by_zero());
            }
            Scalar(a / b)
        }

        (Quantity(a), Quantity(b), Add) => Quantity(
            a.checked_add(*b)
                .ok_or_else(|| exponent_mismatch(op, *a, *b))?,
        ),
        (Quantity(a), Quantity(b), Sub) => Quantity(
            a.checked_sub(*b)
                .ok_or_else(|| exponent_mismatch(op, *a, *b))?,
        ),
        (Quantity(a), Quantity(b), Mul) => Quantity(a.product(*b)),
        (Quantity(a), Quantity(b), Div) => {
            Quantity(a.quotient(*b).ok_or_else(division_by_zero)?)
        }

        // Dimensionless quantities coerce to scalars
        (Quantity(q), Scalar(s), Add | Sub) if q.is_dimensionless() => {
            let a = q.magnitude;
            Scalar(if op == Add { a + s } else { a - s })
        }
        (Scalar(s), Quantity(q), Add | Sub) if q.is_dimensionless() => {
            let b = q.magnitude;
            Scalar(if op == Add { s + b } else { s - b })
        }
        (Quantity(q), Scalar(s), Mul) | (Scalar(s), Quantity(q), Mul) => Quantity(*q * *s),
        (Quantity(q), Scalar(s), Div) => {
            if *s == 0.0 {
                return Err(division_by_zero());
            }
            Quantity(*q / *s)
        }
        (Scalar(s), Quantity(q), Div) => {
            if q.magnitude == 0.0 {
                return Err(division_by_zero());
            }
            Quantity(types::Quantity::with_exponent(
                s / q.magnitude,
                q.unit,
                -q.exponent,
            ))
        }

        (Point(ax, ay), Point(bx, by), Add) => Point(
            ax.checked_add(*bx).ok_or_else(|| exponent_mismatch(op, *ax, *bx))?,
            ay.checked_add(*by).ok_or_else(|| exponent_mismatch(op, *ay, *by))?,
        ),
        (Point(ax, ay), Point(bx, by), Sub) => Point(
            ax.checked_sub(*bx).ok_or_else(|| exponent_mismatch(op, *ax, *bx))?,
            ay.checked_sub(*by).ok_or_else(|| exponent_mismatch(op, *ay, *by))?,
        ),
        (Point(x, y), Scalar(s), Mul) | (Scalar(s), Point(x, y), Mul) => Point(*x * *s, *y * *s),
        (Point(x, y), Scalar(s), Div) => {
            if *s == 0.0 {
                return Err(division_by_zero());
            }
            Point(*x / *s, *y / *s)
        }

        (Vector(a), Vector(b), Add) => Vector(*a + *b),
        (Vector(a), Vector(b), Sub) => Vector(*a - *b),
        (Vector(v), Scalar(s), Mul) | (Scalar(s), Vector(v), Mul) => Vector(*v * *s),
        (Vector(v), Scalar(s), Div) => {
            if *s == 0.0 {
                return Err(division_by_zero());
            }
            Vector(*v / *s)
        }
        // Direction times length gives a displacement
        (Vector(v), Quantity(q), Mul) | (Quantity(q), Vector(v), Mul) => {
            Point(*q * v.x, *q * v.y)
        }

        (Angle(a), Angle(b), Add) => Angle(*a + *b),
        (Angle(a), Angle(b), Sub) => Angle(*a - *b),
        (Angle(a), Angle(b), Div) => {
            if b.radians() == 0.0 {
                return Err(division_by_zero());
            }
            Scalar(a.radians() / b.radians())
        }
        (Angle(a), Scalar(s), Mul) | (Scalar(s), Angle(a), Mul) => Angle(*a * *s),
        (Angle(a), Scalar(s), Div) => {
            if *s == 0.0 {
                return Err(division_by_zero());
            }
            Angle(*a / *s)
        }

        _ => return Err(mismatch(op, lhs, rhs)),
    })
}

fn exponent_mismatch(op: BinaryOp, a: types::Quantity, b: types::Quantity) -> ValueError {
    ValueError::new(format!(
        "cannot apply {} to Quantity and Quantity: exponents {} and {} differ",
        op.symbol(),
        a.exponent,
        b.exponent
    ))
}

/// Apply a prefix operator to a runtime value.
pub fn apply_unary(op: UnaryOp, operand: &Value) -> Result<Value, ValueError> {
    use Value::*;
    Ok(match (op, operand) {
        (UnaryOp::Neg, Scalar(s)) => Scalar(-s),
        (UnaryOp::Neg, Quantity(q)) => Quantity(-*q),
        (UnaryOp::Neg, Point(x, y)) => Point(-*x, -*y),
        (UnaryOp::Neg, Vector(v)) => Vector(-*v),
        (UnaryOp::Neg, Angle(a)) => Angle(-*a),
        (UnaryOp::Not, Bool(b)) => Bool(!b),
        (op, v) => {
            return Err(ValueError::new(format!(
                "cannot apply {} to {}",
                op.symbol(),
                v.kind()
            )));
        }
    })
}

/// Validate that arithmetic did not overflow into NaN or infinity.
pub fn check_finite(value: Value) -> Result<Value, ValueError> {
    let components = match &value {
        Value::Scalar(s) => vec![*s],
        Value::Quantity(q) => vec![q.magnitude],
        Value::Point(x, y) => vec![x.magnitude, y.magnitude],
        Value::Vector(v) => vec![v.x, v.y],
        Value::Angle(a) => vec![a.radians()],
        Value::Color(_) | Value::Bool(_) | Value::Text(_) => Vec::new(),
    };
    for c in components {
        types::finite(c).map_err(|e| ValueError::new(format!("invalid numeric result: {e}")))?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Unit;

    fn mm(v: f64) -> Value {
        Value::Quantity(types::Quantity::new(v, Unit::Millimetre))
    }

    fn cm(v: f64) -> Value {
        Value::Quantity(types::Quantity::new(v, Unit::Centimetre))
    }

    #[test]
    fn quantity_addition_keeps_exponent() {
        let sum = apply_binary(BinaryOp::Add, &mm(1.0), &cm(2.0)).unwrap();
        let q = sum.as_quantity().unwrap();
        assert_eq!(q.exponent, 1);
        assert!(types::approx_eq(q.in_unit(Unit::Millimetre), 21.0));
    }

    #[test]
    fn differing_exponents_are_rejected() {
        let area = apply_binary(BinaryOp::Mul, &mm(2.0), &mm(3.0)).unwrap();
        let err = apply_binary(BinaryOp::Add, &area, &mm(1.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot apply + to Quantity and Quantity: exponents 2 and 1 differ"
        );
    }

    #[test]
    fn mul_and_div_compose_exponents() {
        let a = types::Quantity::with_exponent(3.0, Unit::Millimetre, 2);
        let b = types::Quantity::with_exponent(4.0, Unit::Centimetre, -1);
        let product = apply_binary(BinaryOp::Mul, &Value::Quantity(a), &Value::Quantity(b))
            .unwrap()
            .as_quantity()
            .unwrap();
        assert_eq!(product.exponent, a.exponent + b.exponent);
        let quotient = apply_binary(BinaryOp::Div, &Value::Quantity(a), &Value::Quantity(b))
            .unwrap()
            .as_quantity()
            .unwrap();
        assert_eq!(quotient.exponent, a.exponent - b.exponent);
    }

    #[test]
    fn dimensionless_quantity_coerces_to_scalar() {
        let ratio = apply_binary(BinaryOp::Div, &cm(1.0), &mm(5.0)).unwrap();
        let sum = apply_binary(BinaryOp::Add, &ratio, &Value::Scalar(1.0)).unwrap();
        assert_eq!(sum, Value::Scalar(3.0));
        assert_eq!(ratio.as_scalar(), Some(2.0));
    }

    #[test]
    fn point_plus_scalar_is_a_kind_mismatch() {
        let p = Value::Point(
            types::Quantity::new(1.0, Unit::Millimetre),
            types::Quantity::new(1.0, Unit::Millimetre),
        );
        let err = apply_binary(BinaryOp::Add, &p, &Value::Scalar(5.0)).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply + to Point and Scalar");
    }

    #[test]
    fn length_plus_scalar_is_rejected() {
        assert!(apply_binary(BinaryOp::Add, &mm(1.0), &Value::Scalar(5.0)).is_err());
    }

    #[test]
    fn equality_converts_units() {
        assert_eq!(
            apply_binary(BinaryOp::Eq, &mm(10.0), &cm(1.0)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            apply_binary(BinaryOp::Lt, &mm(9.0), &cm(1.0)).unwrap(),
            Value::Bool(true)
        );
        assert!(apply_binary(BinaryOp::Eq, &mm(1.0), &Value::Bool(true)).is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = apply_binary(BinaryOp::Div, &Value::Scalar(1.0), &Value::Scalar(0.0)).unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
        assert!(apply_binary(BinaryOp::Div, &mm(1.0), &mm(0.0)).is_err());
    }

    #[test]
    fn vector_times_length_is_a_point() {
        let v = Value::Vector(DVec2::new(1.0, 0.5));
        let p = apply_binary(BinaryOp::Mul, &v, &mm(10.0)).unwrap();
        assert_eq!(
            p,
            Value::Point(
                types::Quantity::new(10.0, Unit::Millimetre),
                types::Quantity::new(5.0, Unit::Millimetre)
            )
        );
    }

    #[test]
    fn text_concatenation_formats_values() {
        let v = apply_binary(BinaryOp::Add, &Value::from("w="), &mm(3.0)).unwrap();
        assert_eq!(v, Value::from("w=3mm"));
    }

    #[test]
    fn logic_requires_bools() {
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(apply_binary(BinaryOp::And, &t, &f).unwrap(), f);
        assert_eq!(apply_binary(BinaryOp::Or, &t, &f).unwrap(), t);
        assert_eq!(apply_unary(UnaryOp::Not, &t).unwrap(), f);
        assert!(apply_unary(UnaryOp::Not, &Value::Scalar(1.0)).is_err());
    }

    #[test]
    fn negation() {
        assert_eq!(apply_unary(UnaryOp::Neg, &mm(2.0)).unwrap(), mm(-2.0));
        let err = apply_unary(UnaryOp::Neg, &Value::Bool(true)).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply - to Bool");
    }

    #[test]
    fn formula_strings() {
        assert_eq!(mm(21.0).to_formula_string(), "21mm");
        assert_eq!(Value::Scalar(-0.5).to_formula_string(), "-0.5");
        assert_eq!(Value::Bool(true).to_formula_string(), "true");
        assert_eq!(
            Value::Text("a \"b\"\n".to_string()).to_formula_string(),
            r#""a \"b\"\n""#
        );
        assert_eq!(
            Value::Vector(DVec2::new(1.0, -2.0)).to_formula_string(),
            "Vector(1, -2)"
        );
    }

    #[test]
    fn overflow_is_rejected() {
        let big = Value::Scalar(f64::MAX);
        assert!(apply_binary(BinaryOp::Mul, &big, &big).is_err());
    }
}

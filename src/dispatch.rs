//! Members, methods, functions and unit suffixes available to formulas.
//!
//! Members and methods are looked up by the [`Kind`] of the receiver's value
//! at parse time. The resulting calculation keeps the resolved entry, so if
//! the receiver later changes kind the entry reports a mismatch instead of
//! silently picking another implementation.

use std::f64::consts::PI;
use std::fmt;
use std::ops::RangeInclusive;

use glam::DVec2;

use crate::errors::ValueError;
use crate::types::{Angle, Color, Quantity, Unit};
use crate::value::{self, BinaryOp, Kind, UnaryOp, Value};

/// What a calculation node does with its operand values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Member read; operand 0 is the receiver
    Field(Field),
    /// Method call; operand 0 is the receiver, the rest are arguments
    Method(Method),
    Function(Function),
    /// Unit suffix on a numeric literal
    Convert(Conversion),
}

impl Operation {
    pub fn apply(&self, args: &[Value]) -> Result<Value, ValueError> {
        let result = match (self, args) {
            (Operation::Binary(op), [lhs, rhs]) => return value::apply_binary(*op, lhs, rhs),
            (Operation::Unary(op), [operand]) => value::apply_unary(*op, operand)?,
            (Operation::Field(field), [receiver]) => field.apply(receiver)?,
            (Operation::Method(method), [receiver, rest @ ..]) => method.apply(receiver, rest)?,
            (Operation::Function(function), args) => function.apply(args)?,
            (Operation::Convert(conversion), [operand]) => conversion.apply(operand)?,
            (op, args) => {
                return Err(ValueError::new(format!(
                    "{op} received {} operands",
                    args.len()
                )));
            }
        };
        value::check_finite(result)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Binary(op) => write!(f, "{}", op.symbol()),
            Operation::Unary(op) => write!(f, "unary {}", op.symbol()),
            Operation::Field(field) => write!(f, "member {field:?}"),
            Operation::Method(method) => write!(f, "{}()", method.name()),
            Operation::Function(function) => write!(f, "{}()", function.name()),
            Operation::Convert(conversion) => write!(f, "suffix {}", conversion.suffix()),
        }
    }
}

fn expected(what: &str, kind: Kind) -> ValueError {
    ValueError::new(format!("expected {what}, got {kind}"))
}

fn scalar_arg(value: &Value) -> Result<f64, ValueError> {
    value.as_scalar().ok_or_else(|| expected("Scalar", value.kind()))
}

fn angle_arg(value: &Value) -> Result<Angle, ValueError> {
    value.as_angle().ok_or_else(|| expected("Angle", value.kind()))
}

/// A point's coordinates in its x unit
fn point_coords(x: Quantity, y: Quantity) -> DVec2 {
    DVec2::new(x.magnitude, y.in_unit(x.unit))
}

fn point_from(v: DVec2, like: Quantity) -> Value {
    Value::Point(
        Quantity::with_exponent(v.x, like.unit, like.exponent),
        Quantity::with_exponent(v.y, like.unit, like.exponent),
    )
}

fn direction(v: DVec2) -> Angle {
    Angle(v.y.atan2(v.x))
}

fn normalised(v: DVec2) -> Result<DVec2, ValueError> {
    v.try_normalize()
        .ok_or_else(|| ValueError::new("cannot normalise a zero-length vector"))
}

// ============================================================================
// Fields
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Quantity magnitude in a given unit
    InUnit(Unit),
    Exponent,
    X,
    Y,
    Length,
    Angle,
    Degrees,
    Radians,
    Sin,
    Cos,
    Tan,
    Red,
    Green,
    Blue,
    Alpha,
}

const QUANTITY_FIELDS: &[(&str, Field)] = &[
    ("mm", Field::InUnit(Unit::Millimetre)),
    ("cm", Field::InUnit(Unit::Centimetre)),
    ("m", Field::InUnit(Unit::Metre)),
    ("km", Field::InUnit(Unit::Kilometre)),
    ("in", Field::InUnit(Unit::Inch)),
    ("pt", Field::InUnit(Unit::Point)),
    ("Exponent", Field::Exponent),
];

const PLANAR_FIELDS: &[(&str, Field)] = &[
    ("X", Field::X),
    ("Y", Field::Y),
    ("Length", Field::Length),
    ("Angle", Field::Angle),
];

const ANGLE_FIELDS: &[(&str, Field)] = &[
    ("deg", Field::Degrees),
    ("rad", Field::Radians),
    ("Sin", Field::Sin),
    ("Cos", Field::Cos),
    ("Tan", Field::Tan),
];

const COLOR_FIELDS: &[(&str, Field)] = &[
    ("Red", Field::Red),
    ("Green", Field::Green),
    ("Blue", Field::Blue),
    ("Alpha", Field::Alpha),
];

const TEXT_FIELDS: &[(&str, Field)] = &[("Length", Field::Length)];

/// Member names readable on values of `kind`
pub fn fields(kind: Kind) -> &'static [(&'static str, Field)] {
    match kind {
        Kind::Quantity => QUANTITY_FIELDS,
        Kind::Point | Kind::Vector => PLANAR_FIELDS,
        Kind::Angle => ANGLE_FIELDS,
        Kind::Color => COLOR_FIELDS,
        Kind::Text => TEXT_FIELDS,
        Kind::Scalar | Kind::Bool => &[],
    }
}

pub fn field(kind: Kind, name: &str) -> Option<Field> {
    fields(kind)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, field)| *field)
}

impl Field {
    /// The member name as written in formulas
    pub fn name(self) -> &'static str {
        match self {
            Field::InUnit(unit) => unit.symbol(),
            Field::Exponent => "Exponent",
            Field::X => "X",
            Field::Y => "Y",
            Field::Length => "Length",
            Field::Angle => "Angle",
            Field::Degrees => "deg",
            Field::Radians => "rad",
            Field::Sin => "Sin",
            Field::Cos => "Cos",
            Field::Tan => "Tan",
            Field::Red => "Red",
            Field::Green => "Green",
            Field::Blue => "Blue",
            Field::Alpha => "Alpha",
        }
    }

    pub fn apply(self, receiver: &Value) -> Result<Value, ValueError> {
        Ok(match (self, receiver) {
            (Field::InUnit(unit), Value::Quantity(q)) => Value::Scalar(q.in_unit(unit)),
            (Field::Exponent, Value::Quantity(q)) => Value::Scalar(f64::from(q.exponent)),

            (Field::X, Value::Point(x, _)) => Value::Quantity(*x),
            (Field::Y, Value::Point(_, y)) => Value::Quantity(*y),
            (Field::Length, Value::Point(x, y)) => {
                let length = point_coords(*x, *y).length();
                Value::Quantity(Quantity::with_exponent(length, x.unit, x.exponent))
            }
            (Field::Angle, Value::Point(x, y)) => {
                Value::Angle(direction(point_coords(*x, *y)))
            }

            (Field::X, Value::Vector(v)) => Value::Scalar(v.x),
            (Field::Y, Value::Vector(v)) => Value::Scalar(v.y),
            (Field::Length, Value::Vector(v)) => Value::Scalar(v.length()),
            (Field::Angle, Value::Vector(v)) => Value::Angle(direction(*v)),

            (Field::Degrees, Value::Angle(a)) => Value::Scalar(a.degrees()),
            (Field::Radians, Value::Angle(a)) => Value::Scalar(a.radians()),
            (Field::Sin, Value::Angle(a)) => Value::Scalar(a.radians().sin()),
            (Field::Cos, Value::Angle(a)) => Value::Scalar(a.radians().cos()),
            (Field::Tan, Value::Angle(a)) => Value::Scalar(a.radians().tan()),

            (Field::Red, Value::Color(c)) => Value::Scalar(c.red),
            (Field::Green, Value::Color(c)) => Value::Scalar(c.green),
            (Field::Blue, Value::Color(c)) => Value::Scalar(c.blue),
            (Field::Alpha, Value::Color(c)) => Value::Scalar(c.alpha),

            (Field::Length, Value::Text(s)) => Value::Scalar(s.chars().count() as f64),

            (field, _) => {
                return Err(ValueError::new(format!("{} not found", field.name())));
            }
        })
    }
}

// ============================================================================
// Methods
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Abs,
    Round,
    Rotate,
    Distance,
    Normalise,
    Dot,
    Brighter,
    Darker,
    WithAlpha,
    ToUpper,
    ToLower,
}

const SCALAR_METHODS: &[Method] = &[Method::Abs, Method::Round];
const QUANTITY_METHODS: &[Method] = &[Method::Abs];
const POINT_METHODS: &[Method] = &[Method::Rotate, Method::Distance, Method::Normalise];
const VECTOR_METHODS: &[Method] = &[Method::Normalise, Method::Rotate, Method::Dot];
const COLOR_METHODS: &[Method] = &[Method::Brighter, Method::Darker, Method::WithAlpha];
const TEXT_METHODS: &[Method] = &[Method::ToUpper, Method::ToLower];

/// Methods callable on values of `kind`
pub fn methods(kind: Kind) -> &'static [Method] {
    match kind {
        Kind::Scalar => SCALAR_METHODS,
        Kind::Quantity => QUANTITY_METHODS,
        Kind::Point => POINT_METHODS,
        Kind::Vector => VECTOR_METHODS,
        Kind::Color => COLOR_METHODS,
        Kind::Text => TEXT_METHODS,
        Kind::Angle | Kind::Bool => &[],
    }
}

pub fn method(kind: Kind, name: &str) -> Option<Method> {
    methods(kind).iter().copied().find(|m| m.name() == name)
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Abs => "abs",
            Method::Round => "round",
            Method::Rotate => "rotate",
            Method::Distance => "distance",
            Method::Normalise => "normalise",
            Method::Dot => "dot",
            Method::Brighter => "brighter",
            Method::Darker => "darker",
            Method::WithAlpha => "withAlpha",
            Method::ToUpper => "toUpper",
            Method::ToLower => "toLower",
        }
    }

    /// Number of arguments besides the receiver
    pub fn arity(self) -> usize {
        match self {
            Method::Rotate | Method::Distance | Method::Dot | Method::WithAlpha => 1,
            _ => 0,
        }
    }

    pub fn apply(self, receiver: &Value, args: &[Value]) -> Result<Value, ValueError> {
        if args.len() != self.arity() {
            return Err(ValueError::new(format!(
                "{} expects {} argument{}, got {}",
                self.name(),
                self.arity(),
                if self.arity() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        Ok(match (self, receiver) {
            (Method::Abs, Value::Scalar(s)) => Value::Scalar(s.abs()),
            (Method::Abs, Value::Quantity(q)) => Value::Quantity(q.abs()),
            (Method::Round, Value::Scalar(s)) => Value::Scalar(s.round()),

            (Method::Rotate, Value::Point(x, y)) => {
                let by = angle_arg(&args[0])?;
                let rotated = DVec2::from_angle(by.radians()).rotate(point_coords(*x, *y));
                point_from(rotated, *x)
            }
            (Method::Distance, Value::Point(x, y)) => {
                let Value::Point(ox, oy) = &args[0] else {
                    return Err(expected("Point", args[0].kind()));
                };
                if !x.same_dimension(*ox) {
                    return Err(ValueError::new("cannot measure between points of different dimension"));
                }
                let here = point_coords(*x, *y);
                let there = DVec2::new(ox.in_unit(x.unit), oy.in_unit(x.unit));
                Value::Quantity(Quantity::with_exponent(
                    here.distance(there),
                    x.unit,
                    x.exponent,
                ))
            }
            (Method::Normalise, Value::Point(x, y)) => {
                Value::Vector(normalised(point_coords(*x, *y))?)
            }

            (Method::Normalise, Value::Vector(v)) => Value::Vector(normalised(*v)?),
            (Method::Rotate, Value::Vector(v)) => {
                let by = angle_arg(&args[0])?;
                Value::Vector(DVec2::from_angle(by.radians()).rotate(*v))
            }
            (Method::Dot, Value::Vector(v)) => {
                let Value::Vector(other) = &args[0] else {
                    return Err(expected("Vector", args[0].kind()));
                };
                Value::Scalar(v.dot(*other))
            }

            (Method::Brighter, Value::Color(c)) => Value::Color(c.brighter()),
            (Method::Darker, Value::Color(c)) => Value::Color(c.darker()),
            (Method::WithAlpha, Value::Color(c)) => {
                Value::Color(c.with_alpha(scalar_arg(&args[0])?))
            }

            (Method::ToUpper, Value::Text(s)) => Value::Text(s.to_uppercase()),
            (Method::ToLower, Value::Text(s)) => Value::Text(s.to_lowercase()),

            (method, _) => {
                return Err(ValueError::new(format!("{} not found", method.name())));
            }
        })
    }
}

// ============================================================================
// Global functions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Dimension2,
    Vector,
    Color,
    Sqrt,
    Abs,
    Min,
    Max,
    If,
}

impl Function {
    pub const ALL: [Function; 8] = [
        Function::Dimension2,
        Function::Vector,
        Function::Color,
        Function::Sqrt,
        Function::Abs,
        Function::Min,
        Function::Max,
        Function::If,
    ];

    pub fn from_name(name: &str) -> Option<Function> {
        Function::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Dimension2 => "Dimension2",
            Function::Vector => "Vector",
            Function::Color => "Color",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::If => "if",
        }
    }

    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Function::Dimension2 | Function::Vector | Function::Min | Function::Max => 2..=2,
            Function::Color => 3..=4,
            Function::Sqrt | Function::Abs => 1..=1,
            Function::If => 3..=3,
        }
    }

    /// `"Dimension2 expects 2 arguments, got 3"`
    pub fn arity_message(self, got: usize) -> String {
        let arity = self.arity();
        let wanted = if arity.start() == arity.end() {
            arity.start().to_string()
        } else {
            format!("{} to {}", arity.start(), arity.end())
        };
        let plural = if *arity.end() == 1 { "" } else { "s" };
        format!("{} expects {wanted} argument{plural}, got {got}", self.name())
    }

    pub fn apply(self, args: &[Value]) -> Result<Value, ValueError> {
        if !self.arity().contains(&args.len()) {
            return Err(ValueError::new(self.arity_message(args.len())));
        }
        Ok(match (self, args) {
            (Function::Dimension2, [Value::Quantity(x), Value::Quantity(y)]) => {
                if !x.same_dimension(*y) {
                    return Err(ValueError::new(
                        "Dimension2 expects quantities of the same dimension",
                    ));
                }
                Value::Point(*x, *y)
            }
            (Function::Dimension2, [x, y]) => {
                return Err(ValueError::new(format!(
                    "Dimension2 expects Quantity arguments, got {} and {}",
                    x.kind(),
                    y.kind()
                )));
            }
            (Function::Vector, [x, y]) => Value::Vector(DVec2::new(scalar_arg(x)?, scalar_arg(y)?)),
            (Function::Color, [r, g, b]) => {
                Value::Color(Color::rgb(scalar_arg(r)?, scalar_arg(g)?, scalar_arg(b)?))
            }
            (Function::Color, [r, g, b, a]) => Value::Color(Color::new(
                scalar_arg(r)?,
                scalar_arg(g)?,
                scalar_arg(b)?,
                scalar_arg(a)?,
            )),
            (Function::Sqrt, [Value::Scalar(s)]) => {
                if *s < 0.0 {
                    return Err(ValueError::new("sqrt of a negative number"));
                }
                Value::Scalar(s.sqrt())
            }
            (Function::Sqrt, [Value::Quantity(q)]) => Value::Quantity(q.sqrt().ok_or_else(|| {
                ValueError::new(format!(
                    "sqrt needs a non-negative quantity with an even exponent, got {q}"
                ))
            })?),
            (Function::Abs, [Value::Scalar(s)]) => Value::Scalar(s.abs()),
            (Function::Abs, [Value::Quantity(q)]) => Value::Quantity(q.abs()),
            (Function::Abs, [Value::Angle(a)]) => Value::Angle(Angle(a.radians().abs())),
            (Function::Min | Function::Max, [a, b]) => {
                let less = value::apply_binary(BinaryOp::Lt, a, b)?;
                let pick_a = (less == Value::Bool(true)) == (self == Function::Min);
                if pick_a { a.clone() } else { b.clone() }
            }
            (Function::If, [condition, then, otherwise]) => match condition {
                Value::Bool(true) => then.clone(),
                Value::Bool(false) => otherwise.clone(),
                other => return Err(expected("Bool", other.kind())),
            },
            (function, args) => {
                let kinds: Vec<String> = args.iter().map(|a| a.kind().to_string()).collect();
                return Err(ValueError::new(format!(
                    "cannot apply {} to {}",
                    function.name(),
                    kinds.join(", ")
                )));
            }
        })
    }
}

// ============================================================================
// Unit suffixes and constants
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Length(Unit),
    Degrees,
    Radians,
}

impl Conversion {
    pub fn from_suffix(suffix: &str) -> Option<Conversion> {
        match suffix {
            "deg" => Some(Conversion::Degrees),
            "rad" => Some(Conversion::Radians),
            other => Unit::from_symbol(other).map(Conversion::Length),
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Conversion::Length(unit) => unit.symbol(),
            Conversion::Degrees => "deg",
            Conversion::Radians => "rad",
        }
    }

    pub fn apply(self, operand: &Value) -> Result<Value, ValueError> {
        let Value::Scalar(n) = operand else {
            return Err(ValueError::new(format!(
                "unit suffix {} needs a number, got {}",
                self.suffix(),
                operand.kind()
            )));
        };
        Ok(match self {
            Conversion::Length(unit) => Value::Quantity(Quantity::new(*n, unit)),
            Conversion::Degrees => Value::Angle(Angle::from_degrees(*n)),
            Conversion::Radians => Value::Angle(Angle(*n)),
        })
    }
}

/// Names usable in any formula unless the scope shadows them
pub fn constant(name: &str) -> Option<Value> {
    Some(match name {
        "PI" => Value::Scalar(PI),
        "Black" => Value::Color(Color::BLACK),
        "White" => Value::Color(Color::rgb(1.0, 1.0, 1.0)),
        "Transparent" => Value::Color(Color::new(0.0, 0.0, 0.0, 0.0)),
        _ => return None,
    })
}

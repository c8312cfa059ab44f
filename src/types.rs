//! Strongly-typed numeric primitives: units, quantities, angles, colors.
//!
//! These carry the dimensional rules; `value::Value` wraps them into the
//! closed set of runtime kinds a formula can produce.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::defaults::{EPSILON, MM_PER_INCH, POINTS_PER_INCH, SHADE_FACTOR};

/// Error type for invalid numeric values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericError {
    /// Value is NaN
    NaN,
    /// Value is infinite
    Infinite,
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericError::NaN => write!(f, "value is NaN"),
            NumericError::Infinite => write!(f, "value is infinite"),
        }
    }
}

impl std::error::Error for NumericError {}

/// Reject NaN and infinities coming from user input or arithmetic.
pub fn finite(val: f64) -> Result<f64, NumericError> {
    if val.is_nan() {
        Err(NumericError::NaN)
    } else if val.is_infinite() {
        Err(NumericError::Infinite)
    } else {
        Ok(val)
    }
}

/// Relative comparison used for value equality.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Format a number the way formulas spell it: no exponent notation, no
/// trailing `.0`, float noise below 1e-9 rounded away.
pub fn format_number(val: f64) -> String {
    let rounded = (val * 1e9).round() / 1e9;
    let val = if (rounded - val).abs() < 1e-12 * val.abs().max(1.0) {
        rounded
    } else {
        val
    };
    if val == 0.0 {
        // Avoid "-0".
        return "0".to_string();
    }
    format!("{val}")
}

// ============================================================================
// Units
// ============================================================================

/// Length units a quantity can be expressed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Millimetre,
    Centimetre,
    Metre,
    Kilometre,
    Inch,
    Point,
}

impl Unit {
    pub const ALL: [Unit; 6] = [
        Unit::Millimetre,
        Unit::Centimetre,
        Unit::Metre,
        Unit::Kilometre,
        Unit::Inch,
        Unit::Point,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Millimetre => "mm",
            Unit::Centimetre => "cm",
            Unit::Metre => "m",
            Unit::Kilometre => "km",
            Unit::Inch => "in",
            Unit::Point => "pt",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Unit> {
        Unit::ALL.into_iter().find(|u| u.symbol() == symbol)
    }

    /// Size of one of this unit in millimetres
    pub fn millimetres(self) -> f64 {
        match self {
            Unit::Millimetre => 1.0,
            Unit::Centimetre => 10.0,
            Unit::Metre => 1_000.0,
            Unit::Kilometre => 1_000_000.0,
            Unit::Inch => MM_PER_INCH,
            Unit::Point => MM_PER_INCH / POINTS_PER_INCH,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ============================================================================
// Quantity
// ============================================================================

/// A physical dimension: magnitude in `unit` raised to `exponent`.
///
/// `exponent` 1 is a length, 2 an area, 0 a dimensionless ratio. Formulas
/// can only build whole exponents, so the type keeps them whole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Unit,
    pub exponent: i32,
}

impl Quantity {
    /// A length (exponent 1)
    pub fn new(magnitude: f64, unit: Unit) -> Self {
        Quantity {
            magnitude,
            unit,
            exponent: 1,
        }
    }

    pub fn with_exponent(magnitude: f64, unit: Unit, exponent: i32) -> Self {
        Quantity {
            magnitude,
            unit,
            exponent,
        }
    }

    pub fn is_dimensionless(self) -> bool {
        self.exponent == 0
    }

    pub fn same_dimension(self, other: Quantity) -> bool {
        self.exponent == other.exponent
    }

    /// Magnitude of this quantity expressed in `unit` (same exponent)
    pub fn in_unit(self, unit: Unit) -> f64 {
        let ratio = self.unit.millimetres() / unit.millimetres();
        self.magnitude * ratio.powi(self.exponent)
    }

    pub fn convert(self, unit: Unit) -> Quantity {
        Quantity::with_exponent(self.in_unit(unit), unit, self.exponent)
    }

    /// Sum in the left operand's unit; `None` when exponents differ.
    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        if !self.same_dimension(rhs) {
            return None;
        }
        Some(Quantity::with_exponent(
            self.magnitude + rhs.in_unit(self.unit),
            self.unit,
            self.exponent,
        ))
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.checked_add(-rhs)
    }

    /// Product in the left operand's unit; exponents add.
    pub fn product(self, rhs: Quantity) -> Quantity {
        let rhs = Quantity::with_exponent(rhs.in_unit(self.unit), self.unit, rhs.exponent);
        Quantity::with_exponent(
            self.magnitude * rhs.magnitude,
            self.unit,
            self.exponent + rhs.exponent,
        )
    }

    /// Quotient in the left operand's unit; exponents subtract.
    /// `None` when the divisor is zero.
    pub fn quotient(self, rhs: Quantity) -> Option<Quantity> {
        let divisor = rhs.in_unit(self.unit);
        if divisor == 0.0 {
            return None;
        }
        Some(Quantity::with_exponent(
            self.magnitude / divisor,
            self.unit,
            self.exponent - rhs.exponent,
        ))
    }

    /// Square root; `None` for negative magnitudes or odd exponents.
    pub fn sqrt(self) -> Option<Quantity> {
        if self.magnitude < 0.0 || self.exponent % 2 != 0 {
            return None;
        }
        Some(Quantity::with_exponent(
            self.magnitude.sqrt(),
            self.unit,
            self.exponent / 2,
        ))
    }

    pub fn abs(self) -> Quantity {
        Quantity::with_exponent(self.magnitude.abs(), self.unit, self.exponent)
    }

    pub fn approx_eq(self, other: Quantity) -> bool {
        self.same_dimension(other) && approx_eq(self.magnitude, other.in_unit(self.unit))
    }

    pub fn partial_cmp_value(self, other: Quantity) -> Option<std::cmp::Ordering> {
        if !self.same_dimension(other) {
            return None;
        }
        self.magnitude.partial_cmp(&other.in_unit(self.unit))
    }

    /// Formula text that parses back to this quantity.
    ///
    /// Exponents other than 1 are spelled as products/quotients of unit
    /// literals (`16mm * 1mm`, `5mm / 1mm`).
    pub fn to_formula_string(self) -> String {
        let sym = self.unit.symbol();
        let magnitude = format_number(self.magnitude);
        match self.exponent {
            1 => format!("{magnitude}{sym}"),
            0 => format!("{magnitude}{sym} / 1{sym}"),
            e if e > 1 => {
                let mut out = format!("{magnitude}{sym}");
                for _ in 1..e {
                    out.push_str(&format!(" * 1{sym}"));
                }
                out
            }
            e => {
                let mut out = magnitude;
                for _ in e..0 {
                    out.push_str(&format!(" / 1{sym}"));
                }
                out
            }
        }
    }
}

impl Neg for Quantity {
    type Output = Quantity;
    fn neg(self) -> Quantity {
        Quantity::with_exponent(-self.magnitude, self.unit, self.exponent)
    }
}

impl Mul<f64> for Quantity {
    type Output = Quantity;
    fn mul(self, rhs: f64) -> Quantity {
        Quantity::with_exponent(self.magnitude * rhs, self.unit, self.exponent)
    }
}

impl Div<f64> for Quantity {
    type Output = Quantity;
    fn div(self, rhs: f64) -> Quantity {
        Quantity::with_exponent(self.magnitude / rhs, self.unit, self.exponent)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = self.unit.symbol();
        let magnitude = format_number(self.magnitude);
        if self.exponent == 1 {
            write!(f, "{magnitude}{sym}")
        } else {
            write!(f, "{magnitude}{sym}^{}", self.exponent)
        }
    }
}

// ============================================================================
// Angle
// ============================================================================

/// Angle in radians
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default)]
#[repr(transparent)]
pub struct Angle(pub f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn from_degrees(degrees: f64) -> Angle {
        Angle(degrees.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    pub fn to_formula_string(self) -> String {
        format!("{}deg", format_number(self.degrees()))
    }
}

impl Add for Angle {
    type Output = Angle;
    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;
    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl Mul<f64> for Angle {
    type Output = Angle;
    fn mul(self, rhs: f64) -> Angle {
        Angle(self.0 * rhs)
    }
}

impl Div<f64> for Angle {
    type Output = Angle;
    fn div(self, rhs: f64) -> Angle {
        Angle(self.0 / rhs)
    }
}

impl Neg for Angle {
    type Output = Angle;
    fn neg(self) -> Angle {
        Angle(-self.0)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", format_number(self.degrees()))
    }
}

// ============================================================================
// Color
// ============================================================================

/// RGBA color with components in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        red: 0.0,
        green: 0.0,
        blue: 0.0,
        alpha: 1.0,
    };

    /// Components outside `[0, 1]` are clamped.
    pub fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Color {
        Color {
            red: red.clamp(0.0, 1.0),
            green: green.clamp(0.0, 1.0),
            blue: blue.clamp(0.0, 1.0),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    pub fn rgb(red: f64, green: f64, blue: f64) -> Color {
        Color::new(red, green, blue, 1.0)
    }

    pub fn brighter(self) -> Color {
        Color::new(
            self.red / SHADE_FACTOR,
            self.green / SHADE_FACTOR,
            self.blue / SHADE_FACTOR,
            self.alpha,
        )
    }

    pub fn darker(self) -> Color {
        Color::new(
            self.red * SHADE_FACTOR,
            self.green * SHADE_FACTOR,
            self.blue * SHADE_FACTOR,
            self.alpha,
        )
    }

    pub fn with_alpha(self, alpha: f64) -> Color {
        Color::new(self.red, self.green, self.blue, alpha)
    }

    pub fn approx_eq(self, other: Color) -> bool {
        approx_eq(self.red, other.red)
            && approx_eq(self.green, other.green)
            && approx_eq(self.blue, other.blue)
            && approx_eq(self.alpha, other.alpha)
    }

    pub fn to_formula_string(self) -> String {
        format!(
            "Color({}, {}, {}, {})",
            format_number(self.red),
            format_number(self.green),
            format_number(self.blue),
            format_number(self.alpha)
        )
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = |c: f64| (c * 255.0).round() as u8;
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.red),
            byte(self.green),
            byte(self.blue),
            byte(self.alpha)
        )
    }
}

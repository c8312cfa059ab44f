//! Formula engine for a vector-diagram editor.
//!
//! Shape properties (sizes, positions, colors, labels) are nodes in a lazy
//! reactive graph. A node is a constant, a variable set by the application,
//! or an expression whose formula text is parsed into calculation nodes over
//! other properties. Values carry units, and dimensional mismatches are
//! rejected at the operator that caused them. Edits go through an undo
//! history with batching and merging.
//!
//! ```
//! use draftsman::Record;
//!
//! let shape = Record::new();
//! shape.variable("Width", draftsman::evaluate("20mm").unwrap());
//! let half = shape.expression("Half", "Width / 2");
//! assert_eq!(half.value().unwrap().to_formula_string(), "10mm");
//! ```

pub mod defaults;
pub mod dispatch;
pub mod errors;
pub mod history;
pub mod lexer;
pub mod log;
pub mod parser;
pub mod prop;
pub mod scope;
pub mod types;
pub mod value;

pub use errors::{ErrorKind, FormulaError, PropError, ValueError};
pub use history::{Batch, Change, FormulaChange, History, ValueChange};
pub use parser::parse;
pub use prop::{Prop, Subscription};
pub use scope::{EmptyScope, Member, Record, Scope};
pub use types::{Angle, Color, Quantity, Unit};
pub use value::{Kind, Value};

/// Evaluate a standalone formula (literals and builtins only).
pub fn evaluate(formula: &str) -> Result<Value, FormulaError> {
    parser::evaluate(formula, &EmptyScope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_values() {
        let sum = evaluate("(1mm + 2cm).mm").unwrap();
        assert_eq!(sum.approx_eq(&Value::Scalar(21.0)), Some(true));

        let scaled = evaluate("2cm * 4").unwrap();
        let q = scaled.as_quantity().unwrap();
        assert_eq!(q.exponent, 1);
        assert!(types::approx_eq(q.in_unit(Unit::Centimetre), 8.0));

        let area = evaluate("2mm * 8mm").unwrap().as_quantity().unwrap();
        assert_eq!(area.exponent, 2);
        assert!(types::approx_eq(area.magnitude, 16.0));

        assert_eq!(evaluate("10mm == 1cm").unwrap(), Value::Bool(true));
    }

    #[test]
    fn point_plus_scalar_is_an_eval_error() {
        let err = evaluate("Dimension2(1mm, 1mm) + 5").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Eval);
    }
}

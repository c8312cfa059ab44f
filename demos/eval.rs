//! Evaluate a formula against a small sample shape.
//!
//! ```text
//! cargo run --example eval -- "Width / 2 + Margin"
//! RUST_LOG=draftsman=trace cargo run --example eval --features tracing -- "Corner.X"
//! ```

use draftsman::{Quantity, Record, Unit, Value};
use tracing_subscriber::EnvFilter;

fn mm(v: f64) -> Value {
    Value::Quantity(Quantity::new(v, Unit::Millimetre))
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let document = Record::new();
    document.variable("Margin", mm(2.0));

    let shape = Record::with_parent(document);
    shape.variable("Width", mm(40.0));
    shape.variable("Height", mm(25.0));
    shape.expression("Corner", "Dimension2(Width, Height)");
    shape.expression("Fill", "Color(0.2, 0.4, 0.8)");
    shape.expression("Title", "\"Box \" + \"A\"");

    let formula = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Corner.distance(Dimension2(0mm, 0mm)) - Margin".to_string());

    let result = shape.expression("Result", formula);
    let value = result.value()?;
    println!("{}", value.to_formula_string());
    Ok(())
}

//! Scripted editing session: a width field typed in three keystrokes, a
//! dependent label, then undo and redo.
//!
//! ```text
//! RUST_LOG=draftsman=debug cargo run --example undo --features tracing
//! ```

use std::cell::Cell;
use std::rc::Rc;

use draftsman::{FormulaChange, History, Prop, PropError, Record};
use tracing_subscriber::EnvFilter;

fn show(label: &str, width: &Prop, caption: &Prop) -> miette::Result<()> {
    let width = width.value()?;
    let caption = caption.value()?;
    tracing::info!(step = label, %width, %caption, "state");
    println!(
        "{label:>10}: Width = {:<6} Caption = {caption}",
        width.to_formula_string()
    );
    Ok(())
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("draftsman=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let shape = Record::new();
    let width = shape.expression("Width", "10mm");
    let caption = shape.expression("Caption", "\"width: \" + Width");

    let redraws = Rc::new(Cell::new(0u32));
    let counter = redraws.clone();
    let _redraw = caption.on_change(move || counter.set(counter.get() + 1));

    let mut history = History::new();
    show("initial", &width, &caption)?;

    // Each keystroke is its own edit; the open batch folds them together.
    history.begin_batch();
    for typed in ["2", "20", "20mm"] {
        match FormulaChange::new(&width, typed) {
            Ok(change) => history.make_change(change),
            Err(PropError::Formula(err)) => {
                tracing::warn!(formula = typed, error = %err, "keystroke rejected");
            }
            Err(err) => return Err(err.into()),
        }
    }
    history.end_batch();
    show("typed", &width, &caption)?;

    if let Err(err) = FormulaChange::new(&width, "20mm +") {
        eprintln!("{:?}", miette::Report::new(err));
    }

    history.undo();
    show("undo", &width, &caption)?;
    history.redo();
    show("redo", &width, &caption)?;

    println!(
        "{} undo step(s), {} redraw notification(s)",
        history.len(),
        redraws.get()
    );
    Ok(())
}

use draftsman::{
    Change, FormulaChange, History, PropError, Quantity, Record, Unit, Value, ValueChange,
};

fn width_record() -> (std::rc::Rc<Record>, draftsman::Prop) {
    let shape = Record::new();
    let width = shape.expression("Width", "10mm");
    (shape, width)
}

fn edit(history: &mut History, prop: &draftsman::Prop, formula: &str) {
    let change = FormulaChange::new(prop, formula).unwrap();
    history.make_change(change);
}

#[test]
fn batch_of_edits_is_one_undo_step() {
    let (_shape, width) = width_record();
    let mut history = History::new();

    history.begin_batch();
    edit(&mut history, &width, "20mm");
    edit(&mut history, &width, "30mm");
    history.end_batch();

    assert_eq!(history.len(), 1);
    assert_eq!(history.batch(0).map(|b| b.len()), Some(1));
    insta::assert_snapshot!(width.value().unwrap().to_string(), @"30mm");

    assert!(history.undo());
    assert_eq!(width.formula().as_deref(), Some("10mm"));
    insta::assert_snapshot!(width.value().unwrap().to_string(), @"10mm");

    assert!(history.redo());
    assert_eq!(width.formula().as_deref(), Some("30mm"));
    insta::assert_snapshot!(width.value().unwrap().to_string(), @"30mm");
}

#[test]
fn new_change_after_undo_drops_redo() {
    let (_shape, width) = width_record();
    let mut history = History::new();
    edit(&mut history, &width, "20mm");
    edit(&mut history, &width, "30mm");
    assert_eq!(history.len(), 2);

    history.undo();
    assert!(history.can_redo());

    edit(&mut history, &width, "40mm");
    assert!(!history.can_redo());
    assert_eq!(history.len(), 2);

    history.undo();
    assert_eq!(width.formula().as_deref(), Some("20mm"));
}

#[test]
fn separate_steps_do_not_merge() {
    let (_shape, width) = width_record();
    let mut history = History::new();
    edit(&mut history, &width, "20mm");
    edit(&mut history, &width, "30mm");

    history.undo();
    assert_eq!(width.formula().as_deref(), Some("20mm"));
    history.undo();
    assert_eq!(width.formula().as_deref(), Some("10mm"));
    assert!(!history.can_undo());
}

#[test]
fn changes_to_different_targets_stay_separate() {
    let shape = Record::new();
    let width = shape.expression("Width", "10mm");
    let height = shape.expression("Height", "5mm");
    let mut history = History::new();

    history.begin_batch();
    edit(&mut history, &width, "20mm");
    edit(&mut history, &height, "Width / 2");
    edit(&mut history, &width, "30mm");
    history.end_batch();

    assert_eq!(history.batch(0).map(|b| b.len()), Some(3));
    insta::assert_snapshot!(height.value().unwrap().to_string(), @"15mm");

    history.undo();
    assert_eq!(width.formula().as_deref(), Some("10mm"));
    assert_eq!(height.formula().as_deref(), Some("5mm"));
}

#[test]
fn multi_expression_change_applies_together() {
    let shape = Record::new();
    let left = shape.expression("Left", "0mm");
    let right = shape.expression("Right", "10mm");
    let mut history = History::new();

    let change = FormulaChange::many([
        (left.clone(), "5mm".to_string()),
        (right.clone(), "Left + 10mm".to_string()),
    ])
    .unwrap();
    assert_eq!(change.edits().len(), 2);
    history.make_change(change);
    insta::assert_snapshot!(right.value().unwrap().to_string(), @"15mm");

    history.undo();
    assert_eq!(left.formula().as_deref(), Some("0mm"));
    assert_eq!(right.formula().as_deref(), Some("10mm"));
}

#[test]
fn invalid_formula_is_rejected_before_recording() {
    let (_shape, width) = width_record();
    let err = FormulaChange::new(&width, "10mm +").unwrap_err();
    let PropError::Formula(err) = err else {
        panic!("expected formula error, got {err:?}");
    };
    insta::assert_snapshot!(err.to_string(), @"missing operand for '+'");
    assert_eq!(width.formula().as_deref(), Some("10mm"));
}

#[test]
fn edits_that_close_a_cycle_together_are_rejected() {
    let shape = Record::new();
    let left = shape.expression("Left", "1mm");
    let right = shape.expression("Right", "2mm");

    let err = FormulaChange::many([
        (left.clone(), "Right + 1mm".to_string()),
        (right.clone(), "Left + 1mm".to_string()),
    ])
    .unwrap_err();
    let PropError::Formula(err) = err else {
        panic!("expected formula error, got {err:?}");
    };
    insta::assert_snapshot!(err.to_string(), @"cyclic reference");

    assert_eq!(left.formula().as_deref(), Some("1mm"));
    assert_eq!(right.formula().as_deref(), Some("2mm"));
    insta::assert_snapshot!(right.value().unwrap().to_string(), @"2mm");
}

#[test]
fn edits_that_reverse_a_dependency_are_checked_together() {
    let shape = Record::new();
    let left = shape.expression("Left", "Right + 1mm");
    let right = shape.expression("Right", "1mm");
    insta::assert_snapshot!(left.value().unwrap().to_string(), @"2mm");

    // Alone, the second edit would close a cycle through Left's old formula.
    assert!(right.check_formula("Left + 1mm").is_err());

    let mut history = History::new();
    let change = FormulaChange::many([
        (left.clone(), "2mm".to_string()),
        (right.clone(), "Left + 1mm".to_string()),
    ])
    .unwrap();
    history.make_change(change);
    insta::assert_snapshot!(right.value().unwrap().to_string(), @"3mm");

    history.undo();
    insta::assert_snapshot!(left.value().unwrap().to_string(), @"2mm");
    insta::assert_snapshot!(right.value().unwrap().to_string(), @"1mm");
}

#[test]
fn formula_change_needs_an_expression() {
    let shape = Record::new();
    let fixed = shape.variable("Fixed", 1.0);
    assert_eq!(
        FormulaChange::new(&fixed, "2").unwrap_err(),
        PropError::NotAnExpression
    );
    let formula = shape.expression("Formula", "1");
    assert_eq!(
        ValueChange::new(&formula, 2.0).unwrap_err(),
        PropError::NotAVariable
    );
}

#[test]
fn value_changes_merge_within_a_batch() {
    let shape = Record::new();
    let size = shape.variable("Size", Value::Quantity(Quantity::new(1.0, Unit::Centimetre)));
    let doubled = shape.expression("Doubled", "Size * 2");
    let mut history = History::new();

    history.begin_batch();
    for step in 2..=4 {
        let value = Value::Quantity(Quantity::new(step as f64, Unit::Centimetre));
        history.make_change(ValueChange::new(&size, value).unwrap());
    }
    history.end_batch();

    let batch = history.batch(0).unwrap();
    assert_eq!(batch.len(), 1);
    insta::assert_snapshot!(batch.describe(), @"set value to 4cm");
    insta::assert_snapshot!(doubled.value().unwrap().to_string(), @"8cm");

    history.undo();
    insta::assert_snapshot!(doubled.value().unwrap().to_string(), @"2cm");
}

#[test]
fn nested_batch_merges_only_within_its_level() {
    let (_shape, width) = width_record();
    let mut history = History::new();

    history.begin_batch();
    edit(&mut history, &width, "20mm");
    history.begin_batch();
    edit(&mut history, &width, "30mm");
    edit(&mut history, &width, "40mm");
    history.end_batch();
    history.end_batch();

    let batch = history.batch(0).unwrap();
    assert_eq!(batch.len(), 2);
    let described: Vec<String> = batch.changes().map(|c| c.describe()).collect();
    assert_eq!(described, ["set formula to 20mm", "set formula to 40mm"]);

    history.undo();
    assert_eq!(width.formula().as_deref(), Some("10mm"));
}

#[test]
fn abandoned_inner_level_restores_graph() {
    let (_shape, width) = width_record();
    let mut history = History::new();

    history.begin_batch();
    edit(&mut history, &width, "20mm");
    history.begin_batch();
    edit(&mut history, &width, "99mm");
    history.abandon_batch();
    assert_eq!(width.formula().as_deref(), Some("20mm"));
    history.end_batch();

    assert_eq!(history.len(), 1);
    history.undo();
    assert_eq!(width.formula().as_deref(), Some("10mm"));
}

#[test]
fn abandoned_outer_batch_commits_nothing() {
    let (_shape, width) = width_record();
    let mut history = History::new();

    history.begin_batch();
    edit(&mut history, &width, "20mm");
    edit(&mut history, &width, "30mm");
    history.abandon_batch();

    assert!(!history.is_batch_open());
    assert!(history.is_empty());
    assert_eq!(width.formula().as_deref(), Some("10mm"));
    insta::assert_snapshot!(width.value().unwrap().to_string(), @"10mm");
}

#[test]
fn saved_state_follows_undo_and_redo() {
    let (_shape, width) = width_record();
    let mut history = History::new();
    assert!(history.is_saved());

    edit(&mut history, &width, "20mm");
    assert!(!history.is_saved());
    history.mark_saved();

    edit(&mut history, &width, "30mm");
    assert!(!history.is_saved());
    history.undo();
    assert!(history.is_saved());

    // Branching away from the saved point and back is not the saved state.
    history.undo();
    edit(&mut history, &width, "25mm");
    assert!(!history.is_saved());
    history.undo();
    assert!(!history.is_saved());
    assert_eq!(history.current_index(), 0);
}

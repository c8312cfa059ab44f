use std::cell::Cell;
use std::rc::Rc;

use draftsman::{
    Angle, Color, EmptyScope, ErrorKind, Prop, Quantity, Record, Unit, Value, evaluate, parse,
};
use glam::DVec2;
use miette::Diagnostic;

fn mm(v: f64) -> Value {
    Value::Quantity(Quantity::new(v, Unit::Millimetre))
}

#[test]
fn dirty_propagates_through_a_chain() {
    let shape = Record::new();
    let a = shape.variable("A", mm(1.0));
    let b = shape.expression("B", "A * 2");
    let c = shape.expression("C", "B + 1mm");

    insta::assert_snapshot!(c.value().unwrap().to_string(), @"3mm");
    assert_eq!(b.evaluations(), 1);
    assert_eq!(c.evaluations(), 1);
    assert!(!b.is_dirty());
    assert!(!c.is_dirty());

    a.set(mm(5.0)).unwrap();
    assert!(b.is_dirty());
    assert!(c.is_dirty());
    // Notification alone computes nothing.
    assert_eq!(b.evaluations(), 1);
    assert_eq!(c.evaluations(), 1);

    insta::assert_snapshot!(c.value().unwrap().to_string(), @"11mm");
    assert_eq!(b.evaluations(), 2);
    assert_eq!(c.evaluations(), 2);
}

#[test]
fn unread_nodes_stay_lazy() {
    let shape = Record::new();
    let width = shape.variable("Width", mm(10.0));
    let area = shape.expression("Area", "Width * Width");
    area.value().unwrap();
    let before = area.evaluations();

    for step in 1..=5 {
        width.set(mm(step as f64)).unwrap();
    }
    assert_eq!(area.evaluations(), before);

    let area_value = area.value().unwrap().as_quantity().unwrap();
    assert_eq!(area.evaluations(), before + 1);
    assert_eq!(area_value.exponent, 2);
    assert_eq!(area_value.magnitude, 25.0);
}

#[test]
fn setting_the_same_value_is_silent() {
    let shape = Record::new();
    let width = shape.variable("Width", mm(10.0));
    let double = shape.expression("Double", "Width * 2");
    double.value().unwrap();

    width.set(mm(10.0)).unwrap();
    assert!(!double.is_dirty());
}

#[test]
fn redraw_callback_fires_on_change() {
    let shape = Record::new();
    let width = shape.variable("Width", mm(10.0));
    let right = shape.expression("Right", "Width + 5mm");
    right.value().unwrap();

    let redraws = Rc::new(Cell::new(0));
    let counter = redraws.clone();
    let subscription = right.on_change(move || counter.set(counter.get() + 1));

    width.set(mm(20.0)).unwrap();
    assert_eq!(redraws.get(), 1);
    right.value().unwrap();

    right.set_formula("Width + 6mm").unwrap();
    assert_eq!(redraws.get(), 2);

    drop(subscription);
    right.value().unwrap();
    width.set(mm(30.0)).unwrap();
    assert_eq!(redraws.get(), 2);
}

#[test]
fn document_constants_fall_through() {
    let document = Record::new();
    document.variable("Margin", mm(2.0));
    let shape = Record::with_parent(document.clone());
    shape.variable("Width", mm(10.0));
    let inner = shape.expression("Inner", "Width - Margin * 2");
    insta::assert_snapshot!(inner.value().unwrap().to_string(), @"6mm");

    let Some(margin) = document.prop("Margin") else {
        panic!("Margin missing");
    };
    margin.set(mm(1.0)).unwrap();
    insta::assert_snapshot!(inner.value().unwrap().to_string(), @"8mm");
}

#[test]
fn point_members_are_capitalised() {
    let shape = Record::new();
    shape.variable("Width", mm(40.0));
    shape.variable("Height", mm(25.0));
    shape.expression("Corner", "Dimension2(Width, Height)");

    let x = shape.expression("Left", "Corner.X");
    assert_eq!(x.value().unwrap(), mm(40.0));

    let lower = shape.expression("Lower", "Corner.x");
    let err = lower.value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.offset(), 7);
    insta::assert_snapshot!(err.message(), @"x not found");
}

#[test]
fn list_members_are_live() {
    let geometry = Record::new();
    let first = Prop::variable(Value::Point(
        Quantity::new(0.0, Unit::Millimetre),
        Quantity::new(0.0, Unit::Millimetre),
    ));
    let second = Prop::variable(Value::Point(
        Quantity::new(3.0, Unit::Millimetre),
        Quantity::new(4.0, Unit::Millimetre),
    ));
    geometry.push("Point", first);
    geometry.push("Point", second.clone());

    let shape = Record::new();
    shape.insert("Geometry1", geometry);
    let span = shape.expression("Span", "Geometry1.Point1.distance(Geometry1.Point2)");
    insta::assert_snapshot!(span.value().unwrap().to_string(), @"5mm");

    second
        .set(Value::Point(
            Quantity::new(6.0, Unit::Millimetre),
            Quantity::new(8.0, Unit::Millimetre),
        ))
        .unwrap();
    insta::assert_snapshot!(span.value().unwrap().to_string(), @"10mm");
}

#[test]
fn rejected_formula_leaves_previous_value() {
    let shape = Record::new();
    shape.variable("Height", mm(4.0));
    let label = shape.expression("Label", "Height * 2");
    label.value().unwrap();

    label.set_formula("Heigth * 2").unwrap();
    let err = label.value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.offset(), 0);
    assert_eq!(err.formula(), "Heigth * 2");
    insta::assert_snapshot!(err.to_string(), @"unknown identifier 'Heigth'");

    assert_eq!(label.formula().as_deref(), Some("Height * 2"));
    insta::assert_snapshot!(label.value().unwrap().to_string(), @"8mm");
}

#[test]
fn kind_change_surfaces_at_operator() {
    let shape = Record::new();
    let offset = shape.variable("Offset", mm(1.0));
    let moved = shape.expression("Moved", "Offset + 1mm");
    moved.value().unwrap();

    offset.set(Value::Bool(true)).unwrap();
    let err = moved.value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.offset(), 7);
    assert_eq!(err.formula(), "Offset + 1mm");
    insta::assert_snapshot!(err.to_string(), @"cannot apply + to Bool and Quantity");
    assert_eq!(
        err.code().map(|c| c.to_string()).as_deref(),
        Some("draftsman::eval")
    );

    offset.set(mm(2.0)).unwrap();
    insta::assert_snapshot!(moved.value().unwrap().to_string(), @"3mm");
}

#[test]
fn cycle_through_two_expressions_is_rejected() {
    let shape = Record::new();
    let a = shape.expression("A", "B + 1");
    let b = shape.expression("B", "2");
    assert_eq!(a.value().unwrap(), Value::Scalar(3.0));

    b.set_formula("A * 2").unwrap();
    let err = b.value().unwrap_err();
    assert_eq!(err.message(), "cyclic reference");
    assert_eq!(b.formula().as_deref(), Some("2"));

    assert_eq!(a.value().unwrap(), Value::Scalar(3.0));
    assert_eq!(b.value().unwrap(), Value::Scalar(2.0));
}

#[test]
fn check_formula_reports_cycles_without_installing() {
    let shape = Record::new();
    let a = shape.expression("A", "1");
    let b = shape.expression("B", "A + 1");
    b.value().unwrap();

    let err = a.check_formula("B").unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cyclic reference");
    assert_eq!(a.formula().as_deref(), Some("1"));
    assert!(!a.is_dirty());
}

#[test]
fn replaced_tree_releases_its_subscriptions() {
    let shape = Record::new();
    let width = shape.variable("Width", 1.0);
    let height = shape.variable("Height", 2.0);
    let size = shape.expression("Size", "Width * 3");
    size.value().unwrap();
    assert_eq!(width.subscriber_count(), 1);

    size.set_formula("Height").unwrap();
    size.value().unwrap();
    assert_eq!(width.subscriber_count(), 0);
    assert_eq!(height.subscriber_count(), 1);

    width.set(10.0).unwrap();
    assert!(!size.is_dirty());
}

#[test]
fn first_parse_failure_retries_once_names_exist() {
    let shape = Record::new();
    let total = shape.expression("Total", "Later + 1");
    assert!(total.value().is_err());
    assert_eq!(total.formula().as_deref(), Some("Later + 1"));

    shape.variable("Later", 4.0);
    assert_eq!(total.value().unwrap(), Value::Scalar(5.0));
}

#[test]
fn formula_strings_round_trip() {
    let samples = vec![
        Value::Scalar(-2.5),
        mm(21.0),
        Value::Quantity(Quantity::with_exponent(16.0, Unit::Millimetre, 2)),
        Value::Quantity(Quantity::with_exponent(4.0, Unit::Centimetre, 0)),
        Value::Quantity(Quantity::with_exponent(3.0, Unit::Metre, -1)),
        Value::Quantity(Quantity::with_exponent(0.5, Unit::Inch, 3)),
        Value::Quantity(Quantity::with_exponent(7.0, Unit::Point, -2)),
        Value::Quantity(Quantity::new(12.0, Unit::Point)),
        Value::Point(
            Quantity::new(1.5, Unit::Inch),
            Quantity::new(-2.0, Unit::Inch),
        ),
        Value::Vector(DVec2::new(0.25, -4.0)),
        Value::Angle(Angle::from_degrees(30.0)),
        Value::Color(Color::new(0.2, 0.4, 0.6, 0.5)),
        Value::Bool(false),
        Value::Text("line\n\"quoted\"".to_string()),
    ];
    for value in samples {
        let text = value.to_formula_string();
        let parsed = parse(&text, &EmptyScope)
            .and_then(|node| node.value())
            .unwrap_or_else(|e| panic!("{text}: {e}"));
        assert_eq!(value.approx_eq(&parsed), Some(true), "{text} gave {parsed:?}");
    }
}

#[test]
fn scenario_dimension_plus_scalar() {
    let err = evaluate("Dimension2(1mm,1mm) + 5").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eval);
    insta::assert_snapshot!(err.to_string(), @"cannot apply + to Point and Scalar");
}

fn chain(shape: &Record, links: usize) -> Prop {
    let mut last = None;
    for i in 1..=links {
        last = Some(shape.expression(format!("A{i}"), format!("A{} + 1", i - 1)));
    }
    last.unwrap()
}

#[test]
fn long_chain_evaluates_on_first_read() {
    let shape = Record::new();
    let first = shape.variable("A0", 0.0);
    let last = chain(&shape, 300);

    first.set(1.0).unwrap();
    assert_eq!(last.value().unwrap(), Value::Scalar(301.0));
    assert_eq!(last.evaluations(), 1);
}

#[test]
fn long_chain_updates_after_edit() {
    let shape = Record::new();
    let first = shape.variable("A0", 0.0);
    let last = chain(&shape, 1000);
    assert_eq!(last.value().unwrap(), Value::Scalar(1000.0));

    first.set(10.0).unwrap();
    assert!(last.is_dirty());
    assert_eq!(last.value().unwrap(), Value::Scalar(1010.0));
    assert_eq!(last.evaluations(), 2);

    let Some(middle) = shape.prop("A500") else {
        panic!("A500 missing");
    };
    assert_eq!(middle.evaluations(), 2);
}

#[test]
fn member_of_receiver_that_changed_kind() {
    let shape = Record::new();
    let size = shape.variable("Size", mm(4.0));
    let inner = shape.expression("Inner", "Size.mm * 2");
    assert_eq!(inner.value().unwrap(), Value::Scalar(8.0));

    size.set(Value::Point(
        Quantity::new(1.0, Unit::Millimetre),
        Quantity::new(2.0, Unit::Millimetre),
    ))
    .unwrap();
    let err = inner.value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.offset(), 5);
    insta::assert_snapshot!(err.to_string(), @"mm not found");
}

//! Name resolution for formulas.
//!
//! A formula's free identifiers are looked up in a [`Scope`]. The document
//! model implements it for whatever holds named properties; [`Record`] is a
//! ready-made one with named members and an optional parent.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::prop::Prop;
use crate::value::Value;

/// Something formulas can look names up in
pub trait Scope {
    fn find(&self, name: &str) -> Option<Member>;
}

/// What a name resolves to
#[derive(Clone)]
pub enum Member {
    Prop(Prop),
    Scope(Rc<dyn Scope>),
    /// Ordered members addressed as `Name1`, `Name2`, ...
    List(Vec<Member>),
}

impl Member {
    pub fn as_prop(&self) -> Option<&Prop> {
        match self {
            Member::Prop(prop) => Some(prop),
            _ => None,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Prop(prop) => f.debug_tuple("Prop").field(prop).finish(),
            Member::Scope(_) => f.write_str("Scope(..)"),
            Member::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
        }
    }
}

impl From<Prop> for Member {
    fn from(prop: Prop) -> Self {
        Member::Prop(prop)
    }
}

impl From<Rc<Record>> for Member {
    fn from(record: Rc<Record>) -> Self {
        Member::Scope(record)
    }
}

impl From<Vec<Member>> for Member {
    fn from(items: Vec<Member>) -> Self {
        Member::List(items)
    }
}

/// Look `name` up in `scope`, falling back to 1-based list indexing.
///
/// `Point3` resolves to the third element of a list member named `Point`
/// when no member is called `Point3` outright.
pub fn resolve(scope: &dyn Scope, name: &str) -> Option<Member> {
    if let Some(member) = scope.find(name) {
        return Some(member);
    }
    let (base, index) = split_index(name)?;
    match scope.find(base)? {
        Member::List(items) => items.get(index - 1).cloned(),
        _ => None,
    }
}

fn split_index(name: &str) -> Option<(&str, usize)> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || digits == name.len() {
        return None;
    }
    let (base, index) = name.split_at(name.len() - digits);
    let index: usize = index.parse().ok()?;
    (index >= 1).then_some((base, index))
}

/// A scope with no names; formulas in it can only use literals and builtins
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn find(&self, _name: &str) -> Option<Member> {
        None
    }
}

// ============================================================================
// Record
// ============================================================================

/// Named members with an optional parent scope for fall-through.
///
/// Expressions created through [`Record::expression`] hold the record
/// weakly, so a record can own formulas that refer to its own members.
pub struct Record {
    members: RefCell<BTreeMap<String, Member>>,
    parent: Option<Rc<dyn Scope>>,
    this: Weak<Record>,
}

impl Record {
    pub fn new() -> Rc<Record> {
        Record::build(None)
    }

    /// A record whose unknown names are looked up in `parent`
    pub fn with_parent(parent: Rc<dyn Scope>) -> Rc<Record> {
        Record::build(Some(parent))
    }

    fn build(parent: Option<Rc<dyn Scope>>) -> Rc<Record> {
        Rc::new_cyclic(|this| Record {
            members: RefCell::new(BTreeMap::new()),
            parent,
            this: this.clone(),
        })
    }

    pub fn insert(&self, name: impl Into<String>, member: impl Into<Member>) {
        self.members.borrow_mut().insert(name.into(), member.into());
    }

    pub fn remove(&self, name: &str) -> Option<Member> {
        self.members.borrow_mut().remove(name)
    }

    /// Own member only; no parent fall-through
    pub fn get(&self, name: &str) -> Option<Member> {
        self.members.borrow().get(name).cloned()
    }

    /// Own property member named `name`
    pub fn prop(&self, name: &str) -> Option<Prop> {
        self.get(name).and_then(|m| m.as_prop().cloned())
    }

    pub fn names(&self) -> Vec<String> {
        self.members.borrow().keys().cloned().collect()
    }

    /// Create a variable member and return its handle.
    pub fn variable(&self, name: impl Into<String>, value: impl Into<Value>) -> Prop {
        let prop = Prop::variable(value);
        self.insert(name, prop.clone());
        prop
    }

    /// Create a formula member resolving names in this record.
    pub fn expression(&self, name: impl Into<String>, formula: impl Into<String>) -> Prop {
        let scope: Weak<dyn Scope> = self.this.clone();
        let prop = Prop::expression_in(formula, scope);
        self.insert(name, prop.clone());
        prop
    }

    /// Append to the list member `name`, creating it if needed.
    ///
    /// Returns the new element's 1-based index.
    pub fn push(&self, name: impl Into<String>, member: impl Into<Member>) -> usize {
        let mut members = self.members.borrow_mut();
        let entry = members
            .entry(name.into())
            .or_insert_with(|| Member::List(Vec::new()));
        match entry {
            Member::List(items) => {
                items.push(member.into());
                items.len()
            }
            other => {
                *other = Member::List(vec![other.clone(), member.into()]);
                2
            }
        }
    }
}

impl Scope for Record {
    fn find(&self, name: &str) -> Option<Member> {
        self.get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.find(name)))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("members", &self.names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_index_requires_base_and_positive_index() {
        assert_eq!(split_index("Point3"), Some(("Point", 3)));
        assert_eq!(split_index("Point12"), Some(("Point", 12)));
        assert_eq!(split_index("Point"), None);
        assert_eq!(split_index("42"), None);
        assert_eq!(split_index("Point0"), None);
    }

    #[test]
    fn exact_names_win_over_indexing() {
        let record = Record::new();
        record.push("Point", Prop::constant(1.0));
        record.insert("Point1", Prop::constant(99.0));
        let member = resolve(record.as_ref(), "Point1").unwrap();
        assert_eq!(member.as_prop().unwrap().value().unwrap(), Value::Scalar(99.0));
    }

    #[test]
    fn list_indexing_is_one_based() {
        let record = Record::new();
        assert_eq!(record.push("Point", Prop::constant(1.0)), 1);
        assert_eq!(record.push("Point", Prop::constant(2.0)), 2);
        let second = resolve(record.as_ref(), "Point2").unwrap();
        assert_eq!(second.as_prop().unwrap().value().unwrap(), Value::Scalar(2.0));
        assert!(resolve(record.as_ref(), "Point3").is_none());
    }

    #[test]
    fn parent_fall_through() {
        let document = Record::new();
        document.variable("Margin", 4.0);
        let shape = Record::with_parent(document.clone());
        shape.variable("Width", 10.0);

        assert!(shape.find("Margin").is_some());
        assert!(shape.get("Margin").is_none());
        assert!(document.find("Width").is_none());
    }

    #[test]
    fn record_expression_reads_siblings() {
        let record = Record::new();
        record.variable("Width", 3.0);
        let area = record.expression("Double", "Width * 2");
        assert_eq!(area.value().unwrap(), Value::Scalar(6.0));
        assert_eq!(record.names(), vec!["Double".to_string(), "Width".to_string()]);
    }

    #[test]
    fn dropped_scope_fails_the_reparse() {
        let record = Record::new();
        let prop = record.expression("A", "1");
        drop(record);
        let err = prop.value().unwrap_err();
        assert_eq!(err.message(), "formula scope no longer exists");
    }
}

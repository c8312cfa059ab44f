//! Undo/redo over graph edits.
//!
//! Edits are [`Change`]s grouped into [`Batch`]es; one batch is one undo
//! step. Changes are applied the moment they are made, so the graph always
//! reflects the open batch. Consecutive compatible changes inside a batch
//! merge (typing `10` → `20` → `30` into one field is one change from `10`
//! to `30`).

use std::any::Any;
use std::fmt;

use crate::errors::PropError;
use crate::prop::Prop;
use crate::value::Value;

/// One reversible edit.
///
/// Application is infallible: anything that can fail is checked when the
/// change is constructed.
pub trait Change: fmt::Debug {
    fn apply(&self);

    fn revert(&self);

    /// Absorb `next` (made right after `self`) into `self`.
    ///
    /// On success `self` keeps its own "before" state and takes `next`'s
    /// "after" state.
    fn try_merge(&mut self, _next: &dyn Change) -> bool {
        false
    }

    /// Short human-readable label for menus ("Undo edit Width")
    fn describe(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Formula edits
// ============================================================================

#[derive(Debug, Clone)]
pub struct FormulaEdit {
    pub prop: Prop,
    pub old: String,
    pub new: String,
}

/// Replace the formulas of one or more expressions together
#[derive(Debug, Clone)]
pub struct FormulaChange {
    edits: Vec<FormulaEdit>,
}

impl FormulaChange {
    /// Validate `formula` for `prop` and record the edit.
    pub fn new(prop: &Prop, formula: impl Into<String>) -> Result<Self, PropError> {
        Self::many([(prop.clone(), formula.into())])
    }

    /// Several expressions edited as a unit.
    ///
    /// The formulas are validated together: a set of edits that would close
    /// a cycle between them is rejected even when each one alone is fine.
    pub fn many(edits: impl IntoIterator<Item = (Prop, String)>) -> Result<Self, PropError> {
        let edits: Vec<(Prop, String)> = edits.into_iter().collect();
        Prop::check_formulas(&edits)?;
        let edits = edits
            .into_iter()
            .map(|(prop, new)| {
                let old = prop.formula().ok_or(PropError::NotAnExpression)?;
                Ok(FormulaEdit { prop, old, new })
            })
            .collect::<Result<Vec<_>, PropError>>()?;
        Ok(FormulaChange { edits })
    }

    pub fn edits(&self) -> &[FormulaEdit] {
        &self.edits
    }

    fn same_targets(&self, other: &FormulaChange) -> bool {
        self.edits.len() == other.edits.len()
            && self
                .edits
                .iter()
                .zip(&other.edits)
                .all(|(a, b)| a.prop.ptr_eq(&b.prop))
    }
}

fn install_formula(prop: &Prop, formula: &str) {
    if let Err(err) = prop.set_formula(formula) {
        crate::log::warn!(error = %err, "formula change targets a non-expression");
    }
}

impl Change for FormulaChange {
    fn apply(&self) {
        for edit in &self.edits {
            install_formula(&edit.prop, &edit.new);
        }
    }

    fn revert(&self) {
        for edit in self.edits.iter().rev() {
            install_formula(&edit.prop, &edit.old);
        }
    }

    fn try_merge(&mut self, next: &dyn Change) -> bool {
        let Some(next) = next.as_any().downcast_ref::<FormulaChange>() else {
            return false;
        };
        if !self.same_targets(next) {
            return false;
        }
        for (edit, later) in self.edits.iter_mut().zip(&next.edits) {
            edit.new = later.new.clone();
        }
        true
    }

    fn describe(&self) -> String {
        match self.edits.as_slice() {
            [edit] => format!("set formula to {}", edit.new),
            edits => format!("edit {} formulas", edits.len()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Value edits
// ============================================================================

/// Replace a variable's value
#[derive(Debug, Clone)]
pub struct ValueChange {
    prop: Prop,
    old: Value,
    new: Value,
}

impl ValueChange {
    pub fn new(prop: &Prop, value: impl Into<Value>) -> Result<Self, PropError> {
        if !prop.is_variable() {
            return Err(PropError::NotAVariable);
        }
        Ok(ValueChange {
            prop: prop.clone(),
            old: prop.value()?,
            new: value.into(),
        })
    }

    pub fn old(&self) -> &Value {
        &self.old
    }

    pub fn new_value(&self) -> &Value {
        &self.new
    }

    fn store(&self, value: &Value) {
        if let Err(err) = self.prop.set(value.clone()) {
            crate::log::warn!(error = %err, "value change targets a non-variable");
        }
    }
}

impl Change for ValueChange {
    fn apply(&self) {
        self.store(&self.new);
    }

    fn revert(&self) {
        self.store(&self.old);
    }

    fn try_merge(&mut self, next: &dyn Change) -> bool {
        match next.as_any().downcast_ref::<ValueChange>() {
            Some(next) if next.prop.ptr_eq(&self.prop) => {
                self.new = next.new.clone();
                true
            }
            _ => false,
        }
    }

    fn describe(&self) -> String {
        format!("set value to {}", self.new)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Changes undone and redone as one step
#[derive(Debug, Default)]
pub struct Batch {
    changes: Vec<Box<dyn Change>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Box<dyn Change>) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = &dyn Change> {
        self.changes.iter().map(|c| c.as_ref())
    }

    pub fn apply(&self) {
        for change in &self.changes {
            change.apply();
        }
    }

    pub fn revert(&self) {
        for change in self.changes.iter().rev() {
            change.revert();
        }
    }

    pub fn describe(&self) -> String {
        match self.changes.as_slice() {
            [] => "nothing".to_string(),
            [only] => only.describe(),
            many => format!("{} changes", many.len()),
        }
    }

    /// Merge `change` into the last change at or after `floor`, or append it.
    fn record(&mut self, floor: usize, change: Box<dyn Change>) {
        if self.changes.len() > floor {
            if let Some(last) = self.changes.last_mut() {
                if last.try_merge(change.as_ref()) {
                    return;
                }
            }
        }
        self.changes.push(change);
    }

    /// Revert and drop every change from `start` on.
    fn rollback(&mut self, start: usize) {
        for change in self.changes.drain(start..).rev() {
            change.revert();
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// Linear undo stack of committed batches plus the batch being built.
///
/// Nested [`History::begin_batch`] calls stack: an inner level commits into
/// its parent and only the outermost [`History::end_batch`] creates an undo
/// step. [`History::abandon_batch`] rolls back the innermost level only.
#[derive(Debug)]
pub struct History {
    batches: Vec<Batch>,
    current_index: usize,
    saved_index: Option<usize>,
    open: Option<Batch>,
    /// Start offset in `open` of each nested level, outermost first
    levels: Vec<usize>,
}

impl Default for History {
    fn default() -> Self {
        History {
            batches: Vec::new(),
            current_index: 0,
            saved_index: Some(0),
            open: None,
            levels: Vec::new(),
        }
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_batch(&mut self) {
        let batch = self.open.get_or_insert_with(Batch::new);
        self.levels.push(batch.len());
    }

    /// Apply `change` now and record it in the open batch.
    ///
    /// With no batch open, the change becomes an undo step of its own.
    pub fn make_change(&mut self, change: impl Change + 'static) {
        self.make_boxed_change(Box::new(change));
    }

    pub fn make_boxed_change(&mut self, change: Box<dyn Change>) {
        let implicit = !self.is_batch_open();
        if implicit {
            self.begin_batch();
        }
        change.apply();
        let floor = self.levels.last().copied().unwrap_or(0);
        if let Some(batch) = self.open.as_mut() {
            batch.record(floor, change);
        }
        if implicit {
            self.end_batch();
        }
    }

    /// Close the innermost level; closing the outermost commits.
    pub fn end_batch(&mut self) {
        if self.levels.pop().is_none() {
            crate::log::warn!("end_batch without an open batch");
            return;
        }
        if !self.levels.is_empty() {
            return;
        }
        let Some(batch) = self.open.take() else {
            return;
        };
        if batch.is_empty() {
            return;
        }
        if self.saved_index.is_some_and(|saved| saved > self.current_index) {
            self.saved_index = None;
        }
        self.batches.truncate(self.current_index);
        crate::log::debug!(changes = batch.len(), index = self.current_index, "batch committed");
        self.batches.push(batch);
        self.current_index = self.batches.len();
    }

    /// Revert and discard the innermost open level.
    pub fn abandon_batch(&mut self) {
        let Some(start) = self.levels.pop() else {
            crate::log::warn!("abandon_batch without an open batch");
            return;
        };
        if let Some(batch) = self.open.as_mut() {
            crate::log::debug!(changes = batch.len() - start, "batch abandoned");
            batch.rollback(start);
        }
        if self.levels.is_empty() {
            self.open = None;
        }
    }

    pub fn is_batch_open(&self) -> bool {
        !self.levels.is_empty()
    }

    /// Revert the batch before the current position.
    ///
    /// Refused while a batch is open.
    pub fn undo(&mut self) -> bool {
        if self.is_batch_open() || !self.can_undo() {
            return false;
        }
        self.current_index -= 1;
        let batch = &self.batches[self.current_index];
        crate::log::debug!(index = self.current_index, what = %batch.describe(), "undo");
        batch.revert();
        true
    }

    /// Re-apply the batch at the current position.
    pub fn redo(&mut self) -> bool {
        if self.is_batch_open() || !self.can_redo() {
            return false;
        }
        let batch = &self.batches[self.current_index];
        crate::log::debug!(index = self.current_index, what = %batch.describe(), "redo");
        batch.apply();
        self.current_index += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index < self.batches.len()
    }

    /// Whether the document matches the last [`History::mark_saved`] point
    pub fn is_saved(&self) -> bool {
        self.saved_index == Some(self.current_index)
    }

    pub fn mark_saved(&mut self) {
        self.saved_index = Some(self.current_index);
    }

    /// Committed batches, including undone ones still available for redo
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn batch(&self, index: usize) -> Option<&Batch> {
        self.batches.get(index)
    }

    /// Label of the step [`History::undo`] would revert
    pub fn undo_description(&self) -> Option<String> {
        self.current_index
            .checked_sub(1)
            .and_then(|i| self.batches.get(i))
            .map(Batch::describe)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.batches.get(self.current_index).map(Batch::describe)
    }
}

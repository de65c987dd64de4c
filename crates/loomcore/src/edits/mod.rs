//! The mutation API of the dataflow model.
//!
//! An [`Edit`] is a command: applying it validates and performs one atomic
//! change and hands back the command that reverses it. [`CompoundEdit`]
//! groups edits and rolls back the ones already applied when a later one
//! fails, by replaying the collected inverses in reverse order.

mod graph;
mod processor;

pub use graph::{
    AddDataflowInput, AddDataflowOutput, AddMerge, AddMergeInput, AddProcessor, Connect, Disconnect,
    RemoveDataflowInput, RemoveDataflowOutput, RemoveMerge, RemoveMergeInput, RemoveProcessor,
    RenameDataflow, RenameProcessor,
};
pub use processor::{
    AddActivity, AddDispatchLayer, AddProcessorInput, AddProcessorOutput, ConfigureDispatchLayer,
    CreateCondition, RemoveActivity, RemoveCondition, RemoveDispatchLayer, RemoveProcessorInput,
    RemoveProcessorOutput, SetIterationStrategy,
};

use crate::{Dataflow, EditError};
use std::fmt;

pub trait Edit: fmt::Debug + Send + Sync {
    /// Apply the change and return the edit that reverses it.
    ///
    /// Must leave the dataflow untouched when it fails.
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError>;

    fn description(&self) -> String;
}

/// An edit that has been applied, together with its inverse
#[derive(Debug)]
pub struct AppliedEdit {
    edit: Box<dyn Edit>,
    inverse: Box<dyn Edit>,
}

impl AppliedEdit {
    pub fn description(&self) -> String {
        self.edit.description()
    }

    /// Reverse the edit, returning the original so it can be redone.
    pub fn undo(self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        self.revert(dataflow)?;
        Ok(self.edit)
    }

    fn revert(&self, dataflow: &mut Dataflow) -> Result<(), EditError> {
        dataflow.check_mutable()?;
        self.inverse.apply(dataflow)?;
        dataflow.touch();
        tracing::debug!(dataflow = %dataflow.name(), "undid {}", self.edit.description());
        Ok(())
    }
}

impl Dataflow {
    /// Apply an edit to this dataflow.
    pub fn edit(&mut self, edit: impl Edit + 'static) -> Result<AppliedEdit, EditError> {
        self.edit_boxed(Box::new(edit))
    }

    pub fn edit_boxed(&mut self, edit: Box<dyn Edit>) -> Result<AppliedEdit, EditError> {
        self.check_mutable()?;
        let inverse = edit.apply(self)?;
        self.touch();
        tracing::debug!(dataflow = %self.name(), "applied {}", edit.description());
        Ok(AppliedEdit { edit, inverse })
    }

    pub(crate) fn check_mutable(&self) -> Result<(), EditError> {
        if self.is_immutable() {
            return Err(EditError::Immutable(self.name().to_string()));
        }
        Ok(())
    }
}

/// All-or-nothing group of edits
#[derive(Debug, Default)]
pub struct CompoundEdit {
    edits: Vec<Box<dyn Edit>>,
}

impl CompoundEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, edit: impl Edit + 'static) -> Self {
        self.edits.push(Box::new(edit));
        self
    }

    pub fn push(&mut self, edit: Box<dyn Edit>) {
        self.edits.push(edit);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

impl Edit for CompoundEdit {
    fn apply(&self, dataflow: &mut Dataflow) -> Result<Box<dyn Edit>, EditError> {
        let mut applied: Vec<Box<dyn Edit>> = Vec::with_capacity(self.edits.len());
        for (position, edit) in self.edits.iter().enumerate() {
            match edit.apply(dataflow) {
                Ok(inverse) => applied.push(inverse),
                Err(source) => {
                    while let Some(inverse) = applied.pop() {
                        if let Err(e) = inverse.apply(dataflow) {
                            tracing::error!("rollback of {} failed: {}", inverse.description(), e);
                        }
                    }
                    return Err(EditError::Compound {
                        position,
                        source: Box::new(source),
                    });
                }
            }
        }
        applied.reverse();
        Ok(Box::new(CompoundEdit { edits: applied }))
    }

    fn description(&self) -> String {
        format!("{} edits", self.edits.len())
    }
}

/// Linear undo/redo history over one dataflow
#[derive(Debug, Default)]
pub struct EditHistory {
    done: Vec<AppliedEdit>,
    undone: Vec<Box<dyn Edit>>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn do_edit(&mut self, dataflow: &mut Dataflow, edit: Box<dyn Edit>) -> Result<(), EditError> {
        let applied = dataflow.edit_boxed(edit)?;
        self.done.push(applied);
        self.undone.clear();
        Ok(())
    }

    /// Undo the most recent edit; `false` when there is nothing to undo.
    pub fn undo(&mut self, dataflow: &mut Dataflow) -> Result<bool, EditError> {
        let Some(applied) = self.done.pop() else {
            return Ok(false);
        };
        if let Err(e) = applied.revert(dataflow) {
            self.done.push(applied);
            return Err(e);
        }
        self.undone.push(applied.edit);
        Ok(true)
    }

    pub fn redo(&mut self, dataflow: &mut Dataflow) -> Result<bool, EditError> {
        let Some(edit) = self.undone.pop() else {
            return Ok(false);
        };
        let applied = dataflow.edit_boxed(edit)?;
        self.done.push(applied);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }
}

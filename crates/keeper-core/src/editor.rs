//! Detail editor bound to one entry by position.
//!
//! The session keeps a working copy of the two editable fields and pushes
//! whole-collection snapshots back through
//! [`CollectionController::apply_external_update`]. It listens to the
//! controller's event channel so that removals or reorders made elsewhere move
//! (or invalidate) its target instead of leaving it dangling.

use std::collections::BTreeSet;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};

use crate::controller::{CollectionController, CollectionEvent};
use crate::entry::Entry;
use crate::error::{AccessError, EditorError};
use crate::prompt::Prompter;

pub const DELETE_PROMPT: &str = "Delete this entry?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Source,
    Password,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Source, Field::Password];

    /// A cleared password is a legitimate value; a cleared label is not.
    pub fn allows_empty(self) -> bool {
        matches!(self, Field::Password)
    }
}

impl TryFrom<i64> for Field {
    type Error = EditorError;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Field::Source),
            1 => Ok(Field::Password),
            other => Err(EditorError::UnknownField(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Viewing,
    Editing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Target removed; the host should close the detail view.
    Deleted,
    Cancelled,
}

#[derive(Debug)]
pub struct EditorSession {
    target: Option<usize>,
    state: EditorState,
    working: Entry,
    /// Set after `create_new`: the next commit accepts empty values.
    fresh: bool,
    events: broadcast::Receiver<CollectionEvent>,
    seen_revision: u64,
}

impl EditorSession {
    pub(crate) fn open(controller: &CollectionController, index: usize) -> Result<Self, AccessError> {
        let working = controller.entry(index)?.clone();
        debug!(index, "editor session opened");
        Ok(Self {
            target: Some(index),
            state: EditorState::Viewing,
            working,
            fresh: false,
            events: controller.subscribe(),
            seen_revision: controller.revision(),
        })
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn target_index(&self) -> Option<usize> {
        self.target
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Source => &self.working.source,
            Field::Password => &self.working.password,
        }
    }

    pub fn working(&self) -> &Entry {
        &self.working
    }

    fn ensure_open(&self) -> Result<(), EditorError> {
        if self.state == EditorState::Closed {
            Err(EditorError::Closed)
        } else {
            Ok(())
        }
    }

    /// Applies changes published by the controller since the last sync and
    /// returns the current target position.
    pub fn resync(&mut self) -> Result<usize, EditorError> {
        loop {
            match self.events.try_recv() {
                Ok(CollectionEvent::Changed {
                    revision,
                    len,
                    remap,
                    ..
                }) => {
                    if revision <= self.seen_revision {
                        continue;
                    }
                    self.seen_revision = revision;
                    self.target = match (self.target, remap) {
                        (Some(index), Some(remap)) => remap.get(index),
                        (Some(index), None) if index < len => Some(index),
                        _ => None,
                    };
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "editor missed collection events; target dropped");
                    self.target = None;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.target.ok_or(EditorError::StaleTarget)
    }

    pub fn begin_edit(&mut self) -> Result<(), EditorError> {
        self.ensure_open()?;
        self.state = EditorState::Editing;
        Ok(())
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) -> Result<(), EditorError> {
        self.ensure_open()?;
        if self.state != EditorState::Editing {
            return Err(EditorError::NotEditing);
        }
        let value = value.into();
        match field {
            Field::Source => self.working.source = value,
            Field::Password => self.working.password = value,
        }
        Ok(())
    }

    /// Boundary adapter for UI widgets identified by integer tags.
    pub fn set_field_by_tag(&mut self, tag: i64, value: impl Into<String>) -> Result<(), EditorError> {
        let field = Field::try_from(tag)?;
        self.set_field(field, value)
    }

    /// Writes the working fields into the target entry, stamps it with the
    /// current time and hands the collection back to the controller.
    /// Allowed from `Viewing` too: leaving the view always finalizes.
    pub fn commit(&mut self, controller: &mut CollectionController) -> Result<(), EditorError> {
        self.ensure_open()?;
        let index = self.resync()?;
        let mut entries = controller.snapshot()?;
        let target = entries.get_mut(index).ok_or(EditorError::StaleTarget)?;

        for field in Field::ALL {
            let value = self.field(field);
            if value.is_empty() && !(self.fresh || field.allows_empty()) {
                continue;
            }
            match field {
                Field::Source => target.source = value.to_string(),
                Field::Password => target.password = value.to_string(),
            }
        }
        target.touch();
        self.working = target.clone();

        self.seen_revision = controller.apply_external_update(entries)?;
        self.fresh = false;
        self.state = EditorState::Viewing;
        debug!(index, "editor committed");
        Ok(())
    }

    /// Commits, appends a fresh placeholder entry and starts editing it.
    pub fn create_new(&mut self, controller: &mut CollectionController) -> Result<usize, EditorError> {
        self.commit(controller)?;
        let mut entries = controller.snapshot()?;
        let placeholder = Entry::new_account();
        entries.push(placeholder.clone());
        let index = entries.len() - 1;

        self.seen_revision = controller.apply_external_update(entries)?;
        self.target = Some(index);
        self.working = placeholder;
        self.fresh = true;
        self.state = EditorState::Editing;
        info!(index, "new entry created");
        Ok(index)
    }

    /// Removes the target after confirmation. On `Deleted` the session is
    /// closed; on `StaleTarget` nothing was removed and the host should close.
    pub async fn delete(
        &mut self,
        controller: &mut CollectionController,
        prompter: &dyn Prompter,
    ) -> Result<DeleteOutcome, EditorError> {
        self.ensure_open()?;
        let index = self.resync()?;
        if index >= controller.len() {
            self.target = None;
            return Err(EditorError::StaleTarget);
        }
        if !prompter.confirm(DELETE_PROMPT).await {
            return Ok(DeleteOutcome::Cancelled);
        }

        controller.delete_at(&BTreeSet::from([index]))?;
        self.seen_revision = controller.revision();
        self.target = None;
        self.state = EditorState::Closed;
        controller.reorder_by_sort();
        info!(index, "entry deleted from editor");
        Ok(DeleteOutcome::Deleted)
    }

    /// Teardown hook: commits unconditionally, then closes the session and
    /// lets the controller restore its sort order. Closing twice is a no-op.
    pub fn on_host_disappear(&mut self, controller: &mut CollectionController) -> Result<(), EditorError> {
        if self.state == EditorState::Closed {
            return Ok(());
        }
        let committed = self.commit(controller);
        self.state = EditorState::Closed;
        controller.reorder_by_sort();
        committed
    }
}

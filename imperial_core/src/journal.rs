// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Undo log making `set_all` all-or-nothing.
//!
//! While the outermost `set_all` runs, every key assignment and basic
//! value write records what it replaced, and value structs a key lets go
//! of are kept alive instead of removed. On success the retired structs
//! are removed; on failure the log is replayed backwards.

use crate::error::Result;
use crate::id::StructId;
use crate::key::KeyState;
use crate::tree::{Cached, Tree};
use crate::value::Value;

#[derive(Debug)]
pub(crate) enum Undo {
    Key {
        id: StructId,
        index: usize,
        explicit: Option<StructId>,
        owned: Option<StructId>,
        state: KeyState,
    },
    Basic {
        id: StructId,
        value: Option<Value>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    undo: Vec<Undo>,
    /// Value structs replaced during the batch.
    retired: Vec<StructId>,
}

impl Journal {
    pub(crate) fn record(&mut self, undo: Undo) {
        self.undo.push(undo);
    }

    pub(crate) fn retire(&mut self, id: StructId) {
        self.retired.push(id);
    }
}

impl Tree {
    /// Starts a journal unless one is open. Returns `true` for the caller
    /// that must finish it.
    pub(crate) fn begin(&mut self) -> bool {
        if self.journal.is_some() {
            return false;
        }
        self.journal = Some(Journal::default());
        true
    }

    /// Closes the journal, committing on `Ok` and rolling back on `Err`.
    pub(crate) fn finish(&mut self, result: Result<()>) -> Result<()> {
        let journal = self.journal.take().unwrap_or_default();
        match result {
            Ok(()) => {
                for old in journal.retired {
                    if self.contains(old) {
                        self.remove(old)?;
                    }
                }
                Ok(())
            }
            Err(error) => {
                let steps = journal.undo.len();
                for undo in journal.undo.into_iter().rev() {
                    self.undo(undo)?;
                }
                tracing::debug!(steps, %error, "tree.roll_back");
                Err(error)
            }
        }
    }

    fn undo(&mut self, undo: Undo) -> Result<()> {
        match undo {
            Undo::Basic { id, value } => {
                let Ok(data) = self.data(id) else {
                    return Ok(());
                };
                let node = data.basic_node;
                let graph = self.links.graph_mut();
                match value {
                    Some(value) => {
                        graph.set(node, Cached::Value(value));
                    }
                    None => {
                        graph.clear(node);
                    }
                }
            }
            Undo::Key {
                id,
                index,
                explicit,
                owned,
                state,
            } => {
                let Ok(data) = self.data(id) else {
                    return Ok(());
                };
                let key = &data.keys[index];
                let (node, current, current_owned) = (key.node, key.explicit, key.owned);
                match explicit {
                    Some(target) if self.contains(target) => {
                        self.bind_explicit(id, index, target)?;
                    }
                    _ => {
                        if let Some(current) = current
                            && let Ok(data) = self.data(current)
                        {
                            let basic = data.basic_node;
                            self.links.graph_mut().remove_link(basic, node);
                        }
                        self.key_mut(id, index)?.explicit = None;
                        self.links.graph_mut().invalidate(node);
                    }
                }
                let key = self.key_mut(id, index)?;
                key.owned = owned;
                key.state = state;
                if let Some(fresh) = current_owned
                    && current_owned != owned
                    && self.contains(fresh)
                {
                    self.remove(fresh)?;
                }
            }
        }
        Ok(())
    }
}

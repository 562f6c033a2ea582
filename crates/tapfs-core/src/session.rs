//! Per-command attribution state.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::ops::OpClass;

/// The canonicalized contents of a session: one ascending, unique path list
/// per operation class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedOps {
    /// Paths opened without write intent.
    pub read: Vec<String>,
    /// Paths newly created.
    pub create: Vec<String>,
    /// Existing paths opened with write intent.
    pub update: Vec<String>,
    /// Paths removed.
    pub delete: Vec<String>,
}

/// Attribution state for one traced command.
///
/// Filesystem callbacks from distinct processes in the same group may record
/// concurrently; a single mutex linearizes the set transitions.
pub struct Session {
    id: String,
    sets: Mutex<OpSets>,
}

#[derive(Debug, Default)]
struct OpSets {
    read: BTreeSet<String>,
    create: BTreeSet<String>,
    update: BTreeSet<String>,
    delete: BTreeSet<String>,
}

impl Session {
    /// Creates an empty session with the given registry-assigned ID.
    pub fn new(id: String) -> Self {
        Self {
            id,
            sets: Mutex::new(OpSets::default()),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Records one operation against a path, collapsing session-local churn.
    ///
    /// A path lives in at most one class at any time. Reads and updates of a
    /// locally created path are absorbed into the create; deleting a locally
    /// created path drops it entirely; deleting an updated path keeps only
    /// the delete. The empty path is ignored.
    pub fn record(&self, path: &str, op: OpClass) {
        if path.is_empty() {
            return;
        }
        self.sets.lock().apply(path, op);
    }

    /// Returns the class currently tracking `path`, if any.
    pub fn class_of(&self, path: &str) -> Option<OpClass> {
        self.sets.lock().class_of(path)
    }

    /// Returns the four sorted, unique path lists.
    pub fn collect(&self) -> RecordedOps {
        let sets = self.sets.lock();
        RecordedOps {
            read: sets.read.iter().cloned().collect(),
            create: sets.create.iter().cloned().collect(),
            update: sets.update.iter().cloned().collect(),
            delete: sets.delete.iter().cloned().collect(),
        }
    }
}

impl OpSets {
    fn set_mut(&mut self, op: OpClass) -> &mut BTreeSet<String> {
        match op {
            OpClass::Read => &mut self.read,
            OpClass::Create => &mut self.create,
            OpClass::Update => &mut self.update,
            OpClass::Delete => &mut self.delete,
        }
    }

    fn class_of(&self, path: &str) -> Option<OpClass> {
        OpClass::ALL
            .into_iter()
            .find(|&op| self.set(op).contains(path))
    }

    fn set(&self, op: OpClass) -> &BTreeSet<String> {
        match op {
            OpClass::Read => &self.read,
            OpClass::Create => &self.create,
            OpClass::Update => &self.update,
            OpClass::Delete => &self.delete,
        }
    }

    fn apply(&mut self, path: &str, op: OpClass) {
        let current = self.class_of(path);
        match op {
            // A read of a locally created or already-written path is a
            // self-read, not a dependency.
            OpClass::Read => match current {
                Some(OpClass::Read) | Some(OpClass::Create) | Some(OpClass::Update) => {}
                current => self.shift(path, current, OpClass::Read),
            },
            OpClass::Create => match current {
                Some(OpClass::Create) | Some(OpClass::Update) => {}
                current => self.shift(path, current, OpClass::Create),
            },
            // Writes to a locally created path are still a create.
            OpClass::Update => match current {
                Some(OpClass::Create) | Some(OpClass::Update) => {}
                current => self.shift(path, current, OpClass::Update),
            },
            OpClass::Delete => match current {
                // Created and deleted inside the session: no net effect.
                Some(OpClass::Create) => {
                    self.create.remove(path);
                }
                Some(OpClass::Delete) => {}
                current => self.shift(path, current, OpClass::Delete),
            },
        }
    }

    // Removal precedes insertion so the four sets stay pairwise disjoint.
    fn shift(&mut self, path: &str, from: Option<OpClass>, to: OpClass) {
        if let Some(from) = from {
            self.set_mut(from).remove(path);
        }
        self.set_mut(to).insert(path.to_string());
    }
}

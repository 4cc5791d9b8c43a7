//! Process discovery.
//!
//! Every process known to the image hangs off the `init_task` symbol's
//! circular task list. The walk reuses the generic intrusive-list
//! traversal; `init_task` itself (the idle task) is the head and is not
//! yielded, matching how the kernel's own iteration macros treat it.

use crate::core::{Object, Snapshot};
use crate::error::Result;
use crate::walk::list_of_type;

/// Symbol naming the head of the kernel task list.
pub const INIT_TASK: &str = "init_task";

/// A `task_struct` overlay with convenience accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task<'a> {
    object: Object<'a>,
}

impl<'a> Task<'a> {
    pub fn from_object(object: Object<'a>) -> Self {
        Self { object }
    }

    pub fn object(&self) -> Object<'a> {
        self.object
    }

    pub fn address(&self) -> u64 {
        self.object.address()
    }

    /// Process identifier, when readable.
    pub fn pid(&self) -> Option<u64> {
        self.object.field("pid").ok()?.value()
    }

    /// Command name (`task_struct.comm`), when readable.
    pub fn comm(&self) -> Option<String> {
        self.object.field("comm").ok()?.read_string()
    }

    /// A display name that is always present: the command name, or the
    /// task's address when the name is unreadable.
    pub fn display_name(&self) -> String {
        self.comm()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("task:{:#x}", self.object.address()))
    }
}

/// Enumerate every process on the image's task list.
///
/// Lazy: each step reads one task's worth of links. Profile entries for
/// the fields the `Task` accessors touch are checked up front so that a
/// mismatched profile fails here, not silently per task.
pub fn tasks<'a>(snap: &Snapshot<'a>) -> Result<impl Iterator<Item = Task<'a>> + 'a> {
    let profile = snap.profile();
    profile.field("task_struct", "pid")?;
    profile.field("task_struct", "comm")?;

    let init = snap.object_at_symbol("task_struct", INIT_TASK)?;
    let head = init.field("tasks")?;
    Ok(list_of_type(&head, "task_struct", "tasks")?.map(Task::from_object))
}

// Snapshot - save a thread and later roll it back in place

use std::fmt;

use crate::lua_value::ThreadRef;
use crate::lua_vm::LuaState;

/// A saved thread: the handle it was taken from plus a detached copy of its
/// state at save time.
///
/// Loading writes the copy back into the original thread object, so every
/// holder of that handle observes the restored state.
pub struct Snapshot {
    original: ThreadRef,
    captured: LuaState,
}

impl Snapshot {
    /// Capture `thread` with [`LuaState::clone_state`].
    ///
    /// Must not be called while the thread is executing.
    pub fn save(thread: &ThreadRef) -> Snapshot {
        let captured = thread.borrow().clone_state();
        log::debug!("snapshot saved ({} frames)", captured.call_depth());
        Snapshot {
            original: thread.clone(),
            captured,
        }
    }

    /// Restore the captured state into the original thread and return its
    /// handle. Consumes the snapshot.
    ///
    /// Panics if the thread is borrowed, i.e. called from inside one of its
    /// own native callbacks.
    pub fn load(self) -> ThreadRef {
        let Snapshot { original, captured } = self;
        original.borrow_mut().restore_from(captured);
        log::debug!("snapshot loaded");
        original
    }

    /// Like [`Snapshot::load`] but keeps the snapshot usable: a fresh copy of
    /// the captured state is written back each time.
    pub fn restore(&self) -> ThreadRef {
        let fresh = self.captured.clone_state();
        self.original.borrow_mut().restore_from(fresh);
        log::debug!("snapshot restored");
        self.original.clone()
    }

    /// The thread this snapshot restores into
    pub fn original(&self) -> &ThreadRef {
        &self.original
    }

    pub fn captured(&self) -> &LuaState {
        &self.captured
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("original", &(std::rc::Rc::as_ptr(&self.original)))
            .field("frames", &self.captured.call_depth())
            .finish()
    }
}

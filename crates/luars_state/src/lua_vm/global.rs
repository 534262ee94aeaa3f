// Global - interpreter-wide state shared by every coroutine of a main thread
// (equivalent to global_State in the C implementation)

use std::cell::RefCell;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHashMap;

use crate::lua_value::{LuaTable, LuaValue, LuaValueType, TableRef};
use crate::lua_vm::LuaState;

static TEMP_FILE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// An open temporary file tracked by the runtime and removed on close
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    file: RefCell<Option<File>>,
}

impl TempFile {
    pub fn new(path: PathBuf, file: File) -> Self {
        TempFile {
            path,
            file: RefCell::new(Some(file)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &RefCell<Option<File>> {
        &self.file
    }

    pub fn is_open(&self) -> bool {
        self.file.borrow().is_some()
    }

    /// Close the handle and delete the file
    pub fn remove(&self) -> io::Result<()> {
        self.file.borrow_mut().take();
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

pub struct Global {
    pub main_thread: Weak<RefCell<LuaState>>,
    pub current_thread: Weak<RefCell<LuaState>>,

    /// Bookkeeping table for the host, not visible to scripts.
    /// Always a table: replacing it with anything else is rejected.
    pub registry: TableRef,

    /// Global variables table (`_G`). Always a table.
    pub global: TableRef,

    /// Metatables for types without a per-object metatable slot
    builtin_mts: AHashMap<LuaValueType, LuaValue>,

    temp_files: Vec<Rc<TempFile>>,

    gc_count: i32,
}

impl Default for Global {
    fn default() -> Self {
        Self::new()
    }
}

impl Global {
    pub fn new() -> Self {
        Global {
            main_thread: Weak::new(),
            current_thread: Weak::new(),
            registry: LuaTable::new(0, 32).into_ref(),
            global: LuaTable::new(0, 64).into_ref(),
            builtin_mts: AHashMap::new(),
            temp_files: Vec::new(),
            gc_count: 0,
        }
    }

    pub fn main_thread(&self) -> Option<Rc<RefCell<LuaState>>> {
        self.main_thread.upgrade()
    }

    pub fn current_thread(&self) -> Option<Rc<RefCell<LuaState>>> {
        self.current_thread.upgrade()
    }

    pub fn builtin_metatable(&self, ty: LuaValueType) -> LuaValue {
        self.builtin_mts.get(&ty).cloned().unwrap_or_default()
    }

    /// Setting nil removes the metatable for `ty`
    pub fn set_builtin_metatable(&mut self, ty: LuaValueType, mt: LuaValue) {
        if mt.is_nil() {
            self.builtin_mts.remove(&ty);
        } else {
            self.builtin_mts.insert(ty, mt);
        }
    }

    // ===== Temporary resources =====

    /// Create and track a new file in the system temp directory
    pub fn new_temp_file(&mut self) -> io::Result<Rc<TempFile>> {
        let seq = TEMP_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("luars-{}-{}.tmp", std::process::id(), seq));
        let file = File::create(&path)?;
        let temp = Rc::new(TempFile::new(path, file));
        self.temp_files.push(temp.clone());
        Ok(temp)
    }

    pub fn register_temp_file(&mut self, file: Rc<TempFile>) {
        self.temp_files.push(file);
    }

    pub fn temp_files(&self) -> &[Rc<TempFile>] {
        &self.temp_files
    }

    /// Remove every tracked file; failures are logged and skipped
    pub(crate) fn release_temp_files(&mut self) {
        for temp in self.temp_files.drain(..) {
            if let Err(e) = temp.remove() {
                log::warn!("failed to remove temp file {}: {}", temp.path().display(), e);
            }
        }
    }

    // ===== Allocation counter =====

    pub fn gc_count(&self) -> i32 {
        self.gc_count
    }

    pub(crate) fn count_allocation(&mut self) {
        self.gc_count = self.gc_count.wrapping_add(1);
    }

    // ===== Clone =====

    /// An independent universe.
    ///
    /// Registry and globals become new table objects (one-level copies), so
    /// writes to either side never reach the other. Built-in metatables are
    /// copied the same way. A table reached more than once (a metatable shared
    /// by several types, say) gets a single copy. Thread handles and open
    /// temp files are shared.
    pub fn clone_global(&self) -> Global {
        let mut seen = Vec::new();
        let registry = LuaTable::clone_chain(&self.registry, &mut seen);
        let global = LuaTable::clone_chain(&self.global, &mut seen);
        let builtin_mts = self
            .builtin_mts
            .iter()
            .map(|(ty, mt)| {
                let copy = match mt {
                    LuaValue::Table(t) => LuaValue::Table(LuaTable::clone_chain(t, &mut seen)),
                    other => other.clone_value(),
                };
                (*ty, copy)
            })
            .collect();

        Global {
            main_thread: self.main_thread.clone(),
            current_thread: self.current_thread.clone(),
            registry,
            global,
            builtin_mts,
            temp_files: self.temp_files.clone(),
            gc_count: self.gc_count,
        }
    }
}

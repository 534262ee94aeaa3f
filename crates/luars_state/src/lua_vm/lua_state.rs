// Lua execution state (equivalent to lua_State in Lua C API)
// Represents a single thread/coroutine execution context
// Multiple LuaStates spawned from one main thread share the same Global

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::lua_value::lua_convert::{parse_integer, parse_number};
use crate::lua_value::{
    FunctionKind, FunctionProto, FunctionRef, LuaChannel, LuaFunction, LuaTable, LuaUpvalue,
    LuaUserdata, LuaValue, NativeFn, TableRef, ThreadRef, UpvalueRef, UserdataRef,
};
use crate::lua_vm::allocator::Allocator;
use crate::lua_vm::call_info::{CallFrameStack, CallInfo, CallStackKind};
use crate::lua_vm::global::TempFile;
use crate::lua_vm::lua_limits::{
    ALLOCATOR_POOL_SIZE, ENVIRON_INDEX, GLOBALS_INDEX, MAX_TRACEBACK_LEVELS, MULTRET,
    REGISTRY_INDEX,
};
use crate::lua_vm::value_stack::ValueStack;
use crate::lua_vm::{Context, ErrorKind, Global, LuaError, LuaResult, Options};

/// Called with the error when a failure escapes every frame of the thread
/// without an enclosing protected call.
pub type PanicHook = Rc<dyn Fn(&mut LuaState, &LuaError)>;

/// Execution state for a Lua thread/coroutine
pub struct LuaState {
    /// Interpreter-wide state, shared with sibling coroutines
    g: Rc<RefCell<Global>>,

    /// Thread that spawned this one; navigational only
    parent: Option<Weak<RefCell<LuaState>>>,

    /// Environment used when no frame is running
    env: TableRef,

    panic_hook: Option<PanicHook>,

    dead: bool,

    options: Options,

    /// Data stack - registers, temporaries, function arguments
    reg: ValueStack,

    /// Call stack - one CallInfo per active function call
    stack: CallFrameStack,

    alloc: Allocator,

    /// Index of the executing frame in `stack`
    current_frame: Option<usize>,

    /// Upvalues still pointing into `reg`
    open_upvalues: Vec<UpvalueRef>,

    /// Most recently resolved open upvalue
    uv_cache: Option<UpvalueRef>,

    /// Number of protected calls in progress
    protected_depth: usize,

    ctx: Option<Context>,
}

impl LuaState {
    /// Create a main thread with a fresh Global
    pub fn new(options: Options) -> Self {
        let g = Global::new();
        let env = g.global.clone();
        Self::with_global(options, Rc::new(RefCell::new(g)), env)
    }

    fn with_global(options: Options, g: Rc<RefCell<Global>>, env: TableRef) -> Self {
        LuaState {
            g,
            parent: None,
            env,
            panic_hook: None,
            dead: false,
            reg: ValueStack::new(
                options.registry_size,
                options.registry_max_size,
                options.registry_grow_step,
            ),
            stack: CallFrameStack::new(options.call_stack_size, options.minimize_stack_memory),
            alloc: Allocator::new(ALLOCATOR_POOL_SIZE),
            current_frame: None,
            open_upvalues: Vec::new(),
            uv_cache: None,
            protected_depth: 0,
            ctx: None,
            options,
        }
    }

    /// Move the thread behind a shared handle.
    /// The first thread wrapped for a Global becomes its main thread; the
    /// wrapped thread becomes the current one.
    pub fn into_ref(self) -> ThreadRef {
        let g = self.g.clone();
        let thread = Rc::new(RefCell::new(self));
        {
            let mut g = g.borrow_mut();
            if g.main_thread.upgrade().is_none() {
                g.main_thread = Rc::downgrade(&thread);
            }
            g.current_thread = Rc::downgrade(&thread);
        }
        thread
    }

    /// Spawn a coroutine sharing this thread's Global.
    /// Its parent is the Global's current thread.
    pub fn new_thread(&mut self) -> ThreadRef {
        let parent = {
            let mut g = self.g.borrow_mut();
            g.count_allocation();
            g.current_thread.clone()
        };
        let mut thread = Self::with_global(self.options.clone(), self.g.clone(), self.env.clone());
        thread.parent = (parent.strong_count() > 0).then_some(parent);
        thread.ctx = self.ctx.clone();
        Rc::new(RefCell::new(thread))
    }

    // ===== Accessors =====

    pub fn g(&self) -> &Rc<RefCell<Global>> {
        &self.g
    }

    pub fn registry(&self) -> TableRef {
        self.g.borrow().registry.clone()
    }

    pub fn globals(&self) -> TableRef {
        self.g.borrow().global.clone()
    }

    /// The thread-level environment (used outside of any frame)
    pub fn env(&self) -> &TableRef {
        &self.env
    }

    pub fn parent(&self) -> Option<ThreadRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_parent(&mut self, parent: &ThreadRef) {
        self.parent = Some(Rc::downgrade(parent));
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.dead
    }

    pub fn set_panic_hook(&mut self, hook: PanicHook) {
        self.panic_hook = Some(hook);
    }

    pub fn take_panic_hook(&mut self) -> Option<PanicHook> {
        self.panic_hook.take()
    }

    /// Get call stack depth
    #[inline(always)]
    pub fn call_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn call_stack_kind(&self) -> CallStackKind {
        self.stack.kind()
    }

    pub fn call_stack_capacity(&self) -> usize {
        self.stack.capacity()
    }

    /// Get current call frame (equivalent to Lua's L->ci)
    #[inline(always)]
    pub fn current_frame(&self) -> Option<&CallInfo> {
        self.current_frame.and_then(|i| self.stack.get(i))
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut CallInfo> {
        self.current_frame.and_then(|i| self.stack.get_mut(i))
    }

    /// The function of the executing frame
    pub fn current_function(&self) -> Option<FunctionRef> {
        self.current_frame().map(|f| f.func.clone())
    }

    /// Environment of the executing function, or the thread's own outside calls
    pub fn current_env(&self) -> TableRef {
        match self.current_frame() {
            Some(frame) => frame.func.borrow().env.clone(),
            None => self.env.clone(),
        }
    }

    #[inline(always)]
    fn current_local_base(&self) -> usize {
        self.current_frame().map(|f| f.local_base).unwrap_or(0)
    }

    // ===== Cancellation =====

    pub fn set_context(&mut self, ctx: Context) {
        self.ctx = Some(ctx);
    }

    pub fn context(&self) -> Option<&Context> {
        self.ctx.as_ref()
    }

    pub fn remove_context(&mut self) -> Option<Context> {
        self.ctx.take()
    }

    // ===== Stack API =====

    /// Number of values in the current frame
    pub fn get_top(&self) -> i32 {
        self.reg.top().saturating_sub(self.current_local_base()) as i32
    }

    pub fn set_top(&mut self, idx: i32) -> LuaResult<()> {
        let base = self.current_local_base();
        let new_top = if idx >= 0 {
            base + idx as usize
        } else {
            let t = self.reg.top() as i64 + idx as i64 + 1;
            if t < base as i64 {
                return Err(self.raise_error("invalid new top"));
            }
            t as usize
        };
        self.reg.set_top(new_top)
    }

    #[inline]
    pub fn push(&mut self, value: LuaValue) -> LuaResult<()> {
        self.reg.push(value)
    }

    /// Pop up to `n` values of the current frame
    pub fn pop(&mut self, n: usize) {
        for _ in 0..n.min(self.get_top() as usize) {
            self.reg.pop();
        }
    }

    /// Absolute slot for a positive or negative stack index
    fn index_to_slot(&self, idx: i32) -> Option<usize> {
        let base = self.current_local_base();
        if idx > 0 {
            Some(base + idx as usize - 1)
        } else if idx < 0 && idx > REGISTRY_INDEX {
            let t = self.reg.top() as i64 + idx as i64;
            (t >= base as i64).then_some(t as usize)
        } else {
            None
        }
    }

    /// Read a stack position or pseudo-index. Positions outside the current
    /// frame (including 0) read as nil.
    pub fn get(&self, idx: i32) -> LuaValue {
        if idx > REGISTRY_INDEX {
            return match self.index_to_slot(idx) {
                Some(slot) if slot < self.reg.top() => self.reg.get(slot),
                _ => LuaValue::Nil,
            };
        }
        match idx {
            REGISTRY_INDEX => LuaValue::Table(self.registry()),
            ENVIRON_INDEX => LuaValue::Table(self.current_env()),
            GLOBALS_INDEX => LuaValue::Table(self.globals()),
            _ => self.get_upvalue((GLOBALS_INDEX - idx) as usize),
        }
    }

    /// Write a stack position or pseudo-index.
    ///
    /// Registry, environment and globals only accept tables. Stack positions
    /// outside the current frame (including 0) are silently ignored.
    pub fn replace(&mut self, idx: i32, value: LuaValue) -> LuaResult<()> {
        if idx > REGISTRY_INDEX {
            if let Some(slot) = self.index_to_slot(idx) {
                if slot < self.reg.top() {
                    self.reg.set(slot, value)?;
                }
            }
            return Ok(());
        }
        match idx {
            REGISTRY_INDEX => match value {
                LuaValue::Table(t) => {
                    self.g.borrow_mut().registry = t;
                    Ok(())
                }
                _ => Err(self.new_error(ErrorKind::TypeInvariant, "registry must be a table")),
            },
            ENVIRON_INDEX => match value {
                LuaValue::Table(t) => {
                    match self.current_function() {
                        Some(func) => func.borrow_mut().env = t,
                        None => self.env = t,
                    }
                    Ok(())
                }
                _ => Err(self.new_error(ErrorKind::TypeInvariant, "environment must be a table")),
            },
            GLOBALS_INDEX => match value {
                LuaValue::Table(t) => {
                    self.g.borrow_mut().global = t;
                    Ok(())
                }
                _ => Err(self.new_error(ErrorKind::TypeInvariant, "_G must be a table")),
            },
            _ => {
                self.set_upvalue((GLOBALS_INDEX - idx) as usize, value);
                Ok(())
            }
        }
    }

    /// Insert `value` at `idx`, shifting the values above it up
    pub fn insert(&mut self, value: LuaValue, idx: i32) -> LuaResult<()> {
        let base = self.current_local_base();
        match self.index_to_slot(idx) {
            Some(slot) if slot < self.reg.top() => self.reg.insert(slot.max(base), value),
            _ => self.reg.push(value),
        }
    }

    /// Remove the value at `idx`, shifting the values above it down
    pub fn remove(&mut self, idx: i32) -> LuaValue {
        match self.index_to_slot(idx) {
            Some(slot) if slot < self.reg.top() => self.reg.remove(slot),
            _ => LuaValue::Nil,
        }
    }

    // ===== Conversions =====

    pub fn to_bool(&self, idx: i32) -> bool {
        self.get(idx).as_bool()
    }

    /// Number at `idx`; numeric strings are parsed, anything else is 0
    pub fn to_number(&self, idx: i32) -> f64 {
        self.get(idx).as_number_lossy()
    }

    /// Integer at `idx`, truncated toward zero
    pub fn to_int64(&self, idx: i32) -> i64 {
        match self.get(idx) {
            LuaValue::Number(n) => n as i64,
            LuaValue::String(s) => parse_integer(&s).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn to_int(&self, idx: i32) -> i32 {
        self.to_int64(idx) as i32
    }

    /// Text of a string or number at `idx`, otherwise empty
    pub fn to_string(&self, idx: i32) -> String {
        self.get(idx).as_string_lossy()
    }

    pub fn to_table(&self, idx: i32) -> Option<TableRef> {
        self.get(idx).as_table().cloned()
    }

    pub fn to_function(&self, idx: i32) -> Option<FunctionRef> {
        self.get(idx).as_function().cloned()
    }

    pub fn to_userdata(&self, idx: i32) -> Option<UserdataRef> {
        self.get(idx).as_userdata().cloned()
    }

    pub fn to_thread(&self, idx: i32) -> Option<ThreadRef> {
        self.get(idx).as_thread().cloned()
    }

    pub fn to_channel(&self, idx: i32) -> Option<LuaChannel> {
        self.get(idx).as_channel().cloned()
    }

    // ===== Argument checks =====

    pub fn arg_error(&self, n: usize, msg: &str) -> LuaError {
        self.raise_error(format!("bad argument #{} ({})", n, msg))
    }

    fn type_error(&self, n: usize, expected: &str) -> LuaError {
        let got = self.get(n as i32).type_name();
        self.arg_error(n, &format!("{} expected, got {}", expected, got))
    }

    pub fn check_number(&self, n: usize) -> LuaResult<f64> {
        match self.get(n as i32) {
            LuaValue::Number(x) => Ok(x),
            LuaValue::String(s) => parse_number(&s).ok_or_else(|| self.type_error(n, "number")),
            _ => Err(self.type_error(n, "number")),
        }
    }

    pub fn check_int(&self, n: usize) -> LuaResult<i64> {
        self.check_number(n).map(|x| x as i64)
    }

    pub fn check_string(&self, n: usize) -> LuaResult<String> {
        let v = self.get(n as i32);
        if v.can_convert_to_string() {
            Ok(v.as_string_lossy())
        } else {
            Err(self.type_error(n, "string"))
        }
    }

    pub fn check_table(&self, n: usize) -> LuaResult<TableRef> {
        self.to_table(n as i32)
            .ok_or_else(|| self.type_error(n, "table"))
    }

    pub fn opt_number(&self, n: usize, default: f64) -> LuaResult<f64> {
        if self.get(n as i32).is_nil() {
            Ok(default)
        } else {
            self.check_number(n)
        }
    }

    // ===== Constructors =====

    pub fn new_table(&mut self) -> LuaValue {
        self.create_table(0, 0)
    }

    pub fn create_table(&mut self, array_cap: usize, hash_cap: usize) -> LuaValue {
        self.g.borrow_mut().count_allocation();
        LuaValue::table(LuaTable::new(array_cap, hash_cap))
    }

    pub fn new_function<F>(&mut self, f: F) -> LuaValue
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.new_closure(f, Vec::new())
    }

    /// Native closure; each value becomes a closed upvalue, reachable
    /// through `upvalue_index(1..)` while the closure runs
    pub fn new_closure<F>(&mut self, f: F, upvalues: Vec<LuaValue>) -> LuaValue
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        let native: NativeFn = Rc::new(f);
        let upvalues = upvalues.into_iter().map(LuaUpvalue::new_closed).collect();
        self.g.borrow_mut().count_allocation();
        LuaValue::function(LuaFunction::new_native(self.current_env(), native, upvalues))
    }

    /// Script closure over `proto`, with nil upvalues
    pub fn new_script_function(&mut self, proto: Rc<FunctionProto>) -> LuaValue {
        let upvalues = (0..proto.num_upvalues)
            .map(|_| LuaUpvalue::new_closed(LuaValue::Nil))
            .collect();
        self.g.borrow_mut().count_allocation();
        LuaValue::function(LuaFunction::new_script(self.current_env(), proto, upvalues))
    }

    pub fn new_userdata<T: Any>(&mut self, data: T) -> LuaValue {
        self.g.borrow_mut().count_allocation();
        LuaValue::userdata(LuaUserdata::new(data, self.current_env()))
    }

    pub fn new_channel(&mut self, capacity: usize) -> LuaValue {
        LuaValue::Channel(LuaChannel::new(capacity))
    }

    /// Create a temporary file tracked by Global and removed on close
    pub fn new_temp_file(&mut self) -> LuaResult<Rc<TempFile>> {
        let created = self.g.borrow_mut().new_temp_file();
        created.map_err(|e| self.raise_error(format!("cannot create temp file: {}", e)))
    }

    // ===== Globals, fields, metatables =====

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.globals().borrow_mut().raw_set_string(name, value);
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.globals().borrow().raw_get_string(name)
    }

    /// Expose a native function as a global
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        let func = self.new_function(f);
        self.set_global(name, func);
    }

    pub fn set_field(&mut self, obj: &LuaValue, key: &str, value: LuaValue) -> LuaResult<()> {
        match obj {
            LuaValue::Table(t) => {
                t.borrow_mut().raw_set_string(key, value);
                Ok(())
            }
            other => Err(self.raise_error(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    pub fn get_field(&self, obj: &LuaValue, key: &str) -> LuaValue {
        match obj {
            LuaValue::Table(t) => t.borrow().raw_get_string(key),
            _ => LuaValue::Nil,
        }
    }

    pub fn get_metatable(&self, obj: &LuaValue) -> LuaValue {
        match obj {
            LuaValue::Table(t) => t.borrow().metatable().clone(),
            LuaValue::Userdata(u) => u.borrow().metatable().clone(),
            other => self.g.borrow().builtin_metatable(other.type_of()),
        }
    }

    /// Tables and userdata carry their own metatable; every other type
    /// shares one per type through Global
    pub fn set_metatable(&mut self, obj: &LuaValue, mt: LuaValue) -> LuaResult<()> {
        if !(mt.is_nil() || mt.is_table()) {
            return Err(self.raise_error("metatable must be a table or nil"));
        }
        match obj {
            LuaValue::Table(t) => t.borrow_mut().set_metatable(mt),
            LuaValue::Userdata(u) => u.borrow_mut().set_metatable(mt),
            other => self
                .g
                .borrow_mut()
                .set_builtin_metatable(other.type_of(), mt),
        }
        Ok(())
    }

    // ===== Upvalues =====

    /// Open upvalue for an absolute stack slot, reusing an existing one
    pub fn find_upvalue(&mut self, stack_index: usize) -> UpvalueRef {
        if let Some(uv) = &self.uv_cache {
            if uv.points_to_index(stack_index) {
                return uv.clone();
            }
        }
        let uv = match self
            .open_upvalues
            .iter()
            .find(|uv| uv.points_to_index(stack_index))
        {
            Some(uv) => uv.clone(),
            None => {
                let uv = LuaUpvalue::new_open(stack_index);
                self.open_upvalues.push(uv.clone());
                uv
            }
        };
        self.uv_cache = Some(uv.clone());
        uv
    }

    /// Close every open upvalue at or above `level`
    pub fn close_upvalues(&mut self, level: usize) {
        let reg = &self.reg;
        self.open_upvalues.retain(|uv| match uv.stack_index() {
            Some(i) if i >= level => {
                uv.close(reg.get(i));
                false
            }
            _ => true,
        });
        if self.uv_cache.as_ref().is_some_and(|uv| !uv.is_open()) {
            self.uv_cache = None;
        }
    }

    pub fn open_upvalue_count(&self) -> usize {
        self.open_upvalues.len()
    }

    /// Upvalue `n` (1-based) of the running closure
    fn get_upvalue(&self, n: usize) -> LuaValue {
        match self.current_frame() {
            Some(frame) => frame
                .func
                .borrow()
                .upvalues
                .get(n - 1)
                .map(|uv| uv.get_value(self.reg.as_slice()))
                .unwrap_or_default(),
            None => LuaValue::Nil,
        }
    }

    fn set_upvalue(&mut self, n: usize, value: LuaValue) {
        let uv = self
            .current_frame()
            .and_then(|frame| frame.func.borrow().upvalues.get(n - 1).cloned());
        if let Some(uv) = uv {
            uv.set_value(self.reg.as_mut_slice(), value);
        }
    }

    // ===== Errors =====

    /// Build a runtime error for the caller to return.
    /// The message is prefixed with the location of a running script frame.
    pub fn raise_error(&self, msg: impl Into<String>) -> LuaError {
        self.new_error(ErrorKind::Runtime, &msg.into())
    }

    fn new_error(&self, kind: ErrorKind, msg: &str) -> LuaError {
        let err = LuaError::new(kind, LuaValue::from(format!("{}{}", self.where_(), msg)));
        self.attach_traceback(err)
    }

    fn attach_traceback(&self, err: LuaError) -> LuaError {
        if self.options.include_native_trace {
            err.with_traceback(self.traceback())
        } else {
            err
        }
    }

    /// `source:line: ` of the running frame when it is a script frame
    fn where_(&self) -> String {
        match self.current_frame() {
            Some(frame) => match frame.func.borrow().proto() {
                Some(p) => format!("{}:{}: ", p.source, p.line_at(frame.pc)),
                None => String::new(),
            },
            None => String::new(),
        }
    }

    /// Generate a stack traceback, innermost frame first
    pub fn traceback(&self) -> String {
        let mut result = String::from("stack traceback:");
        let mut next = self.current_frame;
        let mut level = 0;
        while let Some(ci) = next.and_then(|i| self.stack.get(i)) {
            if level >= MAX_TRACEBACK_LEVELS {
                result.push_str("\n\t...");
                break;
            }
            match ci.func.borrow().proto() {
                Some(p) => result.push_str(&format!(
                    "\n\t{}:{}: in function <{}:{}>",
                    p.source,
                    p.line_at(ci.pc),
                    p.source,
                    p.line_defined
                )),
                None => result.push_str("\n\t[native]: in function <native>"),
            }
            next = ci.parent;
            level += 1;
        }
        result
    }

    // ===== Calls =====

    /// Call the function below the top `nargs` values.
    ///
    /// Results replace the function and arguments; `nresults` of them are
    /// kept (MULTRET keeps all). Errors are returned to the caller; when one
    /// escapes the outermost frame outside any protected call, the panic hook
    /// sees it first.
    pub fn call(&mut self, nargs: usize, nresults: i32) -> LuaResult<()> {
        let result = self.call_inner(nargs, nresults);
        if let Err(err) = &result {
            if self.protected_depth == 0 && self.stack.is_empty() {
                if let Some(hook) = self.panic_hook.clone() {
                    hook(self, err);
                }
            }
        }
        result
    }

    /// Protected call.
    ///
    /// On failure the stack is unwound to the function slot. With a handler,
    /// the handler is called with the error object and its result becomes
    /// the object of the returned error.
    pub fn pcall(&mut self, nargs: usize, nresults: i32, handler: Option<LuaValue>) -> LuaResult<()> {
        if self.dead {
            return Err(LuaError::runtime("cannot call on a closed thread"));
        }
        let func_idx = self.call_slot(nargs)?;
        let depth = self.stack.len();
        let saved_frame = self.current_frame;

        self.protected_depth += 1;
        let result = self.call_inner(nargs, nresults);
        self.protected_depth -= 1;

        let err = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        log::trace!("pcall recovered: {}", err.message());

        self.stack.truncate(depth);
        self.current_frame = saved_frame;
        self.close_upvalues(func_idx);
        self.reg.set_top(func_idx)?;

        let Some(handler) = handler else {
            return Err(err);
        };
        self.push(handler)?;
        self.push(err.object().clone())?;

        self.protected_depth += 1;
        let handled = self.call_inner(1, 1);
        self.protected_depth -= 1;

        match handled {
            Ok(()) => {
                let object = self.reg.pop();
                Err(err.with_object(object))
            }
            Err(handler_err) => {
                self.reg.set_top(func_idx)?;
                Err(LuaError::error_handler(&handler_err))
            }
        }
    }

    fn call_inner(&mut self, nargs: usize, nresults: i32) -> LuaResult<()> {
        if self.dead {
            return Err(LuaError::runtime("cannot call on a closed thread"));
        }
        let func_idx = self.call_slot(nargs)?;
        let func = match self.reg.get(func_idx) {
            LuaValue::Function(f) => f,
            other => {
                let err = self.raise_error(format!(
                    "attempt to call a {} value",
                    other.type_name()
                ));
                return self.abort_call(func_idx, err);
            }
        };
        if self.ctx.as_ref().is_some_and(Context::is_cancelled) {
            let err = self.attach_traceback(LuaError::cancelled());
            return self.abort_call(func_idx, err);
        }

        if let Err(err) = self.push_frame(func.clone(), func_idx, nargs, nresults) {
            return self.abort_call(func_idx, err);
        }
        let result = self.run_function(&func);
        self.pop_frame();

        match result {
            Ok(n) => self.move_results(func_idx, n, nresults),
            Err(err) => self.abort_call(func_idx, err),
        }
    }

    /// Slot of the function below the top `nargs` values, which must all
    /// lie inside the current frame
    fn call_slot(&self, nargs: usize) -> LuaResult<usize> {
        let top = self.reg.top();
        if top < self.current_local_base() + nargs + 1 {
            return Err(self.raise_error("not enough values on the stack for call"));
        }
        Ok(top - nargs - 1)
    }

    /// Drop the function and its arguments, then fail with `err`
    fn abort_call(&mut self, func_idx: usize, err: LuaError) -> LuaResult<()> {
        self.reg.set_top(func_idx)?;
        Err(err)
    }

    /// Push a new call frame; fails with "stack overflow" at capacity
    fn push_frame(
        &mut self,
        func: FunctionRef,
        base: usize,
        nargs: usize,
        nret: i32,
    ) -> LuaResult<()> {
        let frame = CallInfo {
            idx: self.stack.len(),
            func,
            parent: self.current_frame,
            pc: 0,
            base,
            local_base: base + 1,
            return_base: base,
            nargs,
            nret,
            tail_call: 0,
        };
        if self.stack.push(frame).is_err() {
            return Err(self.new_error(ErrorKind::StackOverflow, "stack overflow"));
        }
        let idx = self.stack.len() - 1;
        log::trace!("push frame #{} (base {})", idx, base);
        self.current_frame = Some(idx);
        Ok(())
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.stack.pop() {
            log::trace!("pop frame #{}", frame.idx);
            self.close_upvalues(frame.local_base);
            self.current_frame = frame.parent;
        }
    }

    fn run_function(&mut self, func: &FunctionRef) -> LuaResult<usize> {
        let kind = func.borrow().kind.clone();
        let nresults = match kind {
            FunctionKind::Native(native) => self.call_native(&native)?,
            FunctionKind::Script(proto) => match self.options.executor.clone() {
                Some(executor) => executor.execute(self, &proto)?,
                None => {
                    return Err(self.raise_error("no executor installed for script functions"));
                }
            },
        };
        Ok(nresults.min(self.get_top() as usize))
    }

    /// Run a native callback, turning a panic into an error carrying the
    /// panic message
    fn call_native(&mut self, native: &NativeFn) -> LuaResult<usize> {
        match panic::catch_unwind(AssertUnwindSafe(|| native(self))) {
            Ok(result) => result,
            Err(payload) => {
                let err = LuaError::panic(panic_message(payload.as_ref()));
                Err(self.attach_traceback(err))
            }
        }
    }

    /// Move the top `n` values down to `func_idx`, padded or cut to `nresults`
    fn move_results(&mut self, func_idx: usize, n: usize, nresults: i32) -> LuaResult<()> {
        let wanted = if nresults == MULTRET {
            n
        } else {
            nresults.max(0) as usize
        };
        let mut buf = self.alloc.take(n);
        let start = self.reg.top() - n;
        buf.extend_from_slice(self.reg.range(start));

        let moved = self.reg.set_top(func_idx).and_then(|_| {
            buf.iter()
                .cloned()
                .chain(std::iter::repeat(LuaValue::Nil))
                .take(wanted)
                .try_for_each(|v| self.reg.push(v))
        });
        self.alloc.give_back(buf);
        moved
    }

    // ===== Lifecycle =====

    /// Mark the thread dead, drop its frames and remove every temporary
    /// file tracked by its Global
    pub fn close(&mut self) {
        log::debug!("closing thread ({} frames)", self.stack.len());
        self.dead = true;
        self.close_upvalues(0);
        self.stack.clear();
        self.current_frame = None;
        self.g.borrow_mut().release_temp_files();
    }

    // ===== Clone / restore =====

    /// Point-in-time copy of the whole thread.
    ///
    /// The copy gets its own Global (see `Global::clone_global`) and its
    /// environment points at that Global's variables table. Value stack and
    /// call frames are copied slot for slot, the current frame index carries
    /// over, and open upvalues are duplicated into new boxes. The parent link,
    /// panic hook and cancellation context are shared.
    pub fn clone_state(&self) -> LuaState {
        let g = self.g.borrow().clone_global();
        let env = g.global.clone();
        let (open_upvalues, uv_cache) = self.clone_upvalues();
        log::debug!(
            "cloning thread: {} stack slots, {} frames",
            self.reg.top(),
            self.stack.len()
        );

        LuaState {
            g: Rc::new(RefCell::new(g)),
            parent: self.parent.clone(),
            env,
            panic_hook: self.panic_hook.clone(),
            dead: self.dead,
            options: self.options.clone(),
            reg: self.reg.clone(),
            stack: self.stack.clone(),
            alloc: self.alloc.fork(),
            current_frame: self.current_frame,
            open_upvalues,
            uv_cache,
            protected_depth: self.protected_depth,
            ctx: self.ctx.clone(),
        }
    }

    fn clone_upvalues(&self) -> (Vec<UpvalueRef>, Option<UpvalueRef>) {
        let open: Vec<UpvalueRef> = self.open_upvalues.iter().map(|uv| uv.duplicate()).collect();
        let cache = self.uv_cache.as_ref().map(|cached| {
            self.open_upvalues
                .iter()
                .position(|uv| Rc::ptr_eq(uv, cached))
                .map(|i| open[i].clone())
                .unwrap_or_else(|| cached.duplicate())
        });
        (open, cache)
    }

    /// Overwrite every field of this thread with `captured`, keeping this
    /// object's identity. Holders of a handle to this thread observe the
    /// captured state from now on.
    pub fn restore_from(&mut self, captured: LuaState) {
        let LuaState {
            g,
            parent,
            env,
            panic_hook,
            dead,
            options,
            reg,
            stack,
            alloc,
            current_frame,
            open_upvalues,
            uv_cache,
            protected_depth,
            ctx,
        } = captured;

        self.g = g;
        self.parent = parent;
        self.env = env;
        self.panic_hook = panic_hook;
        self.dead = dead;
        self.options = options;
        self.reg = reg;
        self.stack = stack;
        self.alloc = alloc;
        self.current_frame = current_frame;
        self.open_upvalues = open_upvalues;
        self.uv_cache = uv_cache;
        self.protected_depth = protected_depth;
        self.ctx = ctx;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native function panicked".to_owned()
    }
}

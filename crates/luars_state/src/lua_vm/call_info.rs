// CallInfo - Information about a single function call and the call-frame
// stacks that hold them.

use crate::lua_value::FunctionRef;
use crate::lua_vm::lua_limits::CALL_FRAME_SEGMENT_SIZE;

/// Information about a single function call on the call stack
#[derive(Clone)]
pub struct CallInfo {
    /// Position of this frame in the call-frame stack
    pub idx: usize,

    /// The function being called
    pub func: FunctionRef,

    /// Index of the calling frame, None for a call from the host
    pub parent: Option<usize>,

    /// Program counter (script functions only, maintained by the executor)
    pub pc: usize,

    /// Stack slot holding the called function
    pub base: usize,

    /// First argument slot; stack index 1 inside the call maps here
    pub local_base: usize,

    /// Where results are moved when the call returns
    pub return_base: usize,

    /// Number of arguments passed
    pub nargs: usize,

    /// Number of expected results (-1 = MULTRET)
    pub nret: i32,

    /// Tail calls folded into this frame
    pub tail_call: usize,
}

impl CallInfo {
    pub fn is_native(&self) -> bool {
        self.func.borrow().is_native()
    }
}

/// Which call-frame stack a thread runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStackKind {
    Fixed,
    Growable,
}

/// Call-frame stack.
///
/// `Fixed` reserves its full capacity up front; `Growable` allocates frames
/// in segments as the depth increases. Both refuse frames beyond the
/// configured capacity.
#[derive(Clone)]
pub enum CallFrameStack {
    Fixed(FixedCallFrameStack),
    Growable(GrowableCallFrameStack),
}

impl CallFrameStack {
    pub fn new(capacity: usize, growable: bool) -> Self {
        if growable {
            CallFrameStack::Growable(GrowableCallFrameStack::new(capacity))
        } else {
            CallFrameStack::Fixed(FixedCallFrameStack::new(capacity))
        }
    }

    pub fn kind(&self) -> CallStackKind {
        match self {
            CallFrameStack::Fixed(_) => CallStackKind::Fixed,
            CallFrameStack::Growable(_) => CallStackKind::Growable,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            CallFrameStack::Fixed(s) => s.capacity,
            CallFrameStack::Growable(s) => s.max_size,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CallFrameStack::Fixed(s) => s.frames.len(),
            CallFrameStack::Growable(s) => s.len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Push a frame. Gives it back when the stack is full.
    pub fn push(&mut self, frame: CallInfo) -> Result<(), CallInfo> {
        if self.is_full() {
            return Err(frame);
        }
        match self {
            CallFrameStack::Fixed(s) => s.frames.push(frame),
            CallFrameStack::Growable(s) => s.push(frame),
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Option<CallInfo> {
        match self {
            CallFrameStack::Fixed(s) => s.frames.pop(),
            CallFrameStack::Growable(s) => s.pop(),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&CallInfo> {
        match self {
            CallFrameStack::Fixed(s) => s.frames.get(idx),
            CallFrameStack::Growable(s) => s.get(idx),
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut CallInfo> {
        match self {
            CallFrameStack::Fixed(s) => s.frames.get_mut(idx),
            CallFrameStack::Growable(s) => s.get_mut(idx),
        }
    }

    pub fn last(&self) -> Option<&CallInfo> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Drop frames above `len`
    pub fn truncate(&mut self, len: usize) {
        while self.len() > len {
            self.pop();
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }
}

/// Array-backed stack with its whole capacity reserved at construction
pub struct FixedCallFrameStack {
    frames: Vec<CallInfo>,
    capacity: usize,
}

impl FixedCallFrameStack {
    pub fn new(capacity: usize) -> Self {
        FixedCallFrameStack {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }
}

impl Clone for FixedCallFrameStack {
    fn clone(&self) -> Self {
        // Vec::clone would only reserve len(), keep the full reservation
        let mut frames = Vec::with_capacity(self.capacity);
        frames.extend(self.frames.iter().cloned());
        FixedCallFrameStack {
            frames,
            capacity: self.capacity,
        }
    }
}

/// Segmented stack that only allocates the depth actually reached
#[derive(Clone)]
pub struct GrowableCallFrameStack {
    segments: Vec<Vec<CallInfo>>,
    len: usize,
    max_size: usize,
}

impl GrowableCallFrameStack {
    pub fn new(max_size: usize) -> Self {
        GrowableCallFrameStack {
            segments: Vec::new(),
            len: 0,
            max_size,
        }
    }

    fn push(&mut self, frame: CallInfo) {
        let seg = self.len / CALL_FRAME_SEGMENT_SIZE;
        if seg == self.segments.len() {
            self.segments
                .push(Vec::with_capacity(CALL_FRAME_SEGMENT_SIZE));
        }
        self.segments[seg].push(frame);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<CallInfo> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let seg = self.len / CALL_FRAME_SEGMENT_SIZE;
        let frame = self.segments[seg].pop();
        // release the segment above the one in use
        if self.segments.len() > seg + 2 {
            self.segments.truncate(seg + 2);
        }
        frame
    }

    fn get(&self, idx: usize) -> Option<&CallInfo> {
        if idx >= self.len {
            return None;
        }
        self.segments[idx / CALL_FRAME_SEGMENT_SIZE].get(idx % CALL_FRAME_SEGMENT_SIZE)
    }

    fn get_mut(&mut self, idx: usize) -> Option<&mut CallInfo> {
        if idx >= self.len {
            return None;
        }
        self.segments[idx / CALL_FRAME_SEGMENT_SIZE].get_mut(idx % CALL_FRAME_SEGMENT_SIZE)
    }
}

// Channel - bounded value-passing conduit between coroutines of one runtime.
// Coroutines hand off cooperatively, so a channel never blocks: a full
// channel refuses the value and an empty one yields nothing.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::lua_value::LuaValue;

#[derive(Clone)]
pub struct LuaChannel {
    inner: Rc<ChannelInner>,
}

struct ChannelInner {
    queue: RefCell<VecDeque<LuaValue>>,
    capacity: usize,
    closed: Cell<bool>,
}

impl LuaChannel {
    /// A capacity of 0 is treated as 1 (a single hand-off slot)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LuaChannel {
            inner: Rc::new(ChannelInner {
                queue: RefCell::new(VecDeque::with_capacity(capacity)),
                capacity,
                closed: Cell::new(false),
            }),
        }
    }

    /// Queue a value. Gives the value back when the channel is full or closed.
    pub fn try_send(&self, value: LuaValue) -> Result<(), LuaValue> {
        if self.inner.closed.get() {
            return Err(value);
        }
        let mut queue = self.inner.queue.borrow_mut();
        if queue.len() >= self.inner.capacity {
            return Err(value);
        }
        queue.push_back(value);
        Ok(())
    }

    pub fn try_recv(&self) -> Option<LuaValue> {
        self.inner.queue.borrow_mut().pop_front()
    }

    /// Pending values stay receivable after close
    pub fn close(&self) {
        self.inner.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.borrow().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaChannel) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for LuaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({:p}, {}/{})", Rc::as_ptr(&self.inner), self.len(), self.capacity())
    }
}

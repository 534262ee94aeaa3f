use crate::lua_value::LuaValue;

/// Pool of scratch buffers used while shuffling call results.
///
/// Pooled buffers are always empty when handed out, so the pool itself
/// carries no thread state and a cloned thread simply starts a fresh one.
#[derive(Debug)]
pub struct Allocator {
    pool: Vec<Vec<LuaValue>>,
    max_pooled: usize,
    reused: usize,
}

impl Allocator {
    pub fn new(max_pooled: usize) -> Self {
        Allocator {
            pool: Vec::with_capacity(max_pooled),
            max_pooled,
            reused: 0,
        }
    }

    /// An empty buffer able to hold `capacity` values
    pub fn take(&mut self, capacity: usize) -> Vec<LuaValue> {
        match self.pool.pop() {
            Some(mut buf) => {
                self.reused += 1;
                buf.reserve(capacity);
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    pub fn give_back(&mut self, mut buf: Vec<LuaValue>) {
        if self.pool.len() < self.max_pooled {
            buf.clear();
            self.pool.push(buf);
        }
    }

    /// How many buffers were served from the pool
    pub fn reused(&self) -> usize {
        self.reused
    }

    pub fn fork(&self) -> Allocator {
        Allocator::new(self.max_pooled)
    }
}

// Value stack - the registers and temporaries of one thread.
// Layout: [frame0 func, args...][frame1 func, args...]...
// `top` is the first free slot; slots above it hold nil.

use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaError, LuaResult};

#[derive(Clone)]
pub struct ValueStack {
    slots: Vec<LuaValue>,
    top: usize,
    max_size: usize,
    grow_step: usize,
}

impl ValueStack {
    /// `max_size` below `size` pins the stack at `size` slots
    pub fn new(size: usize, max_size: usize, grow_step: usize) -> Self {
        ValueStack {
            slots: vec![LuaValue::Nil; size],
            top: 0,
            max_size: max_size.max(size),
            grow_step: grow_step.max(1),
        }
    }

    #[inline(always)]
    pub fn top(&self) -> usize {
        self.top
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Make room for `needed` slots, growing in `grow_step` increments
    fn ensure(&mut self, needed: usize) -> LuaResult<()> {
        if needed <= self.slots.len() {
            return Ok(());
        }
        if needed > self.max_size {
            return Err(LuaError::stack_overflow("registry overflow"));
        }
        let grown = (self.slots.len() + self.grow_step)
            .max(needed)
            .min(self.max_size);
        self.slots.resize(grown, LuaValue::Nil);
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, value: LuaValue) -> LuaResult<()> {
        self.ensure(self.top + 1)?;
        self.slots[self.top] = value;
        self.top += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> LuaValue {
        if self.top == 0 {
            return LuaValue::Nil;
        }
        self.top -= 1;
        std::mem::take(&mut self.slots[self.top])
    }

    /// Slot at an absolute index, nil when out of range
    #[inline]
    pub fn get(&self, index: usize) -> LuaValue {
        self.slots.get(index).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: LuaValue) -> LuaResult<()> {
        self.ensure(index + 1)?;
        self.slots[index] = value;
        Ok(())
    }

    /// Move the top, clearing slots dropped when it shrinks
    pub fn set_top(&mut self, top: usize) -> LuaResult<()> {
        self.ensure(top)?;
        if top < self.top {
            self.slots[top..self.top].fill(LuaValue::Nil);
        }
        self.top = top;
        Ok(())
    }

    /// Insert at an absolute index below top, shifting the rest up
    pub fn insert(&mut self, index: usize, value: LuaValue) -> LuaResult<()> {
        self.ensure(self.top + 1)?;
        self.slots[index..=self.top].rotate_right(1);
        self.slots[index] = value;
        self.top += 1;
        Ok(())
    }

    /// Remove the slot at an absolute index below top, shifting the rest down
    pub fn remove(&mut self, index: usize) -> LuaValue {
        let removed = std::mem::take(&mut self.slots[index]);
        self.slots[index..self.top].rotate_left(1);
        self.top -= 1;
        removed
    }

    pub fn as_slice(&self) -> &[LuaValue] {
        &self.slots
    }

    pub fn as_mut_slice(&mut self) -> &mut [LuaValue] {
        &mut self.slots
    }

    /// Live slots [from, top)
    pub fn range(&self, from: usize) -> &[LuaValue] {
        &self.slots[from.min(self.top)..self.top]
    }
}

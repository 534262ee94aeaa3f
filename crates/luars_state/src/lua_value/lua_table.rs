// Lua table implementation
// - Array part for integer keys [1..n], promoted from the hash part as soon
//   as the keys become contiguous
// - String fast path keyed by the text itself
// - Generic hash part for every other key
// - Insertion-ordered key list (plus reverse index) driving `next`
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use smol_str::SmolStr;

use super::lua_value::{LuaValue, TableRef, float_to_integer};
use crate::lua_vm::lua_limits::MAX_ARRAY_INDEX;

/// Hybrid array/hash table with a metatable slot.
///
/// A key lives in exactly one of `array`, `strdict` or `dict`. The `keys`
/// list records hash-part keys in first-insertion order; entries whose value
/// was removed stay in the list and are skipped by iteration.
pub struct LuaTable {
    metatable: LuaValue,

    /// Values for integer keys [1..array.len()]; never ends with nil
    array: Vec<LuaValue>,

    /// Generic hash part (numbers outside the array, booleans, objects)
    dict: AHashMap<LuaValue, LuaValue>,

    /// Fast path for string keys
    strdict: AHashMap<SmolStr, LuaValue>,

    /// Hash-part keys in insertion order
    keys: Vec<LuaValue>,

    /// Position of each key inside `keys`
    k2i: AHashMap<LuaValue, usize>,
}

impl Default for LuaTable {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl LuaTable {
    /// Create an empty table with capacity hints for the array and hash parts
    pub fn new(array_cap: usize, hash_cap: usize) -> Self {
        LuaTable {
            metatable: LuaValue::Nil,
            array: Vec::with_capacity(array_cap),
            dict: AHashMap::new(),
            strdict: AHashMap::with_capacity(hash_cap),
            keys: Vec::with_capacity(hash_cap),
            k2i: AHashMap::with_capacity(hash_cap),
        }
    }

    pub fn into_ref(self) -> TableRef {
        Rc::new(RefCell::new(self))
    }

    /// Get the metatable of this table (nil when unset)
    pub fn metatable(&self) -> &LuaValue {
        &self.metatable
    }

    pub fn set_metatable(&mut self, mt: LuaValue) {
        self.metatable = mt;
    }

    /// Border of the array part
    #[inline]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.dict.is_empty() && self.strdict.is_empty()
    }

    /// Largest positive integer key holding a value in the array part
    pub fn max_n(&self) -> usize {
        self.array
            .iter()
            .rposition(|v| !v.is_nil())
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    // ===== Reads =====

    /// Generic key access: array position, string fast path, then hash part
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        match key {
            LuaValue::Number(n) => match float_to_integer(*n) {
                Some(i) => self.raw_get_int(i),
                None => self.raw_get_h(key),
            },
            LuaValue::String(s) => self.raw_get_string(s),
            _ => self.raw_get_h(key),
        }
    }

    #[inline]
    pub fn raw_get_int(&self, key: i64) -> LuaValue {
        if key >= 1 && (key as u64) <= self.array.len() as u64 {
            return self.array[(key - 1) as usize].clone();
        }
        self.raw_get_h(&LuaValue::integer(key))
    }

    #[inline]
    pub fn raw_get_string(&self, key: &str) -> LuaValue {
        self.strdict.get(key).cloned().unwrap_or_default()
    }

    /// Read from the generic hash part only
    pub fn raw_get_h(&self, key: &LuaValue) -> LuaValue {
        if let LuaValue::String(s) = key {
            return self.raw_get_string(s);
        }
        self.dict.get(key).cloned().unwrap_or_default()
    }

    // ===== Writes =====

    /// Generic key write. Nil and NaN keys are ignored.
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) {
        match key {
            LuaValue::Nil => {}
            LuaValue::Number(n) if n.is_nan() => {}
            LuaValue::Number(n) => match float_to_integer(n) {
                Some(i) => self.raw_set_int(i, value),
                None => self.raw_set_h(key, value),
            },
            LuaValue::String(s) => self.raw_set_string(s, value),
            _ => self.raw_set_h(key, value),
        }
    }

    /// Integer key write with array promotion
    pub fn raw_set_int(&mut self, key: i64, value: LuaValue) {
        if key < 1 || key >= MAX_ARRAY_INDEX {
            self.raw_set_h(LuaValue::integer(key), value);
            return;
        }

        let index = (key - 1) as usize;
        let alen = self.array.len();
        if index < alen {
            self.array[index] = value;
            if index == alen - 1 {
                self.trim_array();
            }
        } else if index == alen {
            if value.is_nil() {
                return;
            }
            self.array.push(value);
            self.migrate_from_hash();
        } else {
            self.raw_set_h(LuaValue::integer(key), value);
        }
    }

    pub fn raw_set_string(&mut self, key: impl Into<SmolStr>, value: LuaValue) {
        let key = key.into();
        if value.is_nil() {
            self.strdict.remove(&key);
            return;
        }
        if self.strdict.insert(key.clone(), value).is_none() {
            self.remember_key(LuaValue::String(key));
        }
    }

    /// Write to the hash part, bypassing the array part
    pub fn raw_set_h(&mut self, key: LuaValue, value: LuaValue) {
        match key {
            LuaValue::Nil => {}
            LuaValue::Number(n) if n.is_nan() => {}
            LuaValue::String(s) => self.raw_set_string(s, value),
            key => {
                if value.is_nil() {
                    self.dict.remove(&key);
                    return;
                }
                if self.dict.insert(key.clone(), value).is_none() {
                    self.remember_key(key);
                }
            }
        }
    }

    fn remember_key(&mut self, key: LuaValue) {
        if !self.k2i.contains_key(&key) {
            self.k2i.insert(key.clone(), self.keys.len());
            self.keys.push(key);
        }
    }

    /// Pull keys that became contiguous with the array out of the hash part
    fn migrate_from_hash(&mut self) {
        if self.dict.is_empty() {
            return;
        }
        loop {
            let next = LuaValue::integer(self.array.len() as i64 + 1);
            match self.dict.remove(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    fn trim_array(&mut self) {
        while matches!(self.array.last(), Some(LuaValue::Nil)) {
            self.array.pop();
        }
    }

    // ===== Sequence helpers =====

    /// Append after the current border
    pub fn append(&mut self, value: LuaValue) {
        if value.is_nil() {
            return;
        }
        let key = self.array.len() as i64 + 1;
        self.raw_set_int(key, value);
    }

    /// Insert at 1-based position `pos`, shifting the array part right
    pub fn insert(&mut self, pos: i64, value: LuaValue) {
        if pos > self.array.len() as i64 {
            self.raw_set_int(pos, value);
            return;
        }
        if pos <= 0 {
            self.raw_set_h(LuaValue::integer(pos), value);
            return;
        }
        self.array.insert((pos - 1) as usize, value);
        self.trim_array();
        self.migrate_from_hash();
    }

    /// Remove the value at 1-based position `pos`, shifting the array part
    /// left. A non-positive position removes the last element.
    pub fn remove(&mut self, pos: i64) -> LuaValue {
        let alen = self.array.len();
        if alen == 0 {
            return LuaValue::Nil;
        }
        let removed = if pos <= 0 || pos as usize == alen {
            self.array.pop().unwrap_or_default()
        } else if (pos as usize) < alen {
            self.array.remove((pos - 1) as usize)
        } else {
            LuaValue::Nil
        };
        self.trim_array();
        removed
    }

    // ===== Iteration =====

    /// Iterator step: array part first, then hash keys in insertion order.
    /// Returns None when `key` is the last key or is not in the table.
    pub fn next(&self, key: &LuaValue) -> Option<(LuaValue, LuaValue)> {
        let mut hash_start = 0;
        let array_start = match key {
            LuaValue::Nil => Some(0),
            _ => match key.as_integer() {
                Some(i) if i >= 1 && (i as u64) <= self.array.len() as u64 => Some(i as usize),
                _ => None,
            },
        };

        match array_start {
            Some(start) => {
                for (i, v) in self.array.iter().enumerate().skip(start) {
                    if !v.is_nil() {
                        return Some((LuaValue::integer(i as i64 + 1), v.clone()));
                    }
                }
            }
            None => hash_start = *self.k2i.get(key)? + 1,
        }

        self.keys[hash_start.min(self.keys.len())..]
            .iter()
            .find_map(|k| {
                let v = self.raw_get_h(k);
                (!v.is_nil()).then(|| (k.clone(), v))
            })
    }

    /// Visit every key/value pair in iteration order
    pub fn for_each<F: FnMut(&LuaValue, &LuaValue)>(&self, mut f: F) {
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                f(&LuaValue::integer(i as i64 + 1), v);
            }
        }
        for k in &self.keys {
            let v = self.raw_get_h(k);
            if !v.is_nil() {
                f(k, &v);
            }
        }
    }

    // ===== Clone =====

    /// One-level copy of a table.
    ///
    /// The result is a new table with its own array, hash parts and key list,
    /// holding the same element values. Nested tables are shared, not copied.
    /// The metatable is copied by the same rule, hop by hop along the chain;
    /// a chain that loops back reuses the copy already made.
    pub fn clone_ref(table: &TableRef) -> TableRef {
        let mut seen = Vec::new();
        Self::clone_chain(table, &mut seen)
    }

    /// `clone_ref` sharing `seen` across calls, so a source table reached
    /// twice gets a single copy
    pub(crate) fn clone_chain(
        table: &TableRef,
        seen: &mut Vec<(*const RefCell<LuaTable>, TableRef)>,
    ) -> TableRef {
        if let Some((_, copy)) = seen.iter().find(|(src, _)| *src == Rc::as_ptr(table)) {
            return copy.clone();
        }

        let copy = LuaTable::default().into_ref();
        seen.push((Rc::as_ptr(table), copy.clone()));

        let source = table.borrow();
        let metatable = match &source.metatable {
            LuaValue::Table(mt) => LuaValue::Table(Self::clone_chain(mt, seen)),
            other => other.clone_value(),
        };

        *copy.borrow_mut() = LuaTable {
            metatable,
            array: source.array.clone(),
            dict: source.dict.clone(),
            strdict: source.strdict.clone(),
            keys: source.keys.clone(),
            k2i: source.k2i.clone(),
        };
        copy
    }
}

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::LuaTable;
use super::lua_value::{LuaValue, TableRef};

/// Userdata - arbitrary host data with an environment and optional metatable.
/// The payload is opaque to the runtime and always shared by reference.
pub struct LuaUserdata {
    data: Rc<RefCell<Box<dyn Any>>>,
    env: TableRef,
    metatable: LuaValue,
}

impl LuaUserdata {
    pub fn new<T: Any>(data: T, env: TableRef) -> Self {
        LuaUserdata {
            data: Rc::new(RefCell::new(Box::new(data))),
            env,
            metatable: LuaValue::Nil,
        }
    }

    pub fn get_data(&self) -> Rc<RefCell<Box<dyn Any>>> {
        self.data.clone()
    }

    /// Borrow the payload as `T`, None when it holds another type
    pub fn downcast_ref<T: Any>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.data.borrow(), |b| (**b).downcast_ref::<T>()).ok()
    }

    pub fn downcast_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.data.borrow_mut(), |b| (**b).downcast_mut::<T>()).ok()
    }

    pub fn env(&self) -> &TableRef {
        &self.env
    }

    pub fn set_env(&mut self, env: TableRef) {
        self.env = env;
    }

    pub fn metatable(&self) -> &LuaValue {
        &self.metatable
    }

    pub fn set_metatable(&mut self, metatable: LuaValue) {
        self.metatable = metatable;
    }

    /// Same payload, one-level copies of the environment and metatable
    pub fn clone_userdata(&self) -> LuaUserdata {
        LuaUserdata {
            data: self.data.clone(),
            env: LuaTable::clone_ref(&self.env),
            metatable: self.metatable.clone_value(),
        }
    }
}

impl fmt::Debug for LuaUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Userdata({:p})", self.data.as_ptr())
    }
}

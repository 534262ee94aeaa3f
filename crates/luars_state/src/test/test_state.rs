// Tests for the stack API, pseudo-indices and conversions
use std::rc::Rc;

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{
    ENVIRON_INDEX, ErrorKind, GLOBALS_INDEX, LuaState, Options, REGISTRY_INDEX,
};

fn new_state() -> LuaState {
    LuaState::new(Options::default())
}

#[test]
fn test_push_and_get() {
    let mut l = new_state();
    l.push(LuaValue::integer(1)).unwrap();
    l.push(LuaValue::from("two")).unwrap();

    assert_eq!(l.get_top(), 2);
    assert_eq!(l.get(1), LuaValue::integer(1));
    assert_eq!(l.get(2), LuaValue::from("two"));
    assert_eq!(l.get(-1), LuaValue::from("two"));
    assert_eq!(l.get(-2), LuaValue::integer(1));
}

#[test]
fn test_get_out_of_range_is_nil() {
    let mut l = new_state();
    l.push(LuaValue::integer(1)).unwrap();
    assert!(l.get(0).is_nil());
    assert!(l.get(2).is_nil());
    assert!(l.get(100).is_nil());
    assert!(l.get(-2).is_nil());
}

#[test]
fn test_replace_out_of_range_is_noop() {
    let mut l = new_state();
    l.push(LuaValue::integer(1)).unwrap();
    l.replace(0, LuaValue::integer(5)).unwrap();
    l.replace(3, LuaValue::integer(5)).unwrap();
    l.replace(-2, LuaValue::integer(5)).unwrap();
    assert_eq!(l.get_top(), 1);
    assert_eq!(l.get(1), LuaValue::integer(1));
    assert!(l.get(3).is_nil());

    l.replace(-1, LuaValue::from("x")).unwrap();
    assert_eq!(l.get(1), LuaValue::from("x"));
}

#[test]
fn test_stack_relative_to_frame() {
    let mut l = new_state();
    l.push(LuaValue::from("outside")).unwrap();
    l.register("inner", |l| {
        // index 1 is the first argument, not the caller's slots
        let arg = l.get(1);
        assert_eq!(l.get_top(), 1);
        assert!(l.get(-2).is_nil());
        l.replace(-2, LuaValue::from("clobbered"))?;
        l.push(arg)?;
        Ok(1)
    });
    let f = l.get_global("inner");
    l.push(f).unwrap();
    l.push(LuaValue::integer(7)).unwrap();
    l.call(1, 1).unwrap();

    assert_eq!(l.get_top(), 2);
    assert_eq!(l.get(1), LuaValue::from("outside"));
    assert_eq!(l.get(2), LuaValue::integer(7));
}

#[test]
fn test_registry_and_globals_pseudo_index() {
    let mut l = new_state();
    let reg = l.get(REGISTRY_INDEX);
    assert!(Rc::ptr_eq(reg.as_table().unwrap(), &l.registry()));
    let globals = l.get(GLOBALS_INDEX);
    assert!(Rc::ptr_eq(globals.as_table().unwrap(), &l.globals()));

    let new_globals = LuaTable::default().into_ref();
    l.replace(GLOBALS_INDEX, LuaValue::Table(new_globals.clone())).unwrap();
    assert!(Rc::ptr_eq(&l.globals(), &new_globals));

    let new_registry = LuaTable::default().into_ref();
    l.replace(REGISTRY_INDEX, LuaValue::Table(new_registry.clone())).unwrap();
    assert!(Rc::ptr_eq(&l.registry(), &new_registry));
}

#[test]
fn test_pseudo_index_rejects_non_tables() {
    let mut l = new_state();
    let cases = [
        (REGISTRY_INDEX, "registry must be a table"),
        (ENVIRON_INDEX, "environment must be a table"),
        (GLOBALS_INDEX, "_G must be a table"),
    ];
    for (idx, msg) in cases {
        let err = l.replace(idx, LuaValue::integer(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeInvariant);
        assert!(err.message().contains(msg), "unexpected message: {}", err);
    }
    // nothing was replaced
    assert!(l.get(REGISTRY_INDEX).is_table());
    assert!(l.get(ENVIRON_INDEX).is_table());
    assert!(l.get(GLOBALS_INDEX).is_table());
}

#[test]
fn test_environ_outside_frame_is_thread_env() {
    let mut l = new_state();
    assert!(Rc::ptr_eq(l.get(ENVIRON_INDEX).as_table().unwrap(), l.env()));

    let env = LuaTable::default().into_ref();
    l.replace(ENVIRON_INDEX, LuaValue::Table(env.clone())).unwrap();
    assert!(Rc::ptr_eq(l.env(), &env));
    // globals are untouched
    assert!(!Rc::ptr_eq(&l.globals(), &env));
}

#[test]
fn test_environ_inside_frame_is_function_env() {
    let mut l = new_state();
    let env = LuaTable::default().into_ref();
    let target = env.clone();
    let f = l.new_function(move |l| {
        l.replace(ENVIRON_INDEX, LuaValue::Table(target.clone()))?;
        let seen = l.get(ENVIRON_INDEX);
        l.push(seen)?;
        Ok(1)
    });
    let thread_env = l.env().clone();

    l.push(f.clone()).unwrap();
    l.call(0, 1).unwrap();
    assert!(Rc::ptr_eq(l.get(-1).as_table().unwrap(), &env));
    assert!(Rc::ptr_eq(&f.as_function().unwrap().borrow().env, &env));
    assert!(Rc::ptr_eq(l.env(), &thread_env));
}

#[test]
fn test_set_top_and_pop() {
    let mut l = new_state();
    for i in 1..=4 {
        l.push(LuaValue::integer(i)).unwrap();
    }
    l.set_top(-2).unwrap();
    assert_eq!(l.get_top(), 3);
    l.set_top(5).unwrap();
    assert_eq!(l.get_top(), 5);
    assert!(l.get(4).is_nil());
    l.pop(2);
    assert_eq!(l.get_top(), 3);
    l.pop(10);
    assert_eq!(l.get_top(), 0);
    assert!(l.set_top(-2).is_err());
}

#[test]
fn test_insert_and_remove() {
    let mut l = new_state();
    l.push(LuaValue::integer(1)).unwrap();
    l.push(LuaValue::integer(3)).unwrap();
    l.insert(LuaValue::integer(2), 2).unwrap();
    assert_eq!(l.get_top(), 3);
    assert_eq!(l.get(2), LuaValue::integer(2));
    assert_eq!(l.get(3), LuaValue::integer(3));

    assert_eq!(l.remove(1), LuaValue::integer(1));
    assert_eq!(l.get(1), LuaValue::integer(2));
    assert_eq!(l.get_top(), 2);
    assert!(l.remove(5).is_nil());
    assert_eq!(l.get_top(), 2);
}

#[test]
fn test_to_conversions() {
    let mut l = new_state();
    let t = l.new_table();
    l.push(LuaValue::from("99.9")).unwrap();
    l.push(t.clone()).unwrap();
    l.push(LuaValue::number(-3.7)).unwrap();
    l.push(LuaValue::boolean(false)).unwrap();

    assert_eq!(l.to_int(1), 99);
    assert_eq!(l.to_number(1), 99.9);
    assert_eq!(l.to_string(1), "99.9");
    assert_eq!(l.to_string(2), "");
    assert_eq!(l.to_int(2), 0);
    assert_eq!(l.to_int64(3), -3);
    assert_eq!(l.to_string(3), "-3.7");
    assert!(!l.to_bool(4));
    assert!(l.to_bool(2));
    assert!(Rc::ptr_eq(&l.to_table(2).unwrap(), t.as_table().unwrap()));
    assert!(l.to_table(1).is_none());
    assert!(l.to_function(1).is_none());
    assert!(l.to_userdata(1).is_none());
    assert!(l.to_thread(1).is_none());
    assert!(l.to_channel(1).is_none());
}

#[test]
fn test_argument_checks() {
    let mut l = new_state();
    l.register("double", |l| {
        let n = l.check_number(1)?;
        let scale = l.opt_number(2, 2.0)?;
        l.push(LuaValue::number(n * scale))?;
        Ok(1)
    });

    let f = l.get_global("double");
    l.push(f.clone()).unwrap();
    l.push(LuaValue::from("21")).unwrap();
    l.call(1, 1).unwrap();
    assert_eq!(l.get(-1), LuaValue::integer(42));
    l.pop(1);

    l.push(f).unwrap();
    l.push(LuaValue::from("abc")).unwrap();
    let err = l.call(1, 1).unwrap_err();
    assert_eq!(err.message(), "bad argument #1 (number expected, got string)");
    assert_eq!(l.get_top(), 0);
}

#[test]
fn test_check_table_and_string() {
    let mut l = new_state();
    l.register("probe", |l| {
        let t = l.check_table(1)?;
        let name = l.check_string(2)?;
        assert_eq!(l.check_int(3)?, 4);
        t.borrow_mut().raw_set_string(name.as_str(), LuaValue::boolean(true));
        Ok(0)
    });
    let t = l.new_table();
    let f = l.get_global("probe");
    l.push(f.clone()).unwrap();
    l.push(t.clone()).unwrap();
    l.push(LuaValue::integer(5)).unwrap();
    l.push(LuaValue::number(4.9)).unwrap();
    l.call(3, 0).unwrap();
    assert_eq!(l.get_field(&t, "5"), LuaValue::boolean(true));

    l.push(f).unwrap();
    l.push(LuaValue::integer(1)).unwrap();
    let err = l.call(1, 0).unwrap_err();
    assert!(err.message().contains("table expected, got number"));
}

#[test]
fn test_globals_and_fields() {
    let mut l = new_state();
    l.set_global("answer", LuaValue::integer(42));
    assert_eq!(l.get_global("answer"), LuaValue::integer(42));
    assert!(l.get_global("missing").is_nil());

    let t = l.new_table();
    l.set_field(&t, "k", LuaValue::from("v")).unwrap();
    assert_eq!(l.get_field(&t, "k"), LuaValue::from("v"));
    assert!(l.set_field(&LuaValue::integer(1), "k", LuaValue::Nil).is_err());
    assert!(l.get_field(&LuaValue::Nil, "k").is_nil());
}

#[test]
fn test_metatables() {
    let mut l = new_state();
    let t = l.new_table();
    let mt = l.new_table();
    l.set_metatable(&t, mt.clone()).unwrap();
    assert_eq!(l.get_metatable(&t), mt);

    // strings share one metatable per type
    let string_mt = l.new_table();
    l.set_metatable(&LuaValue::from("a"), string_mt.clone()).unwrap();
    assert_eq!(l.get_metatable(&LuaValue::from("b")), string_mt);
    assert!(l.get_metatable(&LuaValue::integer(1)).is_nil());

    assert!(l.set_metatable(&t, LuaValue::integer(1)).is_err());
    l.set_metatable(&t, LuaValue::Nil).unwrap();
    assert!(l.get_metatable(&t).is_nil());
}

#[test]
fn test_allocation_counter() {
    let mut l = new_state();
    let before = l.g().borrow().gc_count();
    l.new_table();
    l.new_function(|_| Ok(0));
    l.new_userdata(1u8);
    assert_eq!(l.g().borrow().gc_count(), before + 3);
}

#[test]
fn test_threads_share_global() {
    let main = new_state().into_ref();
    let child = main.borrow_mut().new_thread();
    assert!(Rc::ptr_eq(child.borrow().g(), main.borrow().g()));
    assert!(Rc::ptr_eq(&child.borrow().parent().unwrap(), &main));
    assert!(Rc::ptr_eq(&main.borrow().g().borrow().main_thread().unwrap(), &main));

    child.borrow_mut().set_global("shared", LuaValue::boolean(true));
    assert_eq!(main.borrow().get_global("shared"), LuaValue::boolean(true));
}

#[test]
fn test_close_marks_thread_dead() {
    let mut l = new_state();
    let f = l.new_function(|_| Ok(0));
    l.close();
    assert!(l.is_closed());
    l.push(f).unwrap();
    assert!(l.call(0, 0).is_err());
}

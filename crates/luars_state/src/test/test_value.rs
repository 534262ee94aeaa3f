// Tests for the value model: identity, hashing and the one-level copy
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::lua_value::{LuaTable, LuaValue, LuaValueType};
use crate::lua_vm::{LuaState, Options};

fn hash_of(v: &LuaValue) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

#[test]
fn test_type_names() {
    assert_eq!(LuaValue::Nil.type_name(), "nil");
    assert_eq!(LuaValue::boolean(true).type_name(), "boolean");
    assert_eq!(LuaValue::integer(3).type_name(), "number");
    assert_eq!(LuaValue::from("s").type_name(), "string");
    assert_eq!(LuaValue::table(LuaTable::default()).type_of(), LuaValueType::Table);
    assert_eq!(LuaValueType::Channel.to_string(), "channel");
}

#[test]
fn test_truthiness() {
    assert!(LuaValue::Nil.is_false());
    assert!(LuaValue::boolean(false).is_false());
    assert!(LuaValue::integer(0).as_bool());
    assert!(LuaValue::from("").as_bool());
}

#[test]
fn test_scalar_equality_and_hash() {
    assert_eq!(LuaValue::integer(1), LuaValue::number(1.0));
    assert_eq!(LuaValue::number(0.0), LuaValue::number(-0.0));
    assert_eq!(hash_of(&LuaValue::number(0.0)), hash_of(&LuaValue::number(-0.0)));
    assert_eq!(LuaValue::from("abc"), LuaValue::from(String::from("abc")));
    assert_ne!(LuaValue::from("1"), LuaValue::integer(1));
}

#[test]
fn test_compound_equality_is_identity() {
    let a = LuaValue::table(LuaTable::default());
    let b = LuaValue::table(LuaTable::default());
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    assert_eq!(hash_of(&a), hash_of(&a.clone()));
    assert!(a.raw_equal(&a.clone()));
}

#[test]
fn test_display() {
    assert_eq!(LuaValue::integer(10).to_string(), "10");
    assert_eq!(LuaValue::number(1.5).to_string(), "1.5");
    assert_eq!(LuaValue::Nil.to_string(), "nil");
    assert_eq!(LuaValue::boolean(false).to_string(), "false");
    let t = LuaValue::table(LuaTable::default());
    assert!(t.to_string().starts_with("table: 0x"));
}

#[test]
fn test_lossy_conversions() {
    assert_eq!(LuaValue::from("99.9").as_number_lossy(), 99.9);
    assert_eq!(LuaValue::from("nope").as_number_lossy(), 0.0);
    assert_eq!(LuaValue::integer(7).as_string_lossy(), "7");
    assert_eq!(LuaValue::table(LuaTable::default()).as_string_lossy(), "");
    assert_eq!(LuaValue::number(2.0).as_integer(), Some(2));
    assert_eq!(LuaValue::number(2.5).as_integer(), None);
}

#[test]
fn test_clone_value_scalars_unchanged() {
    for v in [
        LuaValue::Nil,
        LuaValue::boolean(true),
        LuaValue::number(4.25),
        LuaValue::from("text"),
    ] {
        assert_eq!(v.clone_value(), v);
    }
}

#[test]
fn test_clone_value_table_is_new_object() {
    let inner = LuaValue::table(LuaTable::default());
    let mut t = LuaTable::default();
    t.raw_set_string("inner", inner.clone());
    t.raw_set_int(1, LuaValue::integer(100));
    let t = LuaValue::table(t);

    let copy = t.clone_value();
    assert_ne!(copy, t);
    let copy_ref = copy.as_table().unwrap();
    // element values are shared, not copied
    assert_eq!(copy_ref.borrow().raw_get_string("inner"), inner);
    assert_eq!(copy_ref.borrow().raw_get_int(1), LuaValue::integer(100));

    copy_ref.borrow_mut().raw_set_int(1, LuaValue::integer(5));
    assert_eq!(t.as_table().unwrap().borrow().raw_get_int(1), LuaValue::integer(100));
}

#[test]
fn test_clone_value_thread() {
    let mut state = LuaState::new(Options::default());
    state.set_global("x", LuaValue::integer(1));
    let thread = LuaValue::thread(state);

    let copy = thread.clone_value();
    assert_ne!(copy, thread);
    let copy_ref = copy.as_thread().unwrap();
    assert_eq!(copy_ref.borrow().get_global("x"), LuaValue::integer(1));
    copy_ref.borrow_mut().set_global("x", LuaValue::integer(2));
    assert_eq!(
        thread.as_thread().unwrap().borrow().get_global("x"),
        LuaValue::integer(1)
    );
}

#[test]
fn test_clone_value_borrowed_thread_keeps_handle() {
    let thread = LuaValue::thread(LuaState::new(Options::default()));
    let handle = thread.as_thread().unwrap().clone();
    let _running = handle.borrow_mut();
    let copy = thread.clone_value();
    assert!(Rc::ptr_eq(copy.as_thread().unwrap(), &handle));
}

#[test]
fn test_integral_only_inside_i64_range() {
    let two_pow_63 = 9_223_372_036_854_775_808.0;
    let big = LuaValue::number(two_pow_63);
    assert_eq!(big.as_integer(), None);
    assert!(!big.is_integer());
    assert_eq!(big.to_string(), "9223372036854775808");

    let min = LuaValue::number(-two_pow_63);
    assert_eq!(min.as_integer(), Some(i64::MIN));
    assert_eq!(min.to_string(), "-9223372036854775808");

    let mut t = LuaTable::default();
    t.raw_set(big.clone(), LuaValue::from("big"));
    assert_eq!(t.raw_get(&big), LuaValue::from("big"));
    assert!(t.raw_get_int(i64::MAX).is_nil());
}

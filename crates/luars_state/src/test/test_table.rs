// Tests for LuaTable: array/hash split, sequence helpers, iteration, copy
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::lua_limits::MAX_ARRAY_INDEX;

#[test]
fn test_raw_set_and_get() {
    let mut t = LuaTable::default();
    t.raw_set(LuaValue::from("name"), LuaValue::from("lua"));
    t.raw_set(LuaValue::integer(1), LuaValue::integer(10));
    t.raw_set(LuaValue::boolean(true), LuaValue::integer(20));
    t.raw_set(LuaValue::number(1.5), LuaValue::integer(30));

    assert_eq!(t.raw_get(&LuaValue::from("name")), LuaValue::from("lua"));
    assert_eq!(t.raw_get_string("name"), LuaValue::from("lua"));
    assert_eq!(t.raw_get(&LuaValue::number(1.0)), LuaValue::integer(10));
    assert_eq!(t.raw_get(&LuaValue::boolean(true)), LuaValue::integer(20));
    assert_eq!(t.raw_get(&LuaValue::number(1.5)), LuaValue::integer(30));
    assert!(t.raw_get(&LuaValue::from("missing")).is_nil());
}

#[test]
fn test_nil_and_nan_keys_ignored() {
    let mut t = LuaTable::default();
    t.raw_set(LuaValue::Nil, LuaValue::integer(1));
    t.raw_set(LuaValue::number(f64::NAN), LuaValue::integer(1));
    assert!(t.is_empty());
    assert!(t.next(&LuaValue::Nil).is_none());
}

#[test]
fn test_array_promotion() {
    let mut t = LuaTable::default();
    t.raw_set_int(3, LuaValue::integer(3));
    t.raw_set_int(2, LuaValue::integer(2));
    assert_eq!(t.len(), 0);

    t.raw_set_int(1, LuaValue::integer(1));
    assert_eq!(t.len(), 3);
    assert_eq!(t.max_n(), 3);
    assert_eq!(t.raw_get_int(2), LuaValue::integer(2));
    assert_eq!(t.raw_get_h(&LuaValue::integer(3)), LuaValue::Nil);
}

#[test]
fn test_trailing_nil_shrinks_border() {
    let mut t = LuaTable::default();
    for i in 1..=4 {
        t.append(LuaValue::integer(i));
    }
    t.raw_set_int(4, LuaValue::Nil);
    assert_eq!(t.len(), 3);
    t.raw_set_int(2, LuaValue::Nil);
    assert_eq!(t.len(), 3);
    assert_eq!(t.max_n(), 3);
}

#[test]
fn test_large_index_stays_in_hash() {
    let mut t = LuaTable::default();
    t.raw_set_int(MAX_ARRAY_INDEX, LuaValue::from("far"));
    t.raw_set_int(-1, LuaValue::from("neg"));
    assert_eq!(t.len(), 0);
    assert_eq!(t.raw_get_int(MAX_ARRAY_INDEX), LuaValue::from("far"));
    assert_eq!(t.raw_get_int(-1), LuaValue::from("neg"));
}

#[test]
fn test_insert_and_remove() {
    let mut t = LuaTable::default();
    t.append(LuaValue::from("a"));
    t.append(LuaValue::from("b"));
    t.insert(1, LuaValue::from("z"));
    t.insert(4, LuaValue::from("c"));
    assert_eq!(t.len(), 4);
    assert_eq!(t.raw_get_int(1), LuaValue::from("z"));
    assert_eq!(t.raw_get_int(4), LuaValue::from("c"));

    assert_eq!(t.remove(1), LuaValue::from("z"));
    assert_eq!(t.raw_get_int(1), LuaValue::from("a"));
    assert_eq!(t.remove(-1), LuaValue::from("c"));
    assert_eq!(t.len(), 2);
    assert!(t.remove(10).is_nil());
    assert_eq!(t.len(), 2);
}

#[test]
fn test_next_order() {
    let mut t = LuaTable::default();
    t.append(LuaValue::integer(10));
    t.append(LuaValue::integer(20));
    t.raw_set_string("x", LuaValue::integer(1));
    t.raw_set_string("y", LuaValue::integer(2));
    t.raw_set_string("x", LuaValue::Nil);

    let mut keys = Vec::new();
    let mut key = LuaValue::Nil;
    while let Some((k, _)) = t.next(&key) {
        keys.push(k.clone());
        key = k;
    }
    assert_eq!(
        keys,
        vec![LuaValue::integer(1), LuaValue::integer(2), LuaValue::from("y")]
    );
    assert!(t.next(&LuaValue::from("unknown")).is_none());
}

#[test]
fn test_for_each_visits_live_pairs() {
    let mut t = LuaTable::default();
    t.append(LuaValue::integer(1));
    t.raw_set(LuaValue::boolean(false), LuaValue::integer(2));
    t.raw_set_string("k", LuaValue::integer(3));
    let mut sum = 0.0;
    t.for_each(|_, v| sum += v.as_number().unwrap_or(0.0));
    assert_eq!(sum, 6.0);
}

#[test]
fn test_clone_ref_is_one_level() {
    let nested = LuaTable::default().into_ref();
    let mut src = LuaTable::default();
    src.raw_set_string("nested", LuaValue::Table(nested.clone()));
    src.append(LuaValue::integer(1));
    let src = src.into_ref();

    let copy = LuaTable::clone_ref(&src);
    copy.borrow_mut().raw_set_string("extra", LuaValue::boolean(true));
    copy.borrow_mut().append(LuaValue::integer(2));
    assert!(src.borrow().raw_get_string("extra").is_nil());
    assert_eq!(src.borrow().len(), 1);

    // nested tables are the same object on both sides
    nested.borrow_mut().raw_set_string("seen", LuaValue::boolean(true));
    let through_copy = copy.borrow().raw_get_string("nested");
    assert_eq!(through_copy, LuaValue::Table(nested.clone()));
}

#[test]
fn test_clone_ref_copies_metatable_chain() {
    let mt = LuaTable::default().into_ref();
    mt.borrow_mut().raw_set_string("__index", LuaValue::from("base"));
    let t = LuaTable::default().into_ref();
    t.borrow_mut().set_metatable(LuaValue::Table(mt.clone()));

    let copy = LuaTable::clone_ref(&t);
    let copy_mt = copy.borrow().metatable().clone();
    assert_ne!(copy_mt, LuaValue::Table(mt.clone()));
    assert_eq!(
        copy_mt.as_table().unwrap().borrow().raw_get_string("__index"),
        LuaValue::from("base")
    );
}

#[test]
fn test_clone_ref_self_metatable() {
    let t = LuaTable::default().into_ref();
    t.borrow_mut().set_metatable(LuaValue::Table(t.clone()));

    let copy = LuaTable::clone_ref(&t);
    let copy_mt = copy.borrow().metatable().clone();
    assert_eq!(copy_mt, LuaValue::Table(copy.clone()));
    // break the cycles so both tables are freed
    t.borrow_mut().set_metatable(LuaValue::Nil);
    copy.borrow_mut().set_metatable(LuaValue::Nil);
}

pub mod test_state;
pub mod test_table;
pub mod test_value;

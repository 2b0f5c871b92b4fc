// Test module organization
pub mod test_memory;
pub mod test_persist_functions;
pub mod test_table;

// Test fixtures shared by unit tests.

pub mod app_state;
pub mod catalog_entry;

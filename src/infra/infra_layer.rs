// The infra module contains implementations of core traits.
// Each storage backend goes in its own submodule.

#[path = "google/mod.rs"]
pub mod google;

#[path = "sqlite/sqlite_store.rs"]
pub mod sqlite;

#[cfg(test)]
#[path = "memory/in_memory.rs"]
pub mod memory;

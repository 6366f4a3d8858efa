mod memory;
mod record_store;

pub use memory::MemoryKeyValueStore;
pub use record_store::RecordKeyValueStore;

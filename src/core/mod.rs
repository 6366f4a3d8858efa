pub mod error;
pub mod record;
pub mod value;

pub use error::{KvError, Result};
pub use record::{Record, RecordId};
pub use value::Value;

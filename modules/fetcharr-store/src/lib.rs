pub mod error;
pub mod memory;
pub mod migrate;
pub mod pg;
pub mod records;
pub mod traits;

pub use error::WorkflowError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use records::*;
pub use traits::{RequestStore, TransferStore, WorkflowStore};

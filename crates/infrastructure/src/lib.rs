pub mod blob_store;
pub mod credit_ledger;
pub mod mailbox;
pub mod memory;
pub mod observability;

pub use blob_store::{FsBlobStore, InMemoryBlobStore};
pub use credit_ledger::{CreditAccount, InMemoryCreditLedger};
pub use mailbox::MailboxNotifier;
pub use memory::{InMemoryNodeRepository, InMemoryTaskRepository};
pub use observability::MetricsCollector;

pub mod filesystem;
pub mod memory;

pub use filesystem::FsBlobStore;
pub use memory::InMemoryBlobStore;

mod file;
mod in_memory;
mod persistence;

pub use file::FilePersistence;
pub use in_memory::InMemoryPersistence;
pub use persistence::Persistence;

//! Outbound adapters: where demands and attachment bytes actually live.

mod attachments;
mod filesystem;
mod memory;
mod repo_error;

pub use attachments::{sanitize_filename, FsAttachmentStore};
pub use filesystem::{JsonFileRepository, INDEX_FILE};
pub use memory::InMemoryDemandRepository;
pub use repo_error::RepositoryError;

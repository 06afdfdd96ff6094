pub mod error;
pub mod handle;
pub mod migrate;

pub use handle::RepositoryHandle;

#[macro_use]
extern crate log;

use git2::Repository;
use graftcore::path::SubdirFilter;
use std::path::PathBuf;
use tempfile::TempDir;

/// A repository opened at a path, bound to a subdirectory filter and a
/// branch.
///
/// The handle owns the working tree it operates on.  All mutation goes
/// through [`configure`](Self::configure), [`apply`](Self::apply) and
/// [`push`](Self::push), which take `&mut self`; the underlying
/// repository is not `Sync`, so a handle must not be shared between
/// threads.
pub struct RepositoryHandle {
    pub(crate) root_path: PathBuf,
    pub(crate) subdir: SubdirFilter,
    pub(crate) branch: String,
    pub(crate) repo: Repository,
    // private working clone of a bare repository; declared after `repo`
    // so the repository is closed before the directory is removed.
    pub(crate) workdir: Option<TempDir>,
}

mod apply;
mod extract;
mod history;
mod impls;
mod push;
pub(crate) mod util;

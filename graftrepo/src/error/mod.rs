use graftcore::error::{
    PatchError,
    PathError,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::migrate::MigrationUnit;

#[derive(Debug, Error)]
pub enum GraftRepoError {
    #[error("ApplyConflict: {0}")]
    ApplyConflict(#[from] ApplyConflict),
    #[error("NotFound: {0}")]
    NotFound(#[from] NotFoundError),
    #[error("PatchError: {0}")]
    PatchError(#[from] PatchError),
    #[error("PathError: {0}")]
    PathError(#[from] PathError),
    #[error("RemoteError: {0}")]
    RemoteError(#[from] RemoteError),
    #[error("RepositoryError: {0}")]
    RepositoryError(#[from] RepositoryError),
}

/// The broad failure categories callers are expected to act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Repository,
    ApplyConflict,
    Remote,
    InvalidPatch,
}

impl GraftRepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraftRepoError::ApplyConflict(_) => ErrorKind::ApplyConflict,
            GraftRepoError::NotFound(_) => ErrorKind::NotFound,
            GraftRepoError::PatchError(_) |
            GraftRepoError::PathError(_) => ErrorKind::InvalidPatch,
            GraftRepoError::RemoteError(_) => ErrorKind::Remote,
            GraftRepoError::RepositoryError(_) => ErrorKind::Repository,
        }
    }
}

impl From<git2::Error> for GraftRepoError {
    fn from(error: git2::Error) -> Self {
        RepositoryError::from(error).into()
    }
}

impl From<std::io::Error> for GraftRepoError {
    fn from(error: std::io::Error) -> Self {
        RepositoryError::from(error).into()
    }
}

#[derive(Debug, PartialEq, Error, Deserialize, Serialize)]
pub enum NotFoundError {
    #[error("no repository at `{path}`")]
    Repository {
        path: String,
    },
    #[error("repository `{path}`: no branch `{branch}`")]
    Branch {
        path: String,
        branch: String,
    },
    #[error("repository `{path}`: no commit `{digest}` reachable \
             from `{branch}`")]
    Commit {
        path: String,
        branch: String,
        digest: String,
    },
    #[error("repository `{path}`: no remote `{remote}`")]
    Remote {
        path: String,
        remote: String,
    },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Libgit2Error: {0}")]
    Libgit2(#[from] git2::Error),
    #[error("StdIoError: {0}")]
    StdIo(#[from] std::io::Error),
    #[error("repository `{path}`: `{key}` must be configured for \
             this repository")]
    MissingIdentity {
        path: String,
        key: String,
    },
    #[error("repository `{path}`: invalid config key `{key}`")]
    InvalidConfigKey {
        path: String,
        key: String,
    },
    #[error("repository `{path}`: branch `{branch}` is not checked out")]
    BranchNotCheckedOut {
        path: String,
        branch: String,
    },
    #[error("repository `{path}`: unexpected error: {msg}")]
    Unexpected {
        path: String,
        msg: String,
    },
}

/// Carries the rendered patch so the failure can be inspected by hand.
#[derive(Debug, PartialEq, Error, Deserialize, Serialize)]
pub enum ApplyConflict {
    #[error("repository `{path}`: patch for commit `{digest}` does \
             not apply: {msg}")]
    Rejected {
        path: String,
        digest: String,
        msg: String,
        patch: String,
    },
    #[error("repository `{path}`: working tree conflicts with patch \
             for commit `{digest}`: {msg}")]
    WorkingTree {
        path: String,
        digest: String,
        msg: String,
        patch: String,
    },
}

impl ApplyConflict {
    pub fn patch(&self) -> &str {
        match self {
            ApplyConflict::Rejected { patch, .. } |
            ApplyConflict::WorkingTree { patch, .. } => patch,
        }
    }
}

#[derive(Debug, PartialEq, Error, Deserialize, Serialize)]
pub enum RemoteError {
    #[error("failed to push `{branch}` to remote `{remote}`: {msg}")]
    Push {
        remote: String,
        branch: String,
        msg: String,
    },
    #[error("remote `{remote}` rejected update of `{refname}`: {msg}")]
    Rejected {
        remote: String,
        refname: String,
        msg: String,
    },
}

fn describe(unit: &Option<MigrationUnit>) -> String {
    unit.as_ref()
        .map(|unit| format!(" at `{}` ({})", unit.digest, unit.state))
        .unwrap_or_default()
}

/// A migration run that stopped part way.  Nothing is rolled back;
/// `completed` lists what was done before the failure.
#[derive(Debug, Error)]
#[error("migration stopped{}: {source}", describe(.unit))]
pub struct MigrationError {
    /// The unit being processed, at the last state it reached.
    pub unit: Option<MigrationUnit>,
    pub completed: Vec<MigrationUnit>,
    #[source]
    pub source: GraftRepoError,
}

use git2::{
    BranchType,
    Commit,
    Config,
    ConfigLevel,
    ErrorCode,
    Repository,
    Signature,
    build::RepoBuilder,
};
use graftcore::path::SubdirFilter;
use std::path::Path;

use crate::error::{
    GraftRepoError,
    NotFoundError,
    RepositoryError,
};
use super::{
    RepositoryHandle,
    util::display,
};

fn branch_tip<'repo>(
    repo: &'repo Repository,
    path: &Path,
    branch: &str,
) -> Result<Commit<'repo>, GraftRepoError> {
    match repo.find_branch(branch, BranchType::Local) {
        Ok(found) => Ok(found.get().peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::NotFound => Err(NotFoundError::Branch {
            path: display(path),
            branch: branch.to_string(),
        }.into()),
        Err(e) => Err(e.into()),
    }
}

impl RepositoryHandle {
    /// Open the repository at `path`, bound to `subdir` and `branch`.
    ///
    /// A bare repository is cloned into a private working tree owned by
    /// the handle, with `path` as its `origin` remote; a repository with
    /// a working tree is used in place.
    pub fn open(
        path: impl AsRef<Path>,
        subdir: impl AsRef<str>,
        branch: &str,
    ) -> Result<Self, GraftRepoError> {
        let root_path = path.as_ref().to_path_buf();
        let subdir = SubdirFilter::new(subdir)?;
        let repo = match Repository::open(&root_path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(NotFoundError::Repository {
                    path: display(&root_path),
                }.into())
            }
            Err(e) => return Err(e.into()),
        };
        let tip = branch_tip(&repo, &root_path, branch)?.id();
        info!("opened {root_path:?} at {branch} ({tip}) filtered to {subdir:?}");

        let (repo, workdir) = if repo.is_bare() {
            let workdir = tempfile::Builder::new()
                .prefix("graft-")
                .tempdir()?;
            let origin = std::fs::canonicalize(&root_path)?;
            let url = origin.to_str()
                .ok_or_else(|| RepositoryError::Unexpected {
                    path: display(&root_path),
                    msg: "path is not valid utf-8".to_string(),
                })?;
            info!("cloning bare {origin:?} into {:?}", workdir.path());
            let clone = RepoBuilder::new()
                .branch(branch)
                .clone(url, workdir.path())?;
            (clone, Some(workdir))
        } else {
            (repo, None)
        };

        Ok(Self {
            root_path,
            subdir,
            branch: branch.to_string(),
            repo,
            workdir,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn subdir(&self) -> &SubdirFilter {
        &self.subdir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The working tree mutated by [`apply`](Self::apply).
    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    /// Whether the handle works on a temporary clone, in which case
    /// anything not pushed is discarded when the handle is dropped.
    pub fn is_clone(&self) -> bool {
        self.workdir.is_some()
    }

    /// Digest of the commit at the tip of the bound branch.
    pub fn tip(&self) -> Result<String, GraftRepoError> {
        Ok(self.tip_commit()?.id().to_string())
    }

    pub(crate) fn tip_commit(&self) -> Result<Commit<'_>, GraftRepoError> {
        branch_tip(&self.repo, &self.root_path, &self.branch)
    }

    fn local_config(&self) -> Result<Config, GraftRepoError> {
        Ok(self.repo.config()?.open_level(ConfigLevel::Local)?)
    }

    /// Set `key` to `value` in the config of this repository only.
    pub fn configure(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<(), GraftRepoError> {
        let valid = key.split_once('.')
            .map(|(section, name)| !section.is_empty() && !name.is_empty())
            .unwrap_or(false);
        if !valid {
            return Err(RepositoryError::InvalidConfigKey {
                path: display(&self.root_path),
                key: key.to_string(),
            }.into());
        }
        self.local_config()?.set_str(key, value)?;
        debug!("configured {key} for {:?}", self.root_path);
        Ok(())
    }

    /// The committer identity configured on this repository, stamped
    /// with the current time.
    pub(crate) fn committer(&self) -> Result<Signature<'static>, GraftRepoError> {
        let config = self.local_config()?;
        let get = |key: &str| match config.get_string(key) {
            Ok(value) => Ok(value),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(GraftRepoError::from(RepositoryError::MissingIdentity {
                    path: display(&self.root_path),
                    key: key.to_string(),
                }))
            }
            Err(e) => Err(e.into()),
        };
        let name = get("user.name")?;
        let email = get("user.email")?;
        Ok(Signature::now(&name, &email)?)
    }
}

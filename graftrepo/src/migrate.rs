use serde::{
    Deserialize,
    Serialize,
};
use std::fmt::{
    Display,
    Formatter,
};

use crate::{
    error::{
        GraftRepoError,
        MigrationError,
        NotFoundError,
    },
    handle::{
        RepositoryHandle,
        util::display,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Pending,
    Extracted,
    Applied,
    Pushed,
}

/// The progress of one source commit through a migration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MigrationUnit {
    pub digest: String,
    pub state: MigrationState,
    /// Digest of the commit created in the destination.
    pub applied_as: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushTarget {
    pub remote: String,
    pub branch: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PushPolicy {
    #[default]
    Never,
    EachCommit(PushTarget),
    AtEnd(PushTarget),
}

#[derive(Clone, Debug, Default)]
pub struct MigrationOptions {
    /// Resume after this source digest.
    pub after: Option<String>,
    pub policy: PushPolicy,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Pending => "pending",
            MigrationState::Extracted => "extracted",
            MigrationState::Applied => "applied",
            MigrationState::Pushed => "pushed",
        }
    }
}

impl Display for MigrationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MigrationUnit {
    fn new(digest: &str) -> Self {
        Self {
            digest: digest.to_string(),
            state: MigrationState::Pending,
            applied_as: None,
        }
    }
}

impl Display for MigrationUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            &self.digest,
            self.applied_as.as_deref().unwrap_or("-"),
            &self.state,
        )
    }
}

fn advance(
    src: &RepositoryHandle,
    dst: &mut RepositoryHandle,
    policy: &PushPolicy,
    unit: &mut MigrationUnit,
) -> Result<(), GraftRepoError> {
    let patch = src.patch(&unit.digest)?;
    unit.state = MigrationState::Extracted;
    unit.applied_as = Some(dst.apply(&patch)?);
    unit.state = MigrationState::Applied;
    if let PushPolicy::EachCommit(target) = policy {
        dst.push(&target.remote, &target.branch)?;
        unit.state = MigrationState::Pushed;
    }
    Ok(())
}

/// Transplant every commit in the filtered log of `src` onto `dst`, one
/// commit at a time and in order.
///
/// The destination handle must already carry a committer identity.  A
/// failure stops the run where it happened; units completed before it
/// stay applied (and pushed, if the policy did so).
pub fn migrate(
    src: &RepositoryHandle,
    dst: &mut RepositoryHandle,
    options: &MigrationOptions,
) -> Result<Vec<MigrationUnit>, MigrationError> {
    let log = src.log()
        .map_err(|source| MigrationError {
            unit: None,
            completed: Vec::new(),
            source,
        })?;
    let start = match options.after.as_deref() {
        None => 0,
        Some(after) => log.iter()
            .position(|entry| !after.is_empty() && entry.digest.starts_with(after))
            .map(|idx| idx + 1)
            .ok_or_else(|| MigrationError {
                unit: None,
                completed: Vec::new(),
                source: NotFoundError::Commit {
                    path: display(src.root_path()),
                    branch: src.branch().to_string(),
                    digest: after.to_string(),
                }.into(),
            })?,
    };
    info!(
        "migrating {} of {} commit(s) from {:?} to {:?}",
        log.len() - start, log.len(), src.root_path(), dst.root_path(),
    );

    let mut completed = Vec::new();
    for entry in &log[start..] {
        let mut unit = MigrationUnit::new(&entry.digest);
        if let Err(source) = advance(src, dst, &options.policy, &mut unit) {
            warn!("migration stopped at {unit}: {source}");
            return Err(MigrationError {
                unit: Some(unit),
                completed,
                source,
            });
        }
        info!("{unit} {}", entry.summary());
        completed.push(unit);
    }

    if let PushPolicy::AtEnd(target) = &options.policy {
        if !completed.is_empty() {
            if let Err(source) = dst.push(&target.remote, &target.branch) {
                return Err(MigrationError {
                    unit: None,
                    completed,
                    source,
                });
            }
            for unit in completed.iter_mut() {
                unit.state = MigrationState::Pushed;
            }
        }
    }
    Ok(completed)
}

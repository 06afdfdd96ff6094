use git2::{
    ErrorCode,
    Signature,
    Time,
    Tree,
    TreeEntry,
    build::CheckoutBuilder,
};
use graftcore::{
    patch::{
        ChangeKind,
        Diff,
        Patch,
    },
    path::SubdirFilter,
};
use std::path::Path;

use crate::error::{
    ApplyConflict,
    GraftRepoError,
    RepositoryError,
};
use super::{
    RepositoryHandle,
    util::display,
};

impl RepositoryHandle {
    /// Apply a patch extracted from another repository as a new commit on
    /// the bound branch, with every path placed under this handle's
    /// subdirectory.
    ///
    /// Authorship is carried over from the patch; the committer is the
    /// identity configured on this repository.  Returns the digest of the
    /// new commit.  Nothing is changed if the patch does not apply
    /// cleanly.
    pub fn apply(&mut self, patch: &Patch) -> Result<String, GraftRepoError> {
        patch.ensure_not_empty()?;
        let committer = self.committer()?;
        self.ensure_checked_out()?;
        let rebased = patch.rebase(&SubdirFilter::root(), &self.subdir)?;

        let path = display(&self.root_path);
        let rejected = |msg: String| GraftRepoError::from(ApplyConflict::Rejected {
            path: path.clone(),
            digest: patch.commit_digest.clone(),
            msg,
            patch: rebased.render(),
        });

        let tip = self.tip_commit()?;
        let old_tree = tip.tree()?;
        // libgit2 applies a new file on top of an existing one, so the
        // expected base is checked before handing the diff over
        for diff in rebased.diffs.iter() {
            if let Some(msg) = base_mismatch(&old_tree, diff)? {
                return Err(rejected(msg));
            }
        }
        let diff = git2::Diff::from_buffer(&rebased.diff_bytes())
            .map_err(|e| rejected(e.message().to_string()))?;
        let mut index = self.repo.apply_to_tree(&old_tree, &diff, None)
            .map_err(|e| rejected(e.message().to_string()))?;
        let tree_id = index.write_tree_to(&self.repo)?;
        if tree_id == old_tree.id() {
            return Err(rejected("patch leaves the tree unchanged".to_string()));
        }
        let new_tree = self.repo.find_tree(tree_id)?;

        let author = Signature::new(
            &rebased.author_name,
            &rebased.author_email,
            &Time::new(rebased.timestamp.seconds, rebased.timestamp.offset_minutes),
        )?;
        let oid = self.repo.commit(
            None,
            &author,
            &committer,
            &rebased.message,
            &new_tree,
            &[&tip],
        )?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo.checkout_tree(new_tree.as_object(), Some(&mut checkout))
            .map_err(|e| ApplyConflict::WorkingTree {
                path: path.clone(),
                digest: patch.commit_digest.clone(),
                msg: e.message().to_string(),
                patch: rebased.render(),
            })?;

        let refname = format!("refs/heads/{}", self.branch);
        let reflog = format!("graft: {}", rebased.summary());
        if let Err(e) = self.repo.reference_matching(&refname, oid, true, tip.id(), &reflog) {
            warn!("failed to advance {refname} to {oid}: {e}; restoring working tree");
            let mut restore = CheckoutBuilder::new();
            restore.force();
            if let Err(e) = self.repo.checkout_tree(old_tree.as_object(), Some(&mut restore)) {
                error!("failed to restore working tree of {path}: {e}");
            }
            return Err(e.into());
        }
        info!(
            "applied {} to {path} at {} as {oid}",
            patch.commit_digest, self.branch,
        );
        Ok(oid.to_string())
    }

    fn ensure_checked_out(&self) -> Result<(), GraftRepoError> {
        let expected = format!("refs/heads/{}", self.branch);
        let checked_out = self.repo.head()
            .ok()
            .and_then(|head| head.name().map(|name| name == expected))
            .unwrap_or(false);
        if checked_out {
            Ok(())
        } else {
            Err(RepositoryError::BranchNotCheckedOut {
                path: display(&self.root_path),
                branch: self.branch.clone(),
            }.into())
        }
    }
}

fn entry<'tree>(
    tree: &'tree Tree<'_>,
    path: &str,
) -> Result<Option<TreeEntry<'tree>>, git2::Error> {
    match tree.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some(entry)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Why `tree` is not the base `diff` was taken against, if it is not.
fn base_mismatch(
    tree: &Tree<'_>,
    diff: &Diff,
) -> Result<Option<String>, git2::Error> {
    if diff.kind == ChangeKind::Add || diff.kind == ChangeKind::Rename {
        if entry(tree, &diff.new_path)?.is_some() {
            return Ok(Some(format!("{} already exists", diff.new_path)));
        }
    }
    if diff.kind == ChangeKind::Add {
        return Ok(None);
    }
    let found = match entry(tree, &diff.old_path)? {
        Some(found) => found,
        None => return Ok(Some(format!("{} does not exist", diff.old_path))),
    };
    let id = found.id().to_string();
    if diff.old_id.is_empty() || !id.starts_with(&diff.old_id) {
        return Ok(Some(format!(
            "{} is at {id}, expected {}", diff.old_path, diff.old_id,
        )));
    }
    let mode = u32::try_from(found.filemode()).unwrap_or_default();
    if mode != diff.old_mode {
        return Ok(Some(format!(
            "{} has mode {mode:o}, expected {:o}", diff.old_path, diff.old_mode,
        )));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use graftcore::patch::NULL_ID;
    use test_graft::{
        repo::{
            files,
            read_blob,
        },
        scenario::{
            FILE1,
            moved_file,
        },
    };

    use crate::error::{
        ErrorKind,
        GraftRepoError,
    };
    use super::*;

    fn identify(handle: &mut RepositoryHandle) -> anyhow::Result<()> {
        handle.configure("user.name", "committer")?;
        handle.configure("user.email", "committer@example.com")?;
        Ok(())
    }

    #[test]
    fn apply_under_subdir() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let src = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        let patch = src.patch(&scenario.src_oids[1].to_string())?;

        let mut dst = RepositoryHandle::open(&scenario.dst, "vendor/dir2", "master")?;
        identify(&mut dst)?;
        let digest = dst.apply(&patch)?;
        assert_eq!(dst.tip()?, digest);

        let commit = dst.repo.find_commit(git2::Oid::from_str(&digest)?)?;
        assert_eq!(commit.parent_id(0)?, scenario.dst_oids[0]);
        assert_eq!(commit.message(), Some("second commit"));
        assert_eq!(commit.author().name(), Some("your name"));
        assert_eq!(commit.author().email(), Some("you@example.com"));
        assert_eq!(commit.author().when().seconds(), 1666666700);
        assert_eq!(commit.committer().name(), Some("committer"));
        assert_eq!(commit.committer().email(), Some("committer@example.com"));

        assert_eq!(files(&dst.repo, "HEAD")?, ["LICENSE", "vendor/dir2/file1"]);
        assert_eq!(read_blob(&dst.repo, "HEAD", "vendor/dir2/file1")?, FILE1.as_bytes());
        let workdir = dst.workdir().expect("working clone").to_path_buf();
        assert_eq!(std::fs::read(workdir.join("vendor/dir2/file1"))?, FILE1.as_bytes());
        assert!(dst.repo.statuses(None)?.is_empty());
        Ok(())
    }

    #[test]
    fn apply_twice_conflicts() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let src = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        let patch = src.patch(&scenario.src_oids[1].to_string())?;
        let mut dst = RepositoryHandle::open(&scenario.dst, "", "master")?;
        identify(&mut dst)?;
        let first = dst.apply(&patch)?;

        let err = dst.apply(&patch).expect_err("file1 already exists");
        assert_eq!(err.kind(), ErrorKind::ApplyConflict);
        match err {
            GraftRepoError::ApplyConflict(conflict) => {
                assert!(conflict.patch().contains("+++ b/file1"));
            }
            _ => unreachable!(),
        }
        // nothing moved
        assert_eq!(dst.tip()?, first);
        assert!(dst.repo.statuses(None)?.is_empty());
        Ok(())
    }

    #[test]
    fn apply_preconditions() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let src = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        let patch = src.patch(&scenario.src_oids[1].to_string())?;
        let empty = src.patch(&scenario.src_oids[0].to_string())?;

        let mut dst = RepositoryHandle::open(&scenario.dst, "", "master")?;
        let tip = dst.tip()?;
        assert!(matches!(
            dst.apply(&patch),
            Err(GraftRepoError::RepositoryError(RepositoryError::MissingIdentity { .. })),
        ));
        identify(&mut dst)?;
        assert_eq!(dst.apply(&empty).err().map(|e| e.kind()), Some(ErrorKind::InvalidPatch));
        assert_eq!(dst.tip()?, tip);
        Ok(())
    }

    #[test]
    fn apply_rejects_missing_context() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let mut dst = RepositoryHandle::open(&scenario.dst, "", "master")?;
        identify(&mut dst)?;
        let tip = dst.tip()?;
        let mut patch = RepositoryHandle::open(&scenario.src, "dir2", "master")?
            .patch(&scenario.src_oids[1].to_string())?;
        // a deletion of a file the destination never had
        patch.diffs = vec![Diff {
            old_path: "missing".to_string(),
            new_path: String::new(),
            kind: ChangeKind::Delete,
            old_mode: 0o100644,
            new_mode: 0,
            old_id: "1111111111111111111111111111111111111111".to_string(),
            new_id: NULL_ID.to_string(),
            similarity: None,
            content: b"@@ -1 +0,0 @@\n-gone\n".to_vec(),
        }];
        assert_eq!(dst.apply(&patch).err().map(|e| e.kind()), Some(ErrorKind::ApplyConflict));
        assert_eq!(dst.tip()?, tip);
        Ok(())
    }

    fn blob_id(content: &str) -> anyhow::Result<String> {
        Ok(git2::Oid::hash_object(git2::ObjectType::Blob, content.as_bytes())?.to_string())
    }

    #[test]
    fn apply_checks_base_content() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let mut patch = RepositoryHandle::open(&scenario.src, "dir2", "master")?
            .patch(&scenario.src_oids[1].to_string())?;
        let mut dst = RepositoryHandle::open(&scenario.dst, "", "master")?;
        identify(&mut dst)?;
        let tip = dst.apply(&patch)?;

        let modify = Diff {
            old_path: "file1".to_string(),
            new_path: "file1".to_string(),
            kind: ChangeKind::Modify,
            old_mode: 0o100644,
            new_mode: 0o100644,
            old_id: blob_id("other file\n")?,
            new_id: blob_id("changed\n")?,
            similarity: None,
            content: b"@@ -1 +1 @@\n-test file\n+changed\n".to_vec(),
        };
        patch.diffs = vec![modify.clone()];
        let err = dst.apply(&patch).expect_err("file1 is not at old_id");
        assert_eq!(err.kind(), ErrorKind::ApplyConflict);
        assert!(err.to_string().contains("file1 is at "));
        assert_eq!(dst.tip()?, tip);

        patch.diffs = vec![Diff {
            old_id: blob_id(FILE1)?,
            old_mode: 0o100755,
            ..modify.clone()
        }];
        let err = dst.apply(&patch).expect_err("file1 is not executable");
        assert_eq!(err.kind(), ErrorKind::ApplyConflict);
        assert_eq!(dst.tip()?, tip);

        // the same hunk against the right base goes through
        patch.diffs = vec![Diff {
            old_id: blob_id(FILE1)?,
            ..modify
        }];
        dst.apply(&patch)?;
        assert_eq!(read_blob(&dst.repo, "HEAD", "file1")?, b"changed\n");
        Ok(())
    }

    #[test]
    fn apply_rename_onto_existing() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let mut patch = RepositoryHandle::open(&scenario.src, "dir2", "master")?
            .patch(&scenario.src_oids[1].to_string())?;
        let mut dst = RepositoryHandle::open(&scenario.dst, "", "master")?;
        identify(&mut dst)?;
        let tip = dst.apply(&patch)?;

        patch.diffs = vec![Diff {
            old_path: "file1".to_string(),
            new_path: "LICENSE".to_string(),
            kind: ChangeKind::Rename,
            old_mode: 0o100644,
            new_mode: 0o100644,
            old_id: blob_id(FILE1)?,
            new_id: blob_id(FILE1)?,
            similarity: Some(100),
            content: Vec::new(),
        }];
        let err = dst.apply(&patch).expect_err("LICENSE is in the way");
        assert_eq!(err.kind(), ErrorKind::ApplyConflict);
        assert!(err.to_string().contains("LICENSE already exists"));
        assert_eq!(dst.tip()?, tip);
        assert_eq!(files(&dst.repo, "HEAD")?, ["LICENSE", "file1"]);
        assert_eq!(read_blob(&dst.repo, "HEAD", "LICENSE")?, b"license\n");
        Ok(())
    }
}

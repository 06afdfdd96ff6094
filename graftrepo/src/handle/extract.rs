use git2::{
    Commit,
    Delta,
    DiffDelta,
    DiffFile,
    DiffFindOptions,
    ErrorCode,
};
use graftcore::{
    patch::{
        ChangeKind,
        Diff,
        NULL_ID,
        Patch,
    },
    path::{
        SubdirFilter,
        rebase,
    },
};

use crate::error::{
    GraftRepoError,
    NotFoundError,
    RepositoryError,
};
use super::{
    RepositoryHandle,
    util::{
        descriptor,
        display,
        mode_bits,
        similarity,
        split_header,
    },
};

impl RepositoryHandle {
    /// Extract the changes `digest` makes under the subdirectory filter,
    /// with every path made relative to that subdirectory.
    ///
    /// The commit must be the tip of the bound branch or one of its
    /// ancestors.  A commit that touches nothing under the filter yields
    /// a patch without diffs.
    pub fn patch(&self, digest: &str) -> Result<Patch, GraftRepoError> {
        let commit = self.reachable_commit(digest)?;
        let mut diff = self.changeset(&commit)?;
        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))?;

        let diffs = diff.deltas()
            .enumerate()
            .map(|(idx, delta)| self.extract_delta(&diff, idx, &delta))
            .collect::<Result<Vec<_>, _>>()?;
        let info = descriptor(&commit);
        debug!("extracted {} diff(s) from {}", diffs.len(), info.digest);
        Ok(Patch {
            commit_digest: info.digest,
            author_name: info.author_name,
            author_email: info.author_email,
            timestamp: info.timestamp,
            message: info.message,
            diffs,
        })
    }

    fn reachable_commit(&self, digest: &str) -> Result<Commit<'_>, GraftRepoError> {
        let not_found = || GraftRepoError::from(NotFoundError::Commit {
            path: display(&self.root_path),
            branch: self.branch.clone(),
            digest: digest.to_string(),
        });
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(not_found());
        }
        let commit = match self.repo.find_commit_by_prefix(digest) {
            Ok(commit) => commit,
            Err(e) if matches!(
                e.code(),
                ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidSpec,
            ) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let tip = self.tip_commit()?;
        if commit.id() == tip.id()
            || self.repo.graph_descendant_of(tip.id(), commit.id())?
        {
            Ok(commit)
        } else {
            Err(not_found())
        }
    }

    fn extract_delta(
        &self,
        diff: &git2::Diff<'_>,
        idx: usize,
        delta: &DiffDelta<'_>,
    ) -> Result<Diff, GraftRepoError> {
        let unexpected = |msg: String| GraftRepoError::from(RepositoryError::Unexpected {
            path: display(&self.root_path),
            msg,
        });
        let kind = match delta.status() {
            Delta::Added => ChangeKind::Add,
            Delta::Deleted => ChangeKind::Delete,
            Delta::Modified => ChangeKind::Modify,
            Delta::Renamed => ChangeKind::Rename,
            status => return Err(unexpected(format!("unsupported change {status:?}"))),
        };
        for file in [delta.old_file(), delta.new_file()] {
            if file.mode() == git2::FileMode::Commit {
                return Err(unexpected(format!(
                    "submodule change at {:?} is not supported", file.path(),
                )));
            }
        }

        // the changeset is taken between subtrees, so paths are already
        // relative to the filter
        let root = SubdirFilter::root();
        let relative = |file: DiffFile<'_>| -> Result<String, GraftRepoError> {
            let path = std::str::from_utf8(file.path_bytes().unwrap_or_default())
                .map_err(|e| unexpected(format!("non utf-8 path: {e}")))?;
            Ok(rebase(path, &root, &root)?)
        };
        let (old_path, new_path) = match kind {
            ChangeKind::Add => (String::new(), relative(delta.new_file())?),
            ChangeKind::Delete => (relative(delta.old_file())?, String::new()),
            ChangeKind::Modify | ChangeKind::Rename => (
                relative(delta.old_file())?,
                relative(delta.new_file())?,
            ),
        };
        let old_id = match kind {
            ChangeKind::Add => NULL_ID.to_string(),
            _ => delta.old_file().id().to_string(),
        };
        let new_id = match kind {
            ChangeKind::Delete => NULL_ID.to_string(),
            _ => delta.new_file().id().to_string(),
        };

        let (header, content) = match git2::Patch::from_diff(diff, idx)? {
            Some(mut patch) => {
                let buf = patch.to_buf()?;
                let (header, body) = split_header(&buf);
                (header.to_vec(), body.to_vec())
            }
            None => (Vec::new(), Vec::new()),
        };
        let similarity = match kind {
            ChangeKind::Rename => similarity(&header),
            _ => None,
        };

        Ok(Diff {
            old_path,
            new_path,
            kind,
            old_mode: mode_bits(delta.old_file().mode()),
            new_mode: mode_bits(delta.new_file().mode()),
            old_id,
            new_id,
            similarity,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_graft::{
        repo::{
            GitObj,
            append_commit_from_objects,
            repo_init,
        },
        scenario::{
            FILE1,
            moved_file,
        },
    };

    use crate::error::ErrorKind;
    use super::*;

    #[test]
    fn patch_of_moved_file() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let handle = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        let digest = scenario.src_oids[1].to_string();
        let patch = handle.patch(&digest)?;
        assert_eq!(patch.commit_digest, digest);
        assert_eq!(patch.author_name, "your name");
        assert_eq!(patch.author_email, "you@example.com");
        assert_eq!(patch.timestamp.seconds, 1666666700);
        assert_eq!(patch.summary(), "second commit");
        assert_eq!(patch.diffs.len(), 1);
        let diff = &patch.diffs[0];
        assert_eq!(diff.kind, ChangeKind::Add);
        assert_eq!(diff.old_path, "");
        assert_eq!(diff.new_path, "file1");
        assert_eq!(diff.old_mode, 0);
        assert_eq!(diff.new_mode, 0o100644);
        assert_eq!(diff.old_id, NULL_ID);
        assert_eq!(diff.content, b"@@ -0,0 +1 @@\n+test file\n");

        // the first commit does not touch dir2 at all
        let empty = handle.patch(&scenario.src_oids[0].to_string())?;
        assert!(empty.is_empty());
        assert_eq!(empty.summary(), "first commit");
        Ok(())
    }

    #[test]
    fn patch_whole_tree_sees_rename() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let handle = RepositoryHandle::open(&scenario.src, "", "master")?;
        let patch = handle.patch(&scenario.src_oids[1].to_string())?;
        assert_eq!(patch.diffs.len(), 1);
        let diff = &patch.diffs[0];
        assert_eq!(diff.kind, ChangeKind::Rename);
        assert_eq!(diff.old_path, "dir1/file1");
        assert_eq!(diff.new_path, "dir2/file1");
        assert_eq!(diff.similarity, Some(100));
        assert!(diff.content.is_empty());
        assert_eq!(diff.old_id, diff.new_id);

        // viewed from the old location only, the file is deleted
        let handle = RepositoryHandle::open(&scenario.src, "dir1", "master")?;
        let patch = handle.patch(&scenario.src_oids[1].to_string())?;
        assert_eq!(patch.diffs.len(), 1);
        assert_eq!(patch.diffs[0].kind, ChangeKind::Delete);
        assert_eq!(patch.diffs[0].old_path, "file1");
        assert_eq!(patch.diffs[0].new_path, "");
        assert_eq!(patch.diffs[0].new_id, NULL_ID);
        Ok(())
    }

    #[test]
    fn patch_root_commit_and_modes() -> anyhow::Result<()> {
        let (td, repo) = repo_init(Some("master"), None)?;
        let root = append_commit_from_objects(
            &repo, Some(1666666600), Some("import"),
            vec![
                GitObj::Tree("pkg", vec![
                    GitObj::Blob("file1", FILE1),
                    GitObj::Executable("run.sh", "#!/bin/sh\n"),
                ]),
                GitObj::Blob("outside", "outside\n"),
            ],
        )?;
        let modify = append_commit_from_objects(
            &repo, Some(1666666700), Some("modify"),
            vec![
                GitObj::Tree("pkg", vec![
                    GitObj::Blob("file1", "test file\nmore\n"),
                    GitObj::Blob("run.sh", "#!/bin/sh\n"),
                ]),
            ],
        )?;
        let td = td.expect("tempdir created");
        let handle = RepositoryHandle::open(td.path(), "pkg", "master")?;

        let patch = handle.patch(&root.to_string())?;
        let paths = patch.diffs.iter()
            .map(|diff| (diff.kind, diff.new_path.as_str(), diff.new_mode))
            .collect::<Vec<_>>();
        assert_eq!(paths, [
            (ChangeKind::Add, "file1", 0o100644),
            (ChangeKind::Add, "run.sh", 0o100755),
        ]);

        let patch = handle.patch(&modify.to_string())?;
        assert_eq!(patch.diffs.len(), 2);
        assert!(patch.diffs.iter().all(|diff| diff.kind == ChangeKind::Modify));
        assert_eq!(patch.diffs[0].content, b"@@ -1 +1,2 @@\n test file\n+more\n");
        assert_eq!(patch.diffs[1].old_mode, 0o100755);
        assert_eq!(patch.diffs[1].new_mode, 0o100644);
        assert!(patch.diffs[1].content.is_empty());

        // abbreviated digests resolve as well
        let short = &modify.to_string()[..10];
        assert_eq!(handle.patch(short)?.commit_digest, modify.to_string());
        Ok(())
    }

    #[test]
    fn patch_directory_replaced_by_file() -> anyhow::Result<()> {
        let (td, repo) = repo_init(Some("master"), None)?;
        append_commit_from_objects(
            &repo, Some(1666666600), Some("add pkg"),
            vec![GitObj::Tree("pkg", vec![GitObj::Blob("x", "x\n")])],
        )?;
        let replace = append_commit_from_objects(
            &repo, Some(1666666700), Some("pkg is a file now"),
            vec![GitObj::Blob("pkg", "x\n")],
        )?;
        let td = td.expect("tempdir created");
        let handle = RepositoryHandle::open(td.path(), "pkg", "master")?;
        assert_eq!(handle.log()?.len(), 2);

        // the file named `pkg` is outside the filter
        let patch = handle.patch(&replace.to_string())?;
        assert_eq!(patch.diffs.len(), 1);
        let diff = &patch.diffs[0];
        assert_eq!(diff.kind, ChangeKind::Delete);
        assert_eq!(diff.old_path, "x");
        assert_eq!(diff.new_path, "");
        assert_eq!(diff.content, b"@@ -1 +0,0 @@\n-x\n");

        // and a filter naming a file sees nothing at all
        let handle = RepositoryHandle::open(td.path(), "pkg/x", "master")?;
        assert!(handle.log()?.is_empty());
        Ok(())
    }

    #[test]
    fn patch_not_found() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let handle = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        for digest in [
            "",
            "not-a-digest",
            "0123456789012345678901234567890123456789",
            // present, but only in the other repository
            &scenario.dst_oids[0].to_string(),
        ] {
            let result = handle.patch(digest);
            assert_eq!(
                result.err().map(|e| e.kind()),
                Some(ErrorKind::NotFound),
                "digest {digest:?}",
            );
        }
        Ok(())
    }
}

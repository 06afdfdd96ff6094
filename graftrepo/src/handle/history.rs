use git2::{
    Commit,
    Diff,
    Sort,
};
use graftcore::commit::CommitDescriptor;

use crate::error::GraftRepoError;
use super::{
    RepositoryHandle,
    util::{
        descriptor,
        diff_options,
        subtree,
    },
};

impl RepositoryHandle {
    /// Commits reachable from the tip along first parents that change
    /// anything under the subdirectory filter, oldest first.
    ///
    /// Merge commits are compared against their first parent only, so
    /// content brought in by the other side of a merge is attributed to
    /// the merge commit itself.
    pub fn log(&self) -> Result<Vec<CommitDescriptor>, GraftRepoError> {
        let tip = self.tip_commit()?;
        let mut revwalk = self.repo.revwalk()?;
        // sorting resets the walker, so it must come first
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.simplify_first_parent()?;
        revwalk.push(tip.id())?;

        let mut entries = Vec::new();
        let mut walked = 0;
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            walked += 1;
            if self.touches(&commit)? {
                entries.push(descriptor(&commit));
            }
        }
        debug!(
            "log of {:?} at {}: {} of {walked} commits touch {:?}",
            self.root_path, self.branch, entries.len(), self.subdir.as_str(),
        );
        Ok(entries)
    }

    /// The changes introduced by `commit` relative to its first parent,
    /// inside the subdirectory only, with paths relative to it.  A root
    /// commit, or one where the subdirectory first appears, is compared
    /// against the empty tree.
    pub(crate) fn changeset<'repo>(
        &'repo self,
        commit: &Commit<'repo>,
    ) -> Result<Diff<'repo>, GraftRepoError> {
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => subtree(&self.repo, &commit.parent(0)?.tree()?, &self.subdir)?,
        };
        let tree = subtree(&self.repo, &commit.tree()?, &self.subdir)?;
        let mut opts = diff_options();
        Ok(self.repo.diff_tree_to_tree(
            parent_tree.as_ref(),
            tree.as_ref(),
            Some(&mut opts),
        )?)
    }

    pub(crate) fn touches(
        &self,
        commit: &Commit<'_>,
    ) -> Result<bool, GraftRepoError> {
        Ok(self.changeset(commit)?.deltas().len() > 0)
    }
}

#[cfg(test)]
mod tests {
    use test_graft::{
        repo::{
            GitObj,
            append_commit_from_objects,
            commit,
            repo_init,
        },
        scenario::moved_file,
    };

    use super::*;

    fn digests(entries: &[CommitDescriptor]) -> Vec<&str> {
        entries.iter()
            .map(|entry| entry.digest.as_str())
            .collect()
    }

    #[test]
    fn log_filters_by_subdir() -> anyhow::Result<()> {
        let scenario = moved_file()?;
        let first = scenario.src_oids[0].to_string();
        let second = scenario.src_oids[1].to_string();

        let handle = RepositoryHandle::open(&scenario.src, "", "master")?;
        assert_eq!(digests(&handle.log()?), [first.as_str(), second.as_str()]);

        let handle = RepositoryHandle::open(&scenario.src, "dir2", "master")?;
        let log = handle.log()?;
        assert_eq!(digests(&log), [second.as_str()]);
        assert_eq!(log[0].author_name, "your name");
        assert_eq!(log[0].author_email, "you@example.com");
        assert_eq!(log[0].timestamp.seconds, 1666666700);
        assert_eq!(log[0].summary(), "second commit");

        let handle = RepositoryHandle::open(&scenario.src, "dir1/", "master")?;
        assert_eq!(digests(&handle.log()?), [first.as_str(), second.as_str()]);

        // a sibling sharing the prefix is not under the filter
        let handle = RepositoryHandle::open(&scenario.src, "dir", "master")?;
        assert!(handle.log()?.is_empty());
        let handle = RepositoryHandle::open(&scenario.src, "dir3", "master")?;
        assert!(handle.log()?.is_empty());
        Ok(())
    }

    #[test]
    fn log_follows_first_parent() -> anyhow::Result<()> {
        let (td, repo) = repo_init(Some("master"), None)?;
        let base = commit(&repo, vec![("README", "readme\n")])?;
        let main = append_commit_from_objects(
            &repo, Some(1666666700), Some("main side"),
            vec![GitObj::Tree("lib", vec![GitObj::Blob("a", "a\n")])],
        )?;
        // a side branch forked from base, merged back into main
        let base_commit = repo.find_commit(base)?;
        let tree = {
            let mut builder = repo.treebuilder(Some(&base_commit.tree()?))?;
            let mut lib = repo.treebuilder(None)?;
            lib.insert("b", repo.blob(b"b\n")?, 0o100644)?;
            builder.insert("lib", lib.write()?, 0o040000)?;
            repo.find_tree(builder.write()?)?
        };
        let sig = test_graft::repo::signature("user", "user@example.com", Some(1666666750))?;
        let side = repo.commit(None, &sig, &sig, "side", &tree, &[&base_commit])?;
        let merged_tree = {
            let main_tree = repo.find_commit(main)?.tree()?;
            let mut builder = repo.treebuilder(Some(&main_tree))?;
            let mut lib = repo.treebuilder(Some(&tree.get_path(std::path::Path::new("lib"))?
                .to_object(&repo)?.peel_to_tree()?))?;
            lib.insert("a", repo.blob(b"a\n")?, 0o100644)?;
            builder.insert("lib", lib.write()?, 0o040000)?;
            repo.find_tree(builder.write()?)?
        };
        let merge = repo.commit(
            Some("HEAD"), &sig, &sig, "merge", &merged_tree,
            &[&repo.find_commit(main)?, &repo.find_commit(side)?],
        )?;

        let td = td.expect("tempdir created");
        let handle = RepositoryHandle::open(td.path(), "lib", "master")?;
        let log = handle.log()?;
        let main = main.to_string();
        let merge = merge.to_string();
        assert_eq!(digests(&log), [main.as_str(), merge.as_str()]);
        Ok(())
    }
}

use crate::{
    commit::{
        CommitDescriptor,
        summary_of,
    },
    error::{
        PatchError,
        PathError,
    },
    path::{
        SubdirFilter,
        rebase,
    },
};
use super::{
    ChangeKind,
    Diff,
    Patch,
};

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Delete => "delete",
            ChangeKind::Modify => "modify",
            ChangeKind::Rename => "rename",
        }
    }
}

impl Diff {
    /// The path this change leaves behind, or the removed path for a
    /// deletion.
    pub fn path(&self) -> &str {
        if self.new_path.is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    pub fn rebase(
        &self,
        strip: &SubdirFilter,
        add: &SubdirFilter,
    ) -> Result<Self, PathError> {
        let rewrite = |path: &str| match path {
            "" => Ok(String::new()),
            path => rebase(path, strip, add),
        };
        Ok(Self {
            old_path: rewrite(&self.old_path)?,
            new_path: rewrite(&self.new_path)?,
            kind: self.kind,
            old_mode: self.old_mode,
            new_mode: self.new_mode,
            old_id: self.old_id.clone(),
            new_id: self.new_id.clone(),
            similarity: self.similarity,
            content: self.content.clone(),
        })
    }

    /// Whether the content holds textual hunks, as opposed to a binary
    /// patch or nothing at all (e.g. a pure rename).
    pub fn has_hunks(&self) -> bool {
        self.content.starts_with(b"@@")
    }
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn ensure_not_empty(&self) -> Result<(), PatchError> {
        if self.is_empty() {
            Err(PatchError::Empty {
                digest: self.commit_digest.clone(),
            })
        } else {
            Ok(())
        }
    }

    pub fn summary(&self) -> &str {
        summary_of(&self.message)
    }

    pub fn descriptor(&self) -> CommitDescriptor {
        CommitDescriptor {
            digest: self.commit_digest.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            timestamp: self.timestamp,
            message: self.message.clone(),
        }
    }

    /// A copy of this patch with every path moved from under `strip` to
    /// under `add`.
    pub fn rebase(
        &self,
        strip: &SubdirFilter,
        add: &SubdirFilter,
    ) -> Result<Self, PathError> {
        Ok(Self {
            commit_digest: self.commit_digest.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            timestamp: self.timestamp,
            message: self.message.clone(),
            diffs: self.diffs.iter()
                .map(|diff| diff.rebase(strip, add))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

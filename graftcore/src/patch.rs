use serde::{
    Deserialize,
    Serialize,
};
use crate::commit::CommitTime;

/// The object id used by git for the absent side of an addition or a
/// deletion.
pub const NULL_ID: &str = "0000000000000000000000000000000000000000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
    Rename,
}

/// A single file level change.
///
/// Paths are relative to whichever subdirectory filter was in effect
/// when the `Diff` was produced or rebased.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Diff {
    /// Empty for additions.
    pub old_path: String,
    /// Empty for deletions.
    pub new_path: String,
    pub kind: ChangeKind,
    pub old_mode: u32,
    pub new_mode: u32,
    pub old_id: String,
    pub new_id: String,
    pub similarity: Option<u32>,
    /// The hunks (or binary patch) with the per file header removed.
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Patch {
    pub commit_digest: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: CommitTime,
    pub message: String,
    pub diffs: Vec<Diff>,
}

mod display;
mod impls;

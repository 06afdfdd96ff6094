use git2::{
    Commit,
    DiffOptions,
    ErrorCode,
    FileMode,
    ObjectType,
    Repository,
    Tree,
};
use graftcore::{
    commit::{
        CommitDescriptor,
        CommitTime,
    },
    path::SubdirFilter,
};
use std::path::Path;

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}

pub(crate) fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub(crate) fn descriptor(commit: &Commit<'_>) -> CommitDescriptor {
    let author = commit.author();
    let when = author.when();
    CommitDescriptor {
        digest: commit.id().to_string(),
        author_name: lossy(author.name_bytes()),
        author_email: lossy(author.email_bytes()),
        timestamp: CommitTime::new(when.seconds(), when.offset_minutes()),
        message: lossy(commit.message_bytes()),
    }
}

pub(crate) fn diff_options() -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.ignore_submodules(true)
        .show_binary(true);
    opts
}

/// The tree found at `subdir` within `tree`.  Anything other than a tree
/// at that path, a file named like the directory included, is `None`.
pub(crate) fn subtree<'repo>(
    repo: &'repo Repository,
    tree: &Tree<'repo>,
    subdir: &SubdirFilter,
) -> Result<Option<Tree<'repo>>, git2::Error> {
    if subdir.is_empty() {
        return Ok(Some(tree.clone()));
    }
    match tree.get_path(Path::new(subdir.pathspec())) {
        Ok(entry) if entry.kind() == Some(ObjectType::Tree) => {
            Ok(Some(repo.find_tree(entry.id())?))
        }
        Ok(_) => Ok(None),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn mode_bits(mode: FileMode) -> u32 {
    u32::from(mode)
}

const BODY_MARKERS: [&[u8]; 3] = [
    b"@@",
    b"GIT binary patch",
    b"Binary files ",
];

/// Split a single file patch as produced by libgit2 into its header and
/// its body; the body starts at the first hunk or binary marker.
pub(crate) fn split_header(buf: &[u8]) -> (&[u8], &[u8]) {
    let mut offset = 0;
    for line in buf.split_inclusive(|b| *b == b'\n') {
        if BODY_MARKERS.iter().any(|marker| line.starts_with(marker)) {
            return buf.split_at(offset);
        }
        offset += line.len();
    }
    (buf, &buf[buf.len()..])
}

/// The percentage from a `similarity index` header line, if present.
pub(crate) fn similarity(header: &[u8]) -> Option<u32> {
    header.split(|b| *b == b'\n')
        .filter_map(|line| line.strip_prefix(b"similarity index "))
        .filter_map(|value| std::str::from_utf8(value).ok())
        .filter_map(|value| value.trim_end_matches('%').parse().ok())
        .next()
}

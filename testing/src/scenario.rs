use git2::Oid;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::repo::{
    GitObj,
    commit_as,
    repo_init,
    signature,
    under,
};

pub const AUTHOR_NAME: &str = "your name";
pub const AUTHOR_EMAIL: &str = "you@example.com";
pub const FILE1: &str = "test file\n";

/// A pair of bare repositories under one temporary root.
///
/// `repos/src` holds two commits: the first adds `dir1/file1`, the
/// second moves it to `dir2/file1`.  `repos/dst` holds a single commit
/// adding an unrelated `LICENSE`.
pub struct MovedFile {
    pub root: TempDir,
    pub src: PathBuf,
    pub dst: PathBuf,
    pub src_oids: Vec<Oid>,
    pub dst_oids: Vec<Oid>,
}

pub fn moved_file() -> anyhow::Result<MovedFile> {
    let root = tempfile::tempdir()?;
    let src = under(&root, "repos/src");
    let dst = under(&root, "repos/dst");

    let (_, repo) = repo_init(Some("master"), Some(&src))?;
    let src_oids = vec![
        commit_as(
            &repo,
            &signature(AUTHOR_NAME, AUTHOR_EMAIL, Some(1666666600))?,
            "first commit",
            vec![
                GitObj::Tree("dir1", vec![
                    GitObj::Blob("file1", FILE1),
                ]),
            ],
        )?,
        commit_as(
            &repo,
            &signature(AUTHOR_NAME, AUTHOR_EMAIL, Some(1666666700))?,
            "second commit",
            vec![
                GitObj::Tree("dir1", vec![
                    GitObj::Remove("file1"),
                ]),
                GitObj::Tree("dir2", vec![
                    GitObj::Blob("file1", FILE1),
                ]),
            ],
        )?,
    ];

    let (_, repo) = repo_init(Some("master"), Some(&dst))?;
    let dst_oids = vec![
        commit_as(
            &repo,
            &signature(AUTHOR_NAME, AUTHOR_EMAIL, Some(1666666800))?,
            "first commit",
            vec![
                GitObj::Blob("LICENSE", "license\n"),
            ],
        )?,
    ];

    Ok(MovedFile { root, src, dst, src_oids, dst_oids })
}

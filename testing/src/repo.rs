use git2::{
    Commit,
    ErrorCode,
    ObjectType,
    Oid,
    Repository,
    RepositoryInitOptions,
    Signature,
    Time,
    Tree,
    TreeWalkMode,
    TreeWalkResult,
    build::RepoBuilder,
};
use std::path::{
    Path,
    PathBuf,
};
use tempfile::TempDir;

pub enum GitObj<'a> {
    Blob(&'a str, &'a str),
    Executable(&'a str, &'a str),
    Tree(&'a str, Vec<GitObj<'a>>),
    Remove(&'a str),
}

/// Initialize a bare repository with `main_branch` as the unborn HEAD,
/// either at `target` or in a new temporary directory.
pub fn repo_init(
    main_branch: Option<&str>,
    target: Option<&Path>,
) -> anyhow::Result<(Option<TempDir>, Repository)> {
    let (tempdir, path) = match target {
        Some(path) => (None, path.to_path_buf()),
        None => {
            let tempdir = tempfile::tempdir()?;
            let path = tempdir.path().to_path_buf();
            (Some(tempdir), path)
        }
    };
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true)
        .initial_head(main_branch.unwrap_or("master"));
    let repo = Repository::init_opts(&path, &opts)?;
    Ok((tempdir, repo))
}

pub fn signature(
    name: &str,
    email: &str,
    timestamp: Option<i64>,
) -> anyhow::Result<Signature<'static>> {
    Ok(match timestamp {
        Some(t) => Signature::new(name, email, &Time::new(t, 0))?,
        None => Signature::now(name, email)?,
    })
}

fn append_tree_from_objects(
    repo: &Repository,
    base: Option<&Tree<'_>>,
    gitobjs: Vec<GitObj>,
) -> anyhow::Result<Oid> {
    let mut builder = repo.treebuilder(base)?;
    for gitobj in gitobjs {
        match gitobj {
            GitObj::Blob(name, contents) => {
                let oid = repo.blob(contents.as_bytes())?;
                builder.insert(name, oid, 0o100644)?;
            }
            GitObj::Executable(name, contents) => {
                let oid = repo.blob(contents.as_bytes())?;
                builder.insert(name, oid, 0o100755)?;
            }
            GitObj::Tree(name, objects) => {
                let existing = match builder.get(name)? {
                    Some(entry) => entry.to_object(repo)?.into_tree().ok(),
                    None => None,
                };
                let oid = append_tree_from_objects(repo, existing.as_ref(), objects)?;
                if repo.find_tree(oid)?.len() > 0 {
                    builder.insert(name, oid, 0o040000)?;
                } else if existing.is_some() {
                    // git does not track empty directories
                    builder.remove(name)?;
                }
            }
            GitObj::Remove(name) => {
                builder.remove(name)?;
            }
        }
    }
    Ok(builder.write()?)
}

/// Commit the objects on top of HEAD of a bare repo, as `signature` for
/// both author and committer.
pub fn commit_as(
    repo: &Repository,
    signature: &Signature<'_>,
    message: &str,
    objects: Vec<GitObj>,
) -> anyhow::Result<Oid> {
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch
            || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let base = parent.as_ref()
        .map(Commit::tree)
        .transpose()?;
    let tree_id = append_tree_from_objects(repo, base.as_ref(), objects)?;
    let tree = repo.find_tree(tree_id)?;
    let parents = parent.iter().collect::<Vec<_>>();
    Ok(repo.commit(
        Some("HEAD"),
        signature,
        signature,
        message,
        &tree,
        &parents,
    )?)
}

pub fn append_commit_from_objects(
    repo: &Repository,
    timestamp: Option<i64>,
    message: Option<&str>,
    objects: Vec<GitObj>,
) -> anyhow::Result<Oid> {
    let signature = signature("user", "user@example.com", timestamp)?;
    commit_as(repo, &signature, message.unwrap_or("commit"), objects)
}

pub fn commit(
    repo: &Repository,
    files: Vec<(&str, &str)>,
) -> anyhow::Result<Oid> {
    append_commit_from_objects(
        repo,
        None,
        None,
        files.into_iter()
            .map(|(n, c)| GitObj::Blob(n, c))
            .collect(),
    )
}

/// A fresh working clone of `url` checked out at `branch`.
pub fn clone_to(
    url: &Path,
    target: &Path,
    branch: &str,
) -> anyhow::Result<Repository> {
    let url = url.to_str()
        .ok_or_else(|| anyhow::anyhow!("non utf-8 path {url:?}"))?;
    Ok(RepoBuilder::new()
        .branch(branch)
        .clone(url, target)?)
}

pub fn read_blob(
    repo: &Repository,
    spec: &str,
    path: &str,
) -> anyhow::Result<Vec<u8>> {
    let tree = repo.revparse_single(spec)?.peel_to_tree()?;
    let entry = tree.get_path(Path::new(path))?;
    Ok(entry.to_object(repo)?.peel_to_blob()?.content().to_vec())
}

/// Sorted list of every file in the tree of `spec`.
pub fn files(
    repo: &Repository,
    spec: &str,
) -> anyhow::Result<Vec<String>> {
    let tree = repo.revparse_single(spec)?.peel_to_tree()?;
    let mut results = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                results.push(format!("{root}{name}"));
            }
        }
        TreeWalkResult::Ok
    })?;
    results.sort();
    Ok(results)
}

/// Path to `name` under the temporary directory.
pub fn under(root: &TempDir, name: &str) -> PathBuf {
    root.path().join(name)
}

#[test]
fn smoke_test_append_commit_from_objects() -> anyhow::Result<()> {
    let (td, repo) = repo_init(None, None)?;
    let first = append_commit_from_objects(
        &repo, Some(1666666666), Some("first"),
        vec![
            GitObj::Blob("some_file", "a blob"),
            GitObj::Tree("some_dir", vec![
                GitObj::Blob("file1", "file1 in some_dir"),
                GitObj::Tree("nested", vec![
                    GitObj::Blob("file_a", "file_a in nested"),
                ]),
            ]),
        ],
    )?;
    assert_eq!(repo.find_commit(first)?.parent_count(), 0);
    assert_eq!(
        files(&repo, "HEAD")?,
        ["some_dir/file1", "some_dir/nested/file_a", "some_file"],
    );

    let second = append_commit_from_objects(
        &repo, Some(1666666700), None,
        vec![
            GitObj::Remove("some_file"),
            GitObj::Tree("some_dir", vec![
                GitObj::Executable("file2", "file2 is new"),
                GitObj::Tree("nested", vec![
                    GitObj::Remove("file_a"),
                ]),
            ]),
        ],
    )?;
    assert_eq!(repo.find_commit(second)?.parent_id(0)?, first);
    assert_eq!(files(&repo, "HEAD")?, ["some_dir/file1", "some_dir/file2"]);
    assert_eq!(read_blob(&repo, "HEAD", "some_dir/file2")?, b"file2 is new");
    assert_eq!(read_blob(&repo, "master~1", "some_file")?, b"a blob");

    let checkout = tempfile::tempdir()?;
    let cloned = clone_to(
        td.as_ref().map(TempDir::path).ok_or_else(|| anyhow::anyhow!("no tempdir"))?,
        checkout.path(),
        "master",
    )?;
    assert_eq!(cloned.head()?.target(), Some(second));
    assert_eq!(std::fs::read(checkout.path().join("some_dir/file1"))?, b"file1 in some_dir");
    Ok(())
}

//! Fixture helpers shared by the inline test modules.

use git2::{Commit, Oid, Repository, Signature};
use std::path::Path;
use std::process::{Command, Stdio};

/// Tests that shell out to `git` skip themselves when it is not installed.
pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Non-bare repository with one commit on `main`, HEAD attached to it.
pub(crate) fn init_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    let repo = Repository::init(path).unwrap();
    commit_file(&repo, "base.txt", "base", &[], Some("refs/heads/main"));
    repo.set_head("refs/heads/main").unwrap();
    repo
}

pub(crate) fn commit_file(
    repo: &Repository,
    name: &str,
    contents: &str,
    parents: &[&Commit<'_>],
    update_ref: Option<&str>,
) -> Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("tester", "tester@example.com").unwrap();
    repo.commit(update_ref, &sig, &sig, "commit", &tree, parents)
        .unwrap()
}

/// Points `refs/remotes/<remote>/<branch>` at `target` and configures it as
/// the upstream of the local branch.
pub(crate) fn set_upstream(repo: &Repository, remote: &str, branch: &str, target: Oid) {
    if repo.find_remote(remote).is_err() {
        repo.remote(remote, &format!("https://example.com/{remote}.git"))
            .unwrap();
    }
    repo.reference(
        &format!("refs/remotes/{remote}/{branch}"),
        target,
        true,
        "remote tracking",
    )
    .unwrap();
    let mut local = repo.find_branch(branch, git2::BranchType::Local).unwrap();
    local
        .set_upstream(Some(&format!("{remote}/{branch}")))
        .unwrap();
}

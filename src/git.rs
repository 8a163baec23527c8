//! Git collaborator (§4.L): the orchestrator's only way of touching the
//! working tree's version control state. Wraps a single `git2::Repository`
//! opened at the project root.

use anyhow::{Context, Result, anyhow};
use git2::{BranchType, DiffOptions, Repository, Signature};
use std::path::Path;

pub struct GitCollaborator {
    repo: Repository,
}

impl GitCollaborator {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("failed to open git repository")?;
        Ok(Self { repo })
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo.head().ok().and_then(|h| h.peel_to_commit().ok())
    }

    /// Creates `name` from the current HEAD if it doesn't exist yet, then
    /// checks it out. A no-op if `name` is already checked out.
    pub fn ensure_branch(&self, name: &str) -> Result<()> {
        if let Ok(head_ref) = self.repo.head()
            && head_ref.is_branch()
            && head_ref.shorthand() == Some(name)
        {
            return Ok(());
        }

        let branch_ref = format!("refs/heads/{name}");
        if self.repo.find_branch(name, BranchType::Local).is_err() {
            let target = self
                .head_commit()
                .ok_or_else(|| anyhow!("cannot create branch '{name}': repository has no commits"))?;
            self.repo.branch(name, &target, false)?;
        }

        self.repo.set_head(&branch_ref)?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::new().safe()))
            .with_context(|| format!("failed to check out branch '{name}'"))?;
        Ok(())
    }

    /// Stages all working-tree changes, including untracked files, and
    /// commits. Returns the current HEAD SHA without creating an empty
    /// commit if nothing is staged.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        if let Some(parent) = self.head_commit()
            && parent.tree_id() == tree_id
        {
            return Ok(parent.id().to_string());
        }

        let sig = Signature::now("orchestrator", "orchestrator@localhost")?;
        let parents: Vec<git2::Commit<'_>> = self.head_commit().into_iter().collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let commit_id = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
        Ok(commit_id.to_string())
    }

    /// Hard-resets the working tree and index to `sha`.
    pub fn reset_hard(&self, sha: &str) -> Result<()> {
        let oid = git2::Oid::from_str(sha)?;
        let object = self.repo.find_object(oid, None)?;
        self.repo
            .reset(&object, git2::ResetType::Hard, None)
            .with_context(|| format!("failed to reset to {sha}"))
    }

    /// Unified diff between `sha` and the current working tree, including
    /// untracked files.
    pub fn diff_since(&self, sha: &str) -> Result<String> {
        let oid = git2::Oid::from_str(sha)?;
        let commit = self.repo.find_commit(oid)?;
        let tree = commit.tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;

        let mut text = Vec::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin() as u8);
            }
            text.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&text).to_string())
    }

    /// The most recent commit whose tree diff touches `path`, walking back
    /// from HEAD.
    pub fn last_commit_touching(&self, path: &Path) -> Result<Option<String>> {
        let Some(head) = self.head_commit() else {
            return Ok(None);
        };

        let mut walk = self.repo.revwalk()?;
        walk.push(head.id())?;

        for oid in walk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let tree = commit.tree()?;
            let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());

            let mut opts = DiffOptions::new();
            opts.pathspec(path);
            let diff = self
                .repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
            if diff.deltas().len() > 0 {
                return Ok(Some(commit.id().to_string()));
            }
        }
        Ok(None)
    }

    pub fn head_sha(&self) -> Option<String> {
        self.head_commit().map(|c| c.id().to_string())
    }
}

//! References: `HEAD`, loose ref files under `refs/` and the `packed-refs` file.
//!
//! A loose ref is a file holding a 40-hex id, or `ref: <other>` for a symbolic ref.
//! `packed-refs` lists `<id> <refname>` lines; `#` comments and `^<id>` peel lines
//! are skipped. A loose ref shadows a packed one of the same name.

use std::{
    collections::BTreeMap,
    fmt::Display,
    fs, io,
    path::Path,
    str::FromStr,
    sync::{Arc, Weak},
};

use tracing::debug;

use crate::{
    errors::GitError, hash::ObjectHash, internal::object::commit::Commit,
    repository::{RepoInner, Repository},
};

/// Prefix of local branches.
pub const HEADS_PREFIX: &str = "refs/heads/";
const SYMBOLIC_PREFIX: &str = "ref: ";
const MAX_SYMBOLIC_DEPTH: usize = 5;

/// Where `HEAD` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// Symbolic, holding the full target name (`refs/heads/main`), which may not have any
    /// commits yet.
    Branch(String),
    Detached(ObjectHash),
}

/// A named pointer to a commit.
#[derive(Debug, Clone)]
pub struct Ref {
    /// Short name, `main` for `refs/heads/main`.
    pub name: String,
    /// `refs/heads/main`, or `HEAD` for a detached head.
    pub full_name: String,
    /// `None` for a branch without commits.
    pub id: Option<ObjectHash>,
    repo: Weak<RepoInner>,
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name && self.id == other.id
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {id}", self.full_name),
            None => write!(f, "{} (no commits)", self.full_name),
        }
    }
}

impl Ref {
    pub(crate) fn new(
        full_name: impl Into<String>,
        id: Option<ObjectHash>,
        repo: Weak<RepoInner>,
    ) -> Self {
        let full_name = full_name.into();
        let name = short_name(&full_name).to_string();
        Ref {
            name,
            full_name,
            id,
            repo,
        }
    }

    pub fn is_head(&self) -> bool {
        self.full_name.starts_with(HEADS_PREFIX)
    }

    pub fn repository(&self) -> Result<Repository, GitError> {
        self.repo
            .upgrade()
            .map(Repository::from_inner)
            .ok_or(GitError::RepoNotFound)
    }

    /// The commit this ref points at, `None` for an unborn branch or a missing object.
    pub fn commit(&self) -> Result<Option<Arc<Commit>>, GitError> {
        match &self.id {
            Some(id) => self.repository()?.commit_by_hash(id),
            None => Ok(None),
        }
    }

    /// Expand `name` the way `git rev-parse` does, returning the first existing ref among
    /// `<name>`, `refs/<name>`, `refs/tags/<name>`, `refs/heads/<name>`,
    /// `refs/remotes/<name>` and `refs/remotes/<name>/HEAD`.
    pub fn full_name_for(name: &str, repo: &Repository) -> Result<Option<String>, GitError> {
        let git_dir = repo.git_dir();
        let packed = read_packed_refs(git_dir)?;
        let candidates = [
            name.to_string(),
            format!("refs/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/heads/{name}"),
            format!("refs/remotes/{name}"),
            format!("refs/remotes/{name}/HEAD"),
        ];
        for candidate in candidates {
            if git_dir.join(&candidate).is_file() || packed.contains_key(&candidate) {
                debug!("full ref name for {name} is {candidate}");
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// `main` for `refs/heads/main`, `origin/main` for `refs/remotes/origin/main`.
pub fn short_name(full_name: &str) -> &str {
    ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"]
        .iter()
        .find_map(|prefix| full_name.strip_prefix(prefix))
        .unwrap_or(full_name)
}

/// Read `HEAD`.
pub fn read_head(git_dir: &Path) -> Result<HeadState, GitError> {
    let text = fs::read_to_string(git_dir.join("HEAD"))?;
    let text = text.trim();
    if let Some(target) = text.strip_prefix(SYMBOLIC_PREFIX) {
        let target = target.trim();
        return Ok(HeadState::Branch(target.to_string()));
    }
    ObjectHash::from_str(text)
        .map(HeadState::Detached)
        .map_err(|_| GitError::InvalidRef(format!("HEAD: {text}")))
}

/// Resolve `full_name` to an id, following symbolic refs. `Ok(None)` when it does not exist.
pub fn read_ref(git_dir: &Path, full_name: &str) -> Result<Option<ObjectHash>, GitError> {
    let mut name = full_name.to_string();
    for _ in 0..MAX_SYMBOLIC_DEPTH {
        let text = match fs::read_to_string(git_dir.join(&name)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(read_packed_refs(git_dir)?.get(&name).copied());
            }
            Err(e) => return Err(e.into()),
        };
        let text = text.trim();
        match text.strip_prefix(SYMBOLIC_PREFIX) {
            Some(target) => name = target.trim().to_string(),
            None => {
                return ObjectHash::from_str(text)
                    .map(Some)
                    .map_err(|_| GitError::InvalidRef(format!("{name}: {text}")));
            }
        }
    }
    Err(GitError::InvalidRef(format!(
        "{full_name}: more than {MAX_SYMBOLIC_DEPTH} levels of symbolic refs"
    )))
}

/// Every entry of `packed-refs`, keyed by full name. A missing file is an empty list.
pub fn read_packed_refs(git_dir: &Path) -> Result<BTreeMap<String, ObjectHash>, GitError> {
    let text = match fs::read_to_string(git_dir.join("packed-refs")) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let mut refs = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let (id, name) = line
            .split_once(' ')
            .ok_or_else(|| GitError::InvalidRef(format!("packed-refs: {line}")))?;
        let id = ObjectHash::from_str(id)
            .map_err(|_| GitError::InvalidRef(format!("packed-refs: {line}")))?;
        refs.insert(name.trim().to_string(), id);
    }
    Ok(refs)
}

/// All refs under `prefix` (e.g. `refs/heads/`), loose and packed, sorted by full name.
pub fn list_refs(git_dir: &Path, prefix: &str) -> Result<Vec<(String, ObjectHash)>, GitError> {
    let mut refs: BTreeMap<String, ObjectHash> = read_packed_refs(git_dir)?
        .into_iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .collect();
    let mut loose = Vec::new();
    collect_loose(git_dir, &git_dir.join(prefix.trim_end_matches('/')), &mut loose)?;
    for name in loose {
        if let Some(id) = read_ref(git_dir, &name)? {
            refs.insert(name, id);
        }
    }
    Ok(refs.into_iter().collect())
}

fn collect_loose(git_dir: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), GitError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_loose(git_dir, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(git_dir) {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // lock files left by a concurrent writer
            if !name.ends_with(".lock") {
                out.push(name);
            }
        }
    }
    Ok(())
}

//! A repository: the stores under `objects/`, the refs, and the boundary to git.
//!
//! ```text
//! Repository ──owns──▶ LooseObjectStore ──caches──▶ GitObject ─ ─weak─ ─▶ Repository
//!            ──owns──▶ PackedObjectStore × N
//! ```
//!
//! [`Repository`] is a cheap handle around shared state. Objects only keep a weak
//! reference back, so dropping the last handle frees stores and caches; objects that
//! outlive it fail with `RepoNotFound` when they need to load something.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use dashmap::DashMap;
use path_absolutize::Absolutize;
use tracing::debug;

use crate::{
    config::OdbConfig,
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::{
            GitObject, ObjectHeader, ObjectTrait, blob::Blob, commit::Commit, id::ObjectId,
            tree::Tree,
        },
        storage::{ObjectStore, loose::LooseObjectStore, packed::PackedObjectStore},
    },
    refs::{self, HEADS_PREFIX, HeadState, Ref},
    runner::{GitRunner, ProcessGitRunner},
    status::{EMPTY_TREE, Status, StatusFile},
};

/// Where [`Repository::status_blob`] takes a file's content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobSource {
    WorkTree,
    Index,
    Repo,
}

#[derive(Debug)]
pub(crate) struct RepoInner {
    git_dir: PathBuf,
    work_dir: Option<PathBuf>,
    config: Arc<OdbConfig>,
    runner: Arc<dyn GitRunner>,
    loose: Mutex<Option<Arc<LooseObjectStore>>>,
    packed: Mutex<Option<Vec<Arc<PackedObjectStore>>>>,
    heads: Mutex<Option<Arc<Vec<Ref>>>>,
    /// Reachable commits per branch name, `""` for `HEAD`.
    commits: DashMap<String, Arc<Vec<Arc<Commit>>>>,
    /// Child ids keyed by `"<id>: <refs>"`.
    children: DashMap<String, Arc<Vec<ObjectHash>>>,
    status: Mutex<Option<Arc<Status>>>,
}

#[derive(Debug, Clone)]
pub struct Repository {
    inner: Arc<RepoInner>,
}

impl Repository {
    /// Open the repository at `path` with the default configuration and the `git` found on
    /// `PATH`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let config = OdbConfig::default();
        let runner = Arc::new(ProcessGitRunner::from_config(&config));
        Self::open_with(path, config, runner)
    }

    /// Open `path`, which is a work tree containing `.git`, a `.git` directory itself, or a
    /// bare repository.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: OdbConfig,
        runner: Arc<dyn GitRunner>,
    ) -> Result<Self, GitError> {
        let path = path.as_ref().absolutize()?.into_owned();
        let (git_dir, work_dir) = if is_git_dir(&path.join(".git")) {
            (path.join(".git"), Some(path))
        } else if is_git_dir(&path) {
            let work_dir = match path.file_name() {
                Some(name) if name == ".git" => path.parent().map(Path::to_path_buf),
                _ => None,
            };
            (path, work_dir)
        } else {
            debug!("{} is not a git repository", path.display());
            return Err(GitError::RepoNotFound);
        };
        debug!("opened repository at {}", git_dir.display());

        Ok(Repository {
            inner: Arc::new(RepoInner {
                git_dir,
                work_dir,
                config: Arc::new(config),
                runner,
                loose: Mutex::new(None),
                packed: Mutex::new(None),
                heads: Mutex::new(None),
                commits: DashMap::new(),
                children: DashMap::new(),
                status: Mutex::new(None),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<RepoInner>) -> Self {
        Repository { inner }
    }

    /// Create an empty repository at `path` with `git init`.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let config = OdbConfig::default();
        let runner = Arc::new(ProcessGitRunner::from_config(&config));
        Self::init_with(path, config, runner)
    }

    pub fn init_with(
        path: impl AsRef<Path>,
        config: OdbConfig,
        runner: Arc<dyn GitRunner>,
    ) -> Result<Self, GitError> {
        let path = path.as_ref().absolutize()?.into_owned();
        fs::create_dir_all(&path)?;
        runner.run(&path, &["init"])?;
        Self::open_with(path, config, runner)
    }

    /// Clone `from` into `to` with `git clone` and open the result.
    pub fn clone_from(
        from: &str,
        to: impl AsRef<Path>,
        options: &[&str],
    ) -> Result<Self, GitError> {
        let config = OdbConfig::default();
        let runner = Arc::new(ProcessGitRunner::from_config(&config));
        Self::clone_with(from, to, options, config, runner)
    }

    pub fn clone_with(
        from: &str,
        to: impl AsRef<Path>,
        options: &[&str],
        config: OdbConfig,
        runner: Arc<dyn GitRunner>,
    ) -> Result<Self, GitError> {
        let to = to.as_ref().absolutize()?.into_owned();
        let parent = to.parent().ok_or_else(|| {
            GitError::InvalidArgument(format!("cannot clone into {}", to.display()))
        })?;
        fs::create_dir_all(parent)?;
        let target = to.to_string_lossy();
        let mut args = vec!["clone"];
        args.extend_from_slice(options);
        args.extend([from, "--", &*target]);
        runner.run(parent, &args)?;
        Self::open_with(&to, config, runner)
    }

    pub fn git_dir(&self) -> &Path {
        &self.inner.git_dir
    }

    /// Work tree, `None` for a bare repository.
    pub fn work_dir(&self) -> Option<&Path> {
        self.inner.work_dir.as_deref()
    }

    pub fn config(&self) -> &OdbConfig {
        &self.inner.config
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.inner.git_dir.join("objects")
    }

    /// Directory external commands run in.
    fn run_dir(&self) -> &Path {
        self.work_dir().unwrap_or(&self.inner.git_dir)
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.inner.runner.run(self.run_dir(), args)
    }

    // ---- stores ----

    pub fn loose_storage(&self) -> Arc<LooseObjectStore> {
        let mut loose = self.inner.loose.lock().unwrap_or_else(PoisonError::into_inner);
        loose
            .get_or_insert_with(|| {
                Arc::new(LooseObjectStore::new(
                    self.objects_dir(),
                    self.inner.config.clone(),
                ))
            })
            .clone()
    }

    /// One store per `objects/pack/*.idx`, ordered by file name.
    pub fn packed_storages(&self) -> Result<Vec<Arc<PackedObjectStore>>, GitError> {
        let mut packed = self.inner.packed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stores) = &*packed {
            return Ok(stores.clone());
        }
        let pack_dir = self.objects_dir().join("pack");
        let mut index_paths = Vec::new();
        match fs::read_dir(&pack_dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "idx") {
                        index_paths.push(path);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        index_paths.sort();
        debug!("found {} pack indices in {}", index_paths.len(), pack_dir.display());
        let stores: Vec<_> = index_paths
            .into_iter()
            .map(|path| Arc::new(PackedObjectStore::new(path, self.inner.config.clone())))
            .collect();
        *packed = Some(stores.clone());
        Ok(stores)
    }

    /// The loose store followed by every packed store.
    pub fn storages(&self) -> Result<Vec<Arc<dyn ObjectStore>>, GitError> {
        let mut stores: Vec<Arc<dyn ObjectStore>> = vec![self.loose_storage()];
        stores.extend(
            self.packed_storages()?
                .into_iter()
                .map(|store| store as Arc<dyn ObjectStore>),
        );
        Ok(stores)
    }

    /// Resolve `text` across all stores. The first store listing the match wins; a prefix
    /// matching different objects in different stores resolves to nothing.
    pub fn storage_for(
        &self,
        text: &str,
    ) -> Result<Option<(ObjectHash, Arc<dyn ObjectStore>)>, GitError> {
        let mut found: Option<(ObjectHash, Arc<dyn ObjectStore>)> = None;
        for store in self.storages()? {
            let Some(id) = store.actual_id_for(text)? else {
                continue;
            };
            match &found {
                None => found = Some((id, store)),
                Some((first, _)) if *first == id => {}
                Some((first, _)) => {
                    debug!("`{text}` is ambiguous: {first} and {id}");
                    return Ok(None);
                }
            }
        }
        Ok(found)
    }

    fn storage_for_hash(&self, id: &ObjectHash) -> Result<Option<Arc<dyn ObjectStore>>, GitError> {
        for store in self.storages()? {
            if store.contains(id)? {
                return Ok(Some(store));
            }
        }
        Ok(None)
    }

    pub fn id_for(&self, text: &str) -> Result<ObjectId, GitError> {
        ObjectId::with_repo(text, self)
    }

    // ---- objects ----

    /// The object `store` holds for `id`, created on first request and shared afterwards.
    pub fn object_in(
        &self,
        store: &Arc<dyn ObjectStore>,
        id: &ObjectHash,
    ) -> Result<GitObject, GitError> {
        if let Some(object) = store.objects().get(id) {
            return Ok(object.value().clone());
        }
        let header = ObjectHeader::new(
            *id,
            store.object_type_for(id)?,
            store.object_size_for(id)?,
            Arc::downgrade(&self.inner),
        );
        Ok(store
            .objects()
            .entry(*id)
            .or_insert_with(|| GitObject::from_header(header))
            .clone())
    }

    /// Object named by full or abbreviated `text`; `None` when it does not resolve.
    pub fn object(&self, text: &str) -> Result<Option<GitObject>, GitError> {
        match self.storage_for(text)? {
            Some((id, store)) => self.object_in(&store, &id).map(Some),
            None => Ok(None),
        }
    }

    /// Object for an id found in another object, such as a tree entry or a parent.
    pub fn object_by_hash(&self, id: &ObjectHash) -> Result<Option<GitObject>, GitError> {
        match self.storage_for_hash(id)? {
            Some(store) => self.object_in(&store, id).map(Some),
            None => Ok(None),
        }
    }

    pub fn blob(&self, text: &str) -> Result<Option<Arc<Blob>>, GitError> {
        Ok(self.object(text)?.and_then(|o| o.as_blob().cloned()))
    }

    pub fn tree(&self, text: &str) -> Result<Option<Arc<Tree>>, GitError> {
        Ok(self.object(text)?.and_then(|o| o.as_tree().cloned()))
    }

    pub fn commit(&self, text: &str) -> Result<Option<Arc<Commit>>, GitError> {
        Ok(self.object(text)?.and_then(|o| o.as_commit().cloned()))
    }

    pub fn tree_by_hash(&self, id: &ObjectHash) -> Result<Option<Arc<Tree>>, GitError> {
        Ok(self.object_by_hash(id)?.and_then(|o| o.as_tree().cloned()))
    }

    pub fn commit_by_hash(&self, id: &ObjectHash) -> Result<Option<Arc<Commit>>, GitError> {
        Ok(self.object_by_hash(id)?.and_then(|o| o.as_commit().cloned()))
    }

    /// Payload of `id` from the first store listing it.
    pub fn object_data_for(&self, id: &ObjectHash) -> Result<Bytes, GitError> {
        match self.storage_for_hash(id)? {
            Some(store) => store.object_data_for(id),
            None => Err(GitError::ObjectNotFound(id.to_string())),
        }
    }

    // ---- refs and history ----

    /// The ref `HEAD` points at when `name` is `None`, otherwise the branch `name`.
    pub fn head(&self, name: Option<&str>) -> Result<Ref, GitError> {
        let git_dir = self.git_dir();
        let weak = Arc::downgrade(&self.inner);
        let full_name = match name {
            Some(name) => {
                let full_name = format!("{HEADS_PREFIX}{name}");
                let id = refs::read_ref(git_dir, &full_name)?
                    .ok_or_else(|| GitError::RefNotFound(full_name.clone()))?;
                return Ok(Ref::new(full_name, Some(id), weak));
            }
            None => match refs::read_head(git_dir)? {
                HeadState::Branch(full_name) => full_name,
                HeadState::Detached(id) => return Ok(Ref::new("HEAD", Some(id), weak)),
            },
        };
        let id = refs::read_ref(git_dir, &full_name)?;
        Ok(Ref::new(full_name, id, weak))
    }

    /// Every local branch, sorted by name.
    pub fn heads(&self) -> Result<Arc<Vec<Ref>>, GitError> {
        let mut heads = self.inner.heads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(heads) = &*heads {
            return Ok(heads.clone());
        }
        let list: Vec<Ref> = refs::list_refs(self.git_dir(), HEADS_PREFIX)?
            .into_iter()
            .map(|(full_name, id)| Ref::new(full_name, Some(id), Arc::downgrade(&self.inner)))
            .collect();
        let list = Arc::new(list);
        *heads = Some(list.clone());
        Ok(list)
    }

    /// Commits reachable from `branch` (or `HEAD`), newest first.
    pub fn commits(&self, branch: Option<&str>) -> Result<Arc<Vec<Arc<Commit>>>, GitError> {
        let key = branch.unwrap_or_default().to_string();
        if let Some(commits) = self.inner.commits.get(&key) {
            return Ok(commits.clone());
        }
        let commits = Arc::new(Commit::all_reachable_from(&self.head(branch)?)?);
        debug!("{} commits reachable from `{key}`", commits.len());
        self.inner.commits.insert(key, commits.clone());
        Ok(commits)
    }

    /// Ids of the commits on `refs` that have `id` as a parent, from
    /// `git rev-list --children`. Empty `refs` means the current branch.
    pub fn children_of(
        &self,
        id: &ObjectHash,
        refs: &[&str],
    ) -> Result<Arc<Vec<ObjectHash>>, GitError> {
        let head;
        let refs = if refs.is_empty() {
            head = self.head(None)?.full_name;
            vec![head.as_str()]
        } else {
            refs.to_vec()
        };
        let key = format!("{id}: {}", refs.join(" "));
        if let Some(children) = self.inner.children.get(&key) {
            return Ok(children.clone());
        }

        let exclude = format!("^{id}^@");
        let mut args = vec!["rev-list", "--children"];
        args.extend(refs.iter().copied());
        args.push(&exclude);
        let output = self.run(&args)?;

        let own = id.to_string();
        let children: Vec<ObjectHash> = output
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .find(|fields| fields.first() == Some(&own.as_str()))
            .map(|fields| {
                fields[1..]
                    .iter()
                    .filter_map(|child| child.parse::<ObjectHash>().ok())
                    .collect()
            })
            .unwrap_or_default();
        let children = Arc::new(children);
        self.inner.children.insert(key, children.clone());
        Ok(children)
    }

    // ---- git boundary ----

    /// `git diff` between two commits.
    pub fn diff(&self, a: &Commit, b: &Commit) -> Result<String, GitError> {
        let (a, b) = (a.id().to_string(), b.id().to_string());
        self.run(&["diff", &a, &b])
    }

    /// Patch a commit introduces relative to its first parent.
    pub fn commit_diff(&self, commit: &Commit) -> Result<String, GitError> {
        let id = commit.id().to_string();
        self.run(&["diff-tree", "-p", "-r", "--root", &id])
    }

    pub fn stage_files(&self, paths: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run(&args)?;
        self.reset_status();
        Ok(())
    }

    /// Remove `paths` from the index, keeping the files. Before the first commit there is
    /// no `HEAD` to reset to, so the entries are dropped instead.
    pub fn unstage_files(&self, paths: &[&str]) -> Result<(), GitError> {
        let mut args = if self.head(None)?.id.is_none() {
            vec!["rm", "--cached", "--"]
        } else {
            vec!["reset", "HEAD", "--"]
        };
        args.extend_from_slice(paths);
        self.run(&args)?;
        self.reset_status();
        Ok(())
    }

    /// Work tree status, cached until [`Repository::reset_status`] or a staging call.
    pub fn status(&self) -> Result<Arc<Status>, GitError> {
        let mut cached = self.inner.status.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = &*cached {
            return Ok(status.clone());
        }
        // an unborn branch compares against the empty tree
        let tree = if self.head(None)?.id.is_some() {
            "HEAD"
        } else {
            EMPTY_TREE
        };
        let ls_files = self.run(&["ls-files", "--stage"])?;
        let untracked = self.run(&["ls-files", "--others", "--exclude-standard"])?;
        let diff_files = self.run(&["diff-files"])?;
        let diff_index = self.run(&["diff-index", tree])?;
        let status = Arc::new(Status::from_outputs(
            &ls_files,
            &untracked,
            &diff_files,
            &diff_index,
        )?);
        *cached = Some(status.clone());
        Ok(status)
    }

    /// Content of `file` from `source`; without one, the work tree for unstaged changes
    /// and the index otherwise. `None` when that side has no content, such as the index
    /// side of a new untracked file.
    pub fn status_blob(
        &self,
        file: &StatusFile,
        source: Option<BlobSource>,
    ) -> Result<Option<Bytes>, GitError> {
        let source = source.unwrap_or(if file.changes_unstaged() {
            BlobSource::WorkTree
        } else {
            BlobSource::Index
        });
        let id = match source {
            BlobSource::WorkTree => {
                let Some(work_dir) = self.work_dir() else {
                    return Ok(None);
                };
                return match fs::read(work_dir.join(&file.path)) {
                    Ok(data) => Ok(Some(Bytes::from(data))),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err.into()),
                };
            }
            BlobSource::Index => file.index_id.or(file.repo_id),
            BlobSource::Repo => file.repo_id,
        };
        match id {
            Some(id) => match self.object_by_hash(&id)? {
                Some(object) => object.data().map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// `git diff` for one status entry, `--cached` when its change is staged. Untracked
    /// files have no diff.
    pub fn status_diff(&self, file: &StatusFile) -> Result<Option<String>, GitError> {
        if file.is_untracked() {
            return Ok(None);
        }
        let mut args = vec!["diff"];
        if file.changes_staged() {
            args.push("--cached");
        }
        args.extend(["--", file.path.as_str()]);
        self.run(&args).map(Some)
    }

    /// Commit the index with `message`; history and ref caches are dropped afterwards.
    pub fn commit_index(&self, message: &str, options: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["commit"];
        args.extend_from_slice(options);
        args.extend(["-m", message]);
        self.run(&args)?;
        self.reset_commits();
        self.reset_heads();
        self.reset_loose_storage();
        self.reset_status();
        Ok(())
    }

    // ---- cache control ----

    pub fn reset_loose_storage(&self) {
        *self.inner.loose.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn reset_packed_storages(&self) {
        *self.inner.packed.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn reset_heads(&self) {
        *self.inner.heads.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn reset_commits(&self) {
        self.inner.commits.clear();
        self.inner.children.clear();
    }

    pub fn reset_status(&self) {
        *self.inner.status.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn reset(&self) {
        self.reset_status();
        self.reset_commits();
        self.reset_heads();
        self.reset_packed_storages();
        self.reset_loose_storage();
    }
}

fn is_git_dir(path: &Path) -> bool {
    path.join("objects").is_dir() && path.join("HEAD").is_file()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::Write,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    };

    use flate2::{Compression, write::ZlibEncoder};
    use tempfile::{TempDir, tempdir};

    use super::{BlobSource, Repository};
    use crate::{
        config::OdbConfig,
        errors::GitError,
        hash::ObjectHash,
        internal::object::{ObjectTrait, types::ObjectType},
        internal::storage::tests::init_logger,
        runner::GitRunner,
        status::EMPTY_TREE,
    };

    /// Records every call and answers with a canned output: the first reply whose key
    /// prefixes the joined arguments, else `output`.
    #[derive(Debug, Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
        output: String,
        replies: Vec<(&'static str, String)>,
    }

    impl GitRunner for ScriptedRunner {
        fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
            self.calls.lock().unwrap().push((
                dir.to_path_buf(),
                args.iter().map(|a| a.to_string()).collect(),
            ));
            let line = args.join(" ");
            Ok(self
                .replies
                .iter()
                .find(|(key, _)| line.starts_with(key))
                .map_or_else(|| self.output.clone(), |(_, reply)| reply.clone()))
        }
    }

    impl ScriptedRunner {
        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().iter().map(|(_, a)| a.clone()).collect()
        }
    }

    struct Fixture {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        repo: Repository,
    }

    impl Fixture {
        fn new(output: &str) -> Fixture {
            Fixture::with_runner(ScriptedRunner {
                output: output.to_string(),
                ..ScriptedRunner::default()
            })
        }

        fn with_runner(runner: ScriptedRunner) -> Fixture {
            let dir = tempdir().unwrap();
            let git_dir = dir.path().join(".git");
            fs::create_dir_all(git_dir.join("objects")).unwrap();
            fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
            fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
            let runner = Arc::new(runner);
            let repo = Repository::open_with(dir.path(), OdbConfig::default(), runner.clone())
                .unwrap();
            Fixture { dir, runner, repo }
        }

        fn git_dir(&self) -> PathBuf {
            self.dir.path().join(".git")
        }

        fn write(&self, object_type: ObjectType, data: &[u8]) -> ObjectHash {
            let id = ObjectHash::from_type_and_data(object_type, data);
            let hex = id.to_string();
            let dir = self.git_dir().join("objects").join(&hex[..2]);
            fs::create_dir_all(&dir).unwrap();
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(format!("{object_type} {}\0", data.len()).as_bytes())
                .unwrap();
            enc.write_all(data).unwrap();
            fs::write(dir.join(&hex[2..]), enc.finish().unwrap()).unwrap();
            id
        }

        fn commit(&self, tree: ObjectHash, parents: &[ObjectHash], time: i64) -> ObjectHash {
            let mut text = format!("tree {tree}\n");
            for parent in parents {
                text.push_str(&format!("parent {parent}\n"));
            }
            text.push_str(&format!("author Me <me@example.com> {time} +0000\n"));
            text.push_str(&format!("committer Me <me@example.com> {time} +0000\n"));
            text.push_str(&format!("\ncommit at {time}\n"));
            self.write(ObjectType::Commit, text.as_bytes())
        }

        fn set_branch(&self, name: &str, id: ObjectHash) {
            fs::write(self.git_dir().join("refs/heads").join(name), format!("{id}\n")).unwrap();
        }
    }

    #[test]
    fn open_shapes() {
        let fixture = Fixture::new("");
        assert_eq!(fixture.repo.work_dir(), Some(fixture.dir.path()));
        let via_git_dir = Repository::open(fixture.git_dir()).unwrap();
        assert_eq!(via_git_dir.git_dir(), fixture.git_dir());
        assert_eq!(via_git_dir.work_dir(), Some(fixture.dir.path()));

        let empty = tempdir().unwrap();
        assert!(matches!(
            Repository::open(empty.path()),
            Err(GitError::RepoNotFound)
        ));
    }

    #[test]
    fn objects_share_one_instance() {
        init_logger();
        let fixture = Fixture::new("");
        let blob = fixture.write(ObjectType::Blob, b"content\n");
        let text = blob.to_string();

        let first = fixture.repo.blob(&text[..8]).unwrap().unwrap();
        let second = fixture.repo.blob(&text).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_populated());
        assert_eq!(&first.data().unwrap()[..], b"content\n");
        assert!(second.is_populated());

        // wrong type and unknown ids are not errors
        assert!(fixture.repo.tree(&text).unwrap().is_none());
        assert!(fixture.repo.object("ffff").unwrap().is_none());
        assert!(!fixture.repo.id_for("ffff").unwrap().is_valid());
    }

    #[test]
    fn dropped_repository_is_not_kept_alive() {
        let fixture = Fixture::new("");
        let blob_id = fixture.write(ObjectType::Blob, b"x");
        let blob = fixture.repo.blob(&blob_id.to_string()).unwrap().unwrap();
        let Fixture { dir, runner, repo } = fixture;
        drop(repo);
        drop(runner);
        assert!(matches!(blob.data(), Err(GitError::RepoNotFound)));
        drop(dir);
    }

    #[test]
    fn history_walk_and_heads() {
        let fixture = Fixture::new("");
        let tree = fixture.write(ObjectType::Tree, b"");
        let root = fixture.commit(tree, &[], 1_000_000_000);
        let left = fixture.commit(tree, &[root], 1_000_000_100);
        let right = fixture.commit(tree, &[root], 1_000_000_200);
        let merge = fixture.commit(tree, &[left, right], 1_000_000_300);
        fixture.set_branch("main", merge);
        fixture.set_branch("side", left);

        let head = fixture.repo.head(None).unwrap();
        assert_eq!(head.name, "main");
        assert_eq!(head.id, Some(merge));

        let commits = fixture.repo.commits(None).unwrap();
        let ids: Vec<_> = commits.iter().map(|c| c.id()).collect();
        assert_eq!(ids, [merge, right, left, root]);
        assert!(commits[0].is_merge().unwrap());
        assert!(Arc::ptr_eq(&commits, &fixture.repo.commits(None).unwrap()));

        let side = fixture.repo.commits(Some("side")).unwrap();
        assert_eq!(side.len(), 2);

        let heads = fixture.repo.heads().unwrap();
        let names: Vec<_> = heads.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["main", "side"]);
        assert!(matches!(
            fixture.repo.head(Some("missing")),
            Err(GitError::RefNotFound(_))
        ));

        let tree_of_merge = commits[0].tree().unwrap().unwrap();
        assert_eq!(tree_of_merge.id(), tree);
        assert_eq!(commits[0].parents().unwrap().len(), 2);
    }

    #[test]
    fn head_on_a_remote_tracking_ref() {
        let fixture = Fixture::new("");
        let tree = fixture.write(ObjectType::Tree, b"");
        let tip = fixture.commit(tree, &[], 1_000_000_000);
        let remotes = fixture.git_dir().join("refs/remotes/origin");
        fs::create_dir_all(&remotes).unwrap();
        fs::write(remotes.join("main"), format!("{tip}\n")).unwrap();
        fs::write(fixture.git_dir().join("HEAD"), "ref: refs/remotes/origin/main\n").unwrap();

        let head = fixture.repo.head(None).unwrap();
        assert_eq!(head.full_name, "refs/remotes/origin/main");
        assert_eq!(head.name, "origin/main");
        assert_eq!(head.id, Some(tip));
    }

    #[test]
    fn children_come_from_rev_list() {
        let a = ObjectHash([0xaa; 20]);
        let b = ObjectHash([0xbb; 20]);
        let c = ObjectHash([0xcc; 20]);
        let fixture = Fixture::new(&format!("{c}\n{b}\n{a} {b} {c}\n"));
        let children = fixture.repo.children_of(&a, &[]).unwrap();
        assert_eq!(*children, vec![b, c]);

        // cached per id and ref list
        fixture.repo.children_of(&a, &[]).unwrap();
        let calls = fixture.runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            ["rev-list", "--children", "refs/heads/main", format!("^{a}^@").as_str()]
        );

        assert!(fixture.repo.children_of(&c, &["main"]).unwrap().is_empty());
        assert_eq!(fixture.runner.calls().len(), 2);
    }

    #[test]
    fn staging_commands() {
        let fixture = Fixture::new("");
        fixture.repo.unstage_files(&["a.txt"]).unwrap();

        let tree = fixture.write(ObjectType::Tree, b"");
        fixture.set_branch("main", fixture.commit(tree, &[], 1_000_000_000));
        fixture.repo.unstage_files(&["a.txt"]).unwrap();
        fixture.repo.stage_files(&["b.txt", "c.txt"]).unwrap();
        fixture.repo.commit_index("message", &["--no-verify"]).unwrap();

        let calls = fixture.runner.calls();
        assert_eq!(calls[0], ["rm", "--cached", "--", "a.txt"]);
        assert_eq!(calls[1], ["reset", "HEAD", "--", "a.txt"]);
        assert_eq!(calls[2], ["add", "--", "b.txt", "c.txt"]);
        assert_eq!(calls[3], ["commit", "--no-verify", "-m", "message"]);
        let dirs: Vec<_> = fixture
            .runner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(dir, _)| dir.clone())
            .collect();
        assert!(dirs.iter().all(|dir| dir == fixture.dir.path()));
    }

    fn status_runner() -> ScriptedRunner {
        let staged = "86e041dad66a19b9518b83b78865015f62662f75";
        let zero = "0".repeat(40);
        ScriptedRunner {
            replies: vec![
                ("ls-files --stage", format!("100644 {staged} 0\tnew.txt\n")),
                ("ls-files --others", "scratch.txt\n".to_string()),
                ("diff-files", String::new()),
                (
                    "diff-index",
                    format!(":000000 100644 {zero} {staged} A\tnew.txt\n"),
                ),
            ],
            ..ScriptedRunner::default()
        }
    }

    #[test]
    fn status_is_cached_until_reset() {
        let fixture = Fixture::with_runner(status_runner());
        let status = fixture.repo.status().unwrap();
        assert!(status.for_file("new.txt")[0].changes_staged());
        assert!(status.for_file("scratch.txt")[0].is_untracked());
        assert!(Arc::ptr_eq(&status, &fixture.repo.status().unwrap()));

        let calls = fixture.runner.calls();
        assert_eq!(calls.len(), 4);
        // no commits yet
        assert_eq!(calls[3], ["diff-index", EMPTY_TREE]);

        fixture.repo.reset_status();
        let tree = fixture.write(ObjectType::Tree, b"");
        fixture.set_branch("main", fixture.commit(tree, &[], 1_000_000_000));
        let again = fixture.repo.status().unwrap();
        assert!(!Arc::ptr_eq(&status, &again));
        assert_eq!(fixture.runner.calls()[7], ["diff-index", "HEAD"]);

        // staging invalidates it too
        fixture.repo.stage_files(&["scratch.txt"]).unwrap();
        fixture.repo.status().unwrap();
        assert_eq!(fixture.runner.calls().len(), 13);
    }

    #[test]
    fn status_blobs_and_diffs() {
        let fixture = Fixture::with_runner(status_runner());
        let blob = fixture.write(ObjectType::Blob, b"foo\nbar\nbaz\n");
        fs::write(fixture.dir.path().join("new.txt"), "foo\nbar\nbaz\nqux\n").unwrap();
        fs::write(fixture.dir.path().join("scratch.txt"), "scratch\n").unwrap();

        let status = fixture.repo.status().unwrap();
        let added = &status.for_file("new.txt")[0];
        assert_eq!(added.index_id, Some(blob));
        assert_eq!(
            fixture.repo.status_blob(added, None).unwrap().as_deref(),
            Some(&b"foo\nbar\nbaz\n"[..])
        );
        assert_eq!(
            fixture.repo.status_blob(added, Some(BlobSource::WorkTree)).unwrap().as_deref(),
            Some(&b"foo\nbar\nbaz\nqux\n"[..])
        );
        assert!(fixture.repo.status_blob(added, Some(BlobSource::Repo)).unwrap().is_none());

        let untracked = &status.for_file("scratch.txt")[0];
        assert_eq!(
            fixture.repo.status_blob(untracked, None).unwrap().as_deref(),
            Some(&b"scratch\n"[..])
        );
        assert!(fixture.repo.status_blob(untracked, Some(BlobSource::Index)).unwrap().is_none());
        assert!(fixture.repo.status_diff(untracked).unwrap().is_none());

        fixture.repo.status_diff(added).unwrap();
        assert_eq!(
            fixture.runner.calls().last().unwrap(),
            &["diff", "--cached", "--", "new.txt"]
        );
    }

    #[test]
    fn reset_picks_up_new_objects() {
        let fixture = Fixture::new("");
        let first = fixture.write(ObjectType::Blob, b"first");
        assert!(fixture.repo.id_for(&first.to_string()).unwrap().exists().unwrap());

        let second = fixture.write(ObjectType::Blob, b"second");
        assert!(!fixture.repo.id_for(&second.to_string()).unwrap().is_valid());
        fixture.repo.reset_loose_storage();
        assert!(fixture.repo.id_for(&second.to_string()).unwrap().is_valid());
    }
}

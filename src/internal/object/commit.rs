//! The Commit object records a snapshot of a project's files, the commits it is based on, and
//! who made it and when.
//!
//! Each commit object contains:
//!
//! - zero or one `tree` line naming the top level tree of the snapshot;
//! - any number of `parent` lines (more than one for a merge);
//! - an `author` and a `committer` line, see [`Signature`];
//! - optional extra headers (`encoding`, `gpgsig`, `mergetag`, ...) whose continuation lines
//!   start with a space;
//! - a blank line followed by the free-form message.
//!
//! Parsing is forgiving: a missing or malformed header line leaves its field empty and never
//! fails the commit.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    fmt::Display,
    str::FromStr,
    sync::Arc,
};

use bstr::ByteSlice;
use chrono::{DateTime, FixedOffset};
use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{
        ObjectHeader, ObjectTrait, Population, signature::Signature, tree::Tree,
        types::ObjectType,
    },
    refs::Ref,
};

/// Parsed content of a commit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitFields {
    pub tree: Option<ObjectHash>,
    pub parents: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    /// Value of the `encoding` header, if any.
    pub encoding: Option<String>,
    /// First paragraph of the message, lines joined with `\n`.
    pub message: String,
    /// First line of `message`.
    pub summary: String,
    /// Everything after the header block.
    pub full_message: String,
}

impl CommitFields {
    pub fn parse(data: &[u8]) -> CommitFields {
        let mut fields = CommitFields::default();
        let mut rest = data;

        while !rest.is_empty() {
            let (line, tail) = match rest.find_byte(b'\n') {
                Some(end) => (&rest[..end], &rest[end + 1..]),
                None => (rest, &rest[rest.len()..]),
            };
            rest = tail;
            if line.is_empty() {
                break;
            }
            if line[0] == b' ' {
                // continuation of a multi-line header such as gpgsig
                continue;
            }
            let line = line.to_str_lossy();
            let (key, value) = line.split_once(' ').unwrap_or((&*line, ""));
            match key {
                "tree" => {
                    if fields.tree.is_some() {
                        warn!("commit has more than one tree line, keeping the first");
                        continue;
                    }
                    match ObjectHash::from_str(value.trim()) {
                        Ok(id) => fields.tree = Some(id),
                        Err(e) => warn!("ignoring commit tree line: {e}"),
                    }
                }
                "parent" => match ObjectHash::from_str(value.trim()) {
                    Ok(id) => fields.parents.push(id),
                    Err(e) => warn!("ignoring commit parent line: {e}"),
                },
                "author" => fields.author = Signature::parse(value),
                "committer" => fields.committer = Signature::parse(value),
                "encoding" => fields.encoding = Some(value.trim().to_string()),
                _ => debug!("skipping commit header `{key}`"),
            }
        }

        fields.full_message = decode_message(rest, fields.encoding.as_deref());
        fields.message = fields
            .full_message
            .lines()
            .skip_while(|line| line.trim().is_empty())
            .take_while(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        fields.summary = fields.message.lines().next().unwrap_or_default().to_string();
        fields
    }
}

fn decode_message(body: &[u8], encoding: Option<&str>) -> String {
    match encoding.and_then(|label| Encoding::for_label(label.as_bytes())) {
        Some(encoding) => encoding.decode(body).0.into_owned(),
        None => {
            if let Some(label) = encoding {
                warn!("unknown commit encoding `{label}`, decoding as UTF-8");
            }
            body.to_str_lossy().into_owned()
        }
    }
}

/// A commit read from a repository, parsed on first field access.
#[derive(Debug)]
pub struct Commit {
    header: ObjectHeader,
    fields: Population<CommitFields>,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.header.id == other.header.id
    }
}

impl Eq for Commit {}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "commit {}", self.header.id)?;
        let fields = match self.fields() {
            Ok(fields) => fields,
            Err(e) => return writeln!(f, "<unreadable: {e}>"),
        };
        if let Some(tree) = fields.tree {
            writeln!(f, "tree {tree}")?;
        }
        for parent in fields.parents.iter() {
            writeln!(f, "parent {parent}")?;
        }
        writeln!(f, "author {}", fields.author)?;
        writeln!(f, "committer {}", fields.committer)?;
        writeln!(f)?;
        writeln!(f, "{}", fields.message)
    }
}

impl Commit {
    pub(crate) fn new(header: ObjectHeader) -> Self {
        Commit {
            header,
            fields: Population::new(),
        }
    }

    pub fn fields(&self) -> Result<Arc<CommitFields>, GitError> {
        self.fields.get_or_try_init(|| {
            let data = self.header.load_data()?;
            Ok(CommitFields::parse(&data))
        })
    }

    pub fn tree_id(&self) -> Result<Option<ObjectHash>, GitError> {
        Ok(self.fields()?.tree)
    }

    pub fn parent_ids(&self) -> Result<Vec<ObjectHash>, GitError> {
        Ok(self.fields()?.parents.clone())
    }

    pub fn author(&self) -> Result<Signature, GitError> {
        Ok(self.fields()?.author.clone())
    }

    pub fn committer(&self) -> Result<Signature, GitError> {
        Ok(self.fields()?.committer.clone())
    }

    pub fn authored_at(&self) -> Result<DateTime<FixedOffset>, GitError> {
        Ok(self.fields()?.author.time())
    }

    pub fn committed_at(&self) -> Result<DateTime<FixedOffset>, GitError> {
        Ok(self.fields()?.committer.time())
    }

    pub fn message(&self) -> Result<String, GitError> {
        Ok(self.fields()?.message.clone())
    }

    pub fn summary(&self) -> Result<String, GitError> {
        Ok(self.fields()?.summary.clone())
    }

    pub fn full_message(&self) -> Result<String, GitError> {
        Ok(self.fields()?.full_message.clone())
    }

    pub fn is_merge(&self) -> Result<bool, GitError> {
        Ok(self.fields()?.parents.len() > 1)
    }

    /// Root tree, `None` when the commit names none or it is missing from the repository.
    pub fn tree(&self) -> Result<Option<Arc<Tree>>, GitError> {
        match self.tree_id()? {
            Some(id) => self.header.repository()?.tree_by_hash(&id),
            None => Ok(None),
        }
    }

    /// Parents present in the repository, in header order.
    pub fn parents(&self) -> Result<Vec<Arc<Commit>>, GitError> {
        let repo = self.header.repository()?;
        let mut parents = Vec::new();
        for id in self.parent_ids()? {
            match repo.commit_by_hash(&id)? {
                Some(parent) => parents.push(parent),
                None => warn!("parent {id} of {} is missing", self.header.id),
            }
        }
        Ok(parents)
    }

    /// Commits reachable from `refs` whose parent is this commit, as reported by
    /// `git rev-list --children`. Empty `refs` means the current branch.
    pub fn children_on(&self, refs: &[&str]) -> Result<Vec<Arc<Commit>>, GitError> {
        let repo = self.header.repository()?;
        let mut children = Vec::new();
        for id in repo.children_of(&self.header.id, refs)?.iter() {
            if let Some(child) = repo.commit_by_hash(id)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Whether more than one commit on `refs` builds on this one.
    pub fn has_branched_on(&self, refs: &[&str]) -> Result<bool, GitError> {
        let repo = self.header.repository()?;
        Ok(repo.children_of(&self.header.id, refs)?.len() > 1)
    }

    /// The commit with the newest committer time.
    pub fn latest_in(commits: &[Arc<Commit>]) -> Result<Option<Arc<Commit>>, GitError> {
        let mut latest: Option<(i64, &Arc<Commit>)> = None;
        for commit in commits {
            let time = commit.committer()?.timestamp;
            if latest.is_none_or(|(best, _)| time > best) {
                latest = Some((time, commit));
            }
        }
        Ok(latest.map(|(_, commit)| commit.clone()))
    }

    /// Every commit reachable from the commit `reference` points at, newest committer
    /// time first. Each commit appears once; missing parents are skipped.
    pub fn all_reachable_from(reference: &Ref) -> Result<Vec<Arc<Commit>>, GitError> {
        let Some(start) = reference.commit()? else {
            return Ok(Vec::new());
        };
        let repo = start.header.repository()?;

        let mut seen = HashSet::from([start.header.id]);
        let mut fringe = BinaryHeap::new();
        let mut pending = Vec::new();
        enqueue(start, &mut fringe, &mut pending)?;

        let mut reachable = Vec::new();
        while let Some((_, Reverse(slot))) = fringe.pop() {
            let Some(commit) = pending.get_mut(slot).and_then(Option::take) else {
                continue;
            };
            for parent in commit.parent_ids()? {
                if !seen.insert(parent) {
                    continue;
                }
                match repo.commit_by_hash(&parent)? {
                    Some(parent) => enqueue(parent, &mut fringe, &mut pending)?,
                    None => warn!("parent {parent} of {} is missing", commit.header.id),
                }
            }
            reachable.push(commit);
        }
        Ok(reachable)
    }
}

/// Fringe ordered by committer time, ties going to the commit queued first.
type Fringe = BinaryHeap<(i64, Reverse<usize>)>;

fn enqueue(
    commit: Arc<Commit>,
    fringe: &mut Fringe,
    pending: &mut Vec<Option<Arc<Commit>>>,
) -> Result<(), GitError> {
    let time = commit.committer()?.timestamp;
    fringe.push((time, Reverse(pending.len())));
    pending.push(Some(commit));
    Ok(())
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Commit {
            header: ObjectHeader::detached(hash, ObjectType::Commit, data.len()),
            fields: Population::populated(CommitFields::parse(data)),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn is_populated(&self) -> bool {
        self.fields.is_populated()
    }

    fn populate(&self) -> Result<(), GitError> {
        self.fields().map(|_| ())
    }
}

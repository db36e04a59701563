//! Work tree status assembled from the text output of four git commands:
//!
//! - `ls-files --stage`: every index entry, unchanged ones included;
//! - `ls-files --others --exclude-standard`: untracked files, ignored ones left out;
//! - `diff-files`: index against work tree;
//! - `diff-index <tree>`: `HEAD` (or the empty tree on an unborn branch) against the
//!   work tree, using the index for entries whose stat data is clean.
//!
//! A path normally has one [`StatusFile`]. It gets a second one when it carries a staged
//! change and a further change in the work tree, in that order: unstaged first.

use std::{collections::BTreeMap, fmt, str::FromStr};

use tracing::debug;

use crate::{errors::GitError, hash::ObjectHash};

/// Tree of the empty directory, which git knows without it being stored.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unmerged,
    Unknown,
    Untracked,
}

impl FileStatus {
    /// Status field of a raw diff line. Renames and copies carry a score (`R100`).
    fn from_raw(field: &str) -> Result<Self, GitError> {
        let status = match field.chars().next() {
            Some('A') => FileStatus::Added,
            Some('C') => FileStatus::Copied,
            Some('D') => FileStatus::Deleted,
            Some('M') => FileStatus::Modified,
            Some('R') => FileStatus::Renamed,
            Some('T') => FileStatus::TypeChanged,
            Some('U') => FileStatus::Unmerged,
            Some('X') => FileStatus::Unknown,
            _ => {
                return Err(GitError::InvalidGitOutput(format!(
                    "unknown diff status `{field}`"
                )));
            }
        };
        Ok(status)
    }

    /// One-letter form, `?` for untracked files as in `git status --short`.
    pub fn letter(&self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Copied => 'C',
            FileStatus::Deleted => 'D',
            FileStatus::Modified => 'M',
            FileStatus::Renamed => 'R',
            FileStatus::TypeChanged => 'T',
            FileStatus::Unmerged => 'U',
            FileStatus::Unknown => 'X',
            FileStatus::Untracked => '?',
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// State of one path. For diff entries the "repo" side is the source (tree or index)
/// and the "index" side the destination; an all-zero id or `000000` mode is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFile {
    pub path: String,
    pub index_id: Option<ObjectHash>,
    pub repo_id: Option<ObjectHash>,
    pub index_mode: Option<String>,
    pub repo_mode: Option<String>,
    /// `None` for a tracked file without changes.
    pub status: Option<FileStatus>,
    pub staged: bool,
}

impl StatusFile {
    pub fn has_changed(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_staged(&self) -> bool {
        self.staged
    }

    pub fn changes_staged(&self) -> bool {
        self.has_changed() && self.staged
    }

    pub fn changes_unstaged(&self) -> bool {
        self.has_changed() && !self.staged
    }

    pub fn is_added(&self) -> bool {
        self.status == Some(FileStatus::Added)
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Some(FileStatus::Deleted)
    }

    pub fn is_modified(&self) -> bool {
        self.status == Some(FileStatus::Modified)
    }

    pub fn is_untracked(&self) -> bool {
        self.status == Some(FileStatus::Untracked)
    }
}

/// Per-path status of a work tree, ordered by path.
#[derive(Debug, Default)]
pub struct Status {
    by_path: BTreeMap<String, Vec<StatusFile>>,
}

impl Status {
    /// Build the status from the outputs listed in the module docs.
    pub fn from_outputs(
        ls_files: &str,
        untracked: &str,
        diff_files: &str,
        diff_index: &str,
    ) -> Result<Self, GitError> {
        let mut status = Status::default();
        for file in parse_ls_files(ls_files)? {
            status.add(file);
        }
        for file in parse_untracked(untracked) {
            status.add(file);
        }
        for file in parse_raw_diff(diff_files)? {
            status.add(file);
        }

        for mut file in parse_raw_diff(diff_index)? {
            let (index_moved, deleted_in_tree) =
                match status.by_path.get(&file.path).and_then(|e| e.last()) {
                    Some(last) => (last.repo_id != file.repo_id, last.is_deleted()),
                    None => (false, false),
                };
            // staged deletions carry no index id
            if file.index_id.is_some() || file.is_deleted() || index_moved {
                file.staged = true;
            }
            // already reported by diff-files
            if deleted_in_tree {
                continue;
            }
            status.add(file);
        }
        debug!("status of {} paths", status.by_path.len());
        Ok(status)
    }

    /// The new entry replaces the path's last one, unless that one already records a
    /// change and the new one is staged: then both are kept.
    fn add(&mut self, file: StatusFile) {
        let entries = self.by_path.entry(file.path.clone()).or_default();
        match entries.last_mut() {
            Some(last) if !(last.has_changed() && file.staged) => *last = file,
            _ => entries.push(file),
        }
    }

    /// Every entry, unchanged tracked files included.
    pub fn files(&self) -> impl Iterator<Item = &StatusFile> {
        self.by_path.values().flatten()
    }

    pub fn for_file(&self, path: &str) -> &[StatusFile] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn staged_files(&self) -> Vec<&StatusFile> {
        self.files().filter(|f| f.changes_staged()).collect()
    }

    pub fn unstaged_files(&self) -> Vec<&StatusFile> {
        self.files().filter(|f| f.changes_unstaged()).collect()
    }

    pub fn is_clean(&self) -> bool {
        !self.files().any(StatusFile::has_changed)
    }
}

/// `<mode> <id> <stage>\t<path>`
fn parse_ls_files(output: &str) -> Result<Vec<StatusFile>, GitError> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (info, path) = split_path(line)?;
            let fields: Vec<_> = info.split(' ').collect();
            let [mode, id, _stage] = fields[..] else {
                return Err(malformed(line));
            };
            Ok(StatusFile {
                path: path.to_string(),
                index_id: non_zero_id(id)?,
                index_mode: non_zero_mode(mode),
                ..StatusFile::default()
            })
        })
        .collect()
}

fn parse_untracked(output: &str) -> Vec<StatusFile> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|path| StatusFile {
            path: path.to_string(),
            status: Some(FileStatus::Untracked),
            ..StatusFile::default()
        })
        .collect()
}

/// `:<src mode> <dst mode> <src id> <dst id> <status>\t<path>`; a second path after a
/// rename or copy names the destination.
fn parse_raw_diff(output: &str) -> Result<Vec<StatusFile>, GitError> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (info, paths) = split_path(line)?;
            let info = info.strip_prefix(':').ok_or_else(|| malformed(line))?;
            let fields: Vec<_> = info.split(' ').collect();
            let [mode_src, mode_dst, id_src, id_dst, status] = fields[..] else {
                return Err(malformed(line));
            };
            let path = paths.rsplit('\t').next().unwrap_or(paths);
            Ok(StatusFile {
                path: path.to_string(),
                index_id: non_zero_id(id_dst)?,
                repo_id: non_zero_id(id_src)?,
                index_mode: non_zero_mode(mode_dst),
                repo_mode: non_zero_mode(mode_src),
                status: Some(FileStatus::from_raw(status)?),
                staged: false,
            })
        })
        .collect()
}

fn split_path(line: &str) -> Result<(&str, &str), GitError> {
    line.split_once('\t').ok_or_else(|| malformed(line))
}

fn non_zero_id(text: &str) -> Result<Option<ObjectHash>, GitError> {
    if text.bytes().all(|b| b == b'0') {
        return Ok(None);
    }
    ObjectHash::from_str(text)
        .map(Some)
        .map_err(|_| GitError::InvalidGitOutput(format!("bad object id `{text}`")))
}

fn non_zero_mode(text: &str) -> Option<String> {
    (text != "000000").then(|| text.to_string())
}

fn malformed(line: &str) -> GitError {
    GitError::InvalidGitOutput(format!("unexpected status line `{line}`"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{FileStatus, Status};
    use crate::{errors::GitError, hash::ObjectHash};

    // "foo\nbar", "foo\nbar\nbaz\n", "foo\nbar\n" and "foo" as blobs
    const FOO_BAR: &str = "a907ec3f431eeb6b1c75799a7e4ba73ca6dc627a";
    const FOO_BAR_BAZ: &str = "86e041dad66a19b9518b83b78865015f62662f75";
    const FOO_BAR_NL: &str = "3bd1f0e29744a1f32b08d5650e62e2e62afb177c";
    const FOO: &str = "19102815663d23f8b75a47e7a01965dcdc96468c";
    const ZERO: &str = "0000000000000000000000000000000000000000";

    fn id(hex: &str) -> Option<ObjectHash> {
        Some(ObjectHash::from_str(hex).unwrap())
    }

    #[test]
    fn untracked_file() {
        let status = Status::from_outputs("", "untracked.txt\n", "", "").unwrap();
        let files = status.for_file("untracked.txt");
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert!(file.is_untracked());
        assert!(file.changes_unstaged());
        assert_eq!((file.index_id, file.repo_id), (None, None));
        assert_eq!(file.status.map(|s| s.letter()), Some('?'));
        assert!(!status.is_clean());
    }

    #[test]
    fn modified_in_work_tree_only() {
        let line = format!(":100644 100644 {FOO_BAR} {ZERO} M\tmodified.txt\n");
        let status = Status::from_outputs(
            &format!("100644 {FOO_BAR} 0\tmodified.txt\n"),
            "",
            &line,
            &line,
        )
        .unwrap();
        let files = status.for_file("modified.txt");
        assert_eq!(files.len(), 1);
        assert!(files[0].is_modified());
        assert!(!files[0].is_staged());
        assert_eq!(files[0].repo_id, id(FOO_BAR));
        assert_eq!(files[0].index_id, None);
        assert_eq!(files[0].index_mode.as_deref(), Some("100644"));
        assert!(status.staged_files().is_empty());
    }

    #[test]
    fn staged_then_modified_again_has_two_entries() {
        let status = Status::from_outputs(
            &format!("100644 {FOO_BAR_NL} 0\tremodified.txt\n"),
            "",
            &format!(":100644 100644 {FOO_BAR_NL} {ZERO} M\tremodified.txt\n"),
            &format!(":100644 100644 {FOO} {ZERO} M\tremodified.txt\n"),
        )
        .unwrap();
        let files = status.for_file("remodified.txt");
        assert_eq!(files.len(), 2);
        assert!(files[0].changes_unstaged());
        assert_eq!(files[0].repo_id, id(FOO_BAR_NL));
        assert!(files[1].changes_staged());
        assert_eq!(files[1].repo_id, id(FOO));
        assert_eq!(status.files().count(), 2);
        assert_eq!(status.staged_files().len(), 1);
        assert_eq!(status.unstaged_files().len(), 1);
    }

    #[test]
    fn staged_changes() {
        // updated and staged
        let status = Status::from_outputs(
            &format!("100644 {FOO_BAR_BAZ} 0\tupdated.txt\n"),
            "",
            "",
            &format!(":100644 100644 {FOO_BAR} {FOO_BAR_BAZ} M\tupdated.txt\n"),
        )
        .unwrap();
        let files = status.for_file("updated.txt");
        assert_eq!(files.len(), 1);
        assert!(files[0].changes_staged());
        assert_eq!(files[0].index_id, id(FOO_BAR_BAZ));

        // new file added to the index
        let status = Status::from_outputs(
            &format!("100644 {FOO_BAR_BAZ} 0\tnewly_added.txt\n"),
            "",
            "",
            &format!(":000000 100644 {ZERO} {FOO_BAR_BAZ} A\tnewly_added.txt\n"),
        )
        .unwrap();
        let file = &status.for_file("newly_added.txt")[0];
        assert!(file.is_added());
        assert!(file.changes_staged());
        assert_eq!((file.repo_id, file.repo_mode.as_deref()), (None, None));

        // removed with `git rm`
        let status = Status::from_outputs(
            "",
            "",
            "",
            &format!(":100644 000000 {FOO_BAR_BAZ} {ZERO} D\tremoved.txt\n"),
        )
        .unwrap();
        let files = status.for_file("removed.txt");
        assert_eq!(files.len(), 1);
        assert!(files[0].is_deleted());
        assert!(files[0].changes_staged());
    }

    #[test]
    fn deleted_from_work_tree_is_unstaged() {
        let line = format!(":100644 000000 {FOO_BAR_BAZ} {ZERO} D\tdeleted.txt\n");
        let status = Status::from_outputs(
            &format!("100644 {FOO_BAR_BAZ} 0\tdeleted.txt\n"),
            "",
            &line,
            &line,
        )
        .unwrap();
        let files = status.for_file("deleted.txt");
        assert_eq!(files.len(), 1);
        assert!(files[0].is_deleted());
        assert!(files[0].changes_unstaged());
        assert_eq!(files[0].index_mode, None);
    }

    #[test]
    fn unchanged_files_are_listed_but_clean() {
        let status = Status::from_outputs(
            &format!("100644 {FOO} 0\tb.txt\n100755 {FOO_BAR} 0\ta.sh\n"),
            "",
            "",
            "",
        )
        .unwrap();
        let paths: Vec<_> = status.files().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["a.sh", "b.txt"]);
        assert!(status.is_clean());
        assert!(status.for_file("missing").is_empty());
        assert_eq!(status.for_file("a.sh")[0].index_mode.as_deref(), Some("100755"));
    }

    #[test]
    fn renames_take_the_destination_path() {
        let status = Status::from_outputs(
            "",
            "",
            "",
            &format!(":100644 100644 {FOO} {FOO} R100\told.txt\tnew.txt\n"),
        )
        .unwrap();
        let file = &status.for_file("new.txt")[0];
        assert_eq!(file.status, Some(FileStatus::Renamed));
        assert!(file.is_staged());
    }

    #[test]
    fn malformed_output() {
        for diff in [
            "no tab here",
            "100644 100644 a b M\tmissing-colon",
            ":100644 100644 zz zz M\tbad-ids",
            &format!(":100644 100644 {FOO} {FOO} Q\tbad-status"),
        ] {
            assert!(
                matches!(
                    Status::from_outputs("", "", diff, ""),
                    Err(GitError::InvalidGitOutput(_))
                ),
                "{diff}"
            );
        }
        assert!(matches!(
            Status::from_outputs("100644 only-two\tx", "", "", ""),
            Err(GitError::InvalidGitOutput(_))
        ));
    }
}

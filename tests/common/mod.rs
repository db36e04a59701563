//! Fixture builders shared by the integration tests: a bare-bones `.git` directory with
//! loose objects and refs, and a pack writer producing `.pack` files with v1 or v2 indices.
#![allow(dead_code)]

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use flate2::{Compression, write::ZlibEncoder};
use git_odb::{ObjectHash, ObjectType, Repository};
use tempfile::TempDir;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("deflate");
    encoder.finish().expect("deflate")
}

/// `<type> <size>\0<payload>`, the hashed and stored form of an object.
pub fn framed(object_type: ObjectType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(object_type.to_bytes());
    out.extend_from_slice(format!(" {}\0", data.len()).as_bytes());
    out.extend_from_slice(data);
    out
}

pub fn tree_payload(entries: &[(&str, &str, ObjectHash)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (mode, name, id) in entries {
        out.extend_from_slice(format!("{mode} {name}\0").as_bytes());
        out.extend_from_slice(&id.0);
    }
    out
}

pub fn commit_payload(
    tree: &ObjectHash,
    parents: &[ObjectHash],
    timestamp: i64,
    message: &str,
) -> Vec<u8> {
    let mut text = format!("tree {tree}\n");
    for parent in parents {
        text.push_str(&format!("parent {parent}\n"));
    }
    text.push_str(&format!("author A U Thor <author@example.com> {timestamp} +0000\n"));
    text.push_str(&format!("committer C O Mitter <committer@example.com> {timestamp} +0000\n"));
    text.push_str(&format!("\n{message}\n"));
    text.into_bytes()
}

/// A `.git` directory inside a temporary work tree.
pub struct FixtureRepo {
    pub dir: TempDir,
}

impl FixtureRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let git_dir = dir.path().join(".git");
        for sub in ["objects/pack", "refs/heads", "refs/tags"] {
            fs::create_dir_all(git_dir.join(sub)).expect("create git dir");
        }
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").expect("write HEAD");
        FixtureRepo { dir }
    }

    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.dir.path().join(".git")
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.git_dir().join("objects/pack")
    }

    pub fn open(&self) -> Repository {
        Repository::open(self.work_dir()).expect("open fixture repository")
    }

    pub fn write_loose(&self, object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let id = ObjectHash::from_type_and_data(object_type, data);
        self.write_loose_raw(&id, &deflate(&framed(object_type, data)));
        id
    }

    /// Store arbitrary compressed bytes under `id`.
    pub fn write_loose_raw(&self, id: &ObjectHash, compressed: &[u8]) {
        let hex = id.to_string();
        let dir = self.git_dir().join("objects").join(&hex[..2]);
        fs::create_dir_all(&dir).expect("create fan-out dir");
        fs::write(dir.join(&hex[2..]), compressed).expect("write loose object");
    }

    pub fn write_ref(&self, full_name: &str, id: &ObjectHash) {
        let path = self.git_dir().join(full_name);
        fs::create_dir_all(path.parent().expect("ref parent")).expect("create ref dir");
        fs::write(path, format!("{id}\n")).expect("write ref");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdxVersion {
    V1,
    V2,
}

enum RecordKind {
    Whole,
    OfsDelta(usize),
    RefDelta(ObjectHash),
}

struct PackRecord {
    id: ObjectHash,
    object_type: ObjectType,
    data: Vec<u8>,
    kind: RecordKind,
    /// Bytes that are deflated into the record: the object or its delta.
    payload: Vec<u8>,
}

/// Builds a pack in memory. Delta bases must already be part of the pack.
#[derive(Default)]
pub struct PackBuilder {
    records: Vec<PackRecord>,
}

impl PackBuilder {
    pub fn new() -> Self {
        PackBuilder::default()
    }

    pub fn whole(&mut self, object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let id = ObjectHash::from_type_and_data(object_type, data);
        self.records.push(PackRecord {
            id,
            object_type,
            data: data.to_vec(),
            kind: RecordKind::Whole,
            payload: data.to_vec(),
        });
        id
    }

    pub fn ofs_delta(&mut self, base: &ObjectHash, data: &[u8]) -> ObjectHash {
        let position = self.position_of(base);
        self.push_delta(position, RecordKind::OfsDelta(position), data)
    }

    pub fn ref_delta(&mut self, base: &ObjectHash, data: &[u8]) -> ObjectHash {
        let position = self.position_of(base);
        self.push_delta(position, RecordKind::RefDelta(*base), data)
    }

    pub fn ids(&self) -> Vec<ObjectHash> {
        self.records.iter().map(|record| record.id).collect()
    }

    fn position_of(&self, id: &ObjectHash) -> usize {
        self.records
            .iter()
            .position(|record| record.id == *id)
            .expect("delta base must be in the pack")
    }

    fn push_delta(&mut self, base: usize, kind: RecordKind, data: &[u8]) -> ObjectHash {
        let object_type = self.records[base].object_type;
        let payload = make_delta(&self.records[base].data, data);
        let id = ObjectHash::from_type_and_data(object_type, data);
        self.records.push(PackRecord {
            id,
            object_type,
            data: data.to_vec(),
            kind,
            payload,
        });
        id
    }

    /// Write `<name>.pack` and `<name>.idx` into `dir`, returning the index path.
    pub fn write(&self, dir: &Path, name: &str, version: IdxVersion) -> PathBuf {
        let mut pack = Vec::new();
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&(self.records.len() as u32).to_be_bytes());

        let mut offsets = Vec::with_capacity(self.records.len());
        let mut entries = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let offset = pack.len();
            let type_number = match record.kind {
                RecordKind::Whole => record.object_type.to_u8(),
                RecordKind::OfsDelta(_) => 6,
                RecordKind::RefDelta(_) => 7,
            };
            pack.extend(record_header(type_number, record.payload.len()));
            match &record.kind {
                RecordKind::Whole => {}
                RecordKind::OfsDelta(base) => {
                    pack.extend(ofs_distance((offset - offsets[*base]) as u64));
                }
                RecordKind::RefDelta(base) => pack.extend_from_slice(&base.0),
            }
            pack.extend(deflate(&record.payload));
            let crc = crc32fast::hash(&pack[offset..]);
            offsets.push(offset);
            entries.push((record.id, offset as u64, crc));
        }
        let pack_sum = ObjectHash::new(&pack);
        pack.extend_from_slice(&pack_sum.0);

        entries.sort_by_key(|(id, _, _)| *id);
        let idx = match version {
            IdxVersion::V1 => index_v1(&entries, &pack_sum),
            IdxVersion::V2 => index_v2(&entries, &pack_sum),
        };

        fs::create_dir_all(dir).expect("create pack dir");
        fs::write(dir.join(format!("{name}.pack")), pack).expect("write pack");
        let idx_path = dir.join(format!("{name}.idx"));
        fs::write(&idx_path, idx).expect("write idx");
        idx_path
    }
}

fn fanout(entries: &[(ObjectHash, u64, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1024);
    for byte in 0..=255u8 {
        let count = entries.iter().filter(|(id, _, _)| id.0[0] <= byte).count() as u32;
        out.extend_from_slice(&count.to_be_bytes());
    }
    out
}

fn finish_index(mut idx: Vec<u8>, pack_sum: &ObjectHash) -> Vec<u8> {
    idx.extend_from_slice(&pack_sum.0);
    let idx_sum = ObjectHash::new(&idx);
    idx.extend_from_slice(&idx_sum.0);
    idx
}

fn index_v1(entries: &[(ObjectHash, u64, u32)], pack_sum: &ObjectHash) -> Vec<u8> {
    let mut idx = fanout(entries);
    for (id, offset, _) in entries {
        idx.extend_from_slice(&(*offset as u32).to_be_bytes());
        idx.extend_from_slice(&id.0);
    }
    finish_index(idx, pack_sum)
}

fn index_v2(entries: &[(ObjectHash, u64, u32)], pack_sum: &ObjectHash) -> Vec<u8> {
    let mut idx = vec![0xFF, b't', b'O', b'c', 0, 0, 0, 2];
    idx.extend(fanout(entries));
    for (id, _, _) in entries {
        idx.extend_from_slice(&id.0);
    }
    for (_, _, crc) in entries {
        idx.extend_from_slice(&crc.to_be_bytes());
    }
    for (_, offset, _) in entries {
        idx.extend_from_slice(&(*offset as u32).to_be_bytes());
    }
    finish_index(idx, pack_sum)
}

fn record_header(type_number: u8, mut size: usize) -> Vec<u8> {
    let mut byte = (type_number << 4) | (size & 0x0F) as u8;
    size >>= 4;
    let mut out = Vec::new();
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7F) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

fn ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7F) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        out.push(0x80 | (distance & 0x7F) as u8);
        distance >>= 7;
    }
    out.reverse();
    out
}

fn varint(mut value: usize, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn copy_op(offset: usize, size: usize, out: &mut Vec<u8>) {
    let mut op = 0x80u8;
    let mut args = Vec::new();
    for i in 0..4 {
        let byte = ((offset >> (8 * i)) & 0xFF) as u8;
        if byte != 0 {
            op |= 1 << i;
            args.push(byte);
        }
    }
    for i in 0..3 {
        let byte = ((size >> (8 * i)) & 0xFF) as u8;
        if byte != 0 {
            op |= 1 << (4 + i);
            args.push(byte);
        }
    }
    out.push(op);
    out.extend(args);
}

/// A delta that copies the common prefix and suffix of `base` and inserts the middle.
pub fn make_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    varint(base.len(), &mut out);
    varint(target.len(), &mut out);

    let prefix = base
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count()
        .min(0xFF_FFFF);
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
        .min(0xFF_FFFF);

    if prefix > 0 {
        copy_op(0, prefix, &mut out);
    }
    for chunk in target[prefix..target.len() - suffix].chunks(0x7F) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    if suffix > 0 {
        copy_op(base.len() - suffix, suffix, &mut out);
    }
    out
}

/// Runs the real `git` binary, or reports that it is not installed.
pub struct Git {
    pub dir: PathBuf,
}

impl Git {
    pub fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    pub fn run(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
            .args(args)
            .current_dir(&self.dir)
            .env("GIT_AUTHOR_NAME", "A U Thor")
            .env("GIT_AUTHOR_EMAIL", "author@example.com")
            .env("GIT_AUTHOR_DATE", "1234567890 +0100")
            .env("GIT_COMMITTER_NAME", "C O Mitter")
            .env("GIT_COMMITTER_EMAIL", "committer@example.com")
            .env("GIT_COMMITTER_DATE", "1234567890 +0100")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("HOME", &self.dir)
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn run_bytes(&self, args: &[&str]) -> Vec<u8> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .expect("spawn git");
        assert!(output.status.success(), "git {args:?} failed");
        output.stdout
    }
}

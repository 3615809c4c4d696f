//! Tier-partitioned append-only sink (C3).
//!
//! One gzip `Store` per tier, lazily opened and rotated by line count.
//! Grounded in `original_source/TeamComp/persist/store.py`'s `Store`/`TierStore`,
//! with the gzip writer itself drawn from the teacher's own compressed-writer
//! usage (`src/observer.rs`, `src/backup.rs`), generalized from zlib to gzip.
//!
//! Not thread-safe on its own (spec.md §5): the engine is responsible for
//! serializing calls to `TierStore::store` under its user-function lock.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A single tier's rotating gzip file family.
pub struct Store {
    dir: PathBuf,
    prefix: String,
    postfix: String,
    matches_per_file: usize,
    writer: Option<GzEncoder<File>>,
    stored: usize,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, matches_per_file: usize, prefix: &str, postfix: &str) -> Self {
        Store {
            dir: dir.into(),
            prefix: prefix.to_string(),
            postfix: postfix.to_string(),
            matches_per_file,
            writer: None,
            stored: 0,
        }
    }

    fn generate_file_path(&self) -> PathBuf {
        // ISO-8601 with `:` replaced by `-` so the name is filesystem-safe
        // on every platform (spec.md §6). A sequence number is appended so
        // two rotations within the same clock tick never collide.
        let stamp = Local::now().to_rfc3339().replace(':', "-");
        let seq = FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_{}-{}_{}_.json.gz", self.prefix, stamp, seq, self.postfix);
        self.dir.join(name)
    }

    fn open(&mut self, path: &Path) -> io::Result<()> {
        self.close()?;
        let file = File::create(path)?;
        self.writer = Some(GzEncoder::new(file, Compression::default()));
        self.stored = 0;
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.finish()?;
        }
        self.stored = 0;
        Ok(())
    }

    /// Append one record, rotating the file if the cap has been hit and
    /// separating records with `\n` (no trailing newline is required).
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        if self.matches_per_file > 0 && self.stored >= self.matches_per_file {
            self.close()?;
        }
        if self.writer.is_none() {
            let path = self.generate_file_path();
            self.open(&path)?;
        } else if self.stored != 0 {
            self.writer.as_mut().unwrap().write_all(b"\n")?;
        }
        self.writer.as_mut().unwrap().write_all(text.as_bytes())?;
        self.stored += 1;
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One `Store` per tier name, instantiated lazily.
pub struct TierStore {
    dir: PathBuf,
    matches_per_file: usize,
    base_file_name: String,
    stores: HashMap<String, Store>,
}

impl TierStore {
    pub fn new(dir: impl Into<PathBuf>, matches_per_file: usize, base_file_name: impl Into<String>) -> Self {
        TierStore {
            dir: dir.into(),
            matches_per_file,
            base_file_name: base_file_name.into(),
            stores: HashMap::new(),
        }
    }

    pub fn store(&mut self, text: &str, tier: &str) -> io::Result<()> {
        let store = self.stores.entry(tier.to_string()).or_insert_with(|| {
            Store::new(&self.dir, self.matches_per_file, &self.base_file_name, tier)
        });
        store.write(text)
    }

    pub fn close(&mut self) -> io::Result<()> {
        for store in self.stores.values_mut() {
            store.close()?;
        }
        Ok(())
    }
}

impl Drop for TierStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn read_all_gz_files(dir: &Path) -> Vec<String> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let mut decoder = GzDecoder::new(File::open(entry.path()).unwrap());
            let mut text = String::new();
            decoder.read_to_string(&mut text).unwrap();
            out.push(text);
        }
        out
    }

    #[test]
    fn write_joins_records_with_newline_no_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new(dir.path(), 0, "prefix", "gold");
        store.write("{\"a\":1}").unwrap();
        store.write("{\"a\":2}").unwrap();
        store.close().unwrap();

        let contents = read_all_gz_files(dir.path());
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0], "{\"a\":1}\n{\"a\":2}");
    }

    #[test]
    fn rotates_after_cap_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new(dir.path(), 2, "prefix", "gold");
        for i in 0..5 {
            store.write(&format!("{{\"a\":{i}}}")).unwrap();
        }
        store.close().unwrap();

        let contents = read_all_gz_files(dir.path());
        // 5 records at 2-per-file rotate into 3 files (2, 2, 1).
        assert_eq!(contents.len(), 3);
        let total_lines: usize = contents.iter().map(|c| c.lines().count()).sum();
        assert_eq!(total_lines, 5);
    }

    #[test]
    fn tier_store_partitions_by_tier() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TierStore::new(dir.path(), 0, "prefix");
        store.store("{\"a\":1}", "gold").unwrap();
        store.store("{\"a\":2}", "silver").unwrap();
        store.close().unwrap();

        let contents = read_all_gz_files(dir.path());
        assert_eq!(contents.len(), 2);
    }
}

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::apt::DownloadListing;

/// Provenance of one `.deb` that was downloaded and checksummed remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub name: String,
    pub origin: String,
    pub section: String,
    pub version: String,
    pub architecture: String,
    /// Full `md5sum` output line: `<digest>  <path>`.
    pub checksum: String,
}

impl DownloadRecord {
    pub fn new(listing: DownloadListing, checksum: impl Into<String>) -> Self {
        Self {
            name: listing.name,
            origin: listing.origin,
            section: listing.section,
            version: listing.version,
            architecture: listing.architecture,
            checksum: checksum.into(),
        }
    }

    pub fn digest(&self) -> &str {
        self.checksum.split_whitespace().next().unwrap_or("")
    }
}

impl fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {} | {}",
            self.origin, self.section, self.version, self.architecture, self.checksum
        )
    }
}

/// What was actually fetched during a run, keyed by `name=version`.
///
/// Keeps insertion order. Recording an existing key replaces its record but
/// keeps the key's original position.
#[derive(Debug, Default, Clone)]
pub struct ArtifactLedger {
    entries: Vec<(String, DownloadRecord)>,
    index: HashMap<String, usize>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, record: DownloadRecord) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = record,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, record));
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&DownloadRecord> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DownloadRecord)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    /// Write one record per line in insertion order. No header, no footer.
    pub fn write_to<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for (_, record) in self.iter() {
            writeln!(out, "{}", record)?;
        }
        out.flush()
    }

    pub fn serialize(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("creating ledger file {}", path.display()))?;
        self.write_to(std::io::BufWriter::new(file))
            .with_context(|| format!("writing ledger file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, digest: &str) -> DownloadRecord {
        DownloadRecord {
            name: name.to_string(),
            origin: "http://archive.ubuntu.com/ubuntu".to_string(),
            section: "focal/main".to_string(),
            version: version.to_string(),
            architecture: "amd64".to_string(),
            checksum: format!("{digest}  depends/{name}_{version}_amd64.deb"),
        }
    }

    #[test]
    fn test_record_line_format() {
        let r = record("curl", "7.68.0-1ubuntu2", "abc123");
        assert_eq!(
            r.to_string(),
            "http://archive.ubuntu.com/ubuntu | focal/main | 7.68.0-1ubuntu2 | amd64 | abc123  depends/curl_7.68.0-1ubuntu2_amd64.deb"
        );
        assert_eq!(r.digest(), "abc123");
    }

    #[test]
    fn test_rerecord_overwrites_in_place() {
        let mut ledger = ArtifactLedger::new();
        ledger.record("a=1", record("a", "1", "old"));
        ledger.record("b=2", record("b", "2", "bbb"));
        ledger.record("a=1", record("a", "1", "new"));

        assert_eq!(ledger.len(), 2);
        let keys: Vec<&str> = ledger.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a=1", "b=2"]);
        assert_eq!(ledger.get("a=1").unwrap().digest(), "new");
        assert!(ledger.contains("b=2"));
        assert!(!ledger.contains("c=3"));
    }

    #[test]
    fn test_serialize_writes_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depends_ubuntu20.txt");

        let mut ledger = ArtifactLedger::new();
        ledger.record("zlib1g=1", record("zlib1g", "1", "z"));
        ledger.record("curl=2", record("curl", "2", "c"));
        ledger.serialize(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("z  depends/zlib1g_1_amd64.deb"));
        assert!(lines[1].ends_with("c  depends/curl_2_amd64.deb"));
    }

    #[test]
    fn test_empty_ledger_serializes_to_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        ArtifactLedger::new().serialize(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}

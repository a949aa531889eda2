// src/ct_log/cache.rs
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::client::CtLogClient;
use super::types::LogEntry;

/// Append-only local copy of a CT log.
///
/// One JSON-encoded [`LogEntry`] per line; line N holds log position N.
pub struct EntriesCache {
    path: PathBuf,
}

impl EntriesCache {
    /// Open the cache file, creating it if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open cache file {:?}", path))?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries cached locally
    pub fn count(&self) -> Result<u64> {
        Ok(self.complete_lines()?.0)
    }

    /// Count of newline-terminated lines and the byte length they cover.
    ///
    /// A trailing line without newline is an interrupted write and is not
    /// included in either.
    fn complete_lines(&self) -> Result<(u64, u64)> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open cache file {:?}", self.path))?;
        let mut reader = BufReader::new(file);

        let mut count = 0;
        let mut length = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .context("Failed to read cache file")?;
            if read == 0 {
                break;
            }
            if buf.ends_with(b"\n") {
                count += 1;
                length += read as u64;
            }
        }

        Ok((count, length))
    }

    /// Append entries to the end of the cache.
    ///
    /// A partial line left by an interrupted write is cut off first so the
    /// first new entry lands on its own line.
    pub fn append(&self, entries: &[LogEntry]) -> Result<()> {
        let (_, length) = self.complete_lines()?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open cache file {:?}", self.path))?;

        let file_len = file
            .metadata()
            .context("Failed to stat cache file")?
            .len();
        if file_len > length {
            debug!(
                "Dropping {} bytes of interrupted write from {:?}",
                file_len - length,
                self.path
            );
            file.set_len(length).context("Failed to truncate cache file")?;
        }
        file.seek(SeekFrom::Start(length))
            .context("Failed to seek cache file")?;

        let mut writer = BufWriter::new(file);

        for entry in entries {
            serde_json::to_writer(&mut writer, entry).context("Failed to encode log entry")?;
            writer.write_all(b"\n").context("Failed to write cache file")?;
        }

        writer.flush().context("Failed to flush cache file")?;
        Ok(())
    }

    /// Download entries `[count, target_size)` from the log and append them.
    ///
    /// Requests at most `batch_size` entries at a time and advances by however
    /// many the log actually returned. Returns the number of entries added.
    pub async fn update(
        &self,
        client: &CtLogClient,
        target_size: u64,
        batch_size: u64,
    ) -> Result<u64> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be greater than 0");
        }

        let start = self.count()?;
        let mut next = start;

        while next < target_size {
            let end = std::cmp::min(next + batch_size, target_size) - 1;
            let entries = client
                .get_entries(next, end)
                .await
                .with_context(|| format!("Failed to download entries {}-{}", next, end))?;

            if entries.is_empty() {
                anyhow::bail!("Log returned no entries for range {}-{}", next, end);
            }

            // Never write past the requested range
            let wanted = (end - next + 1) as usize;
            let take = std::cmp::min(entries.len(), wanted);
            self.append(&entries[..take])?;
            next += take as u64;

            debug!("Cached entries up to {} of {}", next, target_size);
        }

        let added = next - start;
        if added > 0 {
            info!("Downloaded {} new entries into {:?}", added, self.path);
        }

        Ok(added)
    }

    /// Iterate cached entries from position 0.
    ///
    /// Each call starts a fresh pass over the file.
    pub fn entries(&self) -> Result<CachedEntries> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open cache file {:?}", self.path))?;

        Ok(CachedEntries {
            reader: BufReader::new(file),
            buf: Vec::new(),
            position: 0,
            finished: false,
        })
    }
}

/// Lazy, position-ordered pass over an [`EntriesCache`]
pub struct CachedEntries {
    reader: BufReader<File>,
    buf: Vec<u8>,
    position: u64,
    finished: bool,
}

impl Iterator for CachedEntries {
    type Item = (u64, Result<LogEntry>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let position = self.position;
        self.buf.clear();
        let entry = match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => return None,
            // Bytes rather than str so invalid UTF-8 only spoils this line
            Ok(_) => serde_json::from_slice::<LogEntry>(&self.buf)
                .with_context(|| format!("Malformed cache entry at position {}", position)),
            Err(e) => {
                // The reader can't be trusted after an I/O error
                self.finished = true;
                Err(anyhow::Error::new(e)
                    .context(format!("Failed to read cache entry at position {}", position)))
            }
        };

        self.position += 1;
        Some((position, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ct_log::client::tests::TEST_LOG_KEY;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(n: u64) -> LogEntry {
        LogEntry {
            leaf_input: format!("leaf-{}", n),
            extra_data: String::new(),
        }
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.log");

        let cache = EntriesCache::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cache.count().unwrap(), 0);
        assert_eq!(cache.entries().unwrap().count(), 0);
    }

    #[test]
    fn test_append_and_iterate() {
        let temp_file = NamedTempFile::new().unwrap();
        let cache = EntriesCache::open(temp_file.path()).unwrap();

        cache.append(&[entry(0), entry(1)]).unwrap();
        cache.append(&[entry(2)]).unwrap();
        assert_eq!(cache.count().unwrap(), 3);

        let items: Vec<_> = cache.entries().unwrap().collect();
        assert_eq!(items.len(), 3);
        for (i, (position, result)) in items.into_iter().enumerate() {
            assert_eq!(position, i as u64);
            assert_eq!(result.unwrap(), entry(i as u64));
        }
    }

    #[test]
    fn test_entries_restart_from_beginning() {
        let temp_file = NamedTempFile::new().unwrap();
        let cache = EntriesCache::open(temp_file.path()).unwrap();
        cache.append(&[entry(0), entry(1)]).unwrap();

        let mut first = cache.entries().unwrap();
        assert_eq!(first.next().unwrap().0, 0);

        let second: Vec<_> = cache.entries().unwrap().map(|(p, _)| p).collect();
        assert_eq!(second, vec![0, 1]);
    }

    #[test]
    fn test_malformed_line_reported_and_skipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(0)).unwrap()).unwrap();
        writeln!(temp_file, "{{ not json").unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(2)).unwrap()).unwrap();
        temp_file.flush().unwrap();

        let cache = EntriesCache::open(temp_file.path()).unwrap();
        let items: Vec<_> = cache.entries().unwrap().collect();

        assert_eq!(items.len(), 3);
        assert!(items[0].1.is_ok());
        assert!(items[1].1.is_err());
        assert_eq!(items[2].0, 2);
        assert_eq!(items[2].1.as_ref().unwrap(), &entry(2));
    }

    #[test]
    fn test_count_ignores_partial_trailing_line() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(0)).unwrap()).unwrap();
        write!(temp_file, "{{\"leaf_in").unwrap();
        temp_file.flush().unwrap();

        let cache = EntriesCache::open(temp_file.path()).unwrap();
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_append_after_partial_trailing_line() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(0)).unwrap()).unwrap();
        write!(temp_file, "{{\"leaf_in").unwrap();
        temp_file.flush().unwrap();

        let cache = EntriesCache::open(temp_file.path()).unwrap();
        cache.append(&[entry(1)]).unwrap();

        assert_eq!(cache.count().unwrap(), 2);
        let items: Vec<_> = cache
            .entries()
            .unwrap()
            .map(|(p, e)| (p, e.unwrap()))
            .collect();
        assert_eq!(items, vec![(0, entry(0)), (1, entry(1))]);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_end_iteration() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(0)).unwrap()).unwrap();
        temp_file.write_all(b"\xff\xfe garbage\n").unwrap();
        writeln!(temp_file, "{}", serde_json::to_string(&entry(2)).unwrap()).unwrap();
        temp_file.flush().unwrap();

        let cache = EntriesCache::open(temp_file.path()).unwrap();
        let items: Vec<_> = cache.entries().unwrap().collect();

        assert_eq!(items.len(), 3);
        assert!(items[0].1.is_ok());
        assert!(items[1].1.is_err());
        assert_eq!(items[2].0, 2);
        assert_eq!(items[2].1.as_ref().unwrap(), &entry(2));
    }

    #[tokio::test]
    async fn test_update_downloads_missing_range() {
        let server = MockServer::start().await;

        // Log caps responses at 2 entries
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [entry(1), entry(2)]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", "3"))
            .and(query_param("end", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [entry(3)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let temp_file = NamedTempFile::new().unwrap();
        let cache = EntriesCache::open(temp_file.path()).unwrap();
        cache.append(&[entry(0)]).unwrap();

        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();
        let added = cache.update(&client, 4, 10).await.unwrap();

        assert_eq!(added, 3);
        assert_eq!(cache.count().unwrap(), 4);
        let leaves: Vec<_> = cache
            .entries()
            .unwrap()
            .map(|(_, e)| e.unwrap().leaf_input)
            .collect();
        assert_eq!(leaves, vec!["leaf-0", "leaf-1", "leaf-2", "leaf-3"]);
    }

    #[tokio::test]
    async fn test_update_noop_when_current() {
        let temp_file = NamedTempFile::new().unwrap();
        let cache = EntriesCache::open(temp_file.path()).unwrap();
        cache.append(&[entry(0)]).unwrap();

        // No server needed: nothing to fetch
        let client = CtLogClient::new("http://127.0.0.1:9", TEST_LOG_KEY).unwrap();
        assert_eq!(cache.update(&client, 1, 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_empty_page_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "entries": [] })),
            )
            .mount(&server)
            .await;

        let temp_file = NamedTempFile::new().unwrap();
        let cache = EntriesCache::open(temp_file.path()).unwrap();
        let client = CtLogClient::new(&server.uri(), TEST_LOG_KEY).unwrap();

        assert!(cache.update(&client, 5, 10).await.is_err());
        assert_eq!(cache.count().unwrap(), 0);
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record<E: Serialize>(writer: &mut impl Write, record: &E) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Largest payload accepted on replay; a longer length prefix means a torn write.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Read one entry. `None` at end of file, on a torn tail, or on a bad checksum.
fn decode_record<E: DeserializeOwned>(reader: &mut impl Read) -> io::Result<Option<E>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut payload)? || !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload).ok())
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only Write-Ahead Log of `E` records.
///
/// Format per entry: `[u32: len][bincode: E][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
pub struct Wal<E> {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    _record: PhantomData<fn() -> E>,
}

impl<E: Serialize + DeserializeOwned> Wal<E> {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            _record: PhantomData,
        })
    }

    /// Append and fsync one record. Production code goes through `WalHandle`.
    #[cfg(test)]
    pub fn append(&mut self, record: &E) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Append to the BufWriter without flushing or syncing.
    pub fn append_buffered(&mut self, record: &E) -> io::Result<()> {
        encode_record(&mut self.writer, record)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted records to a temp file and fsync.
    pub fn write_compact_file(path: &Path, records: &[E]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the WAL and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[E]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all valid records.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay(path: &Path) -> io::Result<Vec<E>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        while let Some(record) = decode_record(&mut reader)? {
            records.push(record);
        }
        Ok(records)
    }
}

// ── Group-commit writer ──────────────────────────────────

enum WalCommand<E> {
    Append {
        record: E,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<E>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending<E> = Vec<(E, oneshot::Sender<io::Result<()>>)>;

/// Cloneable front of a background task that owns the WAL file.
pub struct WalHandle<E> {
    tx: mpsc::Sender<WalCommand<E>>,
}

impl<E> Clone for WalHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> WalHandle<E>
where
    E: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Move the WAL into a writer task. Must be called inside a tokio runtime.
    pub fn spawn(wal: Wal<E>) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        Self { tx }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> WalCommand<E>) -> io::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(command(tx))
            .await
            .map_err(|_| io::Error::other("WAL writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("WAL writer dropped response"))
    }

    /// Durably append one record; resolves once its batch is fsynced.
    pub async fn append(&self, record: &E) -> io::Result<()> {
        let record = record.clone();
        self.request(|response| WalCommand::Append { record, response })
            .await?
    }

    /// Replace the log with `records`.
    pub async fn compact(&self, records: Vec<E>) -> io::Result<()> {
        self.request(|response| WalCommand::Compact { records, response })
            .await?
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.request(|response| WalCommand::AppendsSinceCompact { response })
            .await
            .unwrap_or(0)
    }
}

/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Single flush_sync for the whole batch.
/// 4. Respond to all senders.
async fn writer_loop<E>(mut wal: Wal<E>, mut rx: mpsc::Receiver<WalCommand<E>>)
where
    E: Serialize + DeserializeOwned,
{
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { record, response } => {
                let mut batch = vec![(record, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { record, response }) => {
                            batch.push((record, response));
                        }
                        Ok(other) => {
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch<E: Serialize + DeserializeOwned>(wal: &mut Wal<E>, batch: &mut Pending<E>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(path = %wal.path().display(), "WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch<E: Serialize + DeserializeOwned>(wal: &mut Wal<E>, batch: &Pending<E>) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (record, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(record) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append<E: Serialize + DeserializeOwned>(wal: &mut Wal<E>, cmd: WalCommand<E>) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

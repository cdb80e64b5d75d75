//! # Ledger State Executor
//!
//! Deterministic implementation of the `StateExecutor` port.
//!
//! ## State Root Chaining
//!
//! ```text
//! root(n) = keccak256( root(n-1) || index_be(n) || keccak256(tx_1) || ... || keccak256(tx_k) )
//! root(-1) = 0x00..00
//! ```
//!
//! Two replicas that apply the same blocks in the same order arrive at the
//! same root, which consensus cross-checks in the next block.
//!
//! ## Persistence
//!
//! Every applied block appends one JSON line to `journal.jsonl` in the data
//! directory. On open the journal is replayed to recover the next expected
//! index and the current root. A final line without its newline (crash
//! mid-write) is cut off. Any newline-terminated line that does not parse
//! refuses to open, including the last one.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use replication_engine::{ConstructionError, ExecutionError, StateExecutor};
use serde::{Deserialize, Serialize};
use shared_types::{keccak256, Block, StateDigest};
use tracing::{debug, info, warn};

use super::lock::DataDirLock;
use crate::container::StateConfig;

/// One line of the state journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub index: u64,
    pub round_received: u64,
    pub tx_count: usize,
    pub state_root: StateDigest,
}

/// Journaled, deterministic state executor.
#[derive(Debug)]
pub struct LedgerState {
    data_dir: PathBuf,
    journal: File,
    next_index: u64,
    state_root: StateDigest,
    sync_writes: bool,
    _lock: DataDirLock,
}

impl LedgerState {
    pub const JOURNAL_FILE: &'static str = "journal.jsonl";

    /// Open (or create) the state in `config.data_dir`.
    pub fn open(config: &StateConfig) -> Result<Self, ConstructionError> {
        let data_dir = config.data_dir.clone();

        if data_dir.exists() && !data_dir.is_dir() {
            return Err(ConstructionError::StateStorage(format!(
                "{} exists and is not a directory",
                data_dir.display()
            )));
        }
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            ConstructionError::StateStorage(format!(
                "cannot create {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        let lock = DataDirLock::acquire(&data_dir)
            .map_err(|e| ConstructionError::StateStorage(e.to_string()))?;

        let journal_path = data_dir.join(Self::JOURNAL_FILE);
        let (next_index, state_root) = replay_journal(&journal_path)?;

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(|e| {
                ConstructionError::StateStorage(format!(
                    "cannot open {}: {}",
                    journal_path.display(),
                    e
                ))
            })?;

        info!(
            data_dir = %data_dir.display(),
            next_index,
            state_root = %state_root,
            "State opened"
        );

        Ok(Self {
            data_dir,
            journal,
            next_index,
            state_root,
            sync_writes: config.sync_writes,
            _lock: lock,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Index the next committed block must carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Root after the last applied block.
    pub fn state_root(&self) -> StateDigest {
        self.state_root
    }

    fn append_record(&mut self, record: &JournalRecord) -> Result<(), ExecutionError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| ExecutionError::Storage(e.to_string()))?;
        line.push('\n');

        let committed_len = self
            .journal
            .metadata()
            .map_err(|e| ExecutionError::Storage(e.to_string()))?
            .len();

        let written = self.journal.write_all(line.as_bytes()).and_then(|()| {
            if self.sync_writes {
                self.journal.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Cut any partial line so the next record starts clean.
            if let Err(trunc) = self.journal.set_len(committed_len) {
                warn!(error = %trunc, "Failed to roll back partial journal record");
            }
            return Err(ExecutionError::Storage(e.to_string()));
        }
        Ok(())
    }
}

/// Root obtained by applying `block` on top of `prev`.
pub fn chain_root(prev: &StateDigest, block: &Block) -> StateDigest {
    let mut preimage = Vec::with_capacity(32 + 8 + 32 * block.tx_count());
    preimage.extend_from_slice(prev.as_bytes());
    preimage.extend_from_slice(&block.index().to_be_bytes());
    for tx in block.transactions() {
        preimage.extend_from_slice(&tx.hash());
    }
    StateDigest::new(keccak256(&preimage))
}

impl StateExecutor for LedgerState {
    fn process_block(&mut self, block: &Block) -> Result<StateDigest, ExecutionError> {
        if block.index() != self.next_index {
            return Err(ExecutionError::OutOfOrder {
                expected: self.next_index,
                actual: block.index(),
            });
        }

        let state_root = chain_root(&self.state_root, block);
        self.append_record(&JournalRecord {
            index: block.index(),
            round_received: block.round_received(),
            tx_count: block.tx_count(),
            state_root,
        })?;

        self.next_index += 1;
        self.state_root = state_root;
        debug!(block_index = block.index(), state_root = %state_root, "State advanced");
        Ok(state_root)
    }
}

/// Recover `(next_index, state_root)` from the journal, trimming a torn tail.
fn replay_journal(path: &Path) -> Result<(u64, StateDigest), ConstructionError> {
    let storage_err =
        |e: std::io::Error| ConstructionError::StateStorage(format!("{}: {}", path.display(), e));

    if !path.exists() {
        return Ok((0, StateDigest::zero()));
    }

    let file = File::open(path).map_err(storage_err)?;
    let mut reader = BufReader::new(file);
    let mut next_index = 0u64;
    let mut state_root = StateDigest::zero();
    let mut valid_len = 0u64;
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(storage_err)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let complete = line.ends_with('\n');
        match serde_json::from_str::<JournalRecord>(line.trim_end()) {
            Ok(record) if complete => {
                if record.index != next_index {
                    return Err(ConstructionError::StateStorage(format!(
                        "{}: line {} has index {}, expected {}",
                        path.display(),
                        line_no,
                        record.index,
                        next_index
                    )));
                }
                next_index += 1;
                state_root = record.state_root;
                valid_len += read as u64;
            }
            // Newline-terminated but unparseable: corruption, even at the tail.
            Err(_) if complete => {
                return Err(ConstructionError::StateStorage(format!(
                    "{}: corrupt record at line {}",
                    path.display(),
                    line_no
                )));
            }
            // No newline: read_line stopped at EOF mid-record.
            _ => {
                warn!(line = line_no, "Truncating torn journal tail");
                let file = OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(storage_err)?;
                file.set_len(valid_len).map_err(storage_err)?;
                break;
            }
        }
    }

    Ok((next_index, state_root))
}

//! Append-only, hash-chained journal of remote mutations.
//!
//! One JSON line per account creation, key creation, or key deletion. Each
//! entry carries the SHA-256 of its own canonical JSON (`entry_hash`) and the
//! hash of the entry before it (`prev_hash`), so edits to the file show up in
//! [`verify_chain`]. Key material is never written here.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::error::ProviderError;
use crate::models::account::Account;
use crate::util::fs as fleet_fs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub project: String,
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

/// Writer for one workspace's journal.
#[derive(Debug, Clone)]
pub struct Journal {
    log_path: PathBuf,
    lock_path: PathBuf,
    project: String,
    actor: String,
}

impl Journal {
    pub fn new(log_path: &Path, lock_path: &Path, project: &str, actor: &str) -> Self {
        Self {
            log_path: log_path.to_path_buf(),
            lock_path: lock_path.to_path_buf(),
            project: project.to_string(),
            actor: actor.to_string(),
        }
    }

    /// Record a mutation. Journal failures are reported and never abort the run.
    pub fn record(
        &self,
        action: &str,
        account: &Account,
        key_id: Option<&str>,
        error: Option<&ProviderError>,
    ) {
        if let Err(e) = self.append(action, account, key_id, error) {
            tracing::warn!(error = %format!("{:#}", e), "audit journal write failed");
        }
    }

    fn append(
        &self,
        action: &str,
        account: &Account,
        key_id: Option<&str>,
        error: Option<&ProviderError>,
    ) -> Result<()> {
        let _lock = FileLock::exclusive(&self.lock_path)?;
        let prev_hash = last_entry_hash(&self.log_path)?;

        let mut entry = AuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: self.actor.clone(),
            project: self.project.clone(),
            account: account.email.clone(),
            key_id: key_id.map(str::to_string),
            result: AuditResult {
                success: error.is_none(),
                error: error.map(|e| e.to_string()),
            },
            prev_hash,
            entry_hash: None,
        };
        entry.entry_hash = Some(compute_entry_hash(&entry)?);

        let line = serde_json::to_string(&entry).context("serialize audit entry")?;
        append_line(&self.log_path, &line)
    }
}

/// Operator name recorded in entries.
pub fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// SHA-256 over the canonical JSON of `entry` without its `entry_hash`.
fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = canonicalize_value(&value);
    let canonical_str = serde_json::to_string(&canonical).context("serialize canonical json")?;
    Ok(format!("{:064x}", Sha256::digest(canonical_str.as_bytes())))
}

/// Recursively sort object keys.
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize_value(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {}", path.display()))?;
    writeln!(file, "{}", line).context("write audit entry")?;
    fleet_fs::set_permissions(path, constants::AUDIT_LOG_MODE)
}

/// `entry_hash` of the last non-blank line, read backwards in chunks.
fn last_entry_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();

    const CHUNK: u64 = 8192;
    let mut offset = len;
    let mut buf = Vec::new();

    while offset > 0 {
        let read_size = std::cmp::min(CHUNK, offset);
        offset -= read_size;
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek {}", path.display()))?;
        let mut tmp = vec![0u8; read_size as usize];
        file.read_exact(&mut tmp)
            .with_context(|| format!("read {}", path.display()))?;
        buf.splice(0..0, tmp);

        // The last line is only complete once a newline precedes it.
        let content_end = buf
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |p| p + 1);
        if offset > 0 && !buf[..content_end].contains(&b'\n') {
            continue;
        }
        for line in buf.split(|b| *b == b'\n').rev() {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let entry: AuditEntry =
                serde_json::from_slice(line).context("last audit entry is not a journal entry")?;
            return Ok(entry.entry_hash);
        }
        return Ok(None);
    }

    Ok(None)
}

/// Entries of the journal at `path`, oldest first, keeping the last `limit`.
pub fn read_log(path: &Path, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path).with_context(|| format!("open audit log {}", path.display()))?;
    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for line in BufReader::new(file).lines() {
        let line = line.context("read audit log line")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(_) => malformed += 1,
        }
    }

    if malformed > 0 {
        tracing::warn!(malformed, "malformed audit entries skipped");
    }

    if let Some(limit) = limit {
        if entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
    }
    Ok(entries)
}

/// Check hashes and links of the whole journal. Returns (entries, problems).
pub fn verify_chain(path: &Path) -> Result<(usize, Vec<String>)> {
    let entries = read_log(path, None)?;
    let mut errors = Vec::new();
    let mut prev: Option<String> = None;

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 && entry.prev_hash != prev {
            errors.push(format!(
                "entry {}: prev_hash mismatch (expected {:?}, got {:?})",
                i + 1,
                prev,
                entry.prev_hash
            ));
        }
        match &entry.entry_hash {
            Some(stored) => match compute_entry_hash(entry) {
                Ok(computed) if &computed == stored => {}
                Ok(_) => errors.push(format!("entry {}: entry_hash mismatch (tampered?)", i + 1)),
                Err(e) => errors.push(format!("entry {}: cannot compute hash: {}", i + 1, e)),
            },
            None => errors.push(format!("entry {}: missing entry_hash", i + 1)),
        }
        prev = entry.entry_hash.clone();
    }

    Ok((entries.len(), errors))
}

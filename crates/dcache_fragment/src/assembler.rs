//! The Assembler: a reassembly buffer for fragments arriving in any order.
//!
//! Fragments are held per payload checksum until every index `0..n` is present.
//! A complete payload whose bytes do not hash to the advertised checksum is
//! dropped; there is no way to ask the sender for a retransmit. Payloads that
//! never complete are evicted once they have been pending longer than the
//! configured TTL, so a misbehaving sender cannot grow the buffer forever.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use dcache_timestamp::Timestamp;

use crate::{content_hash, Fragment, FRAGMENT_MARKER};

/// Default time a partial payload may wait for its missing fragments.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60 * 5);

/// Tunables for an [`Assembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// How long a partial payload is kept after its first fragment arrived.
    pub pending_ttl: Duration,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            pending_ttl: DEFAULT_PENDING_TTL,
        }
    }
}

/// Counters describing what the assembler has done with its input so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Payloads reassembled and verified
    pub reassembled: usize,
    /// Lines without a fragment marker, forwarded untouched
    pub passthrough: usize,
    /// Complete payloads dropped because the checksum did not match
    pub corrupted: usize,
    /// Partial payloads dropped because they outlived the TTL
    pub evicted: usize,
    /// Fragment lines that could not be decoded or did not fit their payload
    pub malformed: usize,
}

#[derive(Debug)]
struct Pending {
    n: usize,
    first_seen: Timestamp,
    parts: BTreeMap<usize, Vec<u8>>,
}

enum Line {
    Fragment(Fragment),
    Whole,
    Malformed(String),
}

/// Reassembles fragment lines produced by [`crate::fragmentize`].
#[derive(Debug, Default)]
pub struct Assembler {
    config: AssemblerConfig,
    pending: HashMap<String, Pending>,
    output: VecDeque<String>,
    stats: AssemblerStats,
}

impl Assembler {
    /// Constructor
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Feed one received line, using the current wall-clock time.
    pub fn push(&mut self, line: &str) {
        self.push_at(line, Timestamp::now())
    }

    /// Feed one received line as of `now`.
    ///
    /// Lines carrying the fragment marker are buffered; any other line is
    /// queued for output as-is.
    pub fn push_at(&mut self, line: &str, now: Timestamp) {
        self.evict_stale(now);

        match classify(line) {
            Line::Whole => {
                self.stats.passthrough += 1;
                self.output.push_back(line.to_string());
            }
            Line::Malformed(reason) => {
                self.stats.malformed += 1;
                tracing::warn!(%reason, "dropping malformed fragment");
            }
            Line::Fragment(f) => {
                let checksum = f.sha256_base58.clone();
                if self.store(f, now) {
                    self.check_complete(&checksum);
                }
            }
        }
    }

    /// Drain every payload that is ready, in arrival-completion order.
    pub fn pop(&mut self) -> Vec<String> {
        self.output.drain(..).collect()
    }

    /// Drop partial payloads that have been pending longer than the TTL.
    /// Returns how many were dropped.
    pub fn evict_stale(&mut self, now: Timestamp) -> usize {
        let ttl = self.config.pending_ttl;
        let before = self.pending.len();
        self.pending.retain(|checksum, p| {
            // a first_seen in our future is kept; the clock may have stepped back
            let keep = match now.elapsed_since(&p.first_seen) {
                Some(age) => age <= ttl,
                None => true,
            };
            if !keep {
                tracing::debug!(
                    %checksum,
                    have = p.parts.len(),
                    n = p.n,
                    "evicting incomplete payload"
                );
            }
            keep
        });
        let evicted = before - self.pending.len();
        self.stats.evicted += evicted;
        evicted
    }

    /// Number of payloads still waiting for fragments
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Counters so far
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn store(&mut self, f: Fragment, now: Timestamp) -> bool {
        if f.n == 0 || f.fragment >= f.n {
            self.stats.malformed += 1;
            tracing::warn!(index = f.fragment, n = f.n, "fragment index out of range");
            return false;
        }
        let bytes = match f.chunk_bytes() {
            Some(b) => b,
            None => {
                self.stats.malformed += 1;
                tracing::warn!(checksum = %f.sha256_base58, "fragment chunk is not base58");
                return false;
            }
        };

        let pending = self
            .pending
            .entry(f.sha256_base58.clone())
            .or_insert_with(|| Pending {
                n: f.n,
                first_seen: now,
                parts: BTreeMap::new(),
            });
        if pending.n != f.n {
            self.stats.malformed += 1;
            tracing::warn!(
                checksum = %f.sha256_base58,
                expected = pending.n,
                got = f.n,
                "fragment disagrees on chunk count"
            );
            return false;
        }
        pending.parts.entry(f.fragment).or_insert(bytes);
        true
    }

    fn check_complete(&mut self, checksum: &str) {
        match self.pending.get(checksum) {
            Some(p) if p.parts.len() == p.n => (),
            _ => return,
        }
        let Some(pending) = self.pending.remove(checksum) else {
            return;
        };

        let payload: Vec<u8> = pending.parts.into_values().flatten().collect();
        if content_hash(&payload) != checksum {
            self.stats.corrupted += 1;
            tracing::warn!(%checksum, "reassembled payload fails checksum, dropping");
            return;
        }
        match String::from_utf8(payload) {
            Ok(s) => {
                self.stats.reassembled += 1;
                tracing::trace!(%checksum, len = s.len(), "payload reassembled");
                self.output.push_back(s);
            }
            Err(_) => {
                self.stats.corrupted += 1;
                tracing::warn!(%checksum, "reassembled payload is not utf8, dropping");
            }
        }
    }
}

fn classify(line: &str) -> Line {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(map)) if map.contains_key(FRAGMENT_MARKER) => {
            match serde_json::from_value::<Fragment>(serde_json::Value::Object(map)) {
                Ok(f) => Line::Fragment(f),
                Err(e) => Line::Malformed(e.to_string()),
            }
        }
        _ => Line::Whole,
    }
}

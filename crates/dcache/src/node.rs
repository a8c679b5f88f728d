//! A node driver wiring the pieces together: lines in from the transport go
//! through the assembler into the repo, and rebroadcast envelopes go back out,
//! fragmented when they are too long for one line.

use dcache_fragment::{fragmentize, Assembler, AssemblerStats};

use crate::config::DcacheConfig;
use crate::envelope::{Envelope, MAX_ENVELOPE_LEN};
use crate::error::DcacheResult;
use crate::path::BucketPath;
use crate::repo::{DistributedRepo, ProcessOutcome, RebroadcastParams};
use crate::wire::Message;

/// Sending a line failed.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    /// Wrap any error
    pub fn other(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(e.into())
    }
}

/// Somewhere to send lines.
pub trait Transport {
    /// Send one line (no trailing newline) on `channel`.
    fn send(&mut self, channel: &str, line: &str) -> Result<(), TransportError>;
}

/// A transport that keeps everything sent, for tests and loopback wiring.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<(String, String)>,
}

impl MemoryTransport {
    /// Drain the `(channel, line)` pairs sent so far
    pub fn take(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, channel: &str, line: &str) -> Result<(), TransportError> {
        self.sent.push((channel.to_string(), line.to_string()));
        Ok(())
    }
}

/// One cache node: a repo, a reassembly buffer and a transport.
#[derive(Debug)]
pub struct GossipNode<T: Transport> {
    repo: DistributedRepo,
    assembler: Assembler,
    transport: T,
    params: RebroadcastParams,
    max_chunk_length: usize,
    failures: usize,
}

impl<T: Transport> GossipNode<T> {
    /// Constructor
    pub fn new(repo: DistributedRepo, transport: T, config: &DcacheConfig) -> Self {
        Self {
            repo,
            assembler: Assembler::new(config.fragments.into()),
            transport,
            params: config.rebroadcast.into(),
            max_chunk_length: config.fragments.max_chunk_length,
            failures: 0,
        }
    }

    /// The repo
    pub fn repo(&self) -> &DistributedRepo {
        &self.repo
    }

    /// The repo, for registering hooks or buckets
    pub fn repo_mut(&mut self) -> &mut DistributedRepo {
        &mut self.repo
    }

    /// The transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Messages that failed to process so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Reassembly counters
    pub fn assembler_stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    /// Take one line received on `channel`.
    ///
    /// Returns the outcomes of every message that became complete. Failures
    /// are logged and counted, never returned.
    pub fn receive(&mut self, line: &str, channel: &str) -> Vec<ProcessOutcome> {
        self.assembler.push_at(line, self.repo.now());
        let mut outcomes = Vec::new();
        for whole in self.assembler.pop() {
            let payload = match Envelope::from_line(&whole) {
                Ok(env) => env.payload,
                Err(_) => whole,
            };
            match self.repo.process(&payload, channel) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    self.failures += 1;
                    tracing::warn!(%channel, error = %e, "dropping message");
                }
            }
        }
        outcomes
    }

    /// Send `message` to each of `channels`. Returns the lines sent.
    ///
    /// Channels that took the message have it recorded in the repo, so the
    /// next rebroadcast pass treats them as freshly served.
    pub fn broadcast(&mut self, message: &Message, channels: &[&str]) -> usize {
        let payload = message.encode();
        let now = self.repo.now();
        let mut total = 0;
        for &ch in channels {
            let env = Envelope::new(self.repo.node_id(), ch, payload.as_str());
            let sent = self.send_envelope(&env);
            if sent > 0 {
                self.repo.record_broadcast(message, ch, now);
            }
            total += sent;
        }
        total
    }

    /// One periodic pass: cleanup, then rebroadcast the bucket at `path` to
    /// `channels`. Returns the lines sent.
    pub fn tick(&mut self, path: &BucketPath, channels: &[&str]) -> DcacheResult<usize> {
        self.repo.cleanup();
        let now = self.repo.now();
        self.assembler.evict_stale(now);
        let params = self.params;
        let out = self.repo.rebroadcast_at(path, channels, &params, now)?;
        Ok(out.envelopes.iter().map(|env| self.send_envelope(env)).sum())
    }

    fn send_envelope(&mut self, env: &Envelope) -> usize {
        let line = env.to_json();
        let lines = if line.len() > MAX_ENVELOPE_LEN {
            fragmentize(&line, self.max_chunk_length)
        } else {
            vec![line]
        };
        let mut sent = 0;
        for l in &lines {
            match self.transport.send(&env.to, l) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(channel = %env.to, error = %e, "send failed"),
            }
        }
        sent
    }
}

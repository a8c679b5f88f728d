//! The DistributedRepo: the facade every inbound message and every periodic
//! task goes through.
//!
//! It routes decoded claims into the bucket tree, keeps the signature index
//! (content hash of a message to the signers vouching for it), tracks
//! per-channel activity, decides what to rebroadcast, and snapshots itself to
//! a [`SnapshotStore`].
//!
//! Every time-dependent operation comes in two flavors: one reading the repo
//! clock, and an `_at` variant taking the time explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dcache_fragment::content_hash;
use dcache_timestamp::Timestamp;
use serde::Serialize;

use crate::bucket::{Bucket, Ingest, NoSuchBucket};
use crate::clock::{ArcClock, SystemClock};
use crate::config::{DcacheConfig, RebroadcastConfig};
use crate::envelope::Envelope;
use crate::error::{DcacheResult, ProcessFailure};
use crate::hooks::Hooks;
use crate::item::BucketDataItem;
use crate::path::BucketPath;
use crate::proposal::Claimant;
use crate::stats::{elapsed_at_least, ChannelStats};
use crate::store::{FileStore, SnapshotStore};
use crate::verify::{TrustAll, Verifier};
use crate::wire::{interpret_message, Claim, Message, MessageKind, Request, Signature};

/// Bump when the snapshot layout changes; older snapshots are then discarded.
pub const SCHEMA_VERSION: u32 = 1;

const KEY_VERSION: &str = "version";
const KEY_ROOT: &str = "root";
const KEY_SIGNATURES: &str = "signatures";

/// content hash -> signer -> signature
pub type SignatureIndex = BTreeMap<String, BTreeMap<String, String>>;

/// Why a well-formed message was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A claim under `pri/<id>` without a signature from `<id>`
    UnsignedPrivateClaim {
        /// The claimed bucket
        path: BucketPath,
    },
    /// The verifier refused the signature
    BadSignature {
        /// The claimed signer
        signer: String,
    },
}

/// What processing one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A propose was routed to its bucket
    Proposed {
        /// The fact is new in the bucket
        created: bool,
        /// Some proposal was recorded
        accepted: bool,
    },
    /// A dismiss was recorded
    Dismissed {
        /// The fact is new in the bucket
        created: bool,
    },
    /// A signature was added to the index
    SignatureRecorded,
    /// A request reset the broadcast stamps of this many facts
    Requested {
        /// Facts whose stamps were reset
        facts: usize,
    },
    /// The message was understood and refused
    Rejected(RejectReason),
    /// The message kind has no handler
    Unsupported(MessageKind),
}

/// Throttling for one rebroadcast pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebroadcastParams {
    /// Minimum time between sends of one fact to one channel
    pub min_delta: Duration,
    /// Minimum quiet time on a channel before we speak on it
    pub min_silence: Duration,
    /// Maximum fact/channel pairs per pass
    pub max_n: usize,
}

impl Default for RebroadcastParams {
    fn default() -> Self {
        RebroadcastConfig::default().into()
    }
}

/// Whether a rebroadcast carries a fact's proposals or its dismissals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClaimKind {
    /// Proposals of a valid fact
    Propose,
    /// Unexpired dismissals
    Dismiss,
}

/// One fact sent to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// Fact name
    pub data: String,
    /// Destination
    pub channel: String,
    /// What was sent
    pub kind: ClaimKind,
}

/// The result of a rebroadcast pass: what was chosen, and the envelopes to
/// hand to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rebroadcast {
    /// Chosen pairs, most stale first
    pub facts: Vec<Sent>,
    /// Envelopes to send, in order
    pub envelopes: Vec<Envelope>,
}

impl Rebroadcast {
    /// Distinct fact names sent, sorted
    pub fn data_names(&self) -> Vec<String> {
        self.facts
            .iter()
            .map(|s| s.data.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Diagnostic view of one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactSummary {
    /// Valid at the summary time
    pub valid: bool,
    /// Revoked without end at the summary time
    pub tombstoned: bool,
    /// Live proposals, rendered
    pub proposals: Vec<String>,
    /// Dismissals, rendered
    pub dismissals: Vec<String>,
}

/// Diagnostic view of the whole repo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    /// `/path` -> fact -> summary, for every bucket
    pub buckets: BTreeMap<String, BTreeMap<String, FactSummary>>,
    /// Number of signed message hashes known
    pub signatures: usize,
    /// Activity per channel
    pub channels: BTreeMap<String, ChannelStats>,
}

/// The distributed cache of one node.
#[derive(Debug)]
pub struct DistributedRepo {
    node_id: String,
    ignore_before: Timestamp,
    auto_create_buckets: bool,
    root: Bucket,
    signatures: SignatureIndex,
    all_channels: BTreeMap<String, ChannelStats>,
    hooks: Hooks,
    verifier: Verifier,
    clock: ArcClock,
    store: Option<Box<dyn SnapshotStore>>,
}

impl DistributedRepo {
    /// An empty repo with the system clock and no signature checking.
    /// `cache_dir` is not opened; see [`DistributedRepo::from_config`].
    pub fn new(config: &DcacheConfig) -> Self {
        Self {
            node_id: config.node_id.clone(),
            ignore_before: config.ignore_before,
            auto_create_buckets: config.auto_create_buckets,
            root: Bucket::default(),
            signatures: SignatureIndex::new(),
            all_channels: BTreeMap::new(),
            hooks: Hooks::default(),
            verifier: Arc::new(TrustAll),
            clock: Arc::new(SystemClock),
            store: None,
        }
    }

    /// A repo loaded from `config.cache_dir`, if set.
    pub fn from_config(config: &DcacheConfig) -> DcacheResult<Self> {
        let mut repo = Self::new(config);
        if let Some(dir) = &config.cache_dir {
            repo.use_cache_dir(dir)?;
        }
        Ok(repo)
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: ArcClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the signature verifier
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Current time per the repo clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// This node's address
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The bucket tree
    pub fn root(&self) -> &Bucket {
        &self.root
    }

    /// The signature index
    pub fn signatures(&self) -> &SignatureIndex {
        &self.signatures
    }

    /// Activity on one channel
    pub fn channel_stats(&self, channel: &str) -> Option<&ChannelStats> {
        self.all_channels.get(channel)
    }

    /// Activity on every channel seen so far
    pub fn all_channels(&self) -> &BTreeMap<String, ChannelStats> {
        &self.all_channels
    }

    /// The hook registry
    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Shorthand for [`Hooks::on_proposed`]
    pub fn on_proposed(
        &mut self,
        path: impl Into<BucketPath>,
        f: impl Fn(&BucketPath, &str) + Send + Sync + 'static,
    ) {
        self.hooks.on_proposed(path.into(), f);
    }

    /// Shorthand for [`Hooks::on_dismissed`]
    pub fn on_dismissed(
        &mut self,
        path: impl Into<BucketPath>,
        f: impl Fn(&BucketPath, &str) + Send + Sync + 'static,
    ) {
        self.hooks.on_dismissed(path.into(), f);
    }

    /// Make sure a bucket exists
    pub fn init_bucket(&mut self, path: &BucketPath) -> &mut Bucket {
        self.root.get_or_create_bucket(path)
    }

    /// Handle one inbound message now.
    pub fn process(&mut self, raw: &str, channel: &str) -> Result<ProcessOutcome, ProcessFailure> {
        let now = self.now();
        self.process_at(raw, channel, now)
    }

    /// Handle one inbound message as of `at`.
    ///
    /// A [`ProcessFailure`] concerns only this message; the caller should log
    /// it and keep going.
    #[tracing::instrument(skip(self, raw))]
    pub fn process_at(
        &mut self,
        raw: &str,
        channel: &str,
        at: Timestamp,
    ) -> Result<ProcessOutcome, ProcessFailure> {
        self.all_channels
            .entry(channel.to_string())
            .or_default()
            .record_received(at);

        let message = interpret_message(raw).map_err(|e| ProcessFailure::new(raw, e))?;
        let outcome = match message {
            Message::Propose(claim) => self.ingest_claim(raw, ClaimKind::Propose, claim, channel, at)?,
            Message::Dismiss(claim) => self.ingest_claim(raw, ClaimKind::Dismiss, claim, channel, at)?,
            Message::Signature(sig) => self.record_signature(sig),
            Message::Request(req) => self.handle_request(&req, channel, at),
            m @ (Message::Ping(_) | Message::Pong(_) | Message::Command(_)) => {
                ProcessOutcome::Unsupported(m.kind())
            }
        };
        tracing::debug!(?outcome);
        Ok(outcome)
    }

    /// The claimants vouching for exactly this message text.
    pub fn signers_for(&self, raw: &str) -> BTreeSet<Claimant> {
        match self.signatures.get(&content_hash(raw)) {
            Some(by_signer) => by_signer.keys().map(|s| Claimant::from(s.as_str())).collect(),
            None => BTreeSet::new(),
        }
    }

    fn ingest_claim(
        &mut self,
        raw: &str,
        kind: ClaimKind,
        claim: Claim,
        channel: &str,
        at: Timestamp,
    ) -> Result<ProcessOutcome, ProcessFailure> {
        let signers = self.signers_for(raw);
        if !owner_signed(&claim.buckets, &signers) {
            tracing::warn!(
                path = %claim.buckets,
                data = %claim.data,
                ?signers,
                "private claim not signed by its owner"
            );
            return Ok(ProcessOutcome::Rejected(
                RejectReason::UnsignedPrivateClaim {
                    path: claim.buckets,
                },
            ));
        }

        let ingest = Ingest {
            channel,
            now: at,
            ignore_before: self.ignore_before,
        };
        let bucket = self
            .root
            .get_bucket_mut(&claim.buckets, self.auto_create_buckets)
            .map_err(|e| ProcessFailure::new(raw, e))?;

        Ok(match kind {
            ClaimKind::Propose => {
                let out = bucket.propose(&claim.data, claim.validity, &signers, ingest);
                if out.created {
                    self.hooks.fire_proposed(&claim.buckets, &claim.data);
                }
                ProcessOutcome::Proposed {
                    created: out.created,
                    accepted: out.accepted,
                }
            }
            ClaimKind::Dismiss => {
                let out = bucket.dismiss(&claim.data, claim.validity, &signers, ingest);
                self.hooks.fire_dismissed(&claim.buckets, &claim.data);
                ProcessOutcome::Dismissed {
                    created: out.created,
                }
            }
        })
    }

    fn record_signature(&mut self, sig: Signature) -> ProcessOutcome {
        if !self.verifier.verify(&sig.signer, &sig.data, &sig.signature) {
            tracing::warn!(signer = %sig.signer, hash = %sig.data, "signature refused");
            return ProcessOutcome::Rejected(RejectReason::BadSignature { signer: sig.signer });
        }
        self.signatures
            .entry(sig.data)
            .or_default()
            .insert(sig.signer, sig.signature);
        ProcessOutcome::SignatureRecorded
    }

    fn handle_request(&mut self, req: &Request, channel: &str, at: Timestamp) -> ProcessOutcome {
        let mut facts = 0;
        for pattern in &req.patterns {
            let path = BucketPath::parse(pattern);
            match self.root.get_bucket_mut(&path, false) {
                Ok(bucket) => facts += bucket.forget_channel(channel, at),
                Err(e) => tracing::debug!(%e, "request for unknown bucket"),
            }
        }
        ProcessOutcome::Requested { facts }
    }

    /// Facts valid now in the bucket at `path`.
    pub fn query(&self, path: &BucketPath) -> Result<Vec<String>, NoSuchBucket> {
        self.query_at(path, self.now())
    }

    /// Facts valid at `at` in the bucket at `path`. Child buckets are not
    /// included.
    pub fn query_at(&self, path: &BucketPath, at: Timestamp) -> Result<Vec<String>, NoSuchBucket> {
        Ok(self.root.get_bucket(path)?.query(at))
    }

    /// Run a rebroadcast pass now.
    pub fn rebroadcast(
        &mut self,
        path: &BucketPath,
        channels: &[&str],
        params: &RebroadcastParams,
    ) -> Result<Rebroadcast, NoSuchBucket> {
        let now = self.now();
        self.rebroadcast_at(path, channels, params, now)
    }

    /// Choose which facts of the bucket at `path` to resend to which of
    /// `channels`, and build the envelopes.
    ///
    /// A channel is eligible once it has been quiet for `min_silence`; a fact
    /// once it has not been exchanged with that channel for `min_delta`. Valid
    /// facts send their proposals, facts with unexpired dismissals send those.
    /// Pairs are taken most stale first (never sent before the stalest), at
    /// most `max_n` of them.
    #[tracing::instrument(skip(self, params))]
    pub fn rebroadcast_at(
        &mut self,
        path: &BucketPath,
        channels: &[&str],
        params: &RebroadcastParams,
        now: Timestamp,
    ) -> Result<Rebroadcast, NoSuchBucket> {
        let quiet: Vec<&str> = channels
            .iter()
            .copied()
            .filter(|c| match self.all_channels.get(*c) {
                Some(stats) => stats.silent_for(now, params.min_silence),
                None => true,
            })
            .collect();

        let bucket = self.root.get_bucket(path)?;
        let mut candidates: Vec<(Option<Timestamp>, &str, &str, ClaimKind)> = Vec::new();
        for (data, item) in bucket.items() {
            let has_proposal = item.valid(now);
            let has_dismissal = item.active_dismissals(now).next().is_some();
            for &channel in &quiet {
                if has_proposal {
                    let last = item.last_propose(channel);
                    if elapsed_at_least(last, now, params.min_delta) {
                        candidates.push((last, data.as_str(), channel, ClaimKind::Propose));
                    }
                }
                if has_dismissal {
                    let last = item.last_dismiss(channel);
                    if elapsed_at_least(last, now, params.min_delta) {
                        candidates.push((last, data.as_str(), channel, ClaimKind::Dismiss));
                    }
                }
            }
        }
        candidates.sort();
        candidates.truncate(params.max_n);

        let mut out = Rebroadcast::default();
        for (_, data, channel, kind) in candidates {
            let Some(item) = bucket.item(data) else {
                continue;
            };
            for payload in self.claim_messages(path, data, item, kind, now) {
                out.envelopes
                    .push(Envelope::new(self.node_id.as_str(), channel, payload));
            }
            out.facts.push(Sent {
                data: data.to_string(),
                channel: channel.to_string(),
                kind,
            });
        }

        let bucket = self.root.get_bucket_mut(path, false)?;
        for sent in &out.facts {
            if let Some(item) = bucket.item_mut(&sent.data) {
                match sent.kind {
                    ClaimKind::Propose => item.mark_propose_sent(&sent.channel, now),
                    ClaimKind::Dismiss => item.mark_dismiss_sent(&sent.channel, now),
                }
            }
        }
        for env in &out.envelopes {
            self.all_channels
                .entry(env.to.clone())
                .or_default()
                .record_sent(now);
        }

        tracing::debug!(
            facts = out.facts.len(),
            envelopes = out.envelopes.len(),
            "rebroadcast"
        );
        Ok(out)
    }

    /// Account for `message` having been sent on `channel` outside a
    /// rebroadcast pass: the channel counts it, and a claim about a known
    /// fact stamps that fact for the channel.
    pub(crate) fn record_broadcast(&mut self, message: &Message, channel: &str, now: Timestamp) {
        self.all_channels
            .entry(channel.to_string())
            .or_default()
            .record_sent(now);

        let (claim, kind) = match message {
            Message::Propose(claim) => (claim, ClaimKind::Propose),
            Message::Dismiss(claim) => (claim, ClaimKind::Dismiss),
            _ => return,
        };
        let Ok(bucket) = self.root.get_bucket_mut(&claim.buckets, false) else {
            return;
        };
        if let Some(item) = bucket.item_mut(&claim.data) {
            match kind {
                ClaimKind::Propose => item.mark_propose_sent(channel, now),
                ClaimKind::Dismiss => item.mark_dismiss_sent(channel, now),
            }
        }
    }

    /// Encoded messages carrying one kind of claim for a fact: each message is
    /// preceded by the known signatures over it, so a receiver can attribute it.
    fn claim_messages(
        &self,
        path: &BucketPath,
        data: &str,
        item: &BucketDataItem,
        kind: ClaimKind,
        now: Timestamp,
    ) -> Vec<String> {
        let mut out = Vec::new();
        match kind {
            ClaimKind::Propose => {
                for validity in item.live_validities(now) {
                    let payload = Message::propose(path.clone(), data, validity).encode();
                    let signers = item
                        .proposals()
                        .iter()
                        .filter(|p| p.validity == validity)
                        .filter_map(|p| p.who.signer());
                    out.extend(self.signature_messages(&payload, signers));
                    out.push(payload);
                }
            }
            ClaimKind::Dismiss => {
                for (validity, who) in item.active_dismissals(now) {
                    let payload = Message::dismiss(path.clone(), data, *validity).encode();
                    let signers = who.iter().filter_map(Claimant::signer);
                    out.extend(self.signature_messages(&payload, signers));
                    out.push(payload);
                }
            }
        }
        out
    }

    fn signature_messages<'a>(
        &self,
        payload: &str,
        signers: impl Iterator<Item = &'a str>,
    ) -> Vec<String> {
        let hash = content_hash(payload);
        let Some(known) = self.signatures.get(&hash) else {
            return Vec::new();
        };
        signers
            .filter_map(|signer| {
                known
                    .get(signer)
                    .map(|sig| Message::signature(signer, hash.as_str(), sig.as_str()).encode())
            })
            .collect()
    }

    /// Drop expired, pre-epoch and dominated claims everywhere, now.
    pub fn cleanup(&mut self) -> Vec<String> {
        let now = self.now();
        self.cleanup_at(now)
    }

    /// Drop expired, pre-epoch and dominated claims everywhere, as of `now`.
    /// Returns what was pruned.
    pub fn cleanup_at(&mut self, now: Timestamp) -> Vec<String> {
        let notes = self.root.cleanup(now, self.ignore_before);
        for note in &notes {
            tracing::debug!(%note, "cleanup");
        }
        notes
    }

    /// Structured view of the repo as of now
    pub fn summary_dict(&self) -> RepoSummary {
        self.summary_dict_at(self.now())
    }

    /// Structured view of the repo as of `at`
    pub fn summary_dict_at(&self, at: Timestamp) -> RepoSummary {
        let mut buckets = BTreeMap::new();
        self.root.walk(&BucketPath::root(), &mut |path, bucket| {
            let facts: BTreeMap<String, FactSummary> = bucket
                .items()
                .map(|(data, item)| {
                    let summary = FactSummary {
                        valid: item.valid(at),
                        tombstoned: item.is_tombstoned(at),
                        proposals: item.proposals().iter().map(ToString::to_string).collect(),
                        dismissals: item
                            .dismissals()
                            .iter()
                            .map(|(v, who)| {
                                let who: Vec<String> = who.iter().map(ToString::to_string).collect();
                                format!("{}@{}", who.join(","), v)
                            })
                            .collect(),
                    };
                    (data.clone(), summary)
                })
                .collect();
            buckets.insert(format!("/{}", path), facts);
        });
        RepoSummary {
            buckets,
            signatures: self.signatures.len(),
            channels: self.all_channels.clone(),
        }
    }

    /// Human-readable multi-line view of the repo
    pub fn summary(&self) -> String {
        let dict = self.summary_dict();
        let mut lines = Vec::new();
        for (path, facts) in &dict.buckets {
            lines.push(format!("bucket {}", path));
            for (data, f) in facts {
                let state = match (f.valid, f.tombstoned) {
                    (_, true) => "tombstoned",
                    (true, false) => "valid",
                    (false, false) => "not valid",
                };
                lines.push(format!(
                    "  {} ({}) proposals [{}] dismissals [{}]",
                    data,
                    state,
                    f.proposals.join(" "),
                    f.dismissals.join(" ")
                ));
            }
        }
        lines.push(format!("signatures: {}", dict.signatures));
        for (channel, s) in &dict.channels {
            lines.push(format!(
                "channel {}: sent {} received {}",
                channel, s.n_sent, s.n_received
            ));
        }
        lines.join("\n")
    }

    /// Every live claim as wire messages, signatures first. Replaying them
    /// into an empty repo reproduces this repo's facts.
    pub fn summary_messages(&self) -> Vec<String> {
        let now = self.now();
        let mut out = Vec::new();
        self.root.walk(&BucketPath::root(), &mut |path, bucket| {
            for (data, item) in bucket.items() {
                out.extend(self.claim_messages(path, data, item, ClaimKind::Propose, now));
                out.extend(self.claim_messages(path, data, item, ClaimKind::Dismiss, now));
            }
        });
        out
    }

    /// Load state from `store` and keep it for later syncs.
    ///
    /// A snapshot written under another [`SCHEMA_VERSION`], or one that does
    /// not decode, is ignored. Hooks are unaffected.
    pub fn use_store(&mut self, store: Box<dyn SnapshotStore>) {
        if let Some((root, signatures)) = load_snapshot(store.as_ref()) {
            tracing::info!(signatures = signatures.len(), "loaded snapshot");
            self.root = root;
            self.signatures = signatures;
        }
        self.store = Some(store);
    }

    /// [`DistributedRepo::use_store`] with a [`FileStore`] in `dir`.
    pub fn use_cache_dir(&mut self, dir: impl AsRef<Path>) -> DcacheResult<()> {
        let store = FileStore::open_dir(dir)?;
        self.use_store(Box::new(store));
        Ok(())
    }

    /// Write the bucket tree and signature index to the store.
    pub fn sync(&mut self) -> DcacheResult<()> {
        let Some(store) = self.store.as_mut() else {
            tracing::debug!("no snapshot store, nothing to sync");
            return Ok(());
        };
        store.set(KEY_VERSION, rmp_serde::to_vec(&SCHEMA_VERSION)?);
        store.set(KEY_ROOT, rmp_serde::to_vec_named(&self.root)?);
        store.set(KEY_SIGNATURES, rmp_serde::to_vec(&self.signatures)?);
        store.sync()?;
        Ok(())
    }

    /// Sync and release the store.
    pub fn close(&mut self) -> DcacheResult<()> {
        self.sync()?;
        if let Some(mut store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }
}

/// Claims under `pri/<id>` must be signed by `<id>`; anything else passes.
fn owner_signed(path: &BucketPath, signers: &BTreeSet<Claimant>) -> bool {
    match path.private_owner() {
        None => true,
        Some(None) => false,
        Some(Some(owner)) => signers.contains(&Claimant::from(owner)),
    }
}

fn load_snapshot(store: &dyn SnapshotStore) -> Option<(Bucket, SignatureIndex)> {
    let version = store.get(KEY_VERSION)?;
    match rmp_serde::from_slice::<u32>(&version) {
        Ok(v) if v == SCHEMA_VERSION => (),
        Ok(v) => {
            tracing::info!(found = v, expected = SCHEMA_VERSION, "snapshot schema changed, discarding");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "unreadable snapshot version, discarding");
            return None;
        }
    }
    let root = rmp_serde::from_slice::<Bucket>(&store.get(KEY_ROOT)?);
    let signatures = rmp_serde::from_slice::<SignatureIndex>(&store.get(KEY_SIGNATURES)?);
    match (root, signatures) {
        (Ok(root), Ok(signatures)) => Some((root, signatures)),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "unreadable snapshot, discarding");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::Validity;
    use pretty_assertions::assert_eq;

    fn repo() -> DistributedRepo {
        DistributedRepo::new(&DcacheConfig::testing())
    }

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn owner_gate() {
        let alice = BTreeSet::from([Claimant::from("alice")]);
        assert!(owner_signed(&"peer".into(), &BTreeSet::new()));
        assert!(owner_signed(&"pri/alice/x".into(), &alice));
        assert!(!owner_signed(&"pri/bob".into(), &alice));
        assert!(!owner_signed(&"pri".into(), &alice));
    }

    #[test]
    fn unsupported_kinds_are_not_failures() {
        let mut r = repo();
        let ping = r#"{"mtype":"ping","validity":[null,null]}"#;
        assert_eq!(
            r.process_at(ping, "c", t(0)).unwrap(),
            ProcessOutcome::Unsupported(MessageKind::Ping)
        );
        assert_eq!(r.channel_stats("c").unwrap().n_received, 1);
    }

    #[test]
    fn garbage_is_a_failure_carrying_the_raw_text() {
        let mut r = repo();
        let err = r.process_at("{oops", "c", t(0)).unwrap_err();
        assert_eq!(err.raw, "{oops");
        // still counted as traffic on the channel
        assert_eq!(r.channel_stats("c").unwrap().n_received, 1);
    }

    #[test]
    fn missing_bucket_without_auto_create() {
        let mut r = DistributedRepo::new(&DcacheConfig {
            auto_create_buckets: false,
            ..DcacheConfig::testing()
        });
        let raw = Message::propose("peer", "x", Validity::always()).encode();
        let err = r.process_at(&raw, "c", t(0)).unwrap_err();
        assert!(matches!(
            err.cause,
            crate::error::ProcessFailureCause::NoSuchBucket(_)
        ));

        r.init_bucket(&"peer".into());
        assert!(r.process_at(&raw, "c", t(0)).is_ok());
        assert_eq!(r.query_at(&"peer".into(), t(1)).unwrap(), vec!["x"]);
    }

    #[test]
    fn snapshot_keys() {
        let store = crate::store::MemoryStore::default();
        let mut r = repo();
        r.use_store(Box::new(store.clone()));
        r.sync().unwrap();
        assert_eq!(store.keys(), vec!["root", "signatures", "version"]);
    }
}

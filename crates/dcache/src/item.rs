//! Per-fact claim state.

use std::collections::{BTreeMap, BTreeSet};

use dcache_timestamp::Timestamp;
use serde::{Deserialize, Serialize};

use crate::proposal::{claimants_or_anonymous, strictly_dominated_by_set, Claimant, Proposal, Validity};

/// Everything known about one fact: who claims it holds when, who revoked
/// it when, and when it was last sent to each channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDataItem {
    proposals: BTreeSet<Proposal>,
    dismissals: BTreeMap<Validity, BTreeSet<Claimant>>,
    last_propose_sent: BTreeMap<String, Timestamp>,
    last_dismiss_sent: BTreeMap<String, Timestamp>,
}

impl BucketDataItem {
    /// Offer a proposal from each signer (or one anonymous proposal).
    ///
    /// Proposals strictly dominated by a live one are dropped, and cleanup
    /// runs after any insertion. Returns whether a new proposal survived
    /// cleanup; if so, `channel` is stamped.
    pub fn propose(
        &mut self,
        validity: Validity,
        signers: &BTreeSet<Claimant>,
        channel: &str,
        now: Timestamp,
        ignore_before: Timestamp,
    ) -> bool {
        let mut inserted = Vec::new();
        for who in claimants_or_anonymous(signers) {
            let p = Proposal::new(validity, who);
            if !strictly_dominated_by_set(&p, &self.proposals, now).is_empty() {
                tracing::trace!(proposal = %p, "dominated on arrival");
                continue;
            }
            if self.proposals.insert(p.clone()) {
                inserted.push(p);
            }
        }
        if inserted.is_empty() {
            return false;
        }
        for note in self.cleanup(now, ignore_before) {
            tracing::trace!(%note, "pruned");
        }
        let accepted = inserted.iter().any(|p| self.proposals.contains(p));
        if accepted {
            self.last_propose_sent.insert(channel.to_string(), now);
        }
        accepted
    }

    /// Record a revocation by each signer (or anonymously). Dismissals
    /// accumulate and only go away when they expire.
    pub fn dismiss(
        &mut self,
        validity: Validity,
        signers: &BTreeSet<Claimant>,
        channel: &str,
        now: Timestamp,
    ) {
        self.dismissals
            .entry(validity)
            .or_default()
            .extend(claimants_or_anonymous(signers));
        self.last_dismiss_sent.insert(channel.to_string(), now);
    }

    /// Drop expired and pre-epoch claims, then every proposal dominated by
    /// another live one. Returns a note per removal, for logging.
    pub fn cleanup(&mut self, now: Timestamp, ignore_before: Timestamp) -> Vec<String> {
        let mut notes = Vec::new();

        self.proposals.retain(|p| {
            let stale = p.validity.is_expired(now) || p.validity.predates(ignore_before);
            if stale {
                notes.push(format!("stale proposal {}", p));
            }
            !stale
        });
        self.dismissals.retain(|v, who| {
            let stale = v.is_expired(now) || v.predates(ignore_before);
            if stale {
                notes.push(format!("stale dismissal {} by {:?}", v, who));
            }
            !stale
        });

        let dominated: Vec<Proposal> = self
            .proposals
            .iter()
            .filter(|p| !strictly_dominated_by_set(p, &self.proposals, now).is_empty())
            .cloned()
            .collect();
        for p in dominated {
            self.proposals.remove(&p);
            notes.push(format!("dominated proposal {}", p));
        }

        notes
    }

    /// Is there an unbounded revocation in force at `now`?
    pub fn is_tombstoned(&self, now: Timestamp) -> bool {
        self.dismissals
            .keys()
            .any(|v| v.end.is_none() && v.contains(now))
    }

    /// Does the fact hold at `at`? Any covering dismissal wins over any
    /// covering proposal.
    pub fn valid(&self, at: Timestamp) -> bool {
        !self.dismissals.keys().any(|v| v.contains(at))
            && self.proposals.iter().any(|p| p.validity.contains(at))
    }

    /// No proposals and no dismissals left
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.dismissals.is_empty()
    }

    /// The live proposals
    pub fn proposals(&self) -> &BTreeSet<Proposal> {
        &self.proposals
    }

    /// Dismiss interval to dismissing claimants
    pub fn dismissals(&self) -> &BTreeMap<Validity, BTreeSet<Claimant>> {
        &self.dismissals
    }

    /// Distinct validities among unexpired proposals.
    pub fn live_validities(&self, now: Timestamp) -> BTreeSet<Validity> {
        self.proposals
            .iter()
            .filter(|p| !p.validity.is_expired(now))
            .map(|p| p.validity)
            .collect()
    }

    /// Dismissals that have not yet expired.
    pub fn active_dismissals(&self, now: Timestamp) -> impl Iterator<Item = (&Validity, &BTreeSet<Claimant>)> {
        self.dismissals.iter().filter(move |(v, _)| !v.is_expired(now))
    }

    /// When this fact's proposals were last exchanged with `channel`
    pub fn last_propose(&self, channel: &str) -> Option<Timestamp> {
        self.last_propose_sent.get(channel).copied()
    }

    /// When this fact's dismissals were last exchanged with `channel`
    pub fn last_dismiss(&self, channel: &str) -> Option<Timestamp> {
        self.last_dismiss_sent.get(channel).copied()
    }

    pub(crate) fn mark_propose_sent(&mut self, channel: &str, now: Timestamp) {
        self.last_propose_sent.insert(channel.to_string(), now);
    }

    pub(crate) fn mark_dismiss_sent(&mut self, channel: &str, now: Timestamp) {
        self.last_dismiss_sent.insert(channel.to_string(), now);
    }

    /// Forget that anything was exchanged with `channel`.
    pub(crate) fn forget_channel(&mut self, channel: &str) {
        self.last_propose_sent.remove(channel);
        self.last_dismiss_sent.remove(channel);
    }
}

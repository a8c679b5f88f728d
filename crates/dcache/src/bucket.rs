//! The bucket tree.

use std::collections::{BTreeMap, BTreeSet};

use dcache_timestamp::Timestamp;
use serde::{Deserialize, Serialize};

use crate::item::BucketDataItem;
use crate::path::BucketPath;
use crate::proposal::{Claimant, Validity};

/// Path resolution hit a segment that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no such bucket {path} (missing {missing:?})")]
pub struct NoSuchBucket {
    /// The full path being resolved
    pub path: BucketPath,
    /// The first segment that was not found
    pub missing: String,
}

/// Where and when a claim is being ingested.
#[derive(Debug, Clone, Copy)]
pub struct Ingest<'a> {
    /// The channel the claim arrived on
    pub channel: &'a str,
    /// Current time
    pub now: Timestamp,
    /// Claims starting before this are discarded
    pub ignore_before: Timestamp,
}

/// What a propose or dismiss did to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// The fact did not exist in this bucket before
    pub created: bool,
    /// Some claim was recorded
    pub accepted: bool,
}

/// A node of the namespace: facts by name, and child buckets by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    items: BTreeMap<String, BucketDataItem>,
    children: BTreeMap<String, Bucket>,
}

impl Bucket {
    /// The item for `data`, creating it if needed. The flag is true on creation.
    pub fn get_or_create_item(&mut self, data: &str) -> (&mut BucketDataItem, bool) {
        let created = !self.items.contains_key(data);
        (self.items.entry(data.to_string()).or_default(), created)
    }

    /// The item for `data`, if it exists
    pub fn item(&self, data: &str) -> Option<&BucketDataItem> {
        self.items.get(data)
    }

    /// Iterate the facts in this bucket, by name
    pub fn items(&self) -> impl Iterator<Item = (&String, &BucketDataItem)> {
        self.items.iter()
    }

    /// Iterate the child buckets, by segment
    pub fn children(&self) -> impl Iterator<Item = (&String, &Bucket)> {
        self.children.iter()
    }

    /// No facts and no children
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.children.is_empty()
    }

    /// Offer a proposal for `data`.
    ///
    /// A fact created here whose proposals were all discarded straight away
    /// (expired, pre-epoch) is removed again and not reported as created.
    pub fn propose(
        &mut self,
        data: &str,
        validity: Validity,
        signers: &BTreeSet<Claimant>,
        ingest: Ingest<'_>,
    ) -> ClaimOutcome {
        let (item, created) = self.get_or_create_item(data);
        let accepted = item.propose(
            validity,
            signers,
            ingest.channel,
            ingest.now,
            ingest.ignore_before,
        );
        if created && item.is_empty() {
            self.items.remove(data);
            return ClaimOutcome {
                created: false,
                accepted: false,
            };
        }
        ClaimOutcome { created, accepted }
    }

    /// Record a dismissal for `data`.
    pub fn dismiss(
        &mut self,
        data: &str,
        validity: Validity,
        signers: &BTreeSet<Claimant>,
        ingest: Ingest<'_>,
    ) -> ClaimOutcome {
        let (item, created) = self.get_or_create_item(data);
        item.dismiss(validity, signers, ingest.channel, ingest.now);
        ClaimOutcome {
            created,
            accepted: true,
        }
    }

    /// Names of the facts in this bucket valid at `at`, sorted.
    /// Child buckets are not included.
    pub fn query(&self, at: Timestamp) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, item)| item.valid(at))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resolve a descendant bucket.
    pub fn get_bucket(&self, path: &BucketPath) -> Result<&Bucket, NoSuchBucket> {
        let mut cur = self;
        for seg in path {
            cur = cur.children.get(seg).ok_or_else(|| NoSuchBucket {
                path: path.clone(),
                missing: seg.clone(),
            })?;
        }
        Ok(cur)
    }

    /// Resolve a descendant bucket for writing, optionally creating the
    /// missing segments.
    pub fn get_bucket_mut(
        &mut self,
        path: &BucketPath,
        create_if_not_exists: bool,
    ) -> Result<&mut Bucket, NoSuchBucket> {
        if create_if_not_exists {
            return Ok(self.get_or_create_bucket(path));
        }
        let mut cur = self;
        for seg in path {
            cur = cur.children.get_mut(seg).ok_or_else(|| NoSuchBucket {
                path: path.clone(),
                missing: seg.clone(),
            })?;
        }
        Ok(cur)
    }

    /// Resolve a descendant bucket, creating it and its ancestors as needed.
    pub fn get_or_create_bucket(&mut self, path: &BucketPath) -> &mut Bucket {
        let mut cur = self;
        for seg in path {
            cur = cur.children.entry(seg.clone()).or_default();
        }
        cur
    }

    /// Clean every item in this bucket and its descendants, dropping items
    /// left with no claims. Child buckets are kept even when empty, since
    /// they may have been created deliberately.
    pub fn cleanup(&mut self, now: Timestamp, ignore_before: Timestamp) -> Vec<String> {
        let mut notes = Vec::new();
        self.items.retain(|name, item| {
            notes.extend(
                item.cleanup(now, ignore_before)
                    .into_iter()
                    .map(|n| format!("{}: {}", name, n)),
            );
            if item.is_empty() {
                notes.push(format!("{}: collected", name));
                false
            } else {
                true
            }
        });
        for (seg, child) in self.children.iter_mut() {
            notes.extend(
                child
                    .cleanup(now, ignore_before)
                    .into_iter()
                    .map(|n| format!("{}/{}", seg, n)),
            );
        }
        notes
    }

    /// Forget every broadcast to `channel` for facts valid at `now`, here and
    /// in every descendant. Returns how many facts were reset.
    pub(crate) fn forget_channel(&mut self, channel: &str, now: Timestamp) -> usize {
        let mut n = 0;
        for item in self.items.values_mut() {
            if item.valid(now) || item.active_dismissals(now).next().is_some() {
                item.forget_channel(channel);
                n += 1;
            }
        }
        for child in self.children.values_mut() {
            n += child.forget_channel(channel, now);
        }
        n
    }

    pub(crate) fn item_mut(&mut self, data: &str) -> Option<&mut BucketDataItem> {
        self.items.get_mut(data)
    }

    /// Visit this bucket and every descendant, depth first, with its path.
    pub fn walk<'a>(&'a self, path: &BucketPath, f: &mut impl FnMut(&BucketPath, &'a Bucket)) {
        f(path, self);
        for (seg, child) in &self.children {
            child.walk(&path.child(seg.clone()), f);
        }
    }
}

//! Validity intervals, claimants, and the domination order over proposals.
//!
//! Domination is what keeps per-fact state small: a proposal that is covered
//! by a wider interval from an equally or more specific claimant carries no
//! information and is dropped. All comparisons first cut both intervals at the
//! current time, so two claims that differ only in the past are treated alike.

use std::collections::BTreeSet;
use std::fmt;

use dcache_timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// The sentinel claimant string for unsigned claims.
pub const ANONYMOUS: &str = "anonymous";

/// A time window during which a claim holds.
///
/// `start: None` means "since always", `end: None` means "until revoked".
/// Membership is half-open: `start <= t < end`.
/// On the wire this is a two-element array `[start, end]` of integers or nulls.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(
    from = "(Option<Timestamp>, Option<Timestamp>)",
    into = "(Option<Timestamp>, Option<Timestamp>)"
)]
pub struct Validity {
    /// Inclusive lower bound
    pub start: Option<Timestamp>,
    /// Exclusive upper bound
    pub end: Option<Timestamp>,
}

impl From<(Option<Timestamp>, Option<Timestamp>)> for Validity {
    fn from((start, end): (Option<Timestamp>, Option<Timestamp>)) -> Self {
        Self { start, end }
    }
}

impl From<Validity> for (Option<Timestamp>, Option<Timestamp>) {
    fn from(v: Validity) -> Self {
        (v.start, v.end)
    }
}

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(s) => write!(f, "[{}", s.as_secs())?,
            None => write!(f, "(-inf")?,
        }
        match self.end {
            Some(e) => write!(f, ", {})", e.as_secs()),
            None => write!(f, ", +inf)"),
        }
    }
}

impl Validity {
    /// Constructor
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    /// Valid since always, until revoked
    pub fn always() -> Self {
        Self::default()
    }

    /// Valid from `start`, until revoked
    pub fn since(start: Timestamp) -> Self {
        Self::new(Some(start), None)
    }

    /// Valid from `start` until just before `end`
    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        Self::new(Some(start), Some(end))
    }

    /// Convenience for tests and literals: seconds, `None` for unbounded.
    pub fn secs(start: Option<i64>, end: Option<i64>) -> Self {
        Self::new(start.map(Timestamp::from_secs), end.map(Timestamp::from_secs))
    }

    /// Forget the past: raise the start bound to at least `t`.
    pub fn cut(&self, t: Timestamp) -> Self {
        let start = match self.start {
            Some(s) if s > t => s,
            _ => t,
        };
        Self::new(Some(start), self.end)
    }

    /// Is `t` inside this interval?
    pub fn contains(&self, t: Timestamp) -> bool {
        let after_start = match self.start {
            Some(s) => s <= t,
            None => true,
        };
        let before_end = match self.end {
            Some(e) => t < e,
            None => true,
        };
        after_start && before_end
    }

    /// Has this interval ended as of `now`?
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.end, Some(e) if e <= now)
    }

    /// Does this interval claim to start before the trust epoch?
    /// An unbounded start is not considered stale.
    pub fn predates(&self, epoch: Timestamp) -> bool {
        matches!(self.start, Some(s) if s < epoch)
    }

    /// Cut at `t`, with an unbounded end mapped to the maximum timestamp.
    fn bounds_after(&self, t: Timestamp) -> (Timestamp, Timestamp) {
        let cut = self.cut(t);
        (cut.start.unwrap_or(t), cut.end.unwrap_or(Timestamp::MAX))
    }

    /// After cutting both at `t`, is this interval a strict superset of `other`?
    pub fn strictly_dominates(&self, other: &Validity, t: Timestamp) -> bool {
        let (a0, a1) = self.bounds_after(t);
        let (b0, b1) = other.bounds_after(t);
        (a0 <= b0 && a1 > b1) || (a0 < b0 && a1 >= b1)
    }

    /// Strict domination, or equality once both are cut at `t`.
    pub fn dominates(&self, other: &Validity, t: Timestamp) -> bool {
        self.strictly_dominates(other, t) || self.cut(t) == other.cut(t)
    }
}

/// Who is making a claim.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Claimant {
    /// An unsigned claim
    Anonymous,
    /// A claim signed by the named identity
    Signer(String),
}

impl From<String> for Claimant {
    fn from(s: String) -> Self {
        if s == ANONYMOUS {
            Self::Anonymous
        } else {
            Self::Signer(s)
        }
    }
}

impl From<&str> for Claimant {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl From<Claimant> for String {
    fn from(c: Claimant) -> Self {
        match c {
            Claimant::Anonymous => ANONYMOUS.to_string(),
            Claimant::Signer(s) => s,
        }
    }
}

impl fmt::Debug for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Claimant::Anonymous => write!(f, "{}", ANONYMOUS),
            Claimant::Signer(s) => write!(f, "{}", s),
        }
    }
}

impl Claimant {
    /// A named claimant beats an anonymous one, and nothing else.
    pub fn strictly_dominates(&self, other: &Claimant) -> bool {
        matches!(
            (self, other),
            (Claimant::Signer(_), Claimant::Anonymous)
        )
    }

    /// Strict domination or the same claimant.
    pub fn dominates(&self, other: &Claimant) -> bool {
        self == other || self.strictly_dominates(other)
    }

    /// The signer identity, if any
    pub fn signer(&self) -> Option<&str> {
        match self {
            Claimant::Anonymous => None,
            Claimant::Signer(s) => Some(s),
        }
    }
}

/// The claimants behind a claim: the given signers, or [`Claimant::Anonymous`]
/// if there are none.
pub fn claimants_or_anonymous(signers: &BTreeSet<Claimant>) -> BTreeSet<Claimant> {
    if signers.is_empty() {
        std::iter::once(Claimant::Anonymous).collect()
    } else {
        signers.clone()
    }
}

/// A claim that a fact is valid during `validity`, made by `who`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Proposal {
    /// When the claim holds
    pub validity: Validity,
    /// Who makes the claim
    pub who: Claimant,
}

impl fmt::Debug for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.who, self.validity)
    }
}

impl Proposal {
    /// Constructor
    pub fn new(validity: Validity, who: impl Into<Claimant>) -> Self {
        Self {
            validity,
            who: who.into(),
        }
    }

    /// Does `self` make `other` redundant as of `t`?
    ///
    /// Either the interval is strictly wider and the claimant at least as
    /// specific, or the interval is at least as wide and the claimant strictly
    /// more specific. Equal proposals do not dominate each other.
    pub fn strictly_dominates(&self, other: &Proposal, t: Timestamp) -> bool {
        (self.validity.strictly_dominates(&other.validity, t) && self.who.dominates(&other.who))
            || (self.validity.dominates(&other.validity, t)
                && self.who.strictly_dominates(&other.who))
    }
}

/// The members of `proposals` that strictly dominate `proposal` as of `t`.
pub fn strictly_dominated_by_set<'a>(
    proposal: &Proposal,
    proposals: impl IntoIterator<Item = &'a Proposal>,
    t: Timestamp,
) -> Vec<&'a Proposal> {
    proposals
        .into_iter()
        .filter(|p| p.strictly_dominates(proposal, t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn p(start: Option<i64>, end: Option<i64>, who: &str) -> Proposal {
        Proposal::new(Validity::secs(start, end), who)
    }

    const T0: Timestamp = Timestamp::from_secs(0);

    #[test]
    fn cut_raises_start_only() {
        let t = Timestamp::from_secs(10);
        assert_eq!(Validity::secs(None, Some(20)).cut(t), Validity::secs(Some(10), Some(20)));
        assert_eq!(Validity::secs(Some(5), None).cut(t), Validity::secs(Some(10), None));
        assert_eq!(Validity::secs(Some(15), Some(20)).cut(t), Validity::secs(Some(15), Some(20)));
    }

    #[test_case(Validity::secs(None, None), 0 => true)]
    #[test_case(Validity::secs(Some(5), None), 4 => false)]
    #[test_case(Validity::secs(Some(5), None), 5 => true)]
    #[test_case(Validity::secs(None, Some(10)), 9 => true)]
    #[test_case(Validity::secs(None, Some(10)), 10 => false)]
    fn contains(v: Validity, t: i64) -> bool {
        v.contains(Timestamp::from_secs(t))
    }

    #[test_case(Validity::secs(Some(0), Some(100)), Validity::secs(Some(0), Some(50)) => true ; "same start longer end")]
    #[test_case(Validity::secs(Some(0), Some(100)), Validity::secs(Some(10), Some(100)) => true ; "earlier start same end")]
    #[test_case(Validity::secs(Some(0), Some(100)), Validity::secs(Some(0), Some(100)) => false ; "equal")]
    #[test_case(Validity::secs(Some(0), None), Validity::secs(Some(0), Some(100)) => true ; "unbounded end wins")]
    #[test_case(Validity::secs(Some(0), Some(50)), Validity::secs(Some(10), Some(100)) => false ; "overlapping")]
    #[test_case(Validity::secs(None, Some(50)), Validity::secs(Some(0), Some(50)) => false ; "past forgotten")]
    fn interval_strict_domination(a: Validity, b: Validity) -> bool {
        a.strictly_dominates(&b, T0)
    }

    #[test]
    fn interval_domination_includes_equality_after_cut() {
        let t = Timestamp::from_secs(20);
        let a = Validity::secs(Some(0), None);
        let b = Validity::secs(Some(10), None);
        assert!(!a.strictly_dominates(&b, t));
        assert!(a.dominates(&b, t));
        assert!(b.dominates(&a, t));
    }

    #[test]
    fn named_beats_anonymous() {
        let anon = Claimant::Anonymous;
        let alice = Claimant::from("alice");
        assert!(alice.strictly_dominates(&anon));
        assert!(!anon.strictly_dominates(&alice));
        assert!(!alice.strictly_dominates(&Claimant::from("bob")));
        assert!(alice.dominates(&alice));
        assert!(!alice.dominates(&Claimant::from("bob")));
    }

    #[test]
    fn identical_proposals_do_not_dominate() {
        let a = p(Some(0), Some(10), "alice");
        assert!(!a.strictly_dominates(&a.clone(), T0));
        let set: BTreeSet<Proposal> = vec![a.clone(), a.clone()].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn anonymous_loses_to_named_over_same_or_worse_window() {
        let named = p(Some(0), Some(10), "alice");
        assert!(named.strictly_dominates(&p(Some(0), Some(10), ANONYMOUS), T0));
        assert!(named.strictly_dominates(&p(Some(2), Some(8), ANONYMOUS), T0));
        assert!(!named.strictly_dominates(&p(Some(0), Some(20), ANONYMOUS), T0));
    }

    #[test]
    fn anonymous_non_nested_windows_coexist() {
        let a = p(Some(0), Some(10), ANONYMOUS);
        let b = p(Some(5), Some(15), ANONYMOUS);
        assert!(!a.strictly_dominates(&b, T0));
        assert!(!b.strictly_dominates(&a, T0));
    }

    #[test]
    fn different_signers_same_window_coexist() {
        let a = p(Some(0), Some(10), "alice");
        let b = p(Some(0), Some(10), "bob");
        assert!(!a.strictly_dominates(&b, T0));
        assert!(!b.strictly_dominates(&a, T0));
    }

    #[test]
    fn dominated_by_set() {
        let set = vec![
            p(Some(0), Some(100), "alice"),
            p(Some(0), Some(50), "alice"),
            p(Some(60), Some(70), "bob"),
        ];
        let target = p(Some(10), Some(40), ANONYMOUS);
        let doms = strictly_dominated_by_set(&target, &set, T0);
        assert_eq!(doms, vec![&set[0], &set[1]]);
    }

    #[test]
    fn claimant_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Claimant::Anonymous).unwrap(), "\"anonymous\"");
        let c: Claimant = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(c, Claimant::from("bob"));
    }

    fn arb_proposal() -> impl Strategy<Value = Proposal> {
        (
            proptest::option::of(-5i64..20),
            proptest::option::of(-5i64..20),
            prop_oneof![Just(ANONYMOUS), Just("alice"), Just("bob")],
        )
            .prop_map(|(s, e, who)| p(s, e, who))
    }

    proptest! {
        #[test]
        fn domination_is_antisymmetric(a in arb_proposal(), b in arb_proposal(), t in -5i64..20) {
            let t = Timestamp::from_secs(t);
            if a != b && a.strictly_dominates(&b, t) {
                prop_assert!(!b.strictly_dominates(&a, t));
            }
        }

        #[test]
        fn domination_is_irreflexive(a in arb_proposal(), t in -5i64..20) {
            prop_assert!(!a.strictly_dominates(&a, Timestamp::from_secs(t)));
        }
    }
}

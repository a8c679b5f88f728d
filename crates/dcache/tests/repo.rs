use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dcache::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::seq::SliceRandom;

fn t(secs: i64) -> Timestamp {
    Timestamp::from_secs(secs)
}

fn repo() -> DistributedRepo {
    DistributedRepo::new(&DcacheConfig::testing())
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&BucketPath, &str) + Send + Sync + 'static) {
    let n = Arc::new(AtomicUsize::new(0));
    let m = n.clone();
    (n, move |_: &BucketPath, _: &str| {
        m.fetch_add(1, Ordering::SeqCst);
    })
}

/// Process a signature from `signer` over `raw`.
fn sign(r: &mut DistributedRepo, raw: &str, signer: &str, at: Timestamp) {
    let sig = Message::signature(signer, content_hash(raw), format!("sig-of-{}", signer)).encode();
    assert_eq!(
        r.process_at(&sig, "chan", at).unwrap(),
        ProcessOutcome::SignatureRecorded
    );
}

#[test]
fn peer_is_valid_for_its_window() {
    dcache_trace::test_run().unwrap();
    let start = 1_700_000_000;
    let mut r = repo();
    let raw = Message::propose("peer", "peer123", Validity::secs(Some(start), Some(start + 600))).encode();
    r.process_at(&raw, "peer123", t(start)).unwrap();

    let peer = BucketPath::from("peer");
    assert_eq!(r.query_at(&peer, t(start + 1)).unwrap(), vec!["peer123"]);
    assert_eq!(r.query_at(&peer, t(start + 599)).unwrap(), vec!["peer123"]);
    assert!(r.query_at(&peer, t(start + 601)).unwrap().is_empty());
}

#[test]
fn same_propose_twice_is_idempotent() {
    let mut r = repo();
    let raw = Message::propose("peer", "x", Validity::secs(Some(0), None)).encode();
    assert_eq!(
        r.process_at(&raw, "c", t(1)).unwrap(),
        ProcessOutcome::Proposed {
            created: true,
            accepted: true
        }
    );
    let once = r.root().clone();
    assert_eq!(
        r.process_at(&raw, "c", t(1)).unwrap(),
        ProcessOutcome::Proposed {
            created: false,
            accepted: false
        }
    );
    assert_eq!(r.root(), &once);
    let item = r
        .root()
        .get_bucket(&"peer".into())
        .unwrap()
        .item("x")
        .unwrap();
    assert_eq!(item.proposals().len(), 1);
}

#[test]
fn two_proposes_commute() {
    let p1 = Message::propose("peer", "a", Validity::secs(Some(0), Some(100))).encode();
    let p2 = Message::propose("peer", "b", Validity::secs(Some(50), None)).encode();

    let mut r1 = repo();
    r1.process_at(&p1, "c", t(10)).unwrap();
    r1.process_at(&p2, "c", t(10)).unwrap();

    let mut r2 = repo();
    r2.process_at(&p2, "c", t(10)).unwrap();
    r2.process_at(&p1, "c", t(10)).unwrap();

    assert_eq!(r1.root(), r2.root());
}

#[test]
fn dismiss_overrides_propose() {
    let mut r = repo();
    let propose = Message::propose("peer", "x", Validity::secs(Some(0), None)).encode();
    sign(&mut r, &propose, "alice", t(0));
    r.process_at(&propose, "c", t(0)).unwrap();
    assert!(r.root().get_bucket(&"peer".into()).unwrap().item("x").unwrap().valid(t(5)));

    let dismiss = Message::dismiss("peer", "x", Validity::secs(Some(0), None)).encode();
    sign(&mut r, &dismiss, "carol", t(1));
    assert_eq!(
        r.process_at(&dismiss, "c", t(1)).unwrap(),
        ProcessOutcome::Dismissed { created: false }
    );
    assert!(r.query_at(&"peer".into(), t(5)).unwrap().is_empty());
    let summary = r.summary_dict_at(t(5));
    let fact = &summary.buckets["/peer"]["x"];
    assert!(fact.tombstoned);
    assert_eq!(fact.proposals, vec!["alice@[0, +inf)"]);
    assert_eq!(fact.dismissals, vec!["carol@[0, +inf)"]);
}

#[test]
fn private_bucket_needs_its_owner_signature() {
    let mut r = repo();
    let (hook_calls, hook) = counter();
    r.on_proposed(["pri", "bob"], hook);
    let path = BucketPath::from(["pri", "bob"]);

    let raw = Message::propose(path.clone(), "key", Validity::always()).encode();
    assert_eq!(
        r.process_at(&raw, "c", t(0)).unwrap(),
        ProcessOutcome::Rejected(RejectReason::UnsignedPrivateClaim { path: path.clone() })
    );
    assert!(r.root().get_bucket(&path).is_err());
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);

    // signed by someone else: still refused
    sign(&mut r, &raw, "mallory", t(0));
    assert!(matches!(
        r.process_at(&raw, "c", t(0)).unwrap(),
        ProcessOutcome::Rejected(_)
    ));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);

    sign(&mut r, &raw, "bob", t(0));
    assert_eq!(
        r.process_at(&raw, "c", t(0)).unwrap(),
        ProcessOutcome::Proposed {
            created: true,
            accepted: true
        }
    );
    assert_eq!(r.query_at(&path, t(1)).unwrap(), vec!["key"]);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

    // both signers end up as claimants
    let item = r.root().get_bucket(&path).unwrap().item("key").unwrap();
    let who: Vec<String> = item.proposals().iter().map(|p| p.who.to_string()).collect();
    assert_eq!(who, vec!["bob", "mallory"]);
}

#[test]
fn hooks_fire_on_creation_and_every_dismiss() {
    let mut r = repo();
    let (proposed, on_p) = counter();
    let (dismissed, on_d) = counter();
    r.on_proposed("peer", on_p);
    r.on_dismissed("peer", on_d);

    let a = Message::propose("peer", "x", Validity::secs(Some(0), Some(10))).encode();
    let b = Message::propose("peer", "x", Validity::secs(Some(0), Some(20))).encode();
    let d = Message::dismiss("peer", "x", Validity::secs(Some(5), Some(6))).encode();
    let other = Message::propose("elsewhere", "x", Validity::always()).encode();
    r.process_at(&a, "c", t(0)).unwrap();
    r.process_at(&b, "c", t(0)).unwrap();
    r.process_at(&d, "c", t(0)).unwrap();
    r.process_at(&d, "c", t(0)).unwrap();
    r.process_at(&other, "c", t(0)).unwrap();

    assert_eq!(proposed.load(Ordering::SeqCst), 1);
    assert_eq!(dismissed.load(Ordering::SeqCst), 2);
}

#[test]
fn failures_carry_the_message_and_do_not_poison_the_repo() {
    let mut r = repo();
    for bad in [
        "",
        "{",
        r#"{"mtype":"propose","bucket":["a"],"data":"x"}"#,
        r#"{"mtype":"propose","bucket":["a"],"data":"x","validity":[null,null],"to":"y"}"#,
        r#"{"mtype":"bogus"}"#,
    ] {
        let err = r.process_at(bad, "c", t(0)).unwrap_err();
        assert_eq!(err.raw, bad);
    }
    let good = Message::propose("a", "x", Validity::always()).encode();
    r.process_at(&good, "c", t(0)).unwrap();
    assert_eq!(r.query_at(&"a".into(), t(0)).unwrap(), vec!["x"]);
    assert_eq!(r.channel_stats("c").unwrap().n_received, 6);
}

#[derive(Debug)]
struct OnlyAlice;

impl SignatureVerifier for OnlyAlice {
    fn verify(&self, signer: &str, _data_hash: &str, _signature: &str) -> bool {
        signer == "alice"
    }
}

#[test]
fn verifier_gates_the_signature_index() {
    let mut r = repo().with_verifier(Arc::new(OnlyAlice));
    let raw = Message::propose("peer", "x", Validity::always()).encode();
    let by = |who: &str| Message::signature(who, content_hash(&raw), "s").encode();

    assert_eq!(
        r.process_at(&by("eve"), "c", t(0)).unwrap(),
        ProcessOutcome::Rejected(RejectReason::BadSignature {
            signer: "eve".into()
        })
    );
    assert_eq!(
        r.process_at(&by("alice"), "c", t(0)).unwrap(),
        ProcessOutcome::SignatureRecorded
    );
    assert_eq!(
        r.signers_for(&raw).into_iter().collect::<Vec<_>>(),
        vec![Claimant::from("alice")]
    );
}

#[test]
fn cleanup_collects_expired_facts_everywhere() {
    let mut r = repo();
    for (path, data, end) in [("a", "x", 10), ("a/b", "y", 10), ("a/b", "z", 100)] {
        let raw = Message::propose(path, data, Validity::secs(Some(0), Some(end))).encode();
        r.process_at(&raw, "c", t(0)).unwrap();
    }
    let notes = r.cleanup_at(t(50));
    assert!(notes.contains(&"a/x: collected".to_string()), "{:?}", notes);
    assert!(notes.contains(&"a/b/y: collected".to_string()), "{:?}", notes);

    let summary = r.summary_dict_at(t(50));
    assert!(summary.buckets["/a"].is_empty());
    assert_eq!(summary.buckets["/a/b"].keys().collect::<Vec<_>>(), vec!["z"]);
}

#[test]
fn claims_before_the_epoch_are_ignored() {
    let mut r = DistributedRepo::new(&DcacheConfig {
        ignore_before: t(1000),
        ..DcacheConfig::testing()
    });
    let old = Message::propose("peer", "old", Validity::secs(Some(10), None)).encode();
    let open = Message::propose("peer", "open", Validity::secs(None, None)).encode();
    let new = Message::propose("peer", "new", Validity::secs(Some(1000), None)).encode();
    for raw in [&old, &open, &new] {
        r.process_at(raw, "c", t(2000)).unwrap();
    }
    assert_eq!(r.query_at(&"peer".into(), t(2000)).unwrap(), vec!["new", "open"]);
}

#[test]
fn summary_messages_rebuild_the_repo() {
    let mut r = repo().with_clock(Arc::new(ManualClock::new(t(5))));
    let signed = Message::propose("peer", "a", Validity::secs(Some(0), None)).encode();
    sign(&mut r, &signed, "alice", t(0));
    r.process_at(&signed, "c", t(0)).unwrap();
    let anon = Message::propose("admin/trusted", "b", Validity::secs(Some(0), Some(100))).encode();
    r.process_at(&anon, "c", t(0)).unwrap();
    let gone = Message::dismiss("peer", "c", Validity::secs(Some(0), None)).encode();
    r.process_at(&gone, "c", t(0)).unwrap();

    let messages = r.summary_messages();
    assert_eq!(messages.len(), 4);

    let mut copy = repo();
    for m in &messages {
        copy.process_at(m, "replay", t(0)).unwrap();
    }
    assert_eq!(copy.summary_dict_at(t(5)).buckets, r.summary_dict_at(t(5)).buckets);
}

#[test]
fn summary_is_readable() {
    let mut r = repo();
    let raw = Message::propose("peer", "x", Validity::secs(Some(0), None)).encode();
    r.process_at(&raw, "c", t(0)).unwrap();
    let text = r.summary();
    assert!(text.contains("bucket /peer"), "{}", text);
    assert!(text.contains("x (valid)"), "{}", text);
    assert!(text.contains("channel c: sent 0 received 1"), "{}", text);
}

#[derive(Debug, Clone)]
struct Op {
    data: &'static str,
    start: Option<i64>,
    end: Option<i64>,
    signer: Option<&'static str>,
}

fn arb_op() -> impl Strategy<Value = Op> {
    (
        prop_oneof![Just("a"), Just("b")],
        proptest::option::of(0i64..20),
        proptest::option::of(0i64..40),
        prop_oneof![Just(None), Just(Some("alice")), Just(Some("bob"))],
    )
        .prop_map(|(data, start, end, signer)| Op {
            data,
            start,
            end,
            signer,
        })
}

proptest! {
    #[test]
    fn final_state_does_not_depend_on_order(ops in proptest::collection::vec(arb_op(), 1..12)) {
        let now = t(10);
        let raws: Vec<(String, Option<&'static str>)> = ops
            .iter()
            .map(|op| {
                let raw = Message::propose("peer", op.data, Validity::secs(op.start, op.end)).encode();
                (raw, op.signer)
            })
            .collect();

        let run = |order: &[(String, Option<&'static str>)]| {
            let mut r = repo();
            for (raw, signer) in &raws {
                if let Some(s) = signer {
                    let sig = Message::signature(*s, content_hash(raw), "s").encode();
                    r.process_at(&sig, "c", now).unwrap();
                }
            }
            for (raw, _) in order {
                r.process_at(raw, "c", now).unwrap();
            }
            r.root().clone()
        };

        let mut shuffled = raws.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        prop_assert_eq!(run(&raws[..]), run(&shuffled[..]));
    }
}

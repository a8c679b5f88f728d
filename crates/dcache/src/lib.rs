#![deny(missing_docs)]
#![deny(unsafe_code)]

//! A peer-to-peer cache of facts valid over time intervals.
//!
//! Facts live in a tree of buckets. Peers claim a fact holds during an
//! interval (propose) or revoke it (dismiss), and those claims spread
//! epidemically over an unreliable text transport. Processing is idempotent
//! and order-independent: a claim that is covered by a wider or better-signed
//! one is dominated and dropped, and a dismissal always wins over a proposal
//! covering the same instant.
//!
//! [`DistributedRepo`] is the entry point. [`GossipNode`] shows how a repo,
//! the fragment [`dcache_fragment::Assembler`] and a [`Transport`] fit
//! together.

mod bucket;
mod clock;
mod config;
mod envelope;
mod error;
mod hooks;
mod item;
mod node;
mod path;
mod proposal;
mod repo;
mod stats;
mod store;
mod verify;
mod wire;

pub use bucket::*;
pub use clock::*;
pub use config::*;
pub use envelope::*;
pub use error::*;
pub use hooks::*;
pub use item::*;
pub use node::*;
pub use path::*;
pub use proposal::*;
pub use repo::*;
pub use stats::*;
pub use store::*;
pub use verify::*;
pub use wire::*;

pub use dcache_fragment::content_hash;
pub use dcache_timestamp::Timestamp;

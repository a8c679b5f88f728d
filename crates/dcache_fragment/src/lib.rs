#![deny(missing_docs)]
#![deny(unsafe_code)]

//! Fragmentation and reassembly of payloads for size-constrained, line-oriented
//! channels.
//!
//! A payload too large for one line is cut into numbered chunks by
//! [`fragmentize`]. Each chunk travels as its own small JSON line carrying the
//! chunk index, the chunk count and a checksum of the whole payload. On the
//! receiving side an [`Assembler`] buffers chunks until a payload is complete,
//! verifies it against the checksum and hands it out through
//! [`Assembler::pop`]. Chunks may arrive in any order, more than once, or never.

mod assembler;
mod checksum;
mod fragment;

pub use assembler::*;
pub use checksum::*;
pub use fragment::*;

use serde::{Deserialize, Serialize};

use crate::content_hash;

/// The key whose presence marks a line as a fragment rather than a whole message.
pub const FRAGMENT_MARKER: &str = "fragment";

/// One numbered chunk of a larger payload, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// Zero-based index of this chunk
    pub fragment: usize,
    /// Total number of chunks in the payload
    pub n: usize,
    /// [`content_hash`] of the whole payload
    pub sha256_base58: String,
    /// The chunk bytes, base58 encoded
    pub chunk_base58: String,
}

impl Fragment {
    /// Serialize to a single JSON line (without the trailing newline).
    pub fn to_line(&self) -> String {
        serde_json::json!({
            "fragment": self.fragment,
            "n": self.n,
            "sha256_base58": self.sha256_base58,
            "chunk_base58": self.chunk_base58,
        })
        .to_string()
    }

    /// Decode the chunk bytes. `None` if the chunk is not valid base58.
    pub fn chunk_bytes(&self) -> Option<Vec<u8>> {
        bs58::decode(&self.chunk_base58).into_vec().ok()
    }
}

/// Split `payload` into fragment lines carrying at most `max_chunk_length` payload
/// bytes each.
///
/// A `max_chunk_length` of zero is treated as one. An empty payload still yields
/// a single (empty) fragment so the receiver can reproduce it.
pub fn fragmentize(payload: &str, max_chunk_length: usize) -> Vec<String> {
    let max_chunk_length = max_chunk_length.max(1);
    let bytes = payload.as_bytes();
    let checksum = content_hash(bytes);

    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(max_chunk_length).collect()
    };
    let n = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            Fragment {
                fragment: i,
                n,
                sha256_base58: checksum.clone(),
                chunk_base58: bs58::encode(chunk).into_string(),
            }
            .to_line()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunk_sizes() {
        let lines = fragmentize("abcdefg", 3);
        assert_eq!(lines.len(), 3);

        let frags: Vec<Fragment> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let chunks: Vec<Vec<u8>> = frags.iter().map(|f| f.chunk_bytes().unwrap()).collect();
        assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);
        assert!(frags.iter().all(|f| f.n == 3));
        assert!(frags.iter().all(|f| f.sha256_base58 == content_hash("abcdefg")));
        assert_eq!(
            frags.iter().map(|f| f.fragment).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn empty_payload_is_one_fragment() {
        let lines = fragmentize("", 10);
        assert_eq!(lines.len(), 1);
        let f: Fragment = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(f.n, 1);
        assert_eq!(f.chunk_bytes().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn zero_chunk_length_is_clamped() {
        assert_eq!(fragmentize("xyz", 0).len(), 3);
    }

    #[test]
    fn lines_carry_the_marker() {
        for line in fragmentize("hello world", 4) {
            let v: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert!(v.get(FRAGMENT_MARKER).is_some());
        }
    }
}

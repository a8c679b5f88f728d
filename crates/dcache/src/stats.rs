use std::time::Duration;

use dcache_timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Send and receive activity on one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Messages sent to the channel
    pub n_sent: u64,
    /// Messages received from the channel
    pub n_received: u64,
    /// Last send
    pub last_sent: Option<Timestamp>,
    /// Last receive
    pub last_received: Option<Timestamp>,
}

impl ChannelStats {
    /// Count one sent message
    pub fn record_sent(&mut self, now: Timestamp) {
        self.n_sent += 1;
        self.last_sent = Some(now);
    }

    /// Count one received message
    pub fn record_received(&mut self, now: Timestamp) {
        self.n_received += 1;
        self.last_received = Some(now);
    }

    /// The most recent send or receive
    pub fn last_activity(&self) -> Option<Timestamp> {
        self.last_sent.max(self.last_received)
    }

    /// Has there been no activity for at least `min_silence` as of `now`?
    /// Activity stamped in the future counts as recent.
    pub fn silent_for(&self, now: Timestamp, min_silence: Duration) -> bool {
        elapsed_at_least(self.last_activity(), now, min_silence)
    }
}

/// True if `last` is unset, or at least `d` before `now`.
pub(crate) fn elapsed_at_least(last: Option<Timestamp>, now: Timestamp, d: Duration) -> bool {
    match last {
        None => true,
        Some(last) => match now.elapsed_since(&last) {
            Some(elapsed) => elapsed >= d,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence() {
        let mut s = ChannelStats::default();
        let min = Duration::from_secs(10);
        assert!(s.silent_for(Timestamp::from_secs(0), min));

        s.record_received(Timestamp::from_secs(100));
        assert!(!s.silent_for(Timestamp::from_secs(105), min));
        assert!(s.silent_for(Timestamp::from_secs(110), min));

        s.record_sent(Timestamp::from_secs(108));
        assert!(!s.silent_for(Timestamp::from_secs(110), min));
        assert!(!s.silent_for(Timestamp::from_secs(50), min));
        assert_eq!((s.n_sent, s.n_received), (1, 1));
    }
}

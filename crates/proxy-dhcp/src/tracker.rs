//! Per-client chainload progress

use std::collections::HashSet;

/// Records which clients have already been offered the first-stage loader.
///
/// Keys are the raw bytes of the client machine identifier (option 97),
/// compared byte-for-byte. Clients that send no identifier all share the
/// empty key, so the first of them consumes the first stage on behalf of
/// the rest; that matches how such clients have always been handled here
/// and must not be changed quietly.
///
/// Entries are never evicted. Boot campaigns on a LAN stay small enough
/// that growth over one process lifetime is not a concern.
#[derive(Debug, Default)]
pub struct ChainloadTracker {
    served: HashSet<Vec<u8>>,
}

impl ChainloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one offer has been built for this identity
    pub fn has_been_served(&self, guid: &[u8]) -> bool {
        self.served.contains(guid)
    }

    /// Record that this identity has received an offer. Idempotent.
    pub fn mark_served(&mut self, guid: &[u8]) {
        self.served.insert(guid.to_vec());
    }
}

//! Entanglement bookkeeping.

use serde::{Deserialize, Serialize};

/// Remote memory a local memory is entangled with.
///
/// Node and memory are always set together; "not entangled" is `None` at
/// the use site.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntanglementPeer {
    pub node_id: String,
    pub memo_id: String,
}

impl EntanglementPeer {
    pub fn new(node_id: impl Into<String>, memo_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            memo_id: memo_id.into(),
        }
    }
}

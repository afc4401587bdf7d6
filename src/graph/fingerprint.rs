use serde::{Deserialize, Serialize};

use super::Node;

/// A stable content hash of a graph's nodes, used for identity-independent
/// equality and as the dedup key for the LLM response cache (spec §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "hex_bytes")] [u8; 32]);

impl Fingerprint {
    /// Hashes the node list alone, deliberately excluding `graph_id`,
    /// `parent_graph_id`, and `generation` so two structurally identical
    /// graphs fingerprint equal regardless of lineage.
    pub fn of_nodes(nodes: &[Node]) -> Self {
        // `nodes` is already in a stable (insertion) order; sort a owned
        // canonical JSON view by node id so two graphs built with the same
        // node set in different order still fingerprint identically.
        let mut canonical: Vec<_> = nodes.iter().collect();
        canonical.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let json = serde_json::to_vec(&canonical).expect("node list is always serializable");
        let hash = blake3::hash(&json);
        Self(*hash.as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("fingerprint must be 32 bytes"))
    }
}

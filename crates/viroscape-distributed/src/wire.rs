//! Messages exchanged between ranks during the sync phases.
//!
//! Every message travels as a bincode-encoded [`SyncMessage`] inside an
//! [`Envelope`]. Bincode writes `f64` values as their raw bits, so carried
//! remainders arrive unchanged.

use crate::package::AgentPackage;
use crate::types::{DistributedError, DistributedResult};
use serde::{Deserialize, Serialize};
use viroscape_core::{AgentId, GridPoint, RankId};

/// One agent in a buffer-zone export.
///
/// `package` is present only when the recipient does not yet hold a replica;
/// otherwise the entry just reports where the agent stands now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub id: AgentId,
    pub point: GridPoint,
    pub package: Option<AgentPackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Ownership hand-off of agents that crossed into the recipient's partition.
    Transfer { agents: Vec<(AgentPackage, GridPoint)> },
    /// The complete set of the sender's agents the recipient must mirror.
    BufferExport { entries: Vec<ExportEntry> },
    /// Ask the owner for the current state of these replicas.
    StateRequest { ids: Vec<AgentId> },
    StateReply { packages: Vec<AgentPackage> },
}

impl SyncMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::Transfer { .. } => "Transfer",
            SyncMessage::BufferExport { .. } => "BufferExport",
            SyncMessage::StateRequest { .. } => "StateRequest",
            SyncMessage::StateReply { .. } => "StateReply",
        }
    }
}

/// An encoded message with its routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: RankId,
    pub to: RankId,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn seal(from: RankId, to: RankId, message: &SyncMessage) -> DistributedResult<Self> {
        let payload = bincode::serialize(message).map_err(|e| DistributedError::Wire(e.to_string()))?;
        Ok(Self { from, to, payload })
    }

    pub fn open(&self) -> DistributedResult<SyncMessage> {
        bincode::deserialize(&self.payload).map_err(|e| DistributedError::Wire(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::provide;
    use viroscape_core::*;

    #[test]
    fn test_transfer_survives_encoding() {
        let id = AgentId::new(2, RankId::new(1), AgentKind::Specialised);
        let mut cell = SpecialisedImmuneCell::new(id, Vitals::new(4, 20), 0.6, 0.4, 0.7);
        cell.recruit.accrue();
        cell.recruit.accrue();
        let package = provide(&Agent::Specialised(cell));

        let message = SyncMessage::Transfer {
            agents: vec![(package.clone(), GridPoint::new(-3, 7))],
        };
        let envelope = Envelope::seal(RankId::new(1), RankId::new(0), &message).unwrap();
        let opened = envelope.open().unwrap();
        assert_eq!(opened, message);
        assert_eq!(opened.name(), "Transfer");
    }

    #[test]
    fn test_garbage_payload_is_wire_error() {
        let envelope = Envelope {
            from: RankId::new(0),
            to: RankId::new(1),
            payload: vec![7],
        };
        assert!(matches!(envelope.open(), Err(DistributedError::Wire(_))));
    }
}

//! Identity, location and state types shared by every agent kind.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Simulation time step counter.
pub type Tick = u64;

/// Identifier of a rank (one process in the partitioned simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RankId(pub i32);

impl RankId {
    /// Create a new rank identifier.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the underlying rank number.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for RankId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank-{}", self.0)
    }
}

/// The four agent kinds. The discriminant is the on-wire kind number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    Epithelial = 0,
    Virion = 1,
    Innate = 2,
    Specialised = 3,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Epithelial,
        AgentKind::Virion,
        AgentKind::Innate,
        AgentKind::Specialised,
    ];

    /// Kind number carried in identities and packages.
    pub fn discriminant(self) -> i32 {
        self as i32
    }

    /// Innate and specialised immune cells.
    pub fn is_immune(self) -> bool {
        matches!(self, AgentKind::Innate | AgentKind::Specialised)
    }
}

impl TryFrom<i32> for AgentKind {
    type Error = SimError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AgentKind::Epithelial),
            1 => Ok(AgentKind::Virion),
            2 => Ok(AgentKind::Innate),
            3 => Ok(AgentKind::Specialised),
            other => Err(SimError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Epithelial => write!(f, "epithelial"),
            AgentKind::Virion => write!(f, "virion"),
            AgentKind::Innate => write!(f, "innate"),
            AgentKind::Specialised => write!(f, "specialised"),
        }
    }
}

/// Process-wide agent identity.
///
/// `(seq, starting_rank, kind)` is the logical identity and never changes.
/// `current_rank` follows the agent when its owning partition changes, so
/// equality, hashing and ordering ignore it: a lookup with a
/// stale `current_rank` still finds the agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentId {
    pub seq: i32,
    pub starting_rank: RankId,
    pub kind: AgentKind,
    pub current_rank: RankId,
}

impl AgentId {
    /// Identity of an agent created on `rank`, which also owns it.
    pub fn new(seq: i32, rank: RankId, kind: AgentKind) -> Self {
        Self {
            seq,
            starting_rank: rank,
            kind,
            current_rank: rank,
        }
    }

    /// The same logical agent, owned by `rank`.
    pub fn on_rank(mut self, rank: RankId) -> Self {
        self.current_rank = rank;
        self
    }

    fn key(&self) -> (i32, RankId, AgentKind) {
        (self.seq, self.starting_rank, self.kind)
    }
}

impl PartialEq for AgentId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AgentId {}

impl Hash for AgentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for AgentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AgentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}@{}/{}",
            self.kind, self.seq, self.starting_rank.0, self.current_rank.0
        )
    }
}

/// A discrete grid location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by an offset. The result is not wrapped onto the torus.
    pub fn offset(self, (dx, dy): (i32, i32)) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The eight Moore-neighbour offsets, excluding the centre.
pub const MOORE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Biological truth of an epithelial cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InternalState {
    Healthy,
    Infected,
    Dead,
}

/// What other agents can perceive of an epithelial cell.
///
/// Decoupled from [`InternalState`] so that an infected cell can look
/// healthy during incubation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalState {
    SeeminglyHealthy,
    DisplayingViralProtein,
    DeadCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VirionState {
    Free,
    Dead,
    /// Entered a cell. Terminal, like `Dead`.
    Contained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImmuneState {
    Healthy,
    Dead,
}

/// What a cell asks to happen to one of its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Revive a dead neighbour through division.
    DivideInto,
    /// Pass the infection to a healthy neighbour.
    Infect,
}

/// A one-shot request from an epithelial cell to change a different cell.
///
/// Only the reconciliation procedure of the rank that owns `target` may act
/// on it, and only if the target still satisfies the request's guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborMutation {
    pub kind: MutationKind,
    pub target: AgentId,
}

impl NeighborMutation {
    pub fn divide_into(target: AgentId) -> Self {
        Self {
            kind: MutationKind::DivideInto,
            target,
        }
    }

    pub fn infect(target: AgentId) -> Self {
        Self {
            kind: MutationKind::Infect,
            target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rank_id_display() {
        let rank = RankId::new(3);
        assert_eq!(rank.as_i32(), 3);
        assert_eq!(format!("{}", rank), "rank-3");
    }

    #[test]
    fn test_kind_discriminants() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::try_from(kind.discriminant()).unwrap(), kind);
        }
        assert_eq!(AgentKind::try_from(4), Err(SimError::UnknownKind(4)));
        assert_eq!(AgentKind::try_from(-1), Err(SimError::UnknownKind(-1)));
    }

    #[test]
    fn test_identity_ignores_current_rank() {
        let id = AgentId::new(7, RankId::new(0), AgentKind::Virion);
        let moved = id.on_rank(RankId::new(2));
        assert_eq!(id, moved);
        assert_eq!(moved.current_rank, RankId::new(2));

        let mut set = HashSet::new();
        set.insert(id);
        assert!(set.contains(&moved));
    }

    #[test]
    fn test_identity_distinguishes_kind_and_origin() {
        let a = AgentId::new(1, RankId::new(0), AgentKind::Innate);
        let b = AgentId::new(1, RankId::new(0), AgentKind::Specialised);
        let c = AgentId::new(1, RankId::new(1), AgentKind::Innate);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_grid_point_offset() {
        let p = GridPoint::new(2, -3).offset((1, -1));
        assert_eq!(p, GridPoint::new(3, -4));
        assert_eq!(format!("{}", p), "(3, -4)");
    }

    #[test]
    fn test_moore_offsets_exclude_centre() {
        assert_eq!(MOORE_OFFSETS.len(), 8);
        assert!(!MOORE_OFFSETS.contains(&(0, 0)));
        let unique: HashSet<_> = MOORE_OFFSETS.iter().collect();
        assert_eq!(unique.len(), 8);
    }
}

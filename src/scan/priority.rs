//! Priority decision: rank positions by descending vehicle count.
//!
//! The ranking is pure. Equal counts keep the order the sides were visited
//! in, so a cycle with no vehicles at all ranks as `1234` when the rig turned
//! forward and `4321` when it turned in reverse.

use crate::scan::types::{Position, SideCount, POSITIONS_PER_CYCLE};
use std::fmt;

/// Permutation of all four positions, busiest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriorityOrder([Position; POSITIONS_PER_CYCLE]);

impl PriorityOrder {
    /// Ranked positions, busiest first.
    pub fn positions(&self) -> [Position; POSITIONS_PER_CYCLE] {
        self.0
    }

    /// Concatenated labels, e.g. `"2314"`.
    pub fn digits(&self) -> String {
        self.0.iter().map(|p| char::from(b'0' + p.get())).collect()
    }
}

impl Default for PriorityOrder {
    fn default() -> Self {
        Self(Position::ALL)
    }
}

impl fmt::Display for PriorityOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits())
    }
}

/// Ranks the four sides of a cycle.
///
/// `sides` is expected in visit order. Sorting is stable, so among equal
/// counts the side visited earlier comes first.
pub fn decide_priority(sides: &[SideCount; POSITIONS_PER_CYCLE]) -> PriorityOrder {
    let mut ranked = *sides;
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    PriorityOrder(ranked.map(|side| side.position))
}

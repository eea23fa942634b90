use super::*;

/// A coordinate's classification from the partial-derivative estimator.
///
/// Directions are named from the descent point of view: `Ascending` marks
/// a coordinate along which `f` grows under `+1` (so a descent step
/// subtracts along it), `Descending` marks one along which `f` grows under
/// `-1` (so a descent step adds along it). `Stationary` means neither
/// probe improved on the descent goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Stationary,
    Ascending,
    Descending,
}

impl Direction {
    pub fn is_stationary(&self) -> bool {
        matches!(self, Direction::Stationary)
    }
}

//! Track navigation policy.
//!
//! Moving past either end of the queue clamps to the boundary instead of
//! wrapping around.

/// Direction for [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

/// Index reached by moving one track from `current` in a queue of `len`.
///
/// Returns `current` unchanged at a boundary, the first track when nothing is
/// selected yet and `None` for an empty queue.
pub fn step(current: Option<usize>, len: usize, direction: Direction) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let Some(current) = current.map(|index| index.min(len - 1)) else {
        return Some(0);
    };

    Some(match direction {
        Direction::Forward => (current + 1).min(len - 1),
        Direction::Backward => current.saturating_sub(1),
    })
}

/// Track to play after `current` finished on its own, `None` at the end.
pub fn after_completion(current: usize, len: usize) -> Option<usize> {
    let next = current + 1;
    (next < len).then_some(next)
}

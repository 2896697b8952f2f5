//! # Waypoint navigation
//!
//! A pure transition function over an ordered waypoint list. The caller owns
//! the [`NavigatorState`], decides *when* a move is due (see
//! [`NavigatorState::move_due`]) and commits the returned [`Step`] only after
//! the move has actually been issued.

use autohunt_core::{Waypoint, WaypointMode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Where the navigator is on the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorState {
    pub index: usize,
    /// +1 walking forward, -1 walking back (only `back_and_forth` uses -1).
    pub direction: i8,
    pub last_move: Option<DateTime<Utc>>,
}

impl Default for NavigatorState {
    fn default() -> Self {
        Self {
            index: 0,
            direction: 1,
            last_move: None,
        }
    }
}

impl NavigatorState {
    /// Pull the index back into `[0, len - 1]` after the route shrank.
    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.index = 0;
        } else if self.index >= len {
            self.index = len - 1;
        }
    }

    /// True once `delay` has passed since the last move, or if there was none.
    pub fn move_due(&self, now: DateTime<Utc>, delay: Duration) -> bool {
        match self.last_move {
            None => true,
            Some(last) => now - last >= delay,
        }
    }
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Waypoint to walk to now.
    pub target: Waypoint,
    /// State to commit once the move went out.
    pub next: NavigatorState,
    /// `once` mode reached the end of the route.
    pub complete: bool,
}

/// Compute the next target and the state after it. `None` for an empty route.
pub fn advance(waypoints: &[Waypoint], mode: WaypointMode, state: &NavigatorState) -> Option<Step> {
    if waypoints.is_empty() {
        return None;
    }
    let last = waypoints.len() - 1;
    let index = state.index.min(last);
    let target = waypoints[index].clone();
    let mut next = NavigatorState { index, ..*state };

    let complete = match mode {
        WaypointMode::Loop => {
            next.index = (index + 1) % waypoints.len();
            false
        }
        WaypointMode::BackAndForth => {
            if last == 0 {
                next.index = 0;
            } else {
                // An end index turns back even if the route shrank under a
                // forward walk.
                let direction: i8 = if index == last {
                    -1
                } else if index == 0 || state.direction >= 0 {
                    1
                } else {
                    -1
                };
                let stepped = index as isize + direction as isize;
                next.index = stepped.clamp(0, last as isize) as usize;
                // Flip on arrival at an end, so the end is visited exactly once.
                next.direction = if next.index == last {
                    -1
                } else if next.index == 0 {
                    1
                } else {
                    direction
                };
            }
            false
        }
        WaypointMode::Once => {
            if index == last {
                true
            } else {
                next.index = index + 1;
                false
            }
        }
    };

    Some(Step {
        target,
        next,
        complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(n: usize) -> Vec<Waypoint> {
        (0..n)
            .map(|i| Waypoint::new(format!("wp{i}"), i as i32 * 10, 0))
            .collect()
    }

    fn visit(waypoints: &[Waypoint], mode: WaypointMode, steps: usize) -> Vec<String> {
        let mut state = NavigatorState::default();
        let mut names = Vec::new();
        for _ in 0..steps {
            let step = advance(waypoints, mode, &state).unwrap();
            names.push(step.target.name);
            state = step.next;
        }
        names
    }

    #[test]
    fn empty_route_is_a_noop() {
        assert!(advance(&[], WaypointMode::Loop, &NavigatorState::default()).is_none());
    }

    #[test]
    fn single_waypoint_every_mode() {
        let wps = route(1);
        for mode in [WaypointMode::Loop, WaypointMode::BackAndForth] {
            assert_eq!(visit(&wps, mode, 3), ["wp0", "wp0", "wp0"]);
        }
        let step = advance(&wps, WaypointMode::Once, &NavigatorState::default()).unwrap();
        assert!(step.complete);
    }

    #[test]
    fn loop_wraps_around() {
        assert_eq!(
            visit(&route(3), WaypointMode::Loop, 5),
            ["wp0", "wp1", "wp2", "wp0", "wp1"]
        );
    }

    #[test]
    fn stale_index_is_clamped() {
        let state = NavigatorState {
            index: 7,
            ..NavigatorState::default()
        };
        let step = advance(&route(2), WaypointMode::Loop, &state).unwrap();
        assert_eq!(step.target.name, "wp1");
        assert_eq!(step.next.index, 0);
    }

    #[test]
    fn back_and_forth_visits_each_waypoint_in_turn() {
        assert_eq!(
            visit(&route(3), WaypointMode::BackAndForth, 6),
            ["wp0", "wp1", "wp2", "wp1", "wp0", "wp1"]
        );
    }

    #[test]
    fn back_and_forth_turns_at_new_end_after_shrink() {
        let long = route(4);
        let mut state = NavigatorState::default();
        for _ in 0..2 {
            state = advance(&long, WaypointMode::BackAndForth, &state).unwrap().next;
        }
        assert_eq!((state.index, state.direction), (2, 1));

        let short = route(3);
        let mut names = Vec::new();
        for _ in 0..3 {
            let step = advance(&short, WaypointMode::BackAndForth, &state).unwrap();
            names.push(step.target.name);
            state = step.next;
        }
        assert_eq!(names, ["wp2", "wp1", "wp0"]);
    }

    #[test]
    fn clamp_state() {
        let mut state = NavigatorState {
            index: 4,
            ..NavigatorState::default()
        };
        state.clamp(3);
        assert_eq!(state.index, 2);
        state.clamp(0);
        assert_eq!(state.index, 0);
    }

    #[test]
    fn move_gate() {
        let now = Utc::now();
        let delay = Duration::milliseconds(1000);
        let mut state = NavigatorState::default();
        assert!(state.move_due(now, delay));
        state.last_move = Some(now);
        assert!(!state.move_due(now + Duration::milliseconds(999), delay));
        assert!(state.move_due(now + Duration::milliseconds(1000), delay));
    }
}

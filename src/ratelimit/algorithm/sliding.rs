//! Sliding window: a fixed-size window re-anchored at the first request
//! after the previous one expired.
//!
//! This is not a log-based sliding window. Two full bursts either side of
//! an anchor boundary are both admitted.

use tracing::debug;

use super::{Decision, StoreWrite};
use crate::ratelimit::limiters::WindowLimit;
use crate::ratelimit::window::{current_window, is_new_window};
use crate::store::UserState;

pub fn evaluate(state: &UserState, limit: &WindowLimit, now: f64) -> Decision {
    let interval = limit.interval as f64;
    let window = current_window(now, None);

    let mut writes = Vec::with_capacity(2);
    let mut requests = state.requests;
    let mut anchor = state.last_window;

    // Whole-second truncation alone would deny with a zero wait for the
    // sub-second tail past the interval.
    let stale = is_new_window(state.last_window, window, Some(limit.interval))
        || window - state.last_window > interval;

    if stale {
        let mut reset = state.clone();
        reset.requests = 0;
        reset.last_window = window;
        writes.push(StoreWrite::Exact(reset));
        requests = 0;
        anchor = window;
    }

    if requests >= limit.max_requests {
        let time_left = (interval - (window - anchor)).max(0.0);
        debug!(
            key = %state.key,
            requests = requests,
            max_requests = limit.max_requests,
            time_left = time_left,
            "Sliding window exhausted"
        );
        return Decision {
            admitted: false,
            time_left: Some(time_left),
            writes,
            ..Default::default()
        };
    }

    writes.push(StoreWrite::Relative(1));
    Decision {
        admitted: true,
        writes,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::LimiterType;

    fn limit(max_requests: u64, interval: u64) -> WindowLimit {
        WindowLimit {
            max_requests,
            interval,
        }
    }

    fn state(requests: u64, last_window: f64) -> UserState {
        let mut state = UserState::new("count:user:sliding:u1", LimiterType::Sliding, last_window);
        state.requests = requests;
        state
    }

    #[test]
    fn test_rejects_with_time_until_anchor_expires() {
        let decision = evaluate(&state(3, 1000.0), &limit(3, 60), 1015.0);
        assert!(!decision.admitted);
        assert_eq!(decision.time_left, Some(45.0));
        assert!(decision.writes.is_empty());
    }

    #[test]
    fn test_window_is_not_clock_aligned() {
        // Same counts as a fixed window would see, but anchored at t=1000
        let decision = evaluate(&state(3, 1000.0), &limit(3, 60), 1059.0);
        assert!(!decision.admitted);
        assert_eq!(decision.time_left, Some(1.0));
    }

    #[test]
    fn test_check_after_interval_resets_and_reanchors() {
        for epsilon in [0.25, 1.0, 30.0] {
            let now = 1000.0 + 60.0 + epsilon;
            let decision = evaluate(&state(3, 1000.0), &limit(3, 60), now);
            assert!(decision.admitted, "epsilon {}", epsilon);

            match &decision.writes[0] {
                StoreWrite::Exact(reset) => {
                    assert_eq!(reset.requests, 0);
                    assert_eq!(reset.last_window, now);
                }
                other => panic!("expected exact reset, got {:?}", other),
            }
            assert_eq!(decision.writes[1], StoreWrite::Relative(1));
        }
    }

    #[test]
    fn test_exactly_at_interval_is_same_window() {
        let decision = evaluate(&state(3, 1000.0), &limit(3, 60), 1060.0);
        assert!(!decision.admitted);
        assert_eq!(decision.time_left, Some(0.0));
    }
}

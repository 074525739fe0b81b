//! Fixed window: clock-aligned windows shared by every identifier.

use tracing::debug;

use super::{Decision, StoreWrite};
use crate::ratelimit::limiters::WindowLimit;
use crate::ratelimit::window::{current_window, is_new_window};
use crate::store::UserState;

pub fn evaluate(state: &UserState, limit: &WindowLimit, now: f64) -> Decision {
    let interval = limit.interval as f64;
    let window = current_window(now, Some(limit.interval));

    let mut writes = Vec::with_capacity(2);
    let mut requests = state.requests;

    if is_new_window(state.last_window, window, None) {
        let mut reset = state.clone();
        reset.requests = 0;
        reset.last_window = window;
        writes.push(StoreWrite::Exact(reset));
        requests = 0;
    }

    if requests >= limit.max_requests {
        // Measured against the clock grid, not the stored window
        let time_left = interval - window.fract() * interval;
        debug!(
            key = %state.key,
            requests = requests,
            max_requests = limit.max_requests,
            time_left = time_left,
            "Fixed window exhausted"
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

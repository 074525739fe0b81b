//! Borrow: a single-holder lease with a timeout.
//!
//! `start` takes the lease when nobody holds it or the holder's lease has
//! timed out; `end` always releases it. The timeout is the only protection
//! against a holder that never calls `end`.

use tracing::debug;

use super::{Decision, StoreWrite};
use crate::ratelimit::limiters::{BorrowAction, BorrowLimit};
use crate::ratelimit::window::current_window;
use crate::store::UserState;

pub fn evaluate(state: &UserState, limit: &BorrowLimit, now: f64) -> Decision {
    let window = current_window(now, None);

    match limit.action {
        BorrowAction::Start => {
            let held_for = window - state.last_window;
            let timeout = limit.timeout as f64;

            if state.requests == 0 || held_for >= timeout {
                let mut taken = state.clone();
                taken.requests = 1;
                taken.last_window = window;
                return Decision {
                    admitted: true,
                    writes: vec![StoreWrite::Exact(taken)],
                    ..Default::default()
                };
            }

            let time_left = (timeout - held_for).max(0.0);
            debug!(
                key = %state.key,
                held_for = held_for,
                time_left = time_left,
                "Lease already held"
            );
            Decision {
                admitted: false,
                time_left: Some(time_left),
                ..Default::default()
            }
        }
        BorrowAction::End => {
            let mut released = state.clone();
            released.requests = 0;
            Decision {
                admitted: true,
                writes: vec![StoreWrite::Exact(released)],
                ..Default::default()
            }
        }
    }
}

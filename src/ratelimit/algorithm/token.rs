//! Token bucket.
//!
//! The stored counter is the number of tokens consumed. Every whole
//! interval elapsed since `last_window` gives back `tokens_per_replenish`
//! tokens; `last_window` is kept in interval units.

use tracing::debug;

use super::{Decision, StoreWrite};
use crate::ratelimit::limiters::TokenLimit;
use crate::ratelimit::window::current_window;
use crate::store::UserState;

pub fn evaluate(state: &UserState, limit: &TokenLimit, now: f64) -> Decision {
    let interval = limit.interval as f64;
    let window = current_window(now, Some(limit.interval));

    // Replenishing happens in whole ticks only
    let ticks = (window - state.last_window).abs().trunc() as u64;
    let replenished = ticks.saturating_mul(limit.tokens_per_replenish);

    let mut consumed = state.requests;
    let mut last_window = state.last_window;
    if replenished > 0 {
        consumed = consumed.saturating_sub(replenished);
        last_window = window;
    }

    if consumed + limit.tokens_cost > limit.max_tokens {
        // Nothing is written, so the stored tick grid still applies
        let elapsed = (window - state.last_window).abs().fract();
        let tick_remaining = (interval - elapsed * interval).clamp(0.0, interval);
        let tokens_left = limit.max_tokens.saturating_sub(consumed);
        debug!(
            key = %state.key,
            consumed = consumed,
            tokens_cost = limit.tokens_cost,
            max_tokens = limit.max_tokens,
            "Token bucket exhausted"
        );
        return Decision {
            admitted: false,
            time_left: Some(tick_remaining),
            tokens_left: Some(tokens_left as f64),
            ..Default::default()
        };
    }

    // Time left in the tick that started at the saved `last_window`
    let tick_remaining = (interval - (window - last_window) * interval).clamp(0.0, interval);

    let consumed = consumed + limit.tokens_cost;
    let mut updated = state.clone();
    updated.requests = consumed;
    updated.last_window = last_window;
    updated.interval = Some(limit.interval);
    updated.max_tokens = Some(limit.max_tokens);

    Decision {
        admitted: true,
        time_left: None,
        tokens_left: Some((limit.max_tokens - consumed) as f64),
        next_replenish_in: Some(tick_remaining),
        writes: vec![StoreWrite::Exact(updated)],
    }
}

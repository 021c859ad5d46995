//! Token bucket state and its atomic transition.
//!
//! Refill is lazy: each admission check credits `floor(elapsed_minutes * rate)`
//! tokens, capped at `burst`, and only moves `last_refill` forward when at
//! least one token was credited. The same arithmetic runs in Rust for the
//! in-process backend and as a Lua script on Redis.

use std::num::NonZeroU32;
use std::sync::LazyLock;
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use super::CacheError;

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Refill rate, capacity and key TTL of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    /// Tokens credited per minute
    pub rate: NonZeroU32,
    /// Capacity
    pub burst: NonZeroU32,
    /// Idle expiry of the stored state, `None` keeps it forever
    pub ttl: Option<Duration>,
}

impl BucketConfig {
    /// Build a config, clamping zero rate or burst to one.
    pub fn new(rate: u32, burst: u32, ttl: Option<Duration>) -> Self {
        Self {
            rate: NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN),
            burst: NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN),
            ttl,
        }
    }
}

/// Persisted bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    #[serde(rename = "rate_limit")]
    pub rate: u32,
    #[serde(rename = "burst_limit")]
    pub burst: u32,
    #[serde(rename = "remaining_tokens")]
    pub remaining: u32,
    /// Unix milliseconds of the last refill that credited tokens
    pub last_refill: u64,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDecision {
    pub admitted: bool,
    pub remaining: u32,
}

impl BucketState {
    /// Apply one admission check at `now_ms`.
    ///
    /// A missing state is a full bucket. Rejections leave `remaining`
    /// untouched. The configured rate and burst always win over whatever was
    /// stored, and a stored `remaining` above the current burst is clamped.
    pub fn admit(
        previous: Option<BucketState>,
        config: &BucketConfig,
        now_ms: u64,
    ) -> (BucketState, BucketDecision) {
        let rate = config.rate.get();
        let burst = config.burst.get();

        let mut state = match previous {
            None => BucketState {
                rate,
                burst,
                remaining: burst,
                last_refill: now_ms,
            },
            Some(prev) => BucketState {
                rate,
                burst,
                remaining: prev.remaining.min(burst),
                last_refill: prev.last_refill,
            },
        };

        let elapsed_ms = now_ms.saturating_sub(state.last_refill);
        let new_tokens = elapsed_ms.saturating_mul(u64::from(rate)) / MILLIS_PER_MINUTE;
        if new_tokens > 0 {
            let refilled = u64::from(state.remaining).saturating_add(new_tokens);
            state.remaining = refilled.min(u64::from(burst)) as u32;
            state.last_refill = now_ms;
        }

        let admitted = state.remaining > 0;
        if admitted {
            state.remaining -= 1;
        }

        (
            state,
            BucketDecision {
                admitted,
                remaining: state.remaining,
            },
        )
    }
}

/// KEYS[1] bucket key; ARGV rate, burst, now (ms), ttl (ms, 0 = persist).
/// Returns {admitted, remaining}.
static TAKE_TOKEN_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local stored = redis.call('HMGET', KEYS[1], 'remaining', 'last_refill')
local remaining = tonumber(stored[1])
local last_refill = tonumber(stored[2])

if remaining == nil or last_refill == nil then
  remaining = burst
  last_refill = now
end
if remaining > burst then remaining = burst end
if remaining < 0 then remaining = 0 end

local elapsed = now - last_refill
if elapsed > 0 then
  local new_tokens = math.floor(elapsed * rate / 60000)
  if new_tokens > 0 then
    remaining = math.min(burst, remaining + new_tokens)
    last_refill = now
  end
end

local admitted = 0
if remaining > 0 then
  remaining = remaining - 1
  admitted = 1
end

redis.call('HSET', KEYS[1], 'rate', rate, 'burst', burst, 'remaining', remaining, 'last_refill', last_refill)
if ttl > 0 then
  redis.call('PEXPIRE', KEYS[1], ttl)
else
  redis.call('PERSIST', KEYS[1])
end
return {admitted, remaining}
"#,
    )
});

pub(super) async fn take_token_redis(
    conn: &mut ConnectionManager,
    key: &str,
    config: &BucketConfig,
    now_ms: u64,
) -> Result<BucketDecision, CacheError> {
    let ttl_ms = config.ttl.map(|ttl| ttl.as_millis() as u64).unwrap_or(0);

    let (admitted, remaining): (i64, i64) = TAKE_TOKEN_SCRIPT
        .key(key)
        .arg(config.rate.get())
        .arg(config.burst.get())
        .arg(now_ms)
        .arg(ttl_ms)
        .invoke_async(conn)
        .await?;

    Ok(BucketDecision {
        admitted: admitted == 1,
        remaining: remaining.max(0) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: u64 = MILLIS_PER_MINUTE;

    fn config(rate: u32, burst: u32) -> BucketConfig {
        BucketConfig::new(rate, burst, None)
    }

    /// Run `n` checks at the same instant, returning how many were admitted.
    fn drain(state: &mut Option<BucketState>, config: &BucketConfig, now: u64, n: usize) -> usize {
        let mut admitted = 0;
        for _ in 0..n {
            let (next, decision) = BucketState::admit(*state, config, now);
            assert!(next.remaining <= config.burst.get());
            *state = Some(next);
            if decision.admitted {
                admitted += 1;
            }
        }
        admitted
    }

    #[test]
    fn test_fresh_bucket_admits_exactly_burst() {
        for burst in [1, 2, 5, 17] {
            let cfg = config(1, burst);
            let mut state = None;
            assert_eq!(drain(&mut state, &cfg, 1_000, burst as usize), burst as usize);

            let (_, decision) = BucketState::admit(state, &cfg, 1_000);
            assert!(!decision.admitted, "request {} should be rejected", burst + 1);
        }
    }

    #[test]
    fn test_first_request_consumes_one_token() {
        let cfg = config(10, 5);
        let (state, decision) = BucketState::admit(None, &cfg, 42);
        assert!(decision.admitted);
        assert_eq!(state.remaining, 4);
        assert_eq!(state.last_refill, 42);
        assert_eq!(state.rate, 10);
        assert_eq!(state.burst, 5);
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let cfg = config(1, 2);
        let mut state = None;
        drain(&mut state, &cfg, 0, 2);

        let before = state.unwrap();
        let (after, decision) = BucketState::admit(state, &cfg, 1);
        assert!(!decision.admitted);
        assert_eq!(after.remaining, 0);
        assert_eq!(after.last_refill, before.last_refill);
    }

    #[test]
    fn test_refill_after_wait_is_floor_of_elapsed_times_rate() {
        let cfg = config(2, 10);
        let mut state = None;
        drain(&mut state, &cfg, 0, 10);

        // 2.5 minutes at 2/min credits 5 tokens.
        let later = 2 * MINUTE + MINUTE / 2;
        assert_eq!(drain(&mut state, &cfg, later, 20), 5);
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let cfg = config(100, 3);
        let mut state = None;
        drain(&mut state, &cfg, 0, 3);

        assert_eq!(drain(&mut state, &cfg, 60 * MINUTE, 10), 3);
    }

    #[test]
    fn test_partial_interval_does_not_move_clock() {
        let cfg = config(1, 1);
        let (state, _) = BucketState::admit(None, &cfg, 0);

        // 40 s at 1/min credits nothing; last_refill must stay at 0.
        let (state, decision) = BucketState::admit(Some(state), &cfg, 40_000);
        assert!(!decision.admitted);
        assert_eq!(state.last_refill, 0);

        // Another 40 s: 80 s since the last credit, one token.
        let (state, decision) = BucketState::admit(Some(state), &cfg, 80_000);
        assert!(decision.admitted);
        assert_eq!(state.last_refill, 80_000);
    }

    #[test]
    fn test_clock_going_backwards_credits_nothing() {
        let cfg = config(60, 2);
        let mut state = None;
        drain(&mut state, &cfg, 10 * MINUTE, 2);

        let (next, decision) = BucketState::admit(state, &cfg, 0);
        assert!(!decision.admitted);
        assert_eq!(next.last_refill, 10 * MINUTE);
    }

    #[test]
    fn test_stored_remaining_clamped_to_new_burst() {
        let stored = BucketState {
            rate: 60,
            burst: 100,
            remaining: 80,
            last_refill: 0,
        };
        let cfg = config(1, 5);
        let (state, decision) = BucketState::admit(Some(stored), &cfg, 0);
        assert!(decision.admitted);
        assert_eq!(state.remaining, 4);
        assert_eq!(state.burst, 5);
    }

    #[test]
    fn test_remaining_stays_within_bounds_over_mixed_traffic() {
        let cfg = config(7, 9);
        let mut state = None;
        let mut now = 0u64;
        // Deterministic irregular arrival pattern.
        for i in 0..2_000u64 {
            now += (i * 7_919) % 23_000;
            let (next, decision) = BucketState::admit(state, &cfg, now);
            assert!(next.remaining <= 9);
            assert_eq!(decision.remaining, next.remaining);
            state = Some(next);
        }
    }

    #[test]
    fn test_zero_config_clamped() {
        let cfg = BucketConfig::new(0, 0, None);
        assert_eq!(cfg.rate.get(), 1);
        assert_eq!(cfg.burst.get(), 1);
    }

    #[test]
    fn test_state_json_field_names() {
        let state = BucketState {
            rate: 1,
            burst: 5,
            remaining: 3,
            last_refill: 99,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["rate_limit"], 1);
        assert_eq!(json["burst_limit"], 5);
        assert_eq!(json["remaining_tokens"], 3);
        assert_eq!(json["last_refill"], 99);
    }
}

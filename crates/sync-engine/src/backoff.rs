//! Exponential backoff with jitter for task retries.

use rand::Rng;

const BASE_DELAYS_SECS: [u64; 5] = [2, 4, 8, 16, 32];

pub const MAX_RETRIES_WRITE: u32 = 5;
pub const MAX_RETRIES_IMPORT: u32 = 3;

/// Delay before retry attempt `retry` (0-indexed), `base_delays[retry]`
/// (capped at the last entry for retries beyond the table) plus
/// `U(0, base/2)` jitter.
pub fn delay_for(retry: u32) -> std::time::Duration {
    let base = BASE_DELAYS_SECS[(retry as usize).min(BASE_DELAYS_SECS.len() - 1)];
    let jitter: f64 = rand::thread_rng().gen_range(0.0..(base as f64 / 2.0));
    std::time::Duration::from_secs_f64(base as f64 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_retry_count() {
        let first = delay_for(0).as_secs_f64();
        let last = delay_for(4).as_secs_f64();
        assert!(first < last);
    }

    #[test]
    fn delay_beyond_table_caps_at_last_entry() {
        let at_cap = delay_for(4).as_secs_f64();
        let beyond = delay_for(10).as_secs_f64();
        assert!(beyond <= 32.0 + 16.0 + 0.001);
        assert!(at_cap <= 32.0 + 16.0 + 0.001);
    }

    #[test]
    fn jitter_never_makes_delay_shrink_below_base() {
        for retry in 0..5 {
            let base = BASE_DELAYS_SECS[retry as usize];
            assert!(delay_for(retry).as_secs_f64() >= base as f64);
        }
    }
}

//! Duration conversions used when reporting timings.

use std::time::Duration;

pub fn duration_to_ns(d: Duration) -> f64 {
    d.as_nanos() as f64
}

pub fn duration_to_us(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000.0
}

/// StatsD timings are expressed in milliseconds.
pub fn duration_to_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

pub fn duration_to_s(d: Duration) -> f64 {
    d.as_secs_f64()
}

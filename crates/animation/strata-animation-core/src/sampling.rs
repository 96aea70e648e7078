//! Keyframe sampling for clip tracks.
//!
//! Model:
//! - Key times are in seconds and non-decreasing (validated at load).
//! - Joint tracks interpolate linearly between the bracketing keys: translation
//!   and scale lerp, rotation slerps.
//! - Channel tracks step (hold left); they carry flags and trigger values.
//! - Times before the first key or after the last clamp to that key.

use crate::clip::{ChannelKey, JointKey};
use crate::transform::Transform;

/// Find the segment `[i, i+1]` containing `t` and return `(i, i+1, local_t)`.
/// Before the first key returns `(0, 0, 0)`, past the last `(last, last, 0)`.
fn find_segment(times: impl Fn(usize) -> f32, n: usize, t: f32) -> (usize, usize, f32) {
    if n == 0 || n == 1 || t <= times(0) {
        return (0, 0, 0.0);
    }
    if t >= times(n - 1) {
        return (n - 1, n - 1, 0.0);
    }
    // First index whose time is > t; the segment ends there.
    let (mut lo, mut hi) = (0usize, n - 1);
    while lo + 1 < hi {
        let mid = (lo + hi) / 2;
        if times(mid) <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let t0 = times(lo);
    let t1 = times(hi);
    let denom = (t1 - t0).max(f32::EPSILON);
    (lo, hi, ((t - t0) / denom).clamp(0.0, 1.0))
}

/// Sample a joint track at `time` seconds. `None` only for an empty track.
pub fn sample_joint_track(keys: &[JointKey], time: f32) -> Option<Transform> {
    match keys.len() {
        0 => None,
        1 => Some(keys[0].transform),
        n => {
            let (i0, i1, lt) = find_segment(|i| keys[i].time, n, time);
            if i0 == i1 {
                return Some(keys[i0].transform);
            }
            Some(keys[i0].transform.lerp(&keys[i1].transform, lt))
        }
    }
}

/// Sample a channel track at `time` seconds, holding the last key at or before it.
pub fn sample_channel_track(keys: &[ChannelKey], time: f32) -> Option<f32> {
    match keys.len() {
        0 => None,
        n => {
            let (i0, _, _) = find_segment(|i| keys[i].time, n, time);
            Some(keys[i0].value)
        }
    }
}

/// Euclidean modulo for clip-local time; non-positive periods yield 0.
#[inline]
pub fn fmod(t: f32, period: f32) -> f32 {
    if period <= 0.0 || !t.is_finite() {
        return 0.0;
    }
    let r = t % period;
    if r < 0.0 {
        r + period
    } else {
        r
    }
}

/// Map accumulated state time into clip-local time: loop with wrap, otherwise clamp.
#[inline]
pub fn clip_local_time(t: f32, duration: f32, looping: bool) -> f32 {
    if looping {
        fmod(t, duration)
    } else {
        t.clamp(0.0, duration.max(0.0))
    }
}

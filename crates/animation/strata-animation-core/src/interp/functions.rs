//! Interpolation helpers:
//! - scalar/vector lerp
//! - quaternion NLERP (N-way accumulation) and SLERP (two-way fades), both shortest-arc
//! - quaternion product, inverse and vector rotation for transform composition

/// Identity quaternion (x, y, z, w).
pub const QUAT_IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
    ]
}

#[inline]
pub fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

/// Normalize a quaternion; degenerate input collapses to identity.
#[inline]
pub fn normalize4(q: [f32; 4]) -> [f32; 4] {
    let len2 = dot4(q, q);
    if len2 > 0.0 && len2.is_finite() {
        let inv_len = len2.sqrt().recip();
        [q[0] * inv_len, q[1] * inv_len, q[2] * inv_len, q[3] * inv_len]
    } else {
        QUAT_IDENTITY
    }
}

#[inline]
fn negate4(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], -q[3]]
}

/// Quaternion NLERP with shortest-arc correction.
/// If dot < 0, negate the second quaternion to ensure the shortest path.
/// Returns a normalized quaternion (x,y,z,w).
#[inline]
pub fn nlerp_quat(a: [f32; 4], mut b: [f32; 4], t: f32) -> [f32; 4] {
    if dot4(a, b) < 0.0 {
        b = negate4(b);
    }
    normalize4([
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
        lerp_f32(a[3], b[3], t),
    ])
}

/// Spherical interpolation between two unit quaternions along the shortest arc.
pub fn slerp_quat(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let qa = normalize4(a);
    let mut qb = normalize4(b);

    let mut dot = dot4(qa, qb);
    if dot < 0.0 {
        qb = negate4(qb);
        dot = -dot;
    }

    // Nearly parallel: NLERP is indistinguishable and avoids dividing by sin(~0).
    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return nlerp_quat(qa, qb, t);
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    normalize4([
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ])
}

/// Hamilton product `a * b` (apply `b` first, then `a`).
#[inline]
pub fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

/// Inverse of a unit quaternion.
#[inline]
pub fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Rotate `v` by unit quaternion `q`.
#[inline]
pub fn quat_rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    // v' = v + 2w(u x v) + 2u x (u x v)
    let u = [q[0], q[1], q[2]];
    let w = q[3];
    let c1 = cross(u, v);
    let c2 = cross(u, c1);
    [
        v[0] + 2.0 * (w * c1[0] + c2[0]),
        v[1] + 2.0 * (w * c1[1] + c2[1]),
        v[2] + 2.0 * (w * c1[2] + c2[2]),
    ]
}

#[inline]
fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

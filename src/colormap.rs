//! Diverging cool-warm palette (blue through light gray to red).

/// Evenly spaced control points from `t = 0` to `t = 1`.
const COOLWARM: [[u8; 3]; 9] = [
    [59, 76, 192],
    [98, 130, 234],
    [141, 176, 254],
    [184, 208, 249],
    [221, 221, 221],
    [245, 196, 173],
    [244, 154, 123],
    [222, 96, 77],
    [180, 4, 38],
];

/// Sample the palette at `t` (clamped to `[0, 1]`) as opaque straight-alpha RGBA8.
pub fn coolwarm(t: f64) -> [u8; 4] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (COOLWARM.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(COOLWARM.len() - 2);
    let frac = scaled - i as f64;

    let a = COOLWARM[i];
    let b = COOLWARM[i + 1];
    let lerp = |ca: u8, cb: u8| -> u8 {
        (f64::from(ca) + (f64::from(cb) - f64::from(ca)) * frac)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    [lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2]), 255]
}

//! Integer range helpers

/// Linearly re-map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Integer arithmetic, truncating toward zero. Values outside the input range
/// extrapolate; pair with [`constrain`] to clamp. A degenerate input range
/// maps everything to `out_min`.
pub const fn map_range(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    let in_span = in_max as i64 - in_min as i64;
    if in_span == 0 {
        return out_min;
    }
    let scaled = (value as i64 - in_min as i64) * (out_max as i64 - out_min as i64) / in_span;
    (scaled + out_min as i64) as i32
}

/// Clamp `value` to `[min, max]`.
pub const fn constrain(value: i32, min: i32, max: i32) -> i32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

use crate::Id;

/// Does `v` lie on the arc that runs clockwise from `lo` to `hi`?
///
/// `lo` and `hi` are plain ring positions (already reduced mod `2^m` by the
/// caller); this function doesn't need `m` itself, only whether `lo <= hi`
/// numerically or the arc wraps past the ring's zero point.
///
/// When `lo == hi` the arc covers either the whole ring or nothing,
/// depending only on the inclusivity flags - that degenerate case is called
/// out explicitly because a naive `lo < val < hi` test gets it wrong in both
/// directions.
pub fn in_range(v: Id, lo: Id, hi: Id, inc_lo: bool, inc_hi: bool) -> bool {
    if lo == hi {
        return inc_lo || inc_hi;
    }

    if lo < hi {
        match (inc_lo, inc_hi) {
            (true, true) => lo <= v && v <= hi,
            (true, false) => lo <= v && v < hi,
            (false, true) => lo < v && v <= hi,
            (false, false) => lo < v && v < hi,
        }
    } else {
        // The arc wraps around the ring's zero point.
        match (inc_lo, inc_hi) {
            (true, true) => v >= lo || v <= hi,
            (true, false) => v >= lo || v < hi,
            (false, true) => v > lo || v <= hi,
            (false, false) => v > lo || v < hi,
        }
    }
}

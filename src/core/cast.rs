use crate::domain::model::LineValue;
use rand::Rng;

/// 50 stalks minus the one set aside for the Taiji.
const INITIAL_STALKS: u32 = 49;

/// Simulates one full yarrow-stalk division and returns the resulting line.
///
/// Three reduction rounds: the bundle is split uniformly into a left pile of
/// 1..=total-1 stalks, one stalk is set aside, and each pile keeps
/// `remainder mod 4` stalks (4 when the remainder is 0). The reduced total is
/// always a multiple of 4 and `total / 4` lands in {6, 7, 8, 9}.
///
/// The split being uniform, the outcome is deliberately non-uniform:
/// roughly 6%, 30%, 44%, 20% for 6, 7, 8, 9. Stable lines (7, 8) dominate
/// changing lines (6, 9).
pub fn cast_line<R: Rng + ?Sized>(rng: &mut R) -> LineValue {
    let mut total = INITIAL_STALKS;

    for _ in 0..3 {
        let left = rng.gen_range(1..total);
        let right = total - left - 1;

        let remainder_left = match left % 4 {
            0 => 4,
            r => r,
        };
        let remainder_right = match right % 4 {
            0 => 4,
            r => r,
        };

        total -= remainder_left + remainder_right + 1;
    }

    debug_assert_eq!(total % 4, 0, "reduction left {total} stalks");
    match LineValue::try_from((total / 4) as u8) {
        Ok(line) => line,
        Err(_) => {
            // Unreachable when the reduction arithmetic is correct; a young
            // yin here would mask a bug, so it only stands as a release-mode
            // last resort.
            debug_assert!(false, "yarrow reduction produced {total} stalks");
            tracing::error!("yarrow reduction produced {total} stalks, defaulting to young yin");
            LineValue::YoungYin
        }
    }
}

/// Casts a full hexagram, bottom line first.
pub fn cast_hexagram<R: Rng + ?Sized>(rng: &mut R) -> [LineValue; 6] {
    [(); 6].map(|_| cast_line(rng))
}

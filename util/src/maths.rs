//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimentions then `None` is
/// returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T>
where
    T: Float,
{
    if point_0.len() != point_1.len() {
        return None;
    }

    Some(
        point_0
            .iter()
            .zip(point_1.iter())
            .fold(T::zero(), |sum, (a, b)| sum + (*a - *b).powi(2))
            .sqrt(),
    )
}

/// Limit `value` to the closed range `[min, max]`.
///
/// `min` is checked last, so if the range is inverted `min` wins.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: PartialOrd,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Sign of a value as -1, 0 or 1.
///
/// Unlike `Float::signum` zero maps to zero.
pub fn sign<T>(value: T) -> T
where
    T: Float,
{
    if value > T::zero() {
        T::one()
    } else if value < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 1.0), (1.0, 3.0), 0.5), 2.0);
        assert_eq!(lin_map((0.0, 10.0), (10.0, 0.0), 2.5), 7.5);
    }

    #[test]
    fn test_norm() {
        assert_eq!(norm(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(norm(&[0.0, 0.0, 1.0], &[3.0, 4.0]), None);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.25, 0.0, 1.0), 0.25);
        assert_eq!(clamp(1500i32 - 1255, 0, 1000), 245);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(0.3), 1.0);
        assert_eq!(sign(-2.0), -1.0);
        assert_eq!(sign(0.0), 0.0);
    }
}

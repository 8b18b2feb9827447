use std::fmt;
use std::time::Duration;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A recording timestamp: whole seconds plus a sub-second nanosecond part.
///
/// Invariant: `nsec < NANOS_PER_SEC`. All constructors and arithmetic
/// normalize, so derived ordering (seconds first, then nanoseconds) is the
/// lexicographic ordering of the pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    sec: i64,
    nsec: u32,
}

impl Time {
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };
    pub const MIN: Self = Self {
        sec: i64::MIN,
        nsec: 0,
    };
    pub const MAX: Self = Self {
        sec: i64::MAX,
        nsec: NANOS_PER_SEC - 1,
    };

    /// Build a timestamp, carrying excess nanoseconds into the seconds part.
    #[must_use]
    pub fn new(sec: i64, nsec: u32) -> Self {
        let carry = i64::from(nsec / NANOS_PER_SEC);
        Self {
            sec: sec.saturating_add(carry),
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    #[must_use]
    pub fn from_secs(sec: i64) -> Self {
        Self { sec, nsec: 0 }
    }

    /// Build a timestamp from a total nanosecond count.
    ///
    /// Saturates at [`Time::MIN`] / [`Time::MAX`].
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn from_nanos(nanos: i128) -> Self {
        let per_sec = i128::from(NANOS_PER_SEC);
        let sec = nanos.div_euclid(per_sec);
        let nsec = nanos.rem_euclid(per_sec);
        if sec > i128::from(i64::MAX) {
            return Self::MAX;
        }
        if sec < i128::from(i64::MIN) {
            return Self::MIN;
        }
        Self {
            sec: sec as i64,
            nsec: nsec as u32,
        }
    }

    /// Total nanoseconds since the zero timestamp.
    #[must_use]
    pub fn as_nanos(&self) -> i128 {
        i128::from(self.sec) * i128::from(NANOS_PER_SEC) + i128::from(self.nsec)
    }

    #[must_use]
    pub fn sec(&self) -> i64 {
        self.sec
    }

    #[must_use]
    pub fn nsec(&self) -> u32 {
        self.nsec
    }

    /// Shift by a signed nanosecond delta, saturating at the representable
    /// bounds.
    #[must_use]
    pub fn add_nanos(&self, delta: i128) -> Self {
        Self::from_nanos(self.as_nanos() + delta)
    }

    /// Signed distance to `earlier`, in nanoseconds.
    #[must_use]
    pub fn nanos_since(&self, earlier: Self) -> i128 {
        self.as_nanos() - earlier.as_nanos()
    }

    /// Clamp into `[min, max]`.
    #[must_use]
    pub fn clamp_to(self, min: Self, max: Self) -> Self {
        if self < min {
            min
        } else if self > max {
            max
        } else {
            self
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

impl std::ops::Add for Time {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_nanos(self.as_nanos() + rhs.as_nanos())
    }
}

impl std::ops::Sub for Time {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_nanos(self.as_nanos() - rhs.as_nanos())
    }
}

impl std::ops::Add<Duration> for Time {
    type Output = Self;

    #[expect(clippy::cast_possible_wrap)]
    fn add(self, rhs: Duration) -> Self {
        Self::from_nanos(self.as_nanos() + rhs.as_nanos() as i128)
    }
}

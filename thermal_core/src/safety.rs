//! Debounced range latches.
//!
//! Each channel carries two signed counters, one per bound. A non-negative
//! value counts consecutive out-of-range observations; reaching the
//! threshold latches the counter at [`Debounce::LATCHED`]. A latch is never
//! cleared by readings coming back into range, only by [`RangeGuard::reset`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    MaxTemp,
    MinTemp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Debounce(i8);

impl Debounce {
    pub const LATCHED: i8 = -1;

    #[inline]
    pub fn count(self) -> i8 {
        self.0
    }

    #[inline]
    pub fn is_latched(self) -> bool {
        self.0 < 0
    }

    /// Record one observation; returns `true` on the observation that latches.
    fn observe(&mut self, out_of_range: bool, threshold: u8) -> bool {
        if self.is_latched() {
            return false;
        }
        if !out_of_range {
            self.0 = 0;
            return false;
        }
        self.0 = self.0.saturating_add(1);
        if i16::from(self.0) >= i16::from(threshold) {
            self.0 = Self::LATCHED;
            return true;
        }
        false
    }

    fn latch(&mut self) -> bool {
        let fresh = !self.is_latched();
        self.0 = Self::LATCHED;
        fresh
    }
}

/// Outcome of one range observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    InRange,
    /// Out of range, not yet latched.
    Counting,
    /// Latched by this observation.
    Tripped(FaultKind),
    /// Latched earlier; the target must stay at zero.
    Latched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeGuard {
    over: Debounce,
    under: Debounce,
    threshold: u8,
}

impl RangeGuard {
    pub fn new(threshold: u8) -> Self {
        Self {
            over: Debounce::default(),
            under: Debounce::default(),
            threshold: threshold.max(1),
        }
    }

    /// Valid readings lie in `[min_raw, max_raw)`.
    pub fn observe(&mut self, raw: u16, min_raw: u16, max_raw: u16) -> Verdict {
        let tripped_over = self.over.observe(raw >= max_raw, self.threshold);
        let tripped_under = self.under.observe(raw < min_raw, self.threshold);
        if tripped_over {
            Verdict::Tripped(FaultKind::MaxTemp)
        } else if tripped_under {
            Verdict::Tripped(FaultKind::MinTemp)
        } else if self.is_latched() {
            Verdict::Latched
        } else if self.over.count() > 0 || self.under.count() > 0 {
            Verdict::Counting
        } else {
            Verdict::InRange
        }
    }

    /// Latch immediately, bypassing the debounce. Returns `true` if the
    /// latch is new.
    pub fn trip(&mut self, kind: FaultKind) -> bool {
        match kind {
            FaultKind::MaxTemp => self.over.latch(),
            FaultKind::MinTemp => self.under.latch(),
        }
    }

    pub fn is_latched(&self) -> bool {
        self.over.is_latched() || self.under.is_latched()
    }

    pub fn over(&self) -> Debounce {
        self.over
    }

    pub fn under(&self) -> Debounce {
        self.under
    }

    pub fn reset(&mut self) {
        self.over = Debounce::default();
        self.under = Debounce::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u16 = 100;
    const MAX: u16 = 1000;

    #[test]
    fn trips_on_third_consecutive_window() {
        let mut g = RangeGuard::new(3);
        assert_eq!(g.observe(1000, MIN, MAX), Verdict::Counting);
        assert_eq!(g.observe(1200, MIN, MAX), Verdict::Counting);
        assert_eq!(g.observe(1001, MIN, MAX), Verdict::Tripped(FaultKind::MaxTemp));
        assert_eq!(g.observe(500, MIN, MAX), Verdict::Latched);
        assert_eq!(g.over().count(), Debounce::LATCHED);
    }

    #[test]
    fn lower_bound_is_inclusive() {
        let mut g = RangeGuard::new(1);
        assert_eq!(g.observe(MIN, MIN, MAX), Verdict::InRange);
        assert_eq!(g.observe(MIN - 1, MIN, MAX), Verdict::Tripped(FaultKind::MinTemp));
    }

    #[test]
    fn trip_reports_only_fresh_latches() {
        let mut g = RangeGuard::new(3);
        assert!(g.trip(FaultKind::MaxTemp));
        assert!(!g.trip(FaultKind::MaxTemp));
        g.reset();
        assert!(!g.is_latched());
    }
}

use embedded_hal::delay::DelayNs;

/// Blocking delay plus a stopwatch
///
/// The stopwatch reference is independent of the delays, so a caller can time
/// a sequence of bus operations that each busy-wait internally.
pub trait Timebase: DelayNs {
    /// Remember the current instant as the reference point
    fn mark_start(&mut self);

    /// Microseconds since the last [`Timebase::mark_start`], wrap-safe over the
    /// counter width
    fn elapsed_us(&self) -> u32;
}

/// Free-running 32-bit cycle counter, e.g. the Cortex-M DWT `CYCCNT`
pub trait CycleCounter {
    fn cycles(&self) -> u32;
}

impl<F: Fn() -> u32> CycleCounter for F {
    fn cycles(&self) -> u32 {
        self()
    }
}

/// [`Timebase`] driven by a [`CycleCounter`] ticking at the core clock
pub struct CycleTimebase<C> {
    counter: C,
    cycles_per_us: u32,
    start: u32,
}

impl<C: CycleCounter> CycleTimebase<C> {
    pub fn new(counter: C, core_clock_hz: u32) -> Self {
        let start = counter.cycles();
        CycleTimebase {
            counter,
            cycles_per_us: (core_clock_hz / 1_000_000).max(1),
            start,
        }
    }

    pub fn cycles_per_us(&self) -> u32 {
        self.cycles_per_us
    }

    fn spin(&self, cycles: u64) {
        let mut remaining = cycles;
        while remaining > 0 {
            // keep each chunk well below the counter period so wrapping_sub stays exact
            let chunk = remaining.min(u64::from(u32::MAX / 2)) as u32;
            let begin = self.counter.cycles();
            while self.counter.cycles().wrapping_sub(begin) < chunk {}
            remaining -= u64::from(chunk);
        }
    }
}

impl<C: CycleCounter> DelayNs for CycleTimebase<C> {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (u64::from(ns) * u64::from(self.cycles_per_us)).div_ceil(1000);
        self.spin(cycles);
    }

    fn delay_us(&mut self, us: u32) {
        self.spin(u64::from(us) * u64::from(self.cycles_per_us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.spin(u64::from(ms) * 1000 * u64::from(self.cycles_per_us));
    }
}

impl<C: CycleCounter> Timebase for CycleTimebase<C> {
    fn mark_start(&mut self) {
        self.start = self.counter.cycles();
    }

    fn elapsed_us(&self) -> u32 {
        self.counter.cycles().wrapping_sub(self.start) / self.cycles_per_us
    }
}

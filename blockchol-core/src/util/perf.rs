use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
pub enum PerfSection {
    Permutation,
    Assembly,
    Factorization,
    Solve,
    Other,
}

/// Wall time spent in each driver phase.
#[derive(Debug, Default, Clone)]
pub struct PerfTimers {
    pub permutation: Duration,
    pub assembly: Duration,
    pub factorization: Duration,
    pub solve: Duration,
    pub other: Duration,
}

impl PerfTimers {
    pub fn scoped<'a>(&'a mut self, section: PerfSection) -> PerfGuard<'a> {
        PerfGuard { section, start: Instant::now(), timers: self }
    }

    pub fn add(&mut self, section: PerfSection, dt: Duration) {
        match section {
            PerfSection::Permutation => self.permutation += dt,
            PerfSection::Assembly => self.assembly += dt,
            PerfSection::Factorization => self.factorization += dt,
            PerfSection::Solve => self.solve += dt,
            PerfSection::Other => self.other += dt,
        }
    }

    pub fn total(&self) -> Duration {
        self.permutation + self.assembly + self.factorization + self.solve + self.other
    }
}

pub struct PerfGuard<'a> {
    section: PerfSection,
    start: Instant,
    timers: &'a mut PerfTimers,
}

impl Drop for PerfGuard<'_> {
    fn drop(&mut self) {
        self.timers.add(self.section, self.start.elapsed());
    }
}

//! Local progress bar and level counter driven purely by the tap stream.

pub const PROGRESS_MAX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTracker {
    progress: u32,
    level: u32,
    step: u32,
}

impl ProgressTracker {
    pub fn new(step: u32) -> Self {
        Self::starting_at(0, 1, step)
    }

    /// `progress` is reduced into `[0, PROGRESS_MAX)`, `level` is at least 1
    /// and `step` is clamped into `1..=PROGRESS_MAX`.
    pub fn starting_at(progress: u32, level: u32, step: u32) -> Self {
        Self {
            progress: progress % PROGRESS_MAX,
            level: level.max(1),
            step: step.clamp(1, PROGRESS_MAX),
        }
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Returns true when the tap completed the bar and raised the level.
    pub fn tap(&mut self) -> bool {
        let sum = self.progress + self.step;
        let gained = sum / PROGRESS_MAX;
        self.level = self.level.saturating_add(gained);
        self.progress = sum % PROGRESS_MAX;
        gained > 0
    }

    pub fn replay(&mut self, taps: u64) {
        for _ in 0..taps {
            self.tap();
        }
    }
}

/// Per-guild boredom accumulator. Grows while the guild stays quiet, resets
/// on activity or after firing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoredomMeter {
    level: f64,
}

impl BoredomMeter {
    pub fn level(&self) -> f64 {
        self.level
    }

    /// One check. Returns true when the bot should speak up.
    pub fn observe(&mut self, idle: bool, increment: f64, max: f64, draw: f64) -> bool {
        if !idle {
            self.level = 0.0;
            return false;
        }
        self.level = (self.level + increment).min(max);
        if draw < self.level {
            self.level = 0.0;
            true
        } else {
            false
        }
    }
}

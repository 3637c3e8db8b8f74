use serde::{Deserialize, Serialize};

/// Limits applied to every thread of a runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Frames per thread. Pushing one more raises a catchable error.
    pub max_call_depth: usize,

    /// Operand stack entries per frame.
    pub max_operand_stack: usize,

    /// Instructions per `resume` across all frames of a thread. When the
    /// budget runs out the thread defers and re-arms itself.
    pub max_steps_per_resume: Option<usize>,

    /// Scheduler ticks per second, used to convert sleep delays given in
    /// deciseconds.
    pub ticks_per_second: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 400,
            max_operand_stack: 1024,
            max_steps_per_resume: None,
            ticks_per_second: 20,
        }
    }
}

impl VmConfig {
    /// Whole ticks for a delay in deciseconds, rounded up. Zero or negative
    /// delays map to zero ticks.
    pub fn delay_ticks(&self, deciseconds: f32) -> u64 {
        if deciseconds <= 0.0 || !deciseconds.is_finite() {
            return 0;
        }
        let ticks = deciseconds * self.ticks_per_second as f32 / 10.0;
        ticks.ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_ticks() {
        let config = VmConfig::default();
        assert_eq!(config.delay_ticks(10.0), 20);
        assert_eq!(config.delay_ticks(0.2), 1);
        assert_eq!(config.delay_ticks(0.0), 0);
        assert_eq!(config.delay_ticks(-3.0), 0);
    }

    #[test]
    fn test_round_trips_through_postcard() {
        let config = VmConfig {
            max_steps_per_resume: Some(500),
            ..VmConfig::default()
        };
        let bytes = postcard::to_allocvec(&config).unwrap();
        let back: VmConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, config);
    }
}

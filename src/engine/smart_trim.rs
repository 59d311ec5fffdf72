use crate::models::SmartTrimConfig;
use std::time::{Duration, Instant};

/// Rate-limited memory pressure trigger.
#[derive(Debug, Default, Clone)]
pub struct SmartTrimGate {
    last_triggered: Option<Instant>,
}

impl SmartTrimGate {
    pub fn last_triggered(&self) -> Option<Instant> {
        self.last_triggered
    }

    /// True when a trim should be requested now. Firing arms the rate limit
    /// immediately, whether or not the trim later succeeds.
    pub fn evaluate(&mut self, config: &SmartTrimConfig, used_percent: f32, now: Instant) -> bool {
        if !config.enabled {
            return false;
        }

        let interval = Duration::from_secs(config.interval_seconds);
        if let Some(last) = self.last_triggered {
            if now.saturating_duration_since(last) < interval {
                return false;
            }
        }

        if used_percent < config.threshold_percent {
            return false;
        }

        self.last_triggered = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmartTrimConfig {
        SmartTrimConfig {
            enabled: true,
            threshold_percent: 80.0,
            interval_seconds: 30,
            ..SmartTrimConfig::default()
        }
    }

    #[test]
    fn fires_then_waits_out_the_interval() {
        let mut gate = SmartTrimGate::default();
        let t0 = Instant::now();

        assert!(gate.evaluate(&config(), 85.0, t0));
        assert_eq!(gate.last_triggered(), Some(t0));

        assert!(!gate.evaluate(&config(), 90.0, t0 + Duration::from_secs(10)));
        assert_eq!(gate.last_triggered(), Some(t0));

        let t31 = t0 + Duration::from_secs(31);
        assert!(gate.evaluate(&config(), 90.0, t31));
        assert_eq!(gate.last_triggered(), Some(t31));
    }

    #[test]
    fn below_threshold_leaves_the_timer_alone() {
        let mut gate = SmartTrimGate::default();
        let t0 = Instant::now();
        assert!(!gate.evaluate(&config(), 79.9, t0));
        assert_eq!(gate.last_triggered(), None);
        assert!(gate.evaluate(&config(), 80.0, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn disabled_never_fires() {
        let mut gate = SmartTrimGate::default();
        let cfg = SmartTrimConfig {
            enabled: false,
            ..config()
        };
        assert!(!gate.evaluate(&cfg, 99.0, Instant::now()));
    }
}

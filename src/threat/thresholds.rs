//! Adaptive request-count thresholds derived from a client's threat score
//!
//! A noisier client gets tighter limits: every threshold drops by
//! floor(score * 10) below its base, clamped at a configured floor.

/// Base thresholds and floors for the adaptive calculation
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub base_allow: u32,
    pub base_throttle: u32,
    pub base_block: u32,
    pub allow_floor: u32,
    pub throttle_floor: u32,
    pub block_floor: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            base_allow: 50,
            base_throttle: 60,
            base_block: 90,
            allow_floor: 10,
            throttle_floor: 20,
            block_floor: 30,
        }
    }
}

/// Effective per-window thresholds for one client at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub allow: u32,
    pub throttle: u32,
    pub block: u32,
}

impl ThresholdPolicy {
    /// Thresholds for a client with the given threat score
    pub fn thresholds_for(&self, threat_score: f64) -> Thresholds {
        let penalty = score_penalty(threat_score);
        Thresholds {
            allow: self.base_allow.saturating_sub(penalty).max(self.allow_floor),
            throttle: self
                .base_throttle
                .saturating_sub(penalty)
                .max(self.throttle_floor),
            block: self.base_block.saturating_sub(penalty).max(self.block_floor),
        }
    }
}

fn score_penalty(threat_score: f64) -> u32 {
    // Saturate rather than wrap for extreme scores
    (threat_score * 10.0).floor().min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_client_gets_base_thresholds() {
        let policy = ThresholdPolicy::default();
        let t = policy.thresholds_for(0.0);

        assert_eq!(t.allow, 50);
        assert_eq!(t.throttle, 60);
        assert_eq!(t.block, 90);
    }

    #[test]
    fn test_penalty_is_ten_per_score_point() {
        let policy = ThresholdPolicy::default();
        let t = policy.thresholds_for(1.0);

        assert_eq!(t.allow, 40);
        assert_eq!(t.throttle, 50);
        assert_eq!(t.block, 80);
    }

    #[test]
    fn test_fractional_score_floors_penalty() {
        let policy = ThresholdPolicy::default();

        // floor(0.19 * 10) = 1
        let t = policy.thresholds_for(0.19);
        assert_eq!(t.allow, 49);

        // floor(0.09 * 10) = 0
        let t = policy.thresholds_for(0.09);
        assert_eq!(t.allow, 50);
    }

    #[test]
    fn test_floors_clamp_high_scores() {
        let policy = ThresholdPolicy::default();
        let t = policy.thresholds_for(10.0);

        assert_eq!(t.allow, 10);
        assert_eq!(t.throttle, 20);
        assert_eq!(t.block, 30);
    }

    #[test]
    fn test_extreme_score_saturates() {
        let policy = ThresholdPolicy::default();
        let t = policy.thresholds_for(1e18);

        assert_eq!(t.allow, policy.allow_floor);
        assert_eq!(t.throttle, policy.throttle_floor);
        assert_eq!(t.block, policy.block_floor);
    }

    #[test]
    fn test_thresholds_never_increase_with_score() {
        let policy = ThresholdPolicy::default();
        let mut previous = policy.thresholds_for(0.0);

        for tenths in 1..200 {
            let t = policy.thresholds_for(tenths as f64 / 10.0);
            assert!(t.allow <= previous.allow);
            assert!(t.throttle <= previous.throttle);
            assert!(t.block <= previous.block);
            previous = t;
        }
    }

    #[test]
    fn test_ordering_holds_at_any_score() {
        let policy = ThresholdPolicy::default();

        for tenths in 0..200 {
            let t = policy.thresholds_for(tenths as f64 / 10.0);
            assert!(t.allow <= t.throttle);
            assert!(t.throttle <= t.block);
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealthConfig;

/// Rates that feed the health score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub response_rate: f64,
    pub avg_satisfaction: f64,
    pub error_rate: f64,
    /// `None` when the agent never sent anything
    pub hours_since_active: Option<f64>,
}

/// Derived snapshot of an agent's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub agent: String,
    /// Messages sent or received by the agent
    pub message_count: usize,
    pub sent_count: usize,
    pub received_count: usize,
    pub response_rate: f64,
    pub avg_satisfaction: f64,
    pub error_rate: f64,
    pub last_active: Option<DateTime<Utc>>,
    pub inactivity_penalty: f64,
    pub health_score: f64,
    pub computed_at: DateTime<Utc>,
}

/// Zero inside the active window, then a linear ramp up to the cap.
pub fn inactivity_penalty(hours_since_active: Option<f64>, config: &HealthConfig) -> f64 {
    let Some(hours) = hours_since_active else {
        return config.never_active_penalty;
    };

    // Clock skew can put last activity in the future
    let idle = (hours - config.active_window_hours).max(0.0);
    if idle == 0.0 {
        return 0.0;
    }
    if config.inactivity_ramp_hours <= 0.0 {
        return config.max_inactivity_penalty;
    }

    (idle / config.inactivity_ramp_hours).min(1.0) * config.max_inactivity_penalty
}

/// Weighted health score, always within `[0, 1]`.
///
/// ```text
/// 1 - w_r * max(0, target_r - rr)
///   - w_s * max(0, target_s - sat)
///   - w_e * err
///   - inactivity
/// ```
pub fn score(inputs: &HealthInputs, config: &HealthConfig) -> f64 {
    let response_gap = (config.response_target - inputs.response_rate).max(0.0);
    let satisfaction_gap = (config.satisfaction_target - inputs.avg_satisfaction).max(0.0);

    let raw = 1.0
        - config.response_weight * response_gap
        - config.satisfaction_weight * satisfaction_gap
        - config.error_weight * inputs.error_rate
        - inactivity_penalty(inputs.hours_since_active, config);

    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> HealthInputs {
        HealthInputs {
            response_rate: 1.0,
            avg_satisfaction: 0.5,
            error_rate: 0.0,
            hours_since_active: Some(1.0),
        }
    }

    #[test]
    fn test_perfect_agent_scores_one() {
        assert_eq!(score(&inputs(), &HealthConfig::default()), 1.0);
    }

    #[test]
    fn test_inactivity_ramp() {
        let config = HealthConfig::default();
        assert_eq!(inactivity_penalty(Some(10.0), &config), 0.0);
        assert_eq!(inactivity_penalty(Some(24.0), &config), 0.0);
        assert!((inactivity_penalty(Some(48.0), &config) - 0.25).abs() < 1e-9);
        assert_eq!(inactivity_penalty(Some(72.0), &config), 0.5);
        assert_eq!(inactivity_penalty(Some(500.0), &config), 0.5);
        assert_eq!(inactivity_penalty(None, &config), 0.3);
    }

    #[test]
    fn test_error_heavy_agent_is_clamped_to_zero() {
        let config = HealthConfig::default();
        let sick = HealthInputs {
            response_rate: 0.0,
            avg_satisfaction: 0.0,
            error_rate: 1.0,
            hours_since_active: Some(100.0),
        };
        // 1 - 0.4 - 0.15 - 0.7 - 0.5 < 0
        assert_eq!(score(&sick, &config), 0.0);
    }

    #[test]
    fn test_response_gap_is_weighted() {
        let config = HealthConfig::default();
        let quiet = HealthInputs {
            response_rate: 0.4,
            ..inputs()
        };
        assert!((score(&quiet, &config) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_nan_inputs_do_not_escape_range() {
        let config = HealthConfig::default();
        let broken = HealthInputs {
            response_rate: f64::NAN,
            avg_satisfaction: f64::NAN,
            error_rate: f64::NAN,
            hours_since_active: Some(f64::NAN),
        };
        let value = score(&broken, &config);
        assert!((0.0..=1.0).contains(&value));
    }
}

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use society_protocol::config::HealthConfig;
use society_protocol::health::{inactivity_penalty, score, HealthInputs};

/// Raw rates as the monitor could observe them, including nonsense values
#[derive(Debug, Clone, Arbitrary)]
struct ObservedRates {
    #[proptest(strategy = "0.0f64..5.0")]
    response_rate: f64,
    #[proptest(strategy = "-1.0f64..2.0")]
    avg_satisfaction: f64,
    #[proptest(strategy = "0.0f64..=1.0")]
    error_rate: f64,
    #[proptest(strategy = "proptest::option::of(-10.0f64..500.0)")]
    hours_since_active: Option<f64>,
}

impl ObservedRates {
    fn inputs(&self) -> HealthInputs {
        HealthInputs {
            response_rate: self.response_rate,
            avg_satisfaction: self.avg_satisfaction,
            error_rate: self.error_rate,
            hours_since_active: self.hours_since_active,
        }
    }
}

proptest! {
    #[test]
    fn score_stays_in_unit_interval(rates in any::<ObservedRates>()) {
        let value = score(&rates.inputs(), &HealthConfig::default());
        prop_assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn more_errors_never_raise_the_score(rates in any::<ObservedRates>(), extra in 0.0f64..1.0) {
        let config = HealthConfig::default();
        let base = rates.inputs();
        let worse = HealthInputs {
            error_rate: (base.error_rate + extra).min(1.0),
            ..base
        };
        prop_assert!(score(&worse, &config) <= score(&base, &config));
    }

    #[test]
    fn longer_idle_never_lowers_the_penalty(hours in 0.0f64..500.0, more in 0.0f64..500.0) {
        let config = HealthConfig::default();
        let earlier = inactivity_penalty(Some(hours), &config);
        let later = inactivity_penalty(Some(hours + more), &config);
        prop_assert!(later >= earlier);
        prop_assert!(later <= config.max_inactivity_penalty);
    }
}

#[test]
fn nan_inputs_score_zero() {
    let inputs = HealthInputs {
        response_rate: 1.0,
        avg_satisfaction: 0.5,
        error_rate: f64::NAN,
        hours_since_active: Some(1.0),
    };
    assert_eq!(score(&inputs, &HealthConfig::default()), 0.0);
}

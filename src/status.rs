//! algae health classification from temperature and pH.
//!
//! the bands are nested, widest last. check them in order and stop at the
//! first match:
//!
//! | tier      | temp (°C)   | pH          |
//! |-----------|-------------|-------------|
//! | excellent | 20 ..= 30   | 6.5 ..= 8.5 |
//! | good      | 18 ..= 32   | 6.0 ..= 9.0 |
//! | fair      | 15 ..= 35   | 5.5 ..= 9.5 |
//! | poor      | anything else             |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl Tier {
    pub fn message(self) -> &'static str {
        match self {
            Tier::Excellent => "Algae are thriving!",
            Tier::Good => "Algae are doing well",
            Tier::Fair => "Algae are surviving",
            Tier::Poor => "Algae are stressed!",
            Tier::Unknown => "Sensor data unavailable",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Tier::Excellent => "🌱",
            Tier::Good => "😊",
            Tier::Fair => "😐",
            Tier::Poor => "😰",
            Tier::Unknown => "❓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgaeStatus {
    pub tier: Tier,
    pub message: String,
    pub emoji: String,
}

impl From<Tier> for AlgaeStatus {
    fn from(tier: Tier) -> Self {
        Self { tier, message: tier.message().to_string(), emoji: tier.emoji().to_string() }
    }
}

/// (tier, temp range, pH range), narrowest first
const BANDS: [(Tier, (f64, f64), (f64, f64)); 3] = [
    (Tier::Excellent, (20.0, 30.0), (6.5, 8.5)),
    (Tier::Good, (18.0, 32.0), (6.0, 9.0)),
    (Tier::Fair, (15.0, 35.0), (5.5, 9.5)),
];

pub fn classify(temperature: Option<f64>, ph: Option<f64>) -> AlgaeStatus {
    let (Some(temp), Some(ph)) = (temperature, ph) else {
        return Tier::Unknown.into();
    };

    BANDS
        .iter()
        .find(|(_, (t_lo, t_hi), (p_lo, p_hi))| {
            (*t_lo..=*t_hi).contains(&temp) && (*p_lo..=*p_hi).contains(&ph)
        })
        .map(|(tier, _, _)| *tier)
        .unwrap_or(Tier::Poor)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(t: Option<f64>, p: Option<f64>) -> Tier {
        classify(t, p).tier
    }

    #[test]
    fn test_reference_points() {
        assert_eq!(tier(Some(25.0), Some(7.0)), Tier::Excellent);
        assert_eq!(tier(Some(19.0), Some(8.8)), Tier::Good);
        assert_eq!(tier(Some(16.0), Some(9.3)), Tier::Fair);
        assert_eq!(tier(Some(5.0), Some(2.0)), Tier::Poor);
        assert_eq!(tier(None, Some(7.0)), Tier::Unknown);
        assert_eq!(tier(Some(25.0), None), Tier::Unknown);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        assert_eq!(tier(Some(20.0), Some(6.5)), Tier::Excellent);
        assert_eq!(tier(Some(30.0), Some(8.5)), Tier::Excellent);
        assert_eq!(tier(Some(32.0), Some(9.0)), Tier::Good);
        assert_eq!(tier(Some(35.0), Some(5.5)), Tier::Fair);
        assert_eq!(tier(Some(35.01), Some(7.0)), Tier::Poor);
    }

    #[test]
    fn test_worst_axis_decides() {
        // perfect temperature cannot rescue a bad pH
        assert_eq!(tier(Some(25.0), Some(9.2)), Tier::Fair);
        assert_eq!(tier(Some(25.0), Some(10.0)), Tier::Poor);
        assert_eq!(tier(Some(f64::NAN), Some(7.0)), Tier::Poor);
    }

    #[test]
    fn test_messages() {
        let status = classify(Some(25.0), Some(7.0));
        assert_eq!(status.message, "Algae are thriving!");
        assert_eq!(classify(None, None).message, "Sensor data unavailable");
        assert_eq!(serde_json::to_value(Tier::Excellent).unwrap(), "excellent");
    }
}

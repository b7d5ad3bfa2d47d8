//! Label classifier.
//!
//! Stateless: the label is derived fresh every cycle, in priority order:
//!
//! 1. not live → informational badge (PENDING / SET1 / SET2 / SET3_PLUS), zero confidence
//! 2. outside the trading window → AVOID
//! 3. EV below minEV or confidence below thrRisky → AVOID
//! 4. confidence below thrSafe → RISKY
//! 5. otherwise → SAFE

use crate::db::models::{Label, OddsPair, Side};

use super::probability::ProbabilityPair;
use super::state::Cutoffs;

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub label: Label,
    pub pick: Option<Side>,
    pub confidence: f64,
    pub expected_value: f64,
    /// Win probability used for EV and staking: 0.5 + confidence / 2
    pub pick_probability: f64,
    pub note: &'static str,
}

/// Badge for a match that is not in play.
pub fn informational_label(current_set: u8) -> Label {
    match current_set {
        0 => Label::Pending,
        1 => Label::Set1,
        2 => Label::Set2,
        _ => Label::Set3Plus,
    }
}

/// Expected value of a unit stake at decimal `odds` with win probability `p`.
pub fn expected_value(p: f64, odds: f64) -> f64 {
    if !(odds.is_finite() && odds > 1.0) {
        return 0.0;
    }
    p * odds - 1.0
}

pub struct ClassifierInput<'a> {
    pub live: bool,
    pub current_set: u8,
    pub in_window: bool,
    pub probabilities: ProbabilityPair,
    /// Volatility confidence multiplier in (0, 1]
    pub confidence_multiplier: f64,
    pub odds: Option<&'a OddsPair>,
}

/// `gates` are the effective (weight-scaled) cutoffs.
pub fn classify(input: &ClassifierInput<'_>, gates: &Cutoffs) -> Assessment {
    if !input.live {
        return Assessment {
            label: informational_label(input.current_set),
            pick: None,
            confidence: 0.0,
            expected_value: 0.0,
            pick_probability: 0.5,
            note: "match not live",
        };
    }

    let pick = input.probabilities.leader(input.odds);
    let confidence =
        (input.probabilities.spread() * input.confidence_multiplier.clamp(0.0, 1.0)).clamp(0.0, 1.0);
    let pick_probability = 0.5 + confidence / 2.0;
    let ev = input
        .odds
        .map(|o| expected_value(pick_probability, o.get(pick)))
        .unwrap_or(0.0);

    let (label, note) = if !input.in_window {
        (Label::Avoid, "outside trading window")
    } else if input.odds.is_none() {
        (Label::Avoid, "no market odds")
    } else if ev < gates.min_ev {
        (Label::Avoid, "expected value below minimum")
    } else if confidence < gates.thr_risky {
        (Label::Avoid, "confidence below risky threshold")
    } else if confidence < gates.thr_safe {
        (Label::Risky, "confidence between risky and safe thresholds")
    } else {
        (Label::Safe, "confidence above safe threshold")
    };

    Assessment {
        label,
        pick: Some(pick),
        confidence,
        expected_value: ev,
        pick_probability,
        note,
    }
}

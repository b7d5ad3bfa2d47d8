/// Kelly Criterion stake sizing with volatility / drift / momentum dampers.
///
/// Standard formula:
///   f* = (b·p − q) / b
/// where
///   b  = net decimal odds (decimal price − 1)
///   p  = calibrated win probability of the pick
///   q  = 1 − p
///
/// The raw fraction is then scaled, in order, by volatility damping, a drift
/// penalty, a momentum boost and the fractional-Kelly multiplier. The result
/// is capped by an adaptive cap that shrinks under high volatility and
/// adverse line drift, and a soft floor lifts tiny positive stakes.
use serde::Serialize;

/// Volatility range over which damping is interpolated.
const VOL_LOW: f64 = 0.30;
const VOL_HIGH: f64 = 0.80;
const VOL_SCALE_MAX: f64 = 0.95;
const VOL_SCALE_MIN: f64 = 0.55;

/// Drift below which the line counts as strongly adverse.
pub const ADVERSE_DRIFT: f64 = -0.40;
/// Volatility above which the cap is halved.
pub const HIGH_VOLATILITY: f64 = 0.75;

const CAP_HIGH_VOL: f64 = 0.50;
const CAP_ADVERSE_DRIFT: f64 = 0.40;
const CAP_BOTH: f64 = 0.25;

pub const DEFAULT_BASE_CAP: f64 = 0.02;
pub const DEFAULT_FLOOR: f64 = 0.003;

/// Classical Kelly fraction for decimal odds. Returns `0.0` when there is no
/// edge or the odds are unusable.
pub fn kelly_fraction(win_prob: f64, decimal_odds: f64) -> f64 {
    if !(decimal_odds.is_finite() && decimal_odds > 1.0) || !win_prob.is_finite() {
        return 0.0;
    }
    let b = decimal_odds - 1.0;
    let p = win_prob.clamp(0.0, 1.0);
    let q = 1.0 - p;
    let f = (b * p - q) / b;
    if f <= 0.0 {
        return 0.0; // no edge
    }
    f.min(1.0)
}

/// 0.95 at volatility ≤ 0.3 down to 0.55 at ≥ 0.8, linear in between.
pub fn volatility_damping(volatility: f64) -> f64 {
    let t = ((volatility - VOL_LOW) / (VOL_HIGH - VOL_LOW)).clamp(0.0, 1.0);
    VOL_SCALE_MAX - t * (VOL_SCALE_MAX - VOL_SCALE_MIN)
}

/// Drift penalty in [0.70, 1.05]. Favourable drift earns a small bonus;
/// adverse drift beyond −0.4 is penalised on a steeper slope.
pub fn drift_scale(drift: f64) -> f64 {
    let d = if drift.is_finite() { drift.clamp(-1.0, 1.0) } else { 0.0 };
    if d >= 0.0 {
        1.0 + 0.05 * d
    } else if d >= ADVERSE_DRIFT {
        1.0 + 0.25 * d
    } else {
        0.90 - 0.20 * (d.abs() - 0.40) / 0.60
    }
}

/// Momentum boost in [0.95, 1.10] for a momentum signal in [-1, 1].
pub fn momentum_scale(momentum: f64) -> f64 {
    let m = if momentum.is_finite() { momentum.clamp(-1.0, 1.0) } else { 0.0 };
    1.025 + 0.075 * m
}

/// Cap on the staked fraction given current conditions.
pub fn adaptive_cap(base_cap: f64, volatility: f64, drift: f64) -> f64 {
    let high_vol = volatility > HIGH_VOLATILITY;
    let adverse = drift < ADVERSE_DRIFT;
    let scale = match (high_vol, adverse) {
        (true, true) => CAP_BOTH,
        (true, false) => CAP_HIGH_VOL,
        (false, true) => CAP_ADVERSE_DRIFT,
        (false, false) => 1.0,
    };
    base_cap * scale
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StakeParams {
    /// Fraction of full Kelly to actually stake (0–1)
    pub kelly_multiplier: f64,
    pub base_cap: f64,
    pub floor: f64,
}

impl Default for StakeParams {
    fn default() -> Self {
        StakeParams {
            kelly_multiplier: 0.25,
            base_cap: DEFAULT_BASE_CAP,
            floor: DEFAULT_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StakeInputs {
    pub win_prob: f64,
    pub decimal_odds: f64,
    pub volatility: f64,
    /// Drift from the pick's perspective in [-1, 1]
    pub drift: f64,
    /// Momentum from the pick's perspective in [-1, 1]
    pub momentum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRecommendation {
    pub raw_kelly: f64,
    /// Dampened fraction before the cap
    pub fraction: f64,
    /// Final stake fraction of bankroll
    pub stake_pct: f64,
    pub cap: f64,
}

pub fn size_stake(inputs: &StakeInputs, params: &StakeParams) -> StakeRecommendation {
    let raw_kelly = kelly_fraction(inputs.win_prob, inputs.decimal_odds);
    let fraction = (raw_kelly
        * volatility_damping(inputs.volatility)
        * drift_scale(inputs.drift)
        * momentum_scale(inputs.momentum)
        * params.kelly_multiplier.clamp(0.0, 1.0))
    .max(0.0);

    let cap = adaptive_cap(params.base_cap, inputs.volatility, inputs.drift);
    let mut stake_pct = fraction.min(cap);
    if stake_pct > 0.0 && stake_pct < params.floor {
        stake_pct = params.floor.min(cap);
    }

    StakeRecommendation {
        raw_kelly,
        fraction,
        stake_pct,
        cap,
    }
}

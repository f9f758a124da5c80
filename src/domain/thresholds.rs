//! Clinical threshold classifier.
//!
//! Hand-authored reference ranges per parameter. Each table is evaluated
//! critical-low, low, critical-high, high, then normal. Inclusive and
//! exclusive boundaries differ between parameters on purpose and must stay
//! exactly as written.

use super::parameter::CanonicalParameter;
use super::patient::Gender;
use super::status::{StatusCode, Verdict};

const NORMAL: Verdict = Verdict::normal();
const LOW: Verdict = Verdict::new(StatusCode::Low, "Low");
const HIGH: Verdict = Verdict::new(StatusCode::High, "High");
const CRITICAL_LOW: Verdict = Verdict::new(StatusCode::Critical, "Critical Low");
const CRITICAL_HIGH: Verdict = Verdict::new(StatusCode::Critical, "Critical High");
const BORDERLINE_HIGH: Verdict = Verdict::new(StatusCode::Low, "Borderline High");

/// Classify a value by canonical key.
///
/// Unknown keys are reported as an untabulated Normal. `age` is accepted for parity with
/// the model path; no current table is age-dependent.
#[must_use]
pub fn classify_by_threshold(value: f64, canonical_key: &str, gender: Gender, _age: u32) -> Verdict {
    match CanonicalParameter::from_key(canonical_key) {
        Some(param) => classify_parameter(param, value, gender),
        None => {
            tracing::warn!(
                parameter = canonical_key,
                "No clinical threshold table for parameter, reporting Normal"
            );
            Verdict::untabulated()
        }
    }
}

/// Classify a value for a known parameter.
#[must_use]
pub fn classify_parameter(param: CanonicalParameter, value: f64, gender: Gender) -> Verdict {
    use CanonicalParameter as P;

    let male = gender.uses_male_ranges();
    let v = value;

    match param {
        P::Hemoglobin => {
            let (low, high) = if male { (13.5, 17.5) } else { (12.0, 15.5) };
            if v <= 7.0 {
                CRITICAL_LOW
            } else if v < low {
                LOW
            } else if v > 20.0 {
                CRITICAL_HIGH
            } else if v > high {
                HIGH
            } else {
                NORMAL
            }
        }
        P::RbcCount => {
            let (crit_low, low, crit_high, high) = if male {
                (3.0, 4.5, 7.0, 5.9)
            } else {
                (2.8, 4.0, 6.5, 5.2)
            };
            if v <= crit_low {
                CRITICAL_LOW
            } else if v < low {
                LOW
            } else if v > crit_high {
                CRITICAL_HIGH
            } else if v > high {
                HIGH
            } else {
                NORMAL
            }
        }
        P::WbcCount => standard(v, 2.0, 4.0, 20.0, 11.0),
        P::PlateletCount => standard(v, 50.0, 150.0, 1000.0, 400.0),
        P::Hematocrit => {
            let (low, high) = if male { (38.0, 54.0) } else { (36.0, 47.0) };
            if v < low {
                LOW
            } else if v > high {
                HIGH
            } else {
                NORMAL
            }
        }
        P::Mcv => standard(v, 60.0, 80.0, 120.0, 100.0),
        P::Mch => standard(v, 20.0, 27.0, 40.0, 33.0),
        P::Mchc => standard(v, 28.0, 32.0, 38.0, 36.0),
        P::Rdw => {
            if v < 11.5 {
                LOW
            } else if v > 20.0 {
                CRITICAL_HIGH
            } else if v > 14.5 {
                HIGH
            } else {
                NORMAL
            }
        }
        P::Neutrophils => standard(v, 10.0, 40.0, 95.0, 70.0),
        P::Lymphocytes => standard(v, 1.0, 20.0, 90.0, 40.0),
        P::Monocytes => {
            if v < 2.0 {
                LOW
            } else if v > 20.0 {
                CRITICAL_HIGH
            } else if v > 10.0 {
                HIGH
            } else {
                NORMAL
            }
        }
        P::Eosinophils => high_only(v, 15.0, 5.0),
        P::Basophils => high_only(v, 5.0, 2.0),
        P::RandomBloodSugar => {
            if v < 70.0 {
                CRITICAL_LOW
            } else if v > 300.0 {
                CRITICAL_HIGH
            } else if v > 200.0 {
                HIGH
            } else if v > 140.0 {
                BORDERLINE_HIGH
            } else {
                NORMAL
            }
        }
        P::Hba1c => {
            if v < 4.0 {
                LOW
            } else if v >= 6.5 {
                Verdict::new(StatusCode::High, "Diabetic Range")
            } else if v >= 5.7 {
                Verdict::new(StatusCode::Low, "Prediabetic")
            } else {
                NORMAL
            }
        }
        P::Esr => high_only(v, 50.0, if male { 20.0 } else { 30.0 }),
        P::Crp => {
            if v > 100.0 {
                CRITICAL_HIGH
            } else if v > 50.0 {
                Verdict::new(StatusCode::High, "Very High")
            } else if v > 10.0 {
                Verdict::new(StatusCode::Low, "Elevated")
            } else {
                NORMAL
            }
        }
        P::SerumCreatinine => {
            let (critical, high, borderline) = if male { (3.0, 1.5, 1.2) } else { (2.5, 1.3, 1.1) };
            if v > critical {
                CRITICAL_HIGH
            } else if v > high {
                HIGH
            } else if v > borderline {
                BORDERLINE_HIGH
            } else {
                NORMAL
            }
        }
        P::SerumIron => range(v, 30.0, 180.0),
        P::Tibc => range(v, 240.0, 450.0),
        P::TransferrinSaturation => range(v, 20.0, 50.0),
        P::Ferritin => range(v, 30.0, 300.0),
        P::VitaminB12 => range(v, 200.0, 900.0),
        P::VitaminD => {
            if v < 20.0 {
                Verdict::new(StatusCode::Low, "Deficient")
            } else if v < 30.0 {
                Verdict::new(StatusCode::Low, "Insufficient")
            } else if v > 100.0 {
                HIGH
            } else {
                Verdict::new(StatusCode::Normal, "Sufficient")
            }
        }
        P::Tsh => {
            if v < 0.5 {
                Verdict::new(StatusCode::High, "Low - Hyperthyroid")
            } else if v > 5.0 {
                Verdict::new(StatusCode::High, "High - Hypothyroid")
            } else {
                NORMAL
            }
        }
        P::CortisolPm => range(v, 3.0, 15.0),
    }
}

/// `<= crit_low`, `< low`, `> crit_high`, `> high`.
fn standard(v: f64, crit_low: f64, low: f64, crit_high: f64, high: f64) -> Verdict {
    if v <= crit_low {
        CRITICAL_LOW
    } else if v < low {
        LOW
    } else if v > crit_high {
        CRITICAL_HIGH
    } else if v > high {
        HIGH
    } else {
        NORMAL
    }
}

/// `> crit_high`, `> high`.
fn high_only(v: f64, crit_high: f64, high: f64) -> Verdict {
    if v > crit_high {
        CRITICAL_HIGH
    } else if v > high {
        HIGH
    } else {
        NORMAL
    }
}

/// `< low`, `> high`.
fn range(v: f64, low: f64, high: f64) -> Verdict {
    if v < low {
        LOW
    } else if v > high {
        HIGH
    } else {
        NORMAL
    }
}

/// Fraction of the detected quantity assumed recoverable
const MASS_PER_ITEM_KG: f64 = 0.7;
/// Currency saved per recovered kilogram
const CURRENCY_PER_KG: f64 = 15.5;
/// CO2 avoided per recovered kilogram
const CO2_PER_KG: f64 = 2.5;

/// Derived display-only impact metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactEstimate {
    pub mass_saved_kg: f64,
    pub currency_saved: f64,
    pub co2_reduced_kg: f64,
}

/// Estimate the impact of intervening on a detected quantity.
///
/// Pure and deterministic; each step is rounded to one decimal place before
/// feeding the next. A negative quantity is accepted and yields a negative
/// (semantically meaningless) estimate; no clamping is applied.
pub fn estimate(quantity: f64) -> ImpactEstimate {
    let mass_saved_kg = round1(quantity * MASS_PER_ITEM_KG);
    let currency_saved = round1(mass_saved_kg * CURRENCY_PER_KG);
    let co2_reduced_kg = round1(mass_saved_kg * CO2_PER_KG);
    ImpactEstimate {
        mass_saved_kg,
        currency_saved,
        co2_reduced_kg,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

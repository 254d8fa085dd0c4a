use super::types::{BreakEven, BreakEvenMethod, Inputs, PROJECTION_YEARS, Projection, YearRecord};

const HOURS_PER_MONTH: f64 = 24.0 * 30.0;
const MONTHS_PER_YEAR: f64 = 12.0;

pub fn run_projection(inputs: &Inputs) -> Projection {
    let total_investment = inputs.total_investment();
    let net_charge_rate_year0 = inputs.net_charge_rate_year0();
    let total_gpus = inputs.total_gpus() as f64;
    let utilization = inputs.utilization_pct / 100.0;

    let electricity_cost = inputs.power_consumption_kwh_per_card_per_month
        * inputs.electricity_unit_price_gbp
        * total_gpus
        * utilization
        * MONTHS_PER_YEAR;
    let other_cost = (inputs.monthly_internet_gbp + inputs.monthly_misc_gbp) * MONTHS_PER_YEAR;

    let mut cumulative_profit = 0.0;
    let years: [YearRecord; PROJECTION_YEARS] = std::array::from_fn(|idx| {
        let charge_rate = charge_rate_for_year(inputs, idx as u32);
        let revenue = charge_rate * HOURS_PER_MONTH * total_gpus * utilization * MONTHS_PER_YEAR;
        let net_profit = revenue - electricity_cost - other_cost;
        cumulative_profit += net_profit;
        YearRecord {
            year: idx as u32 + 1,
            charge_rate,
            revenue,
            electricity_cost,
            other_cost,
            net_profit,
            cumulative_profit,
        }
    });

    let break_even = match inputs.break_even_method {
        BreakEvenMethod::Interpolate => interpolated_break_even(&years, total_investment),
        BreakEvenMethod::FirstCrossing => first_crossing_break_even(&years, total_investment),
    };

    Projection {
        effective_unit_cost: inputs.effective_unit_cost(),
        total_investment,
        total_gpus: inputs.total_gpus(),
        net_charge_rate_year0,
        final_year_charge_rate: charge_rate_for_year(inputs, PROJECTION_YEARS as u32 - 1),
        years,
        break_even,
    }
}

/// Net hourly charge rate in `year_index` (0 = first year), decayed
/// geometrically from the year-0 rate.
pub fn charge_rate_for_year(inputs: &Inputs, year_index: u32) -> f64 {
    let retained = 1.0 - inputs.rate_decline_pct_per_year / 100.0;
    inputs.net_charge_rate_year0() * retained.powi(year_index as i32)
}

fn never_breaks_even(years: &[YearRecord], total_investment: f64) -> bool {
    let best = years
        .iter()
        .map(|y| y.cumulative_profit)
        .fold(f64::NEG_INFINITY, f64::max);
    // NaN comparisons fall through here as well.
    !(best > total_investment)
}

fn interpolated_break_even(years: &[YearRecord], total_investment: f64) -> BreakEven {
    if never_breaks_even(years, total_investment) {
        return BreakEven::NotWithinHorizon;
    }
    let xp: Vec<f64> = years.iter().map(|y| y.cumulative_profit).collect();
    let fp: Vec<f64> = years.iter().map(|y| f64::from(y.year)).collect();
    BreakEven::Within {
        years: interp(total_investment, &xp, &fp),
    }
}

fn first_crossing_break_even(years: &[YearRecord], total_investment: f64) -> BreakEven {
    years
        .iter()
        .find(|y| y.cumulative_profit > total_investment)
        .map(|y| BreakEven::Within {
            years: f64::from(y.year),
        })
        .unwrap_or(BreakEven::NotWithinHorizon)
}

/// Piecewise-linear interpolation of `x` over the table `(xp, fp)`.
///
/// `xp` is assumed ascending. The right end is checked before the left, so
/// `x` above the last sample maps to the last `fp` even when `xp` has fallen
/// below its first value. When `xp` is not ascending the segment is picked by
/// binary search anyway; the result is approximate but never leaves the range
/// of `fp`.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 {
        return f64::NAN;
    }
    if x > xp[n - 1] {
        return fp[n - 1];
    }
    if n == 1 || x < xp[0] {
        return fp[0];
    }
    if x == xp[n - 1] {
        return fp[n - 1];
    }

    let upper = xp.partition_point(|&v| v <= x).clamp(1, n - 1);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 || !span.is_finite() {
        return fp[lower];
    }
    let t = ((x - xp[lower]) / span).clamp(0.0, 1.0);
    fp[lower] + t * (fp[upper] - fp[lower])
}

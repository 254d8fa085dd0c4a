use serde::Serialize;

pub const PROJECTION_YEARS: usize = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BreakEvenMethod {
    /// Linear interpolation of the investment against cumulative profit.
    #[default]
    Interpolate,
    /// First year whose cumulative profit exceeds the investment.
    FirstCrossing,
}

/// Scalar inputs for one projection run. All money is in GBP and all
/// percentages are in percent (e.g. `24.0` for 24%).
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub unit_price_gbp: f64,
    pub tax_rate_pct: f64,
    pub gpu_per_system: i32,
    pub num_systems: i32,
    pub hourly_rate_gbp: f64,
    pub utilization_pct: f64,
    pub rate_decline_pct_per_year: f64,
    pub platform_fee_pct: f64,
    pub electricity_unit_price_gbp: f64,
    pub power_consumption_kwh_per_card_per_month: f64,
    pub monthly_internet_gbp: f64,
    pub monthly_misc_gbp: f64,
    pub break_even_method: BreakEvenMethod,
}

impl Inputs {
    pub fn effective_unit_cost(&self) -> f64 {
        self.unit_price_gbp - self.unit_price_gbp * (self.tax_rate_pct / 100.0)
    }

    pub fn total_investment(&self) -> f64 {
        self.effective_unit_cost() * f64::from(self.num_systems)
    }

    pub fn total_gpus(&self) -> i64 {
        i64::from(self.num_systems) * i64::from(self.gpu_per_system)
    }

    pub fn net_charge_rate_year0(&self) -> f64 {
        self.hourly_rate_gbp - self.hourly_rate_gbp * (self.platform_fee_pct / 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year: u32,
    pub charge_rate: f64,
    pub revenue: f64,
    pub electricity_cost: f64,
    pub other_cost: f64,
    pub net_profit: f64,
    pub cumulative_profit: f64,
}

impl YearRecord {
    pub fn label(&self) -> String {
        format!("Year {}", self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BreakEven {
    #[serde(rename_all = "camelCase")]
    Within { years: f64 },
    NotWithinHorizon,
}

impl BreakEven {
    pub fn years(self) -> Option<f64> {
        match self {
            BreakEven::Within { years } => Some(years),
            BreakEven::NotWithinHorizon => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub effective_unit_cost: f64,
    pub total_investment: f64,
    pub total_gpus: i64,
    pub net_charge_rate_year0: f64,
    pub final_year_charge_rate: f64,
    pub years: [YearRecord; PROJECTION_YEARS],
    pub break_even: BreakEven,
}

use serde::Serialize;

use crate::core::{BreakEven, PROJECTION_YEARS, Projection};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub annual_profit: Vec<f64>,
    pub cumulative_profit: Vec<f64>,
    pub investment: Vec<f64>,
}

/// One year of the annual breakdown, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub year: String,
    pub revenue: String,
    pub electricity_cost: String,
    pub other_cost: String,
    pub net_profit: String,
    pub cumulative_profit: String,
}

impl TableRow {
    fn cells(self) -> [String; 6] {
        [
            self.year,
            self.revenue,
            self.electricity_cost,
            self.other_cost,
            self.net_profit,
            self.cumulative_profit,
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub effective_cost: String,
    pub total_cost: String,
    pub gbp_rate: String,
    pub charge_rate: String,
    pub total_investment: String,
    pub break_even: String,
}

/// Money with a pound sign, thousands separators and `decimals` places,
/// e.g. `£69,984` or `£-4,104`.
pub fn format_gbp(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return format!("£{value}");
    }
    let fixed = format!("{:.*}", decimals, value.abs());
    let (whole, frac) = match fixed.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // Sign follows the input, not the rounded digits: -0.2 prints as "£-0".
    let sign = if value.is_sign_negative() { "-" } else { "" };
    match frac {
        Some(frac) => format!("£{sign}{grouped}.{frac}"),
        None => format!("£{sign}{grouped}"),
    }
}

pub fn format_money(value: f64) -> String {
    format_gbp(value, 0)
}

pub fn format_rate(value: f64) -> String {
    format_gbp(value, 2)
}

pub fn break_even_message(break_even: BreakEven) -> String {
    match break_even {
        BreakEven::Within { years } => {
            format!("Break-even occurs after approximately {years:.1} years")
        }
        BreakEven::NotWithinHorizon => {
            format!("Investment does not break even within the {PROJECTION_YEARS}-year period")
        }
    }
}

pub fn chart_series(projection: &Projection) -> ChartSeries {
    ChartSeries {
        labels: projection.years.iter().map(|y| y.label()).collect(),
        annual_profit: projection.years.iter().map(|y| y.net_profit).collect(),
        cumulative_profit: projection
            .years
            .iter()
            .map(|y| y.cumulative_profit)
            .collect(),
        investment: vec![projection.total_investment; PROJECTION_YEARS],
    }
}

pub fn summary(projection: &Projection, hourly_rate_gbp: f64, num_systems: i32) -> Summary {
    Summary {
        effective_cost: format!(
            "Effective Cost in GBP per system: {}",
            format_money(projection.effective_unit_cost)
        ),
        total_cost: format!(
            "Total cost of systems is: {} which includes {} GPU cards",
            format_money(projection.effective_unit_cost * f64::from(num_systems)),
            projection.total_gpus
        ),
        gbp_rate: format!("rate in GBP: {hourly_rate_gbp:.2}"),
        charge_rate: format!(
            "You are charging {} per GPU hour (after charges) falling to {} after {PROJECTION_YEARS} years",
            format_rate(projection.net_charge_rate_year0),
            format_rate(projection.final_year_charge_rate)
        ),
        total_investment: format!(
            "Total Investment: {}",
            format_money(projection.total_investment)
        ),
        break_even: break_even_message(projection.break_even),
    }
}

pub fn table_rows(projection: &Projection) -> Vec<TableRow> {
    projection
        .years
        .iter()
        .map(|y| TableRow {
            year: y.label(),
            revenue: format_money(y.revenue),
            electricity_cost: format_money(y.electricity_cost),
            other_cost: format_money(y.other_cost),
            net_profit: format_money(y.net_profit),
            cumulative_profit: format_money(y.cumulative_profit),
        })
        .collect()
}

/// Plain-text annual breakdown for terminals.
pub fn render_table(projection: &Projection) -> String {
    let header = [
        "Year",
        "Revenue",
        "Electricity Costs",
        "Other Costs",
        "Net Profit",
        "Cumulative Profit",
    ];
    let rows: Vec<[String; 6]> = table_rows(projection)
        .into_iter()
        .map(TableRow::cells)
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, header.iter().map(|h| h.to_string()), &widths);
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');
    for row in rows {
        push_row(&mut out, row.into_iter(), &widths);
    }
    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let pad = width.saturating_sub(cell.chars().count());
        if idx == 0 {
            line.push_str(&cell);
            line.push_str(&" ".repeat(pad));
        } else {
            line.push_str(&" ".repeat(pad));
            line.push_str(&cell);
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

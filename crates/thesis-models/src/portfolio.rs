use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Allowed deviation of summed weights from 1.0 before a portfolio is
/// reported as not fully allocated.
pub const ALLOCATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Flattened view of a portfolio-construction payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub name: Option<String>,
    pub objective: Option<String>,
    pub positions: Vec<Position>,
    pub total_weight: Decimal,
    /// True when weights sum to 1.0 within `ALLOCATION_TOLERANCE`.
    pub fully_allocated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub name: Option<String>,
    pub weight: Decimal,
    pub rationale: Option<String>,
}

impl PortfolioSummary {
    /// Build a summary from a portfolio payload.
    ///
    /// Assets are read from `assets`, or from `schema.properties.assets` when
    /// the agent echoed the schema envelope back. Returns `None` when neither
    /// holds an array.
    pub fn from_payload(payload: &Value, subject: Option<&str>) -> Option<Self> {
        let assets = payload
            .get("assets")
            .or_else(|| payload.pointer("/schema/properties/assets"))
            .and_then(Value::as_array)?;

        let positions: Vec<Position> = assets.iter().filter_map(position_from_asset).collect();
        let total_weight: Decimal = positions.iter().map(|p| p.weight).sum();
        let fully_allocated = (total_weight - Decimal::ONE).abs() <= ALLOCATION_TOLERANCE;

        Some(Self {
            subject: subject.map(str::to_string),
            name: string_field(payload, "name"),
            objective: string_field(payload, "objective"),
            positions,
            total_weight,
            fully_allocated,
        })
    }
}

fn position_from_asset(asset: &Value) -> Option<Position> {
    let ticker = asset.get("ticker").and_then(Value::as_str)?;
    Some(Position {
        ticker: ticker.to_string(),
        name: string_field(asset, "ticker_name"),
        weight: asset.get("weight").and_then(decimal_value).unwrap_or(Decimal::ZERO),
        rationale: string_field(asset, "rationale"),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Weights arrive as JSON numbers or decimal strings.
fn decimal_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

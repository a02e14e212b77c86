// Per-second generation pricing
// Rates are hardcoded as fallback but can be overridden from database (system_settings table)

use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;

/// Hardcoded per-second rates in USD, used when the database has no
/// override for a model.
pub fn default_rates() -> HashMap<String, Decimal> {
    let mut rates = HashMap::new();
    rates.insert("kling-v1-6".to_string(), Decimal::new(920, 4)); // 0.0920
    rates.insert("luma-ray-2".to_string(), Decimal::new(1100, 4)); // 0.1100
    rates.insert("eleven-music-v1".to_string(), Decimal::new(80, 4)); // 0.0080
    rates
}

/// Per-second rates for every model, database overrides merged over the
/// hardcoded defaults. Override keys look like
/// `model_pricing.kling-v1-6.per_second`.
pub async fn fetch_model_rates(pool: &PgPool) -> Result<HashMap<String, Decimal>, sqlx::Error> {
    let mut rates = default_rates();

    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT setting_key, setting_value FROM system_settings WHERE setting_key LIKE 'model_pricing.%.per_second'",
    )
    .fetch_all(pool)
    .await?;

    for (key, value) in rows {
        let model = key
            .trim_start_matches("model_pricing.")
            .trim_end_matches(".per_second");
        match Decimal::from_str(&value) {
            Ok(rate) => {
                rates.insert(model.to_string(), rate);
            }
            Err(e) => {
                tracing::warn!(
                    "Bad rate for {} in system_settings: {} ({})",
                    model,
                    value,
                    e
                );
            }
        }
    }

    Ok(rates)
}

pub fn rate_for(rates: &HashMap<String, Decimal>, model: &str) -> Decimal {
    if let Some(rate) = rates.get(model) {
        return *rate;
    }
    match default_rates().get(model) {
        Some(rate) => *rate,
        None => {
            tracing::warn!("No rate for model {}, costing it at zero", model);
            Decimal::ZERO
        }
    }
}

/// Cost of `seconds` of generation at the model's per-second rate.
pub fn cost_for(rates: &HashMap<String, Decimal>, model: &str, seconds: f64) -> Decimal {
    let seconds = Decimal::try_from(seconds).unwrap_or_default();
    (rate_for(rates, model) * seconds).round_dp(6)
}

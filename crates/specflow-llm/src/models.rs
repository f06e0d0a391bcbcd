//! Model catalogue entries returned by `GET /models`

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Usage;

/// Response envelope of the models endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub data: Vec<Model>,
}

/// A model offered by the completion API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<serde_json::Value>,
}

/// Per-token prices in USD.
///
/// Providers publish prices as decimal strings (`"0.000003"`); numbers are
/// accepted too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default, deserialize_with = "price")]
    pub prompt: f64,
    #[serde(default, deserialize_with = "price")]
    pub completion: f64,
}

impl ModelPricing {
    /// Cost of one request in USD
    #[must_use]
    pub fn cost(&self, usage: &Usage) -> f64 {
        self.prompt * usage.prompt_tokens as f64 + self.completion * usage.completion_tokens as f64
    }
}

fn price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Price::deserialize(deserializer)? {
        Price::Number(n) => Ok(n),
        Price::Text(s) if s.trim().is_empty() => Ok(0.0),
        Price::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_string_and_numeric_prices() {
        let json = r#"{"data":[
            {"id":"a/one","name":"One","context_length":8192,
             "pricing":{"prompt":"0.000002","completion":"0.000004"}},
            {"id":"b/two","pricing":{"prompt":0.5,"completion":1}}
        ]}"#;
        let list: ModelList = serde_json::from_str(json).unwrap();
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].context_length, Some(8192));
        let pricing = list.data[0].pricing.unwrap();
        assert!((pricing.prompt - 0.000_002).abs() < 1e-12);
        assert_eq!(list.data[1].pricing.unwrap().completion, 1.0);
        assert_eq!(list.data[1].name, "");
    }

    #[test]
    fn test_cost_uses_prompt_and_completion_tokens() {
        let pricing = ModelPricing {
            prompt: 0.5,
            completion: 2.0,
        };
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 3,
            total_tokens: 13,
        };
        assert_eq!(pricing.cost(&usage), 11.0);
    }

    #[test]
    fn test_bad_price_is_an_error() {
        let json = r#"{"id":"x","pricing":{"prompt":"free","completion":"0"}}"#;
        assert!(serde_json::from_str::<Model>(json).is_err());
    }
}

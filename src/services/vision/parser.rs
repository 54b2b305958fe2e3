// Turns the vision model's reply into ingredients
//
// Primary path: JSON (optionally wrapped in markdown fences).
// Fallback: a regex over free text in the form "<name><n>克...<n>千卡...<x>千卡/克".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::{AnalysisResult, Ingredient};

static INGREDIENT_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^0-9]+)([0-9]+)克.*?([0-9]+)千卡.*?([0-9]+\.?[0-9]*)千卡/克")
        .expect("ingredient pattern is valid")
});

/// Which path produced the ingredients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSource {
    Json,
    TextFallback,
}

/// Read a numeric field leniently: numbers and numeric strings count, anything else is 0
fn lenient_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn ingredient_from_value(raw: &Value) -> Ingredient {
    let name = match raw.get("name") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let weight = lenient_number(raw.get("weight"));
    let calories = lenient_number(raw.get("calories"));
    let mut calories_per_gram = lenient_number(raw.get("caloriesPerGram"));
    if calories_per_gram == 0.0 {
        calories_per_gram = derive_calories_per_gram(calories, weight);
    }
    Ingredient::new(name, weight, calories, calories_per_gram)
}

/// calories / weight, or 0 when there is no weight to divide by
pub fn derive_calories_per_gram(calories: f64, weight: f64) -> f64 {
    if weight > 0.0 {
        calories / weight
    } else {
        0.0
    }
}

/// Remove ```json / ``` fence markers around a model reply
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse a JSON reply; `None` only when the text is not JSON at all.
///
/// Any JSON document takes the structured path. A document without an `ingredients` array
/// yields an empty result.
pub fn parse_structured(text: &str) -> Option<AnalysisResult> {
    let cleaned = strip_code_fences(text);
    let payload = match serde_json::from_str::<Value>(cleaned) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("Reply is not JSON: {}", e);
            return None;
        }
    };

    let ingredients = payload
        .get("ingredients")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(ingredient_from_value).collect())
        .unwrap_or_default();
    Some(AnalysisResult::new(ingredients))
}

/// Heuristic extraction from free text. Yields zero or more ingredients.
pub fn extract_from_text(text: &str) -> Vec<Ingredient> {
    INGREDIENT_TEXT
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps[1].trim().to_string();
            let weight = caps[2].parse::<f64>().ok()?;
            let calories = caps[3].parse::<f64>().ok()?;
            let calories_per_gram = caps[4].parse::<f64>().ok()?;
            debug!("Text match: {} {}g {}kcal {}kcal/g", name, weight, calories, calories_per_gram);
            Some(Ingredient::new(name, weight, calories, calories_per_gram))
        })
        .collect()
}

/// Parse a model reply: JSON first, then the text fallback.
///
/// A missing reply is treated as an empty JSON object.
pub fn parse_model_reply(content: Option<&str>) -> (AnalysisResult, ParseSource) {
    let content = content.unwrap_or("{}");

    if let Some(result) = parse_structured(content) {
        return (result, ParseSource::Json);
    }

    let ingredients = extract_from_text(content);
    if ingredients.is_empty() {
        warn!("Text fallback found no ingredients in model reply");
    }
    (AnalysisResult::new(ingredients), ParseSource::TextFallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_extracts_single_ingredient() {
        let (result, source) = parse_model_reply(Some("鸡胸肉150克约165千卡0.83千卡/克"));

        assert_eq!(source, ParseSource::TextFallback);
        assert_eq!(
            result.ingredients,
            vec![Ingredient::new("鸡胸肉", 150.0, 165.0, 0.83)]
        );
    }

    #[test]
    fn test_fallback_extracts_multiple_lines() {
        let text = "识别结果：\n米饭 200克，约260千卡，1.3千卡/克\n西兰花 80克，约27千卡，0.34千卡/克";
        let ingredients = extract_from_text(text);

        assert_eq!(ingredients.len(), 2);
        assert_eq!(ingredients[0].weight, 200.0);
        assert_eq!(ingredients[0].calories, 260.0);
        assert_eq!(ingredients[0].calories_per_gram, 1.3);
        // Leading prose is swallowed into the first name
        assert!(ingredients[0].name.ends_with("米饭"));
        assert_eq!(ingredients[1].name, "西兰花");
        assert_eq!(ingredients[1].calories_per_gram, 0.34);
    }

    #[test]
    fn test_fenced_empty_json_is_empty_result() {
        let (result, source) = parse_model_reply(Some("```json\n{\"ingredients\":[]}\n```"));
        assert_eq!(source, ParseSource::Json);
        assert!(result.is_empty());
    }

    #[test]
    fn test_json_with_all_fields() {
        let reply = r#"```json
{"ingredients":[{"name":"米饭","weight":150,"calories":195,"caloriesPerGram":1.3}]}
```"#;
        let result = parse_structured(reply).unwrap();
        assert_eq!(result.ingredients, vec![Ingredient::new("米饭", 150.0, 195.0, 1.3)]);
    }

    #[test]
    fn test_missing_calories_per_gram_is_derived() {
        let result =
            parse_structured(r#"{"ingredients":[{"name":"egg","weight":50,"calories":70}]}"#).unwrap();
        assert!((result.ingredients[0].calories_per_gram - 1.4).abs() < 1e-9);

        let result =
            parse_structured(r#"{"ingredients":[{"name":"salt","weight":0,"calories":0}]}"#).unwrap();
        assert_eq!(result.ingredients[0].calories_per_gram, 0.0);
    }

    #[test]
    fn test_missing_reply_is_empty_json() {
        let (result, source) = parse_model_reply(None);
        assert_eq!(source, ParseSource::Json);
        assert!(result.is_empty());
    }

    #[test]
    fn test_unmatched_prose_is_empty_fallback() {
        let (result, source) = parse_model_reply(Some("I cannot see any food in this picture."));
        assert_eq!(source, ParseSource::TextFallback);
        assert!(result.is_empty());
    }

    #[test]
    fn test_numeric_strings_are_read_as_numbers() {
        let reply = r#"{"ingredients":[{"name":"米饭","weight":"150","calories":"195","caloriesPerGram":"1.3"},{"name":"鸡蛋","weight":50,"calories":70,"caloriesPerGram":1.4}]}"#;
        let (result, source) = parse_model_reply(Some(reply));

        assert_eq!(source, ParseSource::Json);
        assert_eq!(
            result.ingredients,
            vec![
                Ingredient::new("米饭", 150.0, 195.0, 1.3),
                Ingredient::new("鸡蛋", 50.0, 70.0, 1.4),
            ]
        );
    }

    #[test]
    fn test_null_and_garbage_numbers_count_as_zero() {
        let reply = r#"{"ingredients":[{"name":"汤","weight":null,"calories":40,"caloriesPerGram":null},{"name":"面","weight":"a lot","calories":300}]}"#;
        let (result, source) = parse_model_reply(Some(reply));

        assert_eq!(source, ParseSource::Json);
        assert_eq!(result.ingredients.len(), 2);
        assert_eq!(result.ingredients[0].weight, 0.0);
        assert_eq!(result.ingredients[0].calories, 40.0);
        assert_eq!(result.ingredients[0].calories_per_gram, 0.0);
        assert_eq!(result.ingredients[1].weight, 0.0);
        assert_eq!(result.ingredients[1].calories, 300.0);
    }

    #[test]
    fn test_json_without_ingredients_array_is_empty_not_fallback() {
        for reply in [r#"{"foods":[]}"#, "[]", r#"{"ingredients":"none"}"#] {
            let (result, source) = parse_model_reply(Some(reply));
            assert_eq!(source, ParseSource::Json, "reply: {}", reply);
            assert!(result.is_empty());
        }
    }

    #[test]
    fn test_fallback_only_matches_ascii_digits() {
        // Full-width digits are skipped; the ASCII numbers later in the line are used
        let ingredients = extract_from_text("鸡胸肉１５０克150克约165千卡0.83千卡/克");
        assert_eq!(ingredients.len(), 1);
        assert_eq!(ingredients[0].name, "鸡胸肉１５０克");
        assert_eq!(ingredients[0].weight, 150.0);
        assert_eq!(ingredients[0].calories, 165.0);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }
}

// Shared data model for the capture → analysis → results flow

use serde::{Deserialize, Serialize};

/// Message returned to callers whenever the proxy fails
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze food image";

/// One detected ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    /// Estimated weight in grams
    pub weight: f64,
    /// Total calories in kcal
    pub calories: f64,
    /// kcal per gram, kept consistent with weight/calories by the edit rule
    pub calories_per_gram: f64,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, weight: f64, calories: f64, calories_per_gram: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            calories,
            calories_per_gram,
        }
    }
}

/// Ingredient list produced by one analysis request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

impl AnalysisResult {
    pub fn new(ingredients: Vec<Ingredient>) -> Self {
        Self { ingredients }
    }

    /// An empty list means "no food recognized", not an error
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }

    pub fn total_calories(&self) -> f64 {
        self.ingredients.iter().map(|i| i.calories).sum()
    }
}

/// Body of `POST /api/analyze-food`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub image_url: String,
}

/// Body returned with a non-2xx status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

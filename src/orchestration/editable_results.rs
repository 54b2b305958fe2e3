//! Editable ingredient table.
//!
//! Keeps `calories` and `caloriesPerGram` consistent with `weight` after each single-field
//! edit. Rows loaded from the model are taken as-is; the rule only applies on edit.

use crate::core::errors::EditError;
use crate::core::types::{AnalysisResult, Ingredient};
use crate::services::vision::parser::derive_calories_per_gram;

/// Editable column of an ingredient row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngredientField {
    Name,
    Weight,
    Calories,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IngredientTable {
    rows: Vec<Ingredient>,
}

impl IngredientTable {
    /// Load rows from an analysis result, filling a missing calories-per-gram ratio.
    pub fn from_result(result: &AnalysisResult) -> Self {
        let rows = result
            .ingredients
            .iter()
            .cloned()
            .map(|mut row| {
                if row.calories_per_gram == 0.0 || !row.calories_per_gram.is_finite() {
                    row.calories_per_gram = derive_calories_per_gram(row.calories, row.weight);
                }
                row
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Ingredient] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_calories(&self) -> f64 {
        self.rows.iter().map(|row| row.calories).sum()
    }

    /// Apply one edit as typed by the user and recompute the dependent field.
    pub fn edit(&mut self, index: usize, field: IngredientField, value: &str) -> Result<&Ingredient, EditError> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or(EditError::OutOfRange { index, len })?;

        match field {
            IngredientField::Name => row.name = value.to_string(),
            IngredientField::Weight => {
                row.weight = parse_number(value);
                row.calories = round_half_up(row.weight * row.calories_per_gram);
            }
            IngredientField::Calories => {
                row.calories = parse_number(value);
                row.calories_per_gram = derive_calories_per_gram(row.calories, row.weight);
            }
        }

        Ok(row)
    }

    pub fn into_result(self) -> AnalysisResult {
        AnalysisResult::new(self.rows)
    }
}

/// Numeric input; anything unparsable counts as 0
pub fn parse_number(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rice_table() -> IngredientTable {
        IngredientTable::from_result(&AnalysisResult::new(vec![
            Ingredient::new("rice", 150.0, 195.0, 1.3),
            Ingredient::new("egg", 50.0, 70.0, 1.4),
        ]))
    }

    #[test]
    fn test_weight_edit_recomputes_calories() {
        let mut table = rice_table();
        let row = table.edit(0, IngredientField::Weight, "200").unwrap();

        assert_eq!(row.weight, 200.0);
        assert_eq!(row.calories, 260.0);
        assert_eq!(row.calories_per_gram, 1.3);
        assert_eq!(table.total_calories(), 330.0);
    }

    #[test]
    fn test_calories_edit_recomputes_ratio() {
        let mut table = rice_table();
        let row = table.edit(1, IngredientField::Calories, "100").unwrap();

        assert_eq!(row.calories, 100.0);
        assert_eq!(row.weight, 50.0);
        assert_eq!(row.calories_per_gram, 2.0);
        assert_eq!(table.total_calories(), 295.0);
    }

    #[test]
    fn test_name_edit_touches_nothing_else() {
        let mut table = rice_table();
        let before = table.rows()[0].clone();
        let row = table.edit(0, IngredientField::Name, "brown rice").unwrap();

        assert_eq!(row.name, "brown rice");
        assert_eq!(row.weight, before.weight);
        assert_eq!(row.calories, before.calories);
        assert_eq!(row.calories_per_gram, before.calories_per_gram);
    }

    #[test]
    fn test_non_numeric_input_counts_as_zero() {
        let mut table = rice_table();
        let row = table.edit(0, IngredientField::Weight, "abc").unwrap();
        assert_eq!(row.weight, 0.0);
        assert_eq!(row.calories, 0.0);

        let row = table.edit(1, IngredientField::Calories, "").unwrap();
        assert_eq!(row.calories, 0.0);
        assert_eq!(row.calories_per_gram, 0.0);
    }

    #[test]
    fn test_calories_edit_with_zero_weight_keeps_ratio_finite() {
        let mut table = rice_table();
        table.edit(0, IngredientField::Weight, "0").unwrap();
        let row = table.edit(0, IngredientField::Calories, "50").unwrap();
        assert_eq!(row.calories_per_gram, 0.0);
    }

    #[test]
    fn test_rounding_is_half_up() {
        let mut table =
            IngredientTable::from_result(&AnalysisResult::new(vec![Ingredient::new("oil", 10.0, 90.0, 0.25)]));
        let row = table.edit(0, IngredientField::Weight, "2").unwrap();
        assert_eq!(row.calories, 1.0);
        let row = table.edit(0, IngredientField::Weight, "6").unwrap();
        assert_eq!(row.calories, 2.0);
    }

    #[test]
    fn test_edited_rows_flow_back_into_result() {
        let mut table = rice_table();
        table.edit(0, IngredientField::Name, "糙米").unwrap();
        let result = table.into_result();
        assert_eq!(result.ingredients[0].name, "糙米");
        assert_eq!(result.total_calories(), 265.0);
    }

    #[test]
    fn test_out_of_range_edit() {
        let mut table = rice_table();
        assert_eq!(
            table.edit(5, IngredientField::Name, "x").unwrap_err(),
            EditError::OutOfRange { index: 5, len: 2 }
        );
    }

    #[test]
    fn test_load_fills_missing_ratio_but_keeps_upstream_values() {
        let table = IngredientTable::from_result(&AnalysisResult::new(vec![
            Ingredient::new("tofu", 100.0, 80.0, 0.0),
            // Upstream ratio disagrees slightly with calories/weight; kept as sent
            Ingredient::new("rice", 150.0, 200.0, 1.3),
        ]));

        assert_eq!(table.rows()[0].calories_per_gram, 0.8);
        assert_eq!(table.rows()[1].calories_per_gram, 1.3);
        assert_eq!(table.total_calories(), 280.0);
    }
}

//! Meals: food logs and calorie reporting.

pub mod calories;
pub mod model;

pub use calories::{CalorieReport, MealBreakdown, Period, breakdown, local_day_bounds};
pub use model::{DailySummary, FoodItem, FoodLog, MealType};

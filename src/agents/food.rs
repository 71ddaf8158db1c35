//! Meal photo analysis.
//!
//! The vision model is asked for a JSON object describing the plate. Small
//! open models are sloppy with types (numbers as strings, arrays serialized
//! into strings), so the reply is read through `serde_json::Value` and
//! coerced field by field.

use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Agent, AgentKind, AgentPayload, AgentRequest, extract_json_object};
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest, InlineImage, LlmProvider};
use crate::meals::{FoodItem, FoodLog, MealType};
use crate::store::Database;

const SYSTEM_PROMPT: &str = "You are a nutrition expert that analyzes food photos.

Given a photo:
1. Identify all visible food items and estimate portion sizes.
2. Estimate the nutritional content of the whole meal.
3. Add one brief, helpful note (e.g. \"Good protein source!\").
4. If you are at least 90% sure the photo does not show food, set is_food to false.

Be reasonable with estimates; it's better to be approximately right than precisely wrong.
For ambiguous items, use typical serving sizes.

Reply with ONLY a JSON object of this shape:
{
  \"is_food\": true,
  \"items\": [{\"name\": \"grilled chicken\", \"calories\": 280, \"portion\": \"150 g\"}],
  \"calories\": 650,
  \"protein\": 45,
  \"carbs\": 60,
  \"fat\": 20,
  \"notes\": \"Good protein source!\"
}
Numbers are kcal for calories and grams for macros.";

const NOT_FOOD_REPLY: &str = "🤔 That doesn't look like a meal to me. \
Could you check you sent the right photo?\n\n\
📸 Send me a picture of your food and I'll estimate the calories.";

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("static regex"));

/// What the model saw on the plate.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodAnalysis {
    pub is_food: bool,
    pub items: Vec<FoodItem>,
    pub calories: f64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub notes: Option<String>,
}

impl FoodAnalysis {
    /// Parse the model reply.
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let value: Value = serde_json::from_str(extract_json_object(raw))
            .map_err(|e| AgentError::Parse(format!("food analysis is not JSON: {e}")))?;

        let is_food = value.get("is_food").map(lenient_bool).unwrap_or(true);
        let items = value.get("items").map(parse_items).unwrap_or_default();
        let notes = value
            .get("notes")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if !is_food {
            return Ok(Self {
                is_food,
                items,
                calories: 0.0,
                protein: None,
                carbs: None,
                fat: None,
                notes,
            });
        }

        let calories = value
            .get("calories")
            .and_then(lenient_number)
            .or_else(|| {
                let per_item: Vec<f64> = items.iter().filter_map(|i| i.calories).collect();
                (!per_item.is_empty()).then(|| per_item.iter().sum())
            })
            .ok_or_else(|| AgentError::Parse("food analysis has no calories".into()))?;

        Ok(Self {
            is_food,
            items,
            calories,
            protein: value.get("protein").and_then(lenient_number),
            carbs: value.get("carbs").and_then(lenient_number),
            fat: value.get("fat").and_then(lenient_number),
            notes,
        })
    }

    /// Chat reply for a logged meal.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if !self.items.is_empty() {
            let names: Vec<&str> = self.items.iter().map(|i| i.name.as_str()).collect();
            let _ = writeln!(out, "🍽️ {}\n", names.join(", "));
        }
        let _ = writeln!(out, "📊 Nutrition Breakdown:");
        let _ = writeln!(out, "   • Calories: ~{:.0} kcal", self.calories);
        for (label, grams) in [
            ("Protein", self.protein),
            ("Carbs", self.carbs),
            ("Fat", self.fat),
        ] {
            if let Some(g) = grams {
                let _ = writeln!(out, "   • {label}: {g:.0}g");
            }
        }
        if let Some(notes) = &self.notes {
            let _ = writeln!(out, "\n💡 {notes}");
        }
        out.push_str("\n✅ Meal logged!");
        out
    }
}

fn lenient_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "no" | "0"),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// Numbers, or strings like `"450"`, `"~450 kcal"`, `"12.5g"`.
fn lenient_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER.find(s).and_then(|m| m.as_str().parse().ok()),
        _ => None,
    };
    n.filter(|n: &f64| n.is_finite() && *n >= 0.0)
}

/// An array of items, or that array serialized into a string.
fn parse_items(v: &Value) -> Vec<FoodItem> {
    let array = match v {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    array
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(FoodItem {
                name: name.to_string(),
                calories: item.get("calories").and_then(lenient_number),
                portion: item
                    .get("portion")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Estimates a meal from a photo and logs it.
pub struct FoodAnalyzer {
    llm: Arc<dyn LlmProvider>,
    db: Arc<dyn Database>,
}

impl FoodAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>, db: Arc<dyn Database>) -> Self {
        Self { llm, db }
    }
}

#[async_trait]
impl Agent for FoodAnalyzer {
    fn kind(&self) -> AgentKind {
        AgentKind::Food
    }

    async fn run(&self, request: AgentRequest) -> Result<String, AgentError> {
        let AgentPayload::Photo(photo) = request.payload else {
            return Err(AgentError::UnexpectedPayload {
                agent: AgentKind::Food.name(),
                expected: "photo",
            });
        };
        let user = request.user;

        let image = InlineImage::new(photo.mime_type, BASE64.encode(&photo.bytes));
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_image("Analyze this meal.", image),
        ])
        .with_max_tokens(800)
        .with_temperature(0.2)
        .with_json_mode();

        let response = self.llm.complete(completion).await?;
        debug!(telegram_id = user.telegram_id, raw = %response.content, "Food analysis reply");
        let analysis = FoodAnalysis::parse(&response.content)?;

        if !analysis.is_food {
            info!(telegram_id = user.telegram_id, "Photo is not food, nothing logged");
            return Ok(NOT_FOOD_REPLY.to_string());
        }

        let now = Utc::now();
        let log = FoodLog {
            id: Uuid::new_v4(),
            telegram_id: user.telegram_id,
            calories: analysis.calories,
            protein: analysis.protein,
            carbs: analysis.carbs,
            fat: analysis.fat,
            items: analysis.items.clone(),
            meal_type: Some(MealType::at(now, user.tz())),
            notes: analysis.notes.clone(),
            logged_at: now,
        };
        self.db.insert_food_log(&log).await?;
        info!(
            telegram_id = user.telegram_id,
            calories = log.calories,
            meal = log.meal_label(),
            "Meal logged"
        );

        Ok(analysis.summary())
    }
}

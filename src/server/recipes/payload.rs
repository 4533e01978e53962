//! Turns a recipe JSON body into typed input, reporting every bad field at
//! once instead of stopping at the first.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::server::response::{ApiError, FieldErrors, push_field_error};
use crate::server::validation::{
    NOT_NULL, REQUIRED, validate_optional_text, validate_required_text,
};
use crate::types::{NewRecipe, RecipeChanges};

const PRICE_MAX_DIGITS: u32 = 5;
const PRICE_DECIMAL_PLACES: u32 = 2;

const NOT_STRING: &str = "Not a valid string.";
const NOT_INTEGER: &str = "A valid integer is required.";
const NOT_NUMBER: &str = "A valid number is required.";

/// Which fields must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// POST: title, time_minutes and price are required.
    Create,
    /// PUT: same required fields as create; absent optional fields are kept.
    Replace,
    /// PATCH: everything optional.
    Partial,
}

impl PayloadMode {
    fn requires_base_fields(self) -> bool {
        matches!(self, Self::Create | Self::Replace)
    }
}

/// Parsed recipe body. `user`, `id`, `image` and unknown keys are ignored.
#[derive(Debug, Default)]
pub struct RecipeInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipeInput {
    pub fn parse(body: &Value, mode: PayloadMode) -> Result<Self, ApiError> {
        let Value::Object(map) = body else {
            return Err(ApiError::bad_request(
                "Invalid data. Expected a JSON object.",
            ));
        };

        let mut errors = FieldErrors::new();
        let mut input = RecipeInput {
            title: field(map, "title", &mut errors, |v| {
                parse_text(v).and_then(|s| validate_required_text(&s).map(|()| s))
            }),
            description: field(map, "description", &mut errors, parse_text),
            time_minutes: field(map, "time_minutes", &mut errors, parse_integer),
            price: field(map, "price", &mut errors, parse_price),
            link: field(map, "link", &mut errors, |v| {
                parse_text(v).and_then(|s| validate_optional_text(&s).map(|()| s))
            }),
            tags: None,
            ingredients: None,
        };
        input.tags = names_field(map, "tags", &mut errors);
        input.ingredients = names_field(map, "ingredients", &mut errors);

        if mode.requires_base_fields() {
            for key in ["title", "time_minutes", "price"] {
                if !map.contains_key(key) {
                    push_field_error(&mut errors, key, REQUIRED);
                }
            }
        }

        if errors.is_empty() {
            Ok(input)
        } else {
            Err(ApiError::validation(errors))
        }
    }

    /// Converts a body parsed in `Create` mode.
    pub fn into_new_recipe(self) -> Result<NewRecipe, ApiError> {
        Ok(NewRecipe {
            title: self.title.ok_or_else(|| ApiError::field("title", REQUIRED))?,
            description: self.description.unwrap_or_default(),
            time_minutes: self
                .time_minutes
                .ok_or_else(|| ApiError::field("time_minutes", REQUIRED))?,
            price: self.price.ok_or_else(|| ApiError::field("price", REQUIRED))?,
            link: self.link.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            ingredients: self.ingredients.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn into_changes(self) -> RecipeChanges {
        RecipeChanges {
            title: self.title,
            description: self.description,
            time_minutes: self.time_minutes,
            price: self.price,
            link: self.link,
            tags: self.tags,
            ingredients: self.ingredients,
        }
    }
}

/// Parses `key` when present; a parse failure is recorded and yields `None`.
fn field<T>(
    map: &Map<String, Value>,
    key: &str,
    errors: &mut FieldErrors,
    parse: impl Fn(&Value) -> Result<T, String>,
) -> Option<T> {
    let value = map.get(key)?;
    if value.is_null() {
        push_field_error(errors, key, NOT_NULL);
        return None;
    }
    match parse(value) {
        Ok(parsed) => Some(parsed),
        Err(msg) => {
            push_field_error(errors, key, msg);
            None
        }
    }
}

/// A list of `{"name": ...}` descriptors. Present and empty means "clear".
fn names_field(
    map: &Map<String, Value>,
    key: &str,
    errors: &mut FieldErrors,
) -> Option<Vec<String>> {
    let value = map.get(key)?;
    let Value::Array(items) = value else {
        let msg = if value.is_null() {
            NOT_NULL.to_string()
        } else {
            format!("Expected a list of items but got type \"{}\".", type_name(value))
        };
        push_field_error(errors, key, msg);
        return None;
    };

    let mut names = Vec::with_capacity(items.len());
    let mut failed = false;
    for (index, item) in items.iter().enumerate() {
        match parse_descriptor(item) {
            Ok(name) => names.push(name),
            Err(msg) => {
                push_field_error(errors, key, format!("Item {index}: {msg}"));
                failed = true;
            }
        }
    }

    (!failed).then_some(names)
}

fn parse_descriptor(item: &Value) -> Result<String, String> {
    let Value::Object(descriptor) = item else {
        return Err(format!(
            "Invalid data. Expected a dictionary, but got {}.",
            type_name(item)
        ));
    };
    let name = match descriptor.get("name") {
        None => return Err(format!("name: {REQUIRED}")),
        Some(Value::Null) => return Err(format!("name: {NOT_NULL}")),
        Some(value) => parse_text(value).map_err(|msg| format!("name: {msg}"))?,
    };
    validate_required_text(&name).map_err(|msg| format!("name: {msg}"))?;
    Ok(name)
}

/// Strings are trimmed; numbers are accepted in their JSON spelling.
fn parse_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(NOT_STRING.to_string()),
    }
}

/// JSON integers, integral floats, or strings holding an integer.
fn parse_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| NOT_INTEGER.to_string()),
        Value::String(s) => s.trim().parse().map_err(|_| NOT_INTEGER.to_string()),
        _ => Err(NOT_INTEGER.to_string()),
    }
}

/// JSON numbers or decimal strings, at most 5 digits with 2 decimal places.
fn parse_price(value: &Value) -> Result<Decimal, String> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(NOT_NUMBER.to_string()),
    };
    let price = Decimal::from_str(&text).map_err(|_| NOT_NUMBER.to_string())?;
    check_price_digits(price)?;
    Ok(price)
}

fn check_price_digits(price: Decimal) -> Result<(), String> {
    let normalized = price.normalize();
    let decimals = normalized.scale();
    let significant = normalized.mantissa().unsigned_abs().to_string().len() as u32;
    let digits = significant.max(decimals);
    let whole_digits = digits - decimals;
    let max_whole = PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES;

    if digits > PRICE_MAX_DIGITS {
        return Err(format!(
            "Ensure that there are no more than {PRICE_MAX_DIGITS} digits in total."
        ));
    }
    if decimals > PRICE_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."
        ));
    }
    if whole_digits > max_whole {
        return Err(format!(
            "Ensure that there are no more than {max_whole} digits before the decimal point."
        ));
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

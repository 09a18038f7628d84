//! Schema checks for implementation-specific configuration tables.
//!
//! Factories receive the raw `toml::Value` of their section (`[ledger]`,
//! `[transport]`, a token's `[price_plugin]`, ...). Each implementation
//! exposes a [`ConfigSchema`] so the table can be checked before anything is
//! constructed from it.

use alloy::primitives::{Address, U256};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Nests the error under `parent`, so `rpc_url` becomes `ledger.rpc_url`.
	fn within(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(format!("{}.{}", parent, f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// Hex-encoded 20-byte account address.
	Address,
	/// Non-negative integer that may exceed `i64`, given as an integer or a
	/// decimal / `0x` string.
	Amount,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Type alias for field validator functions.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A field definition with name and type.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator run after the type check passes.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Keys not named by the schema are ignored; implementation tables share
	/// their section with keys such as `type`.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| ValidationError::TypeMismatch {
			field: "root".to_string(),
			expected: "table".to_string(),
			actual: config.type_str().to_string(),
		})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(field: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch(field, "string", value))?;
		}
		FieldType::Integer { min, max } => {
			let int_val = value.as_integer().ok_or_else(|| mismatch(field, "integer", value))?;
			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min_val),
				});
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max_val),
				});
			}
		}
		FieldType::Boolean => {
			value.as_bool().ok_or_else(|| mismatch(field, "boolean", value))?;
		}
		FieldType::Address => {
			let raw = value.as_str().ok_or_else(|| mismatch(field, "address string", value))?;
			Address::from_str(raw).map_err(|_| ValidationError::InvalidValue {
				field: field.to_string(),
				message: format!("'{}' is not a 20-byte hex address", raw),
			})?;
		}
		FieldType::Amount => {
			parse_amount(value).map_err(|message| ValidationError::InvalidValue {
				field: field.to_string(),
				message,
			})?;
		}
		FieldType::Array(inner) => {
			let array = value.as_array().ok_or_else(|| mismatch(field, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", field, i), item, inner)?;
			}
		}
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.within(field))?;
		}
	}

	Ok(())
}

/// Reads a non-negative amount from a TOML integer or numeric string.
pub fn parse_amount(value: &toml::Value) -> Result<U256, String> {
	match value {
		toml::Value::Integer(i) if *i >= 0 => Ok(U256::from(*i as u64)),
		toml::Value::Integer(i) => Err(format!("{} is negative", i)),
		toml::Value::String(s) => U256::from_str(s).map_err(|_| format!("'{}' is not a number", s)),
		other => Err(format!("expected integer or string, got {}", other.type_str())),
	}
}

/// Trait defining a configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	/// Checks required fields are present, types are correct and values meet
	/// their constraints.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

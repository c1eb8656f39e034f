//! Declared argument schemas and validation

use super::ToolError;
use serde_json::{json, Map, Value};

/// JSON type an argument must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Number,
}

impl ArgType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
        }
    }
}

/// One named argument
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub required: bool,
    pub description: &'static str,
}

impl ArgSpec {
    pub fn required(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            required: true,
            description,
        }
    }

    #[cfg(test)]
    pub fn optional(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            required: false,
            description,
        }
    }
}

/// Argument schema for a tool
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    args: Vec<ArgSpec>,
}

impl ToolSchema {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    /// Check presence and type of every declared argument.
    ///
    /// Undeclared keys are ignored. A JSON `null` counts as missing.
    pub fn validate(&self, tool: &str, args: &Value) -> Result<(), ToolError> {
        let empty = Map::new();
        let object = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::invalid_arguments(
                    tool,
                    format!("expected an object, got {other}"),
                ))
            }
        };

        for spec in &self.args {
            match object.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ToolError::invalid_arguments(
                        tool,
                        format!("missing required field '{}'", spec.name),
                    ));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.arg_type.accepts(value) => {
                    return Err(ToolError::invalid_arguments(
                        tool,
                        format!(
                            "field '{}' must be {}, got {value}",
                            spec.name,
                            spec.arg_type.as_str()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// JSON schema offered to the oracle
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|a| {
                (
                    a.name.to_string(),
                    json!({ "type": a.arg_type.as_str(), "description": a.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name)
            .collect();

        json!({
            "type": "object",
            "required": required,
            "properties": properties,
        })
    }
}

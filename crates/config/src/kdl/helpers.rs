//! Small accessors over KDL nodes.
//!
//! Blocks are written as `name { field value; ... }`, so most lookups are
//! "find the child node called X and take its first argument".

use kdl::{KdlNode, KdlValue};

use crate::ConfigError;

/// First positional (unnamed) argument of a node
pub fn get_first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// First positional argument as a string
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    get_first_arg(node)
        .and_then(|v| v.as_string())
        .map(str::to_string)
}

/// Child node of a block by name
pub fn get_child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
}

/// String value of a `name "value"` child
pub fn get_string_entry(node: &KdlNode, name: &str) -> Result<Option<String>, ConfigError> {
    let Some(child) = get_child(node, name) else {
        return Ok(None);
    };
    match get_first_arg(child) {
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(name, format!("expected a string, got {}", value))),
        None => Err(invalid(name, "missing value")),
    }
}

/// Integer value of a `name 42` child
pub fn get_int_entry(node: &KdlNode, name: &str) -> Result<Option<i128>, ConfigError> {
    let Some(child) = get_child(node, name) else {
        return Ok(None);
    };
    match get_first_arg(child) {
        Some(value) => value
            .as_integer()
            .map(Some)
            .ok_or_else(|| invalid(name, format!("expected an integer, got {}", value))),
        None => Err(invalid(name, "missing value")),
    }
}

/// Integer child converted into a narrower type
pub fn get_int_entry_as<T: TryFrom<i128>>(
    node: &KdlNode,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    get_int_entry(node, name)?
        .map(|v| T::try_from(v).map_err(|_| invalid(name, format!("{} is out of range", v))))
        .transpose()
}

pub(crate) fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

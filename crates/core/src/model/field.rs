use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar type of a normalized attribute. Each kind has its own field table
/// and link table in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    Text,
}

impl FieldKind {
    pub const ALL: [FieldKind; 3] = [FieldKind::Int, FieldKind::Float, FieldKind::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
            Self::Text(_) => FieldKind::Text,
        }
    }

    /// Coerces an arbitrary JSON value into one of the three stored scalar
    /// types. Anything that is not a number or a string is kept as its JSON
    /// text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if n.is_u64() {
                    Self::Text(n.to_string())
                } else {
                    n.as_f64()
                        .map(Self::Float)
                        .unwrap_or_else(|| Self::Text(n.to_string()))
                }
            }
            other => Self::Text(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn coerces_json_scalars() {
        assert_eq!(FieldValue::from_json(json!(3)), FieldValue::Int(3));
        assert_eq!(FieldValue::from_json(json!(2.5)), FieldValue::Float(2.5));
        assert_eq!(FieldValue::from_json(json!("x")), FieldValue::Text("x".into()));
    }

    #[test]
    fn stringifies_other_shapes() {
        assert_eq!(FieldValue::from_json(json!(true)), FieldValue::Text("true".into()));
        assert_eq!(FieldValue::from_json(json!(null)), FieldValue::Text("null".into()));
        assert_eq!(
            FieldValue::from_json(json!([1, 2])),
            FieldValue::Text("[1,2]".into())
        );
        assert_eq!(
            FieldValue::from_json(json!(u64::MAX)),
            FieldValue::Text(u64::MAX.to_string())
        );
    }

    #[test]
    fn untagged_serde_keeps_kind() {
        let values: Vec<FieldValue> = serde_json::from_str(r#"[1, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![FieldValue::Int(1), FieldValue::Float(2.5), FieldValue::Text("x".into())]
        );
    }
}

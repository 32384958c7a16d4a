//! Query descriptors: the operation text plus its bound variables.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variables bound to an operation
pub type Variables = Map<String, Value>;

/// Whether an operation reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

/// Immutable description of one operation execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Operation name, used for logging only
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub kind: OperationKind,
    #[serde(default)]
    pub variables: Variables,
}

impl QueryDescriptor {
    pub fn query(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind: OperationKind::Query,
            variables: Variables::new(),
        }
    }

    pub fn mutation(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            ..Self::query(name, text)
        }
    }

    /// Replace the bound variables
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Bind a single variable
    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn is_mutation(&self) -> bool {
        self.kind == OperationKind::Mutation
    }

    /// Stable key over text and variables, used by the response cache
    pub fn cache_key(&self) -> String {
        let mut key = self.text.clone();
        key.push('\u{0}');
        write_canonical(&mut key, &Value::Object(self.variables.clone()));
        key
    }
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(out, v);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

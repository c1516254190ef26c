//! CEL filter compilation and evaluation, used by `list`'s
//! `--include`/`--exclude` predicates and `gc`'s snapshot/volume sweeps.
//! Records are converted to `cel_interpreter::Value` via their
//! `serde_json::Value` form, so any `Serialize` record gets a
//! dotted-path-addressable CEL view for free.

use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::objects::{Key, Map as CelMap};
use cel_interpreter::{Context, Program, Value};
use serde::Serialize;

use crate::errors::MngError;

/// A compiled include/exclude CEL predicate pair. `None` for either side
/// means "no restriction" on that side.
pub struct FilterSet {
    include: Option<Program>,
    exclude: Option<Program>,
}

impl FilterSet {
    pub fn compile(include: Option<&str>, exclude: Option<&str>) -> Result<Self, MngError> {
        Ok(Self {
            include: include.map(compile_one).transpose()?,
            exclude: exclude.map(compile_one).transpose()?,
        })
    }

    /// No-op filter set: every record matches. Used when the caller
    /// passes neither `--include` nor `--exclude`.
    pub fn everything() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether `record` is included: present in `include` (or no
    /// `include` given) and absent from `exclude` (or no `exclude`
    /// given).
    pub fn matches<T: Serialize>(&self, record: &T) -> Result<bool, MngError> {
        if self.include.is_none() && self.exclude.is_none() {
            return Ok(true);
        }
        let value = to_cel_value(record)?;
        let mut ctx = Context::default();
        ctx.add_variable("item", value)
            .map_err(|e| MngError::Other(anyhow::anyhow!("bind CEL context: {e}")))?;

        if let Some(program) = &self.include {
            if !eval_bool(program, &ctx)? {
                return Ok(false);
            }
        }
        if let Some(program) = &self.exclude {
            if eval_bool(program, &ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn compile_one(expr: &str) -> Result<Program, MngError> {
    Program::compile(expr)
        .map_err(|e| MngError::UserInput(format!("invalid CEL expression `{expr}`: {e}")))
}

fn eval_bool(program: &Program, ctx: &Context) -> Result<bool, MngError> {
    match program.execute(ctx) {
        Ok(Value::Bool(b)) => Ok(b),
        Ok(other) => Err(MngError::UserInput(format!(
            "CEL filter must evaluate to a bool, got {other:?}"
        ))),
        Err(e) => Err(MngError::UserInput(format!("CEL evaluation failed: {e}"))),
    }
}

fn to_cel_value<T: Serialize>(record: &T) -> Result<Value, MngError> {
    let json = serde_json::to_value(record)
        .map_err(|e| MngError::Other(anyhow::anyhow!("serialize record for CEL: {e}")))?;
    Ok(json_to_cel(json))
}

fn json_to_cel(value: serde_json::Value) -> Value {
    use serde_json::Value as J;
    match value {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        J::String(s) => Value::String(Arc::new(s)),
        J::Array(items) => Value::List(Arc::new(items.into_iter().map(json_to_cel).collect())),
        J::Object(fields) => {
            let mut map = HashMap::new();
            for (k, v) in fields {
                map.insert(Key::String(Arc::new(k)), json_to_cel(v));
            }
            Value::Map(CelMap { map: Arc::new(map) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Sample {
        name: String,
        tier: String,
    }

    #[test]
    fn include_filter_admits_matching_record() {
        let filters = FilterSet::compile(Some(r#"item.tier == "prod""#), None).unwrap();
        let record = Sample {
            name: "a1".into(),
            tier: "prod".into(),
        };
        assert!(filters.matches(&record).unwrap());
    }

    #[test]
    fn exclude_filter_rejects_matching_record() {
        let filters = FilterSet::compile(None, Some(r#"item.tier == "prod""#)).unwrap();
        let record = Sample {
            name: "a1".into(),
            tier: "prod".into(),
        };
        assert!(!filters.matches(&record).unwrap());
    }

    #[test]
    fn no_filters_admits_everything() {
        let filters = FilterSet::everything();
        let record = Sample {
            name: "a1".into(),
            tier: "staging".into(),
        };
        assert!(filters.matches(&record).unwrap());
    }

    #[test]
    fn invalid_expression_is_a_user_input_error() {
        let result = FilterSet::compile(Some("item..."), None);
        assert!(matches!(result, Err(MngError::UserInput(_))));
    }
}

//! `${...}` interpolation over a merged configuration tree.
//!
//! Supported expressions:
//! * `${a.b.0.c}` absolute dotted path into the document, numeric segments index sequences
//! * `${oc.env:NAME}` and `${oc.env:NAME,default}` lookups in the variable store
//!
//! A string that is exactly one interpolation takes the referenced value with
//! its type. Interpolations embedded in longer strings are rendered as text.
//! Interpolations nest: `${oc.env:NAME,${a.b}}` resolves the inner one first.
//! `\${` produces a literal `${`.

use serde_json::{Map, Value};

use super::ConfigResolutionError;
use crate::config::variables::VariableStore;

/// Resolves every value of a mapping against the mapping itself.
pub(crate) fn resolve_mapping(
    root: &Map<String, Value>,
    variables: &dyn VariableStore,
) -> Result<Map<String, Value>, ConfigResolutionError> {
    let document = Value::Object(root.clone());
    let resolver = Resolver {
        root: &document,
        variables,
    };
    let mut in_progress = Vec::new();
    root.iter()
        .map(|(key, value)| {
            Ok((
                key.clone(),
                resolver.resolve_value(value, key, &mut in_progress)?,
            ))
        })
        .collect()
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Expr(String),
}

struct Resolver<'a> {
    root: &'a Value,
    variables: &'a dyn VariableStore,
}

impl Resolver<'_> {
    fn resolve_value(
        &self,
        value: &Value,
        at: &str,
        in_progress: &mut Vec<String>,
    ) -> Result<Value, ConfigResolutionError> {
        match value {
            Value::String(text) => self.resolve_string(text, at, in_progress),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_value(item, &join(at, &i.to_string()), in_progress))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| {
                    Ok((
                        key.clone(),
                        self.resolve_value(item, &join(at, key), in_progress)?,
                    ))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        text: &str,
        at: &str,
        in_progress: &mut Vec<String>,
    ) -> Result<Value, ConfigResolutionError> {
        let segments = parse_template(text, at)?;
        match segments.as_slice() {
            [] => Ok(Value::String(String::new())),
            [Segment::Expr(expr)] => self.evaluate(expr, at, in_progress),
            _ => {
                let mut rendered = String::new();
                for segment in &segments {
                    match segment {
                        Segment::Literal(literal) => rendered.push_str(literal),
                        Segment::Expr(expr) => {
                            let value = self.evaluate(expr, at, in_progress)?;
                            rendered.push_str(&stringify(&value, expr, at)?);
                        }
                    }
                }
                Ok(Value::String(rendered))
            }
        }
    }

    fn evaluate(
        &self,
        expr: &str,
        at: &str,
        in_progress: &mut Vec<String>,
    ) -> Result<Value, ConfigResolutionError> {
        let nested;
        let expr = if expr.contains("${") {
            nested = stringify(&self.resolve_string(expr, at, in_progress)?, expr, at)?;
            nested.trim()
        } else {
            expr.trim()
        };

        if let Some(args) = expr
            .strip_prefix("oc.env:")
            .or_else(|| expr.strip_prefix("env:"))
        {
            let (name, default) = match args.split_once(',') {
                Some((name, default)) => (name.trim(), Some(unquote(default.trim()))),
                None => (args.trim(), None),
            };
            return match (self.variables.get(name), default) {
                (Some(value), _) => Ok(Value::String(value)),
                (None, Some(default)) => Ok(Value::String(default.to_string())),
                (None, None) => Err(ConfigResolutionError::UndefinedVariable {
                    name: name.to_string(),
                    at: at.to_string(),
                }),
            };
        }

        if in_progress.iter().any(|key| key == expr) {
            return Err(ConfigResolutionError::Cycle {
                key: expr.to_string(),
            });
        }

        let target = lookup(self.root, expr).ok_or_else(|| ConfigResolutionError::UndefinedKey {
            key: expr.to_string(),
            at: at.to_string(),
        })?;

        in_progress.push(expr.to_string());
        let resolved = self.resolve_value(target, expr, in_progress);
        in_progress.pop();
        resolved
    }
}

fn parse_template(text: &str, at: &str) -> Result<Vec<Segment>, ConfigResolutionError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("\\${") {
            literal.push_str("${");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("${") {
            let end = closing_brace(after).ok_or_else(|| ConfigResolutionError::Unterminated {
                    value: text.to_string(),
                    at: at.to_string(),
                })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expr(after[..end].to_string()));
            rest = &after[end + 1..];
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                literal.push(c);
            }
            rest = chars.as_str();
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Offset of the `}` closing an interpolation whose body starts `after` its `${`.
fn closing_brace(after: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = 0;
    while i < after.len() {
        let rest = &after[i..];
        if rest.starts_with("\\${") {
            i += 3;
        } else if rest.starts_with("${") {
            depth += 1;
            i += 2;
        } else if rest.starts_with('}') {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 1;
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn stringify(value: &Value, expr: &str, at: &str) -> Result<String, ConfigResolutionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err(ConfigResolutionError::NonScalar {
            key: expr.to_string(),
            at: at.to_string(),
        }),
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

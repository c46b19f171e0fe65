// Aggregation pipelines - a declarative stage vocabulary and an executor
// that runs against plain document vectors, so it is testable without a
// store behind it.

use crate::document::{self, Document};
use crate::error::StoreError;
use crate::store::Filter;
use serde_json::{Number, Value};

/// Source of whole collections, needed to resolve `Lookup` stages.
/// An unknown collection resolves to no documents.
pub trait CollectionSource {
    fn collection(&self, name: &str) -> Result<Vec<Document>, StoreError>;
}

/// One step of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep only documents matching the filter.
    Match(Filter),
    /// Embed the matching documents of another collection as an array
    /// field on each driving document. A missing local value joins as
    /// null, pairing with foreign documents that also lack the field.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Fold documents into one row per distinct key, in first-encounter
    /// order. The key keeps its field name in the output row; documents
    /// missing the key group under null.
    Group {
        by: String,
        fields: Vec<(String, Accumulator)>,
    },
    /// Replace each document with exactly the projected fields. An
    /// expression that yields nothing omits its field.
    Project(Vec<(String, Expr)>),
    /// Stable sort. Documents missing the field rank lowest.
    Sort { field: String, descending: bool },
    /// Keep the first n documents.
    Limit(usize),
}

/// Per-group reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Number of documents in the group.
    Count,
    /// Number of documents where the field is `true`.
    CountIf(String),
    /// Sum of the expression; documents yielding nothing numeric are
    /// ignored, and an empty sum is 0.
    Sum(Expr),
    /// Mean of the expression; documents yielding nothing numeric are
    /// ignored, and a group with none reports null.
    Avg(Expr),
}

/// Value-producing expression evaluated against one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Current value of a field.
    Field(String),
    /// Element count of an array field.
    SizeOf(String),
    /// Product of two numeric expressions.
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient of two numeric expressions; nothing when the denominator
    /// is zero.
    Div(Box<Expr>, Box<Expr>),
    /// "YYYY-MM" bucket of an RFC 3339 date field.
    Month(String),
    /// Constant.
    Literal(Value),
}

impl Expr {
    pub fn field(name: &str) -> Self {
        Expr::Field(name.to_string())
    }

    pub fn size_of(name: &str) -> Self {
        Expr::SizeOf(name.to_string())
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Mul(Box::new(a), Box::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::Div(Box::new(a), Box::new(b))
    }
}

/// Execute a pipeline over the given input documents.
pub fn run(
    stages: &[Stage],
    input: Vec<Document>,
    source: &dyn CollectionSource,
) -> Result<Vec<Document>, StoreError> {
    let mut rows = input;
    for stage in stages {
        rows = apply_stage(stage, rows, source)?;
    }
    Ok(rows)
}

fn apply_stage(
    stage: &Stage,
    rows: Vec<Document>,
    source: &dyn CollectionSource,
) -> Result<Vec<Document>, StoreError> {
    match stage {
        Stage::Match(filter) => Ok(rows.into_iter().filter(|d| filter.matches(d)).collect()),
        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        } => {
            let foreign = source.collection(from)?;
            Ok(rows
                .into_iter()
                .map(|mut row| {
                    let local = row.get(local_field.as_str()).cloned().unwrap_or(Value::Null);
                    let matches: Vec<Value> = foreign
                        .iter()
                        .filter(|f| *f.get(foreign_field.as_str()).unwrap_or(&Value::Null) == local)
                        .cloned()
                        .map(Value::Object)
                        .collect();
                    row.insert(as_field.clone(), Value::Array(matches));
                    row
                })
                .collect())
        }
        Stage::Group { by, fields } => Ok(group(by, fields, rows)),
        Stage::Project(fields) => Ok(rows.iter().map(|row| project(fields, row)).collect()),
        Stage::Sort { field, descending } => {
            let mut rows = rows;
            rows.sort_by(|a, b| {
                let va = a.get(field.as_str()).unwrap_or(&Value::Null);
                let vb = b.get(field.as_str()).unwrap_or(&Value::Null);
                let ord = document::compare_values(va, vb);
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
            Ok(rows)
        }
        Stage::Limit(n) => {
            let mut rows = rows;
            rows.truncate(*n);
            Ok(rows)
        }
    }
}

fn group(by: &str, fields: &[(String, Accumulator)], rows: Vec<Document>) -> Vec<Document> {
    // Linear bucket scan keeps first-encounter order, which stable sorts
    // downstream rely on for tie-breaking.
    let mut buckets: Vec<(Value, Vec<Document>)> = Vec::new();
    for row in rows {
        let key = row.get(by).cloned().unwrap_or(Value::Null);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => buckets.push((key, vec![row])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert(by.to_string(), key);
            for (name, acc) in fields {
                if let Some(value) = accumulate(acc, &members) {
                    out.insert(name.clone(), value);
                }
            }
            out
        })
        .collect()
}

fn accumulate(acc: &Accumulator, members: &[Document]) -> Option<Value> {
    match acc {
        Accumulator::Count => Some(Value::from(members.len() as u64)),
        Accumulator::CountIf(field) => {
            let n = members
                .iter()
                .filter(|d| document::get_bool(d, field).unwrap_or(false))
                .count();
            Some(Value::from(n as u64))
        }
        Accumulator::Sum(expr) => {
            let total: f64 = members
                .iter()
                .filter_map(|d| eval(expr, d))
                .filter_map(|v| v.as_f64())
                .sum();
            Some(number(total))
        }
        Accumulator::Avg(expr) => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|d| eval(expr, d))
                .filter_map(|v| v.as_f64())
                .collect();
            if values.is_empty() {
                Some(Value::Null)
            } else {
                Some(number(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
    }
}

fn project(fields: &[(String, Expr)], row: &Document) -> Document {
    let mut out = Document::new();
    for (name, expr) in fields {
        if let Some(value) = eval(expr, row) {
            out.insert(name.clone(), value);
        }
    }
    out
}

fn eval(expr: &Expr, row: &Document) -> Option<Value> {
    match expr {
        Expr::Field(name) => document::get(row, name).cloned(),
        Expr::SizeOf(name) => {
            document::get_array(row, name).map(|items| Value::from(items.len() as u64))
        }
        Expr::Mul(a, b) => {
            let x = eval(a, row)?.as_f64()?;
            let y = eval(b, row)?.as_f64()?;
            Some(number(x * y))
        }
        Expr::Div(a, b) => {
            let x = eval(a, row)?.as_f64()?;
            let y = eval(b, row)?.as_f64()?;
            if y == 0.0 {
                None
            } else {
                Some(number(x / y))
            }
        }
        Expr::Month(field) => {
            let date = document::get(row, field).and_then(document::parse_date)?;
            Some(Value::String(date.format("%Y-%m").to_string()))
        }
        Expr::Literal(value) => Some(value.clone()),
    }
}

/// Integral results become JSON integers so counts stay clean.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

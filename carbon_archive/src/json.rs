//! JSON importer: turns a JSON document into a [`ColumnDoc`].

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use carbon_core::{Error, FieldType, Result, Scalar};

use crate::model::{
    ColumnDoc, ColumnEntry, ColumnGroupModel, ColumnModel, ObjectModel, StringDictionary, StringId,
};

/// Parse `json` and build its columnar model.
///
/// With `read_optimized`, string ids follow the lexicographic order of the
/// strings and every group is ordered by key id.
pub fn import(json: &str, read_optimized: bool) -> Result<ColumnDoc> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::InvalidModel(format!("malformed JSON: {e}")))?;
    import_value(&value, read_optimized)
}

pub fn import_value(value: &Value, read_optimized: bool) -> Result<ColumnDoc> {
    let Value::Object(root) = value else {
        return Err(Error::InvalidModel(format!(
            "JSON root must be an object, found {}",
            Coarse::of(value).name()
        )));
    };

    let mut all = Vec::new();
    collect_strings(value, &mut all);
    let strings = if read_optimized {
        StringDictionary::sorted(all)
    } else {
        let mut dict = StringDictionary::new();
        for s in all {
            dict.intern(s);
        }
        dict
    };

    let mut builder = Builder { strings };
    let mut root = builder.object(root)?;
    if read_optimized {
        root.sort_by_key();
    }
    tracing::debug!(strings = builder.strings.len(), read_optimized, "imported JSON document");
    Ok(ColumnDoc {
        strings: builder.strings,
        root,
        read_optimized,
    })
}

impl ColumnDoc {
    pub fn from_json(json: &str, read_optimized: bool) -> Result<Self> {
        import(json, read_optimized)
    }
}

/// Keys and string values in document order.
fn collect_strings<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                out.push(key);
                collect_strings(v, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::String(s) => out.push(s),
        _ => {}
    }
}

// ── Value classification ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Coarse {
    Null,
    Bool,
    Number,
    String,
    Object,
    Array,
}

impl Coarse {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Coarse::Null,
            Value::Bool(_) => Coarse::Bool,
            Value::Number(_) => Coarse::Number,
            Value::String(_) => Coarse::String,
            Value::Object(_) => Coarse::Object,
            Value::Array(_) => Coarse::Array,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Coarse::Null => "null",
            Coarse::Bool => "boolean",
            Coarse::Number => "number",
            Coarse::String => "string",
            Coarse::Object => "object",
            Coarse::Array => "array",
        }
    }
}

/// Common element class of an array; empty arrays count as null.
fn element_class(items: &[Value], key: &str) -> Result<Coarse> {
    let Some(first) = items.first() else {
        return Ok(Coarse::Null);
    };
    let class = Coarse::of(first);
    if class == Coarse::Array {
        return Err(Error::InvalidModel(format!(
            "array under key '{key}' contains nested arrays"
        )));
    }
    if let Some(other) = items.iter().map(Coarse::of).find(|c| *c != class) {
        return Err(Error::InvalidModel(format!(
            "array under key '{key}' mixes {} and {} values",
            class.name(),
            other.name()
        )));
    }
    Ok(class)
}

/// Smallest integer type holding every number, or float if any has a fraction.
fn number_type<'n>(numbers: impl IntoIterator<Item = &'n Number>, key: &str) -> Result<FieldType> {
    let (mut all_i32, mut all_i64, mut all_u64, mut any_float) = (true, true, true, false);
    for n in numbers {
        if n.is_f64() {
            any_float = true;
            continue;
        }
        let signed = n.as_i64();
        all_i64 &= signed.is_some();
        all_i32 &= signed.is_some_and(|v| i32::try_from(v).is_ok());
        all_u64 &= n.as_u64().is_some();
    }
    match (any_float, all_i32, all_i64, all_u64) {
        (true, ..) => Ok(FieldType::Float),
        (_, true, ..) => Ok(FieldType::Int32),
        (_, _, true, _) => Ok(FieldType::Int64),
        (_, _, _, true) => Ok(FieldType::UInt64),
        _ => Err(Error::InvalidModel(format!(
            "numbers under key '{key}' span both negative and beyond-int64 values"
        ))),
    }
}

fn number_scalar(n: &Number, ty: FieldType) -> Result<Scalar> {
    let out_of_range = || Error::InvalidModel(format!("{n} does not fit {}", ty.label()));
    Ok(match ty {
        FieldType::Int32 => {
            Scalar::Int32(n.as_i64().and_then(|v| i32::try_from(v).ok()).ok_or_else(out_of_range)?)
        }
        FieldType::Int64 => Scalar::Int64(n.as_i64().ok_or_else(out_of_range)?),
        FieldType::UInt64 => Scalar::UInt64(n.as_u64().ok_or_else(out_of_range)?),
        FieldType::Float => Scalar::Float(n.as_f64().ok_or_else(out_of_range)? as f32),
        _ => return Err(out_of_range()),
    })
}

// ── Model builder ──────────────────────────────────────────────────────────

struct Builder {
    strings: StringDictionary,
}

impl Builder {
    fn object(&mut self, map: &Map<String, Value>) -> Result<ObjectModel> {
        let mut obj = ObjectModel::new();
        for (key, value) in map {
            let k = self.strings.intern(key);
            match value {
                Value::Object(nested) => obj.insert_object(k, self.object(nested)?),
                Value::Array(items) => self.array(&mut obj, k, key, items)?,
                Value::Number(n) => {
                    let ty = number_type([n], key)?;
                    obj.insert_scalar(k, number_scalar(n, ty)?);
                }
                scalar => {
                    let ty = self.scalar_type(scalar);
                    obj.insert_scalar(k, self.scalar(scalar, ty)?);
                }
            }
        }
        Ok(obj)
    }

    fn array(&mut self, obj: &mut ObjectModel, k: StringId, key: &str, items: &[Value]) -> Result<()> {
        match element_class(items, key)? {
            Coarse::Object => {
                let group = self.column_group(k, key, items)?;
                obj.insert_column_group(group);
            }
            class => {
                let ty = self.class_type(class, items.iter(), key)?;
                let values = items
                    .iter()
                    .map(|v| self.scalar(v, ty))
                    .collect::<Result<Vec<_>>>()?;
                obj.insert_array(k, ty, values);
            }
        }
        Ok(())
    }

    /// Field type for values of one class; numbers are typed across all of `values`.
    fn class_type<'v>(
        &self,
        class: Coarse,
        values: impl Iterator<Item = &'v Value>,
        key: &str,
    ) -> Result<FieldType> {
        Ok(match class {
            Coarse::Null => FieldType::Null,
            Coarse::Bool => FieldType::Bool,
            Coarse::String => FieldType::String,
            Coarse::Object => FieldType::Object,
            Coarse::Number => number_type(
                values.filter_map(|v| match v {
                    Value::Number(n) => Some(n),
                    _ => None,
                }),
                key,
            )?,
            Coarse::Array => {
                return Err(Error::InvalidModel(format!(
                    "array under key '{key}' contains nested arrays"
                )))
            }
        })
    }

    fn scalar_type(&self, value: &Value) -> FieldType {
        match value {
            Value::Bool(_) => FieldType::Bool,
            Value::String(_) => FieldType::String,
            _ => FieldType::Null,
        }
    }

    fn scalar(&mut self, value: &Value, ty: FieldType) -> Result<Scalar> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            Value::Number(n) => number_scalar(n, ty),
            Value::String(s) => Ok(Scalar::String(self.strings.intern(s))),
            other => Err(Error::InvalidModel(format!(
                "{} is not a scalar value",
                Coarse::of(other).name()
            ))),
        }
    }

    /// Lay an array of objects out as one column per (key, value class).
    fn column_group(&mut self, k: StringId, key: &str, rows: &[Value]) -> Result<ColumnGroupModel> {
        type Cells<'v> = Vec<(u32, &'v Value)>;
        let mut order: Vec<(StringId, Coarse, &str, Cells<'_>)> = Vec::new();
        let mut slot: HashMap<(StringId, Coarse), usize> = HashMap::new();

        for (row, value) in rows.iter().enumerate() {
            let Value::Object(fields) = value else {
                return Err(Error::InvalidModel(format!(
                    "array under key '{key}' mixes objects and {} values",
                    Coarse::of(value).name()
                )));
            };
            for (name, cell) in fields {
                let class = match cell {
                    Value::Array(items) => element_class(items, name)?,
                    other => Coarse::of(other),
                };
                let column_key = self.strings.intern(name);
                let idx = *slot.entry((column_key, class)).or_insert_with(|| {
                    order.push((column_key, class, name.as_str(), Vec::new()));
                    order.len() - 1
                });
                order[idx].3.push((row as u32, cell));
            }
        }

        let mut group = ColumnGroupModel::new(k);
        for (column_key, class, name, cells) in order {
            let elements = cells.iter().flat_map(|(_, cell)| match cell {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                single => vec![*single],
            });
            let ty = self.class_type(class, elements, name)?;
            let mut column = ColumnModel::new(column_key, ty);
            for (row, cell) in cells {
                let items: &[Value] = match cell {
                    Value::Array(items) => items,
                    single => std::slice::from_ref(single),
                };
                let entry = if ty == FieldType::Object {
                    ColumnEntry::Objects(
                        items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|m| self.object(m))
                            .collect::<Result<_>>()?,
                    )
                } else {
                    ColumnEntry::Values(
                        items
                            .iter()
                            .map(|v| self.scalar(v, ty))
                            .collect::<Result<_>>()?,
                    )
                };
                column.push(row, entry);
            }
            group.columns.push(column);
        }
        Ok(group)
    }
}

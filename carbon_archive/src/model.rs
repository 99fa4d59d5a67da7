//! In-memory columnar document model handed to the archive writer.

use std::collections::{BTreeMap, HashMap};

use carbon_core::{Error, FieldType, PropFlags, PropKind, Result, Scalar};

/// Interned string identifier.
pub type StringId = u64;

// ── String dictionary ──────────────────────────────────────────────────────

/// Interned strings of one document, in dictionary order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringDictionary {
    entries: Vec<(StringId, String)>,
    by_text: HashMap<String, StringId>,
}

impl StringDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `s`, assigning the next free id on first sight. Ids start at 1.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.by_text.get(s) {
            return id;
        }
        let id = self.entries.len() as StringId + 1;
        self.entries.push((id, s.to_owned()));
        self.by_text.insert(s.to_owned(), id);
        id
    }

    /// Dictionary whose ids follow the lexicographic order of the strings.
    pub fn sorted<'s>(strings: impl IntoIterator<Item = &'s str>) -> Self {
        let mut all: Vec<&str> = strings.into_iter().collect();
        all.sort_unstable();
        all.dedup();
        let mut dict = Self::new();
        for s in all {
            dict.intern(s);
        }
        dict
    }

    pub fn id_of(&self, s: &str) -> Option<StringId> {
        self.by_text.get(s).copied()
    }

    pub fn get(&self, id: StringId) -> Option<&str> {
        let idx = usize::try_from(id.checked_sub(1)?).ok()?;
        self.entries.get(idx).map(|(_, s)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringId, &str)> {
        self.entries.iter().map(|(id, s)| (*id, s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Objects and property groups ────────────────────────────────────────────

/// One document node: property groups keyed by kind.
///
/// `BTreeMap` iteration follows [`PropKind`] order, which is the order groups
/// are laid out on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectModel {
    pub groups: BTreeMap<PropKind, PropGroup>,
}

/// Same-typed key/value pairs attached to one object.
#[derive(Debug, Clone, PartialEq)]
pub enum PropGroup {
    /// Fixed-width scalars, one value per key.
    Fixed { keys: Vec<StringId>, values: Vec<Scalar> },
    /// Nested objects, one per key.
    Objects { keys: Vec<StringId>, objects: Vec<ObjectModel> },
    /// Scalar arrays, one array per key.
    Arrays { keys: Vec<StringId>, arrays: Vec<Vec<Scalar>> },
    /// Arrays of objects in column layout.
    Table(Vec<ColumnGroupModel>),
}

impl PropGroup {
    pub fn len(&self) -> usize {
        match self {
            PropGroup::Fixed { keys, .. }
            | PropGroup::Objects { keys, .. }
            | PropGroup::Arrays { keys, .. } => keys.len(),
            PropGroup::Table(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<StringId> {
        match self {
            PropGroup::Fixed { keys, .. }
            | PropGroup::Objects { keys, .. }
            | PropGroup::Arrays { keys, .. } => keys.clone(),
            PropGroup::Table(groups) => groups.iter().map(|g| g.key).collect(),
        }
    }

    fn empty_for(kind: PropKind) -> Self {
        match kind {
            PropKind::Object => PropGroup::Objects { keys: Vec::new(), objects: Vec::new() },
            PropKind::ObjectArray => PropGroup::Table(Vec::new()),
            k if k.is_array() => PropGroup::Arrays { keys: Vec::new(), arrays: Vec::new() },
            _ => PropGroup::Fixed { keys: Vec::new(), values: Vec::new() },
        }
    }

    /// Reorder entries by ascending key id.
    fn sort_by_key(&mut self) {
        fn permute<T>(keys: &mut Vec<StringId>, items: &mut Vec<T>) {
            let mut paired: Vec<(StringId, T)> = keys.drain(..).zip(items.drain(..)).collect();
            paired.sort_by_key(|(k, _)| *k);
            for (k, item) in paired {
                keys.push(k);
                items.push(item);
            }
        }
        match self {
            PropGroup::Fixed { keys, values } => permute(keys, values),
            PropGroup::Objects { keys, objects } => {
                permute(keys, objects);
                objects.iter_mut().for_each(ObjectModel::sort_by_key);
            }
            PropGroup::Arrays { keys, arrays } => permute(keys, arrays),
            PropGroup::Table(groups) => {
                groups.sort_by_key(|g| g.key);
                for group in groups {
                    group.columns.sort_by_key(|c| c.key);
                    for column in &mut group.columns {
                        for entry in &mut column.entries {
                            if let ColumnEntry::Objects(objects) = entry {
                                objects.iter_mut().for_each(ObjectModel::sort_by_key);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl ObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_mut(&mut self, kind: PropKind) -> &mut PropGroup {
        self.groups
            .entry(kind)
            .or_insert_with(|| PropGroup::empty_for(kind))
    }

    pub fn insert_scalar(&mut self, key: StringId, value: Scalar) {
        let kind = PropKind::scalar_of(value.field_type());
        if let PropGroup::Fixed { keys, values } = self.group_mut(kind) {
            keys.push(key);
            values.push(value);
        }
    }

    /// Add an array of `ty` values. All elements must have type `ty`.
    pub fn insert_array(&mut self, key: StringId, ty: FieldType, values: Vec<Scalar>) {
        if let PropGroup::Arrays { keys, arrays } = self.group_mut(PropKind::array_of(ty)) {
            keys.push(key);
            arrays.push(values);
        }
    }

    pub fn insert_object(&mut self, key: StringId, object: ObjectModel) {
        if let PropGroup::Objects { keys, objects } = self.group_mut(PropKind::Object) {
            keys.push(key);
            objects.push(object);
        }
    }

    pub fn insert_column_group(&mut self, group: ColumnGroupModel) {
        if let PropGroup::Table(groups) = self.group_mut(PropKind::ObjectArray) {
            groups.push(group);
        }
    }

    pub fn group(&self, kind: PropKind) -> Option<&PropGroup> {
        self.groups.get(&kind).filter(|g| !g.is_empty())
    }

    /// Groups that will be written, in on-disk order.
    pub fn present_groups(&self) -> impl Iterator<Item = (PropKind, &PropGroup)> {
        self.groups
            .iter()
            .filter(|(_, g)| !g.is_empty())
            .map(|(k, g)| (*k, g))
    }

    /// Presence flags: one bit per non-empty group.
    pub fn flags(&self) -> PropFlags {
        self.present_groups().map(|(k, _)| k).collect()
    }

    /// Recursively reorder every group by key id.
    pub fn sort_by_key(&mut self) {
        for group in self.groups.values_mut() {
            group.sort_by_key();
        }
    }

    /// Check the shape invariants the writer relies on.
    pub fn validate(&self) -> Result<()> {
        for (kind, group) in &self.groups {
            validate_group(*kind, group)?;
        }
        Ok(())
    }
}

fn invalid(detail: String) -> Error {
    Error::InvalidModel(detail)
}

fn check_type(expected: FieldType, value: &Scalar, context: &str) -> Result<()> {
    if value.field_type() != expected {
        return Err(invalid(format!(
            "{context}: expected {} value but found {}",
            expected.label(),
            value.field_type().label()
        )));
    }
    Ok(())
}

fn validate_group(kind: PropKind, group: &PropGroup) -> Result<()> {
    let ty = kind.field_type();
    match (kind, group) {
        (PropKind::Object, PropGroup::Objects { keys, objects }) => {
            if keys.len() != objects.len() {
                return Err(invalid(format!(
                    "object group has {} keys but {} objects",
                    keys.len(),
                    objects.len()
                )));
            }
            objects.iter().try_for_each(ObjectModel::validate)
        }
        (PropKind::ObjectArray, PropGroup::Table(groups)) => {
            groups.iter().try_for_each(ColumnGroupModel::validate)
        }
        (k, PropGroup::Arrays { keys, arrays }) if k.is_array() && k != PropKind::ObjectArray => {
            if keys.len() != arrays.len() {
                return Err(invalid(format!(
                    "{} group has {} keys but {} arrays",
                    k.label(),
                    keys.len(),
                    arrays.len()
                )));
            }
            arrays
                .iter()
                .flatten()
                .try_for_each(|v| check_type(ty, v, k.label()))
        }
        (k, PropGroup::Fixed { keys, values }) if !k.is_array() && k != PropKind::Object => {
            if keys.len() != values.len() {
                return Err(invalid(format!(
                    "{} group has {} keys but {} values",
                    k.label(),
                    keys.len(),
                    values.len()
                )));
            }
            values.iter().try_for_each(|v| check_type(ty, v, k.label()))
        }
        (k, _) => Err(invalid(format!("{} group holds the wrong payload shape", k.label()))),
    }
}

// ── Column groups ──────────────────────────────────────────────────────────

/// One array-of-objects property: one column per (key, type) observed
/// across the array's elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnGroupModel {
    pub key: StringId,
    pub columns: Vec<ColumnModel>,
}

impl ColumnGroupModel {
    pub fn new(key: StringId) -> Self {
        Self { key, columns: Vec::new() }
    }

    /// Rows in the group: one past the highest position of any column.
    pub fn num_rows(&self) -> u32 {
        self.columns
            .iter()
            .filter_map(|c| c.positions.iter().max())
            .max()
            .map_or(0, |p| p + 1)
    }

    pub fn validate(&self) -> Result<()> {
        self.columns.iter().try_for_each(ColumnModel::validate)
    }
}

/// Values of one key across the rows of a column group.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub key: StringId,
    pub ty: FieldType,
    /// Row index of each entry, strictly increasing.
    pub positions: Vec<u32>,
    pub entries: Vec<ColumnEntry>,
}

/// The value(s) one row holds for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnEntry {
    Values(Vec<Scalar>),
    Objects(Vec<ObjectModel>),
}

impl ColumnEntry {
    pub fn len(&self) -> usize {
        match self {
            ColumnEntry::Values(v) => v.len(),
            ColumnEntry::Objects(o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ColumnModel {
    pub fn new(key: StringId, ty: FieldType) -> Self {
        Self {
            key,
            ty,
            positions: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, position: u32, entry: ColumnEntry) {
        self.positions.push(position);
        self.entries.push(entry);
    }

    pub fn validate(&self) -> Result<()> {
        if self.positions.len() != self.entries.len() {
            return Err(invalid(format!(
                "column {} has {} positions but {} entries",
                self.key,
                self.positions.len(),
                self.entries.len()
            )));
        }
        if self.positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(format!(
                "column {} positions are not strictly increasing",
                self.key
            )));
        }
        for entry in &self.entries {
            match (self.ty, entry) {
                (FieldType::Object, ColumnEntry::Objects(objects)) => {
                    objects.iter().try_for_each(ObjectModel::validate)?
                }
                (FieldType::Object, ColumnEntry::Values(_)) | (_, ColumnEntry::Objects(_)) => {
                    return Err(invalid(format!(
                        "column {} of type {} holds the wrong entry shape",
                        self.key,
                        self.ty.label()
                    )))
                }
                (ty, ColumnEntry::Values(values)) => {
                    values.iter().try_for_each(|v| check_type(ty, v, "column entry"))?
                }
            }
        }
        Ok(())
    }
}

// ── Document ───────────────────────────────────────────────────────────────

/// Everything the writer needs: the dictionary and the root object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDoc {
    pub strings: StringDictionary,
    pub root: ObjectModel,
    /// Ids are lexicographic and groups are ordered by key.
    pub read_optimized: bool,
}

impl ColumnDoc {
    pub fn new(strings: StringDictionary, root: ObjectModel) -> Self {
        Self {
            strings,
            root,
            read_optimized: false,
        }
    }
}

//! Attribute snapshots, dirty tracking and the relation cache.

use indexmap::IndexMap;

use crate::filter::FilterValue;
use crate::row::{Attributes, Row};

/// A loaded relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// To-one relation; `None` when nothing matched.
    One(Option<Box<EntityState>>),
    /// To-many relation; empty when nothing matched.
    Many(Vec<EntityState>),
}

impl RelationValue {
    /// Build a value of the right shape from loaded states.
    pub fn from_states(many: bool, states: Vec<EntityState>) -> Self {
        if many {
            Self::Many(states)
        } else {
            Self::One(states.into_iter().next().map(Box::new))
        }
    }

    /// The loaded states, zero or more.
    pub fn states(&self) -> Vec<&EntityState> {
        match self {
            Self::One(one) => one.as_deref().into_iter().collect(),
            Self::Many(many) => many.iter().collect(),
        }
    }

    /// Take ownership of the loaded states.
    pub fn into_states(self) -> Vec<EntityState> {
        match self {
            Self::One(one) => one.map(|s| vec![*s]).unwrap_or_default(),
            Self::Many(many) => many,
        }
    }

    /// Whether this is a to-many value.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    /// Number of loaded states.
    pub fn len(&self) -> usize {
        match self {
            Self::One(one) => usize::from(one.is_some()),
            Self::Many(many) => many.len(),
        }
    }

    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current and last-persisted attributes of one entity.
///
/// `dirty = {k : current[k] != original[k]}`; a successful write resets
/// `original` to `current`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    attributes: Attributes,
    original: Attributes,
    exists: bool,
    relations: IndexMap<String, RelationValue>,
    pivot: Option<Attributes>,
}

impl EntityState {
    /// A state for an entity not yet persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A persisted state hydrated from a row.
    pub fn from_row(row: Row) -> Self {
        Self::hydrate(row.into_attributes())
    }

    /// A persisted state with `attributes` as both snapshots.
    pub fn hydrate(attributes: Attributes) -> Self {
        Self {
            original: attributes.clone(),
            attributes,
            exists: true,
            relations: IndexMap::new(),
            pivot: None,
        }
    }

    /// Get a current attribute.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.attributes.get(column)
    }

    /// Set a current attribute.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) {
        self.attributes.insert(column.into(), value.into());
    }

    /// Remove a current attribute.
    pub fn remove(&mut self, column: &str) -> Option<FilterValue> {
        self.attributes.shift_remove(column)
    }

    /// Current attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Last-persisted attributes.
    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Changed attributes, skipping `exclude`.
    pub fn dirty_except(&self, exclude: &[&str]) -> Attributes {
        self.attributes
            .iter()
            .filter(|(k, v)| !exclude.contains(&k.as_str()) && self.original.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Changed attributes.
    pub fn dirty(&self) -> Attributes {
        self.dirty_except(&[])
    }

    /// Whether any attribute changed.
    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Whether `column` changed.
    pub fn is_dirty_column(&self, column: &str) -> bool {
        self.attributes.get(column) != self.original.get(column)
    }

    /// Mark the current attributes as persisted.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Mark specific columns as persisted.
    pub fn sync_original_columns(&mut self, columns: &[&str]) {
        for column in columns {
            match self.attributes.get(*column) {
                Some(value) => {
                    self.original.insert((*column).to_string(), value.clone());
                }
                None => {
                    self.original.shift_remove(*column);
                }
            }
        }
    }

    /// Replace both snapshots with freshly loaded attributes. The relation
    /// cache is cleared.
    pub fn replace(&mut self, attributes: Attributes) {
        self.original = attributes.clone();
        self.attributes = attributes;
        self.relations.clear();
        self.exists = true;
    }

    /// Whether the entity has a row.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Set the existence flag.
    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// A cached relation.
    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    /// Whether a relation is cached.
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Cache a relation.
    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) {
        self.relations.insert(name.into(), value);
    }

    /// Remove a cached relation.
    pub fn take_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.shift_remove(name)
    }

    /// Names of cached relations, in load order.
    pub fn loaded_relations(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Pivot columns, for an entity loaded through a pivot table.
    pub fn pivot(&self) -> Option<&Attributes> {
        self.pivot.as_ref()
    }

    /// Move `columns` out of the attributes into the pivot map.
    pub fn split_pivot(&mut self, columns: &[String]) {
        let mut pivot = Attributes::new();
        for column in columns {
            if let Some(value) = self.attributes.shift_remove(column) {
                self.original.shift_remove(column);
                let name = column.strip_prefix("pivot_").unwrap_or(column);
                pivot.insert(name.to_string(), value);
            }
        }
        self.pivot = Some(pivot);
    }

    /// Attributes plus loaded relations, as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match Row::new(self.attributes.clone()).to_json() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (name, value) in &self.relations {
            let json = match value {
                RelationValue::One(None) => serde_json::Value::Null,
                RelationValue::One(Some(state)) => state.to_json(),
                RelationValue::Many(states) => {
                    serde_json::Value::Array(states.iter().map(EntityState::to_json).collect())
                }
            };
            object.insert(name.clone(), json);
        }
        serde_json::Value::Object(object)
    }
}

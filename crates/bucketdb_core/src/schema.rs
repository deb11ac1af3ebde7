//! Field definitions that map caller data onto entity documents.
//!
//! A [`Schema`] decides where each field of a caller's data lands: mandatory
//! fields are inlined in the core record, optional fields go to the bucket
//! named by their group, and fields with index derivations produce index
//! specs.

use crate::error::{CoreError, CoreResult};
use crate::keys;
use crate::store::IndexSpec;
use bucketdb_storage::Attributes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Group of mandatory fields, stored in the core record.
pub const DEFAULT_GROUP: &str = "default";

/// Accepts or rejects a field value.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Derives an index value from a field value.
pub type Derivation = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Definition of one entity field.
#[derive(Clone)]
pub struct FieldDef {
    name: String,
    mandatory: bool,
    group: String,
    description: Option<String>,
    validator: Option<Validator>,
    search_by: Vec<Derivation>,
}

impl FieldDef {
    /// Creates an optional field in the default group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mandatory: false,
            group: DEFAULT_GROUP.to_string(),
            description: None,
            validator: None,
            search_by: Vec::new(),
        }
    }

    /// Sets whether the field is mandatory.
    #[must_use]
    pub fn mandatory(mut self, value: bool) -> Self {
        self.mandatory = value;
        self
    }

    /// Sets the bucket group of an optional field.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets a description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the validator values must pass.
    #[must_use]
    pub fn validate(mut self, validator: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Adds an index derivation; the field's name is the index name.
    #[must_use]
    pub fn search_by(
        mut self,
        derivation: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.search_by.push(Arc::new(derivation));
        self
    }

    /// Indexes the field by its own value.
    #[must_use]
    pub fn search_by_value(self) -> Self {
        self.search_by(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Returns the field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the field is mandatory.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Returns the bucket group.
    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.group
    }

    /// Returns the description.
    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns true if the field has index derivations.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        !self.search_by.is_empty()
    }

    /// Checks `value` against the validator.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the validator rejects `value`.
    pub fn check(&self, value: &Value) -> CoreResult<()> {
        match &self.validator {
            Some(validator) if !validator(value) => Err(CoreError::validation(format!(
                "invalid value for `{}`: {value}",
                self.name
            ))),
            _ => Ok(()),
        }
    }

    /// Returns the non-empty index values derived from `value`.
    #[must_use]
    pub fn index_values(&self, value: &Value) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for derive in &self.search_by {
            if let Some(derived) = derive(value).filter(|v| !v.is_empty()) {
                if !values.contains(&derived) {
                    values.push(derived);
                }
            }
        }
        values
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("mandatory", &self.mandatory)
            .field("group", &self.group)
            .field("description", &self.description)
            .field("validated", &self.validator.is_some())
            .field("derivations", &self.search_by.len())
            .finish()
    }
}

/// Caller data split into the parts of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Mandatory attributes for the core record.
    pub core: Attributes,
    /// Optional attributes by bucket group.
    pub buckets: Vec<(String, Attributes)>,
    /// Index specs derived from indexed fields.
    pub index_specs: Vec<IndexSpec>,
}

/// The set of fields of one collection.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldDef>,
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for duplicate or unusable field names, unusable
    /// group names, and mandatory fields outside the default group.
    pub fn build(self) -> CoreResult<Schema> {
        let mut fields = BTreeMap::new();
        for field in self.fields {
            keys::validate_segment("field name", &field.name)?;
            keys::validate_segment("group name", &field.group)?;
            if field.mandatory && field.group != DEFAULT_GROUP {
                return Err(CoreError::validation(format!(
                    "mandatory field `{}` must be in the `{DEFAULT_GROUP}` group",
                    field.name
                )));
            }
            if fields.contains_key(&field.name) {
                return Err(CoreError::validation(format!(
                    "field `{}` is defined twice",
                    field.name
                )));
            }
            fields.insert(field.name.clone(), field);
        }
        Ok(Schema { fields })
    }
}

impl Schema {
    /// Creates a schema builder.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns the definition of `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Returns all field definitions in name order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    fn lookup(&self, name: &str) -> CoreResult<&FieldDef> {
        self.fields
            .get(name)
            .ok_or_else(|| CoreError::validation(format!("unknown field `{name}`")))
    }

    /// Returns the validated mandatory attributes of `data`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unknown fields, rejected values and missing
    /// mandatory fields.
    pub fn resolve_core(&self, data: &Attributes) -> CoreResult<Attributes> {
        let mut core = Attributes::new();
        for (name, value) in data {
            let field = self.lookup(name)?;
            if field.mandatory {
                field.check(value)?;
                core.insert(name.clone(), value.clone());
            }
        }
        if let Some(missing) = self
            .fields
            .values()
            .find(|field| field.mandatory && !core.contains_key(&field.name))
        {
            return Err(CoreError::validation(format!(
                "missing mandatory field `{}`",
                missing.name
            )));
        }
        Ok(core)
    }

    /// Returns the validated optional attributes of `data` grouped by bucket.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unknown fields and rejected values.
    pub fn resolve_buckets(&self, data: &Attributes) -> CoreResult<Vec<(String, Attributes)>> {
        let mut groups: BTreeMap<String, Attributes> = BTreeMap::new();
        for (name, value) in data {
            let field = self.lookup(name)?;
            if !field.mandatory {
                field.check(value)?;
                groups
                    .entry(field.group.clone())
                    .or_default()
                    .insert(name.clone(), value.clone());
            }
        }
        Ok(groups.into_iter().collect())
    }

    /// Returns the index specs derived from the indexed fields of `data`.
    #[must_use]
    pub fn resolve_index_specs(&self, data: &Attributes) -> Vec<IndexSpec> {
        data.iter()
            .filter_map(|(name, value)| self.fields.get(name).map(|field| (field, value)))
            .flat_map(|(field, value)| {
                field
                    .index_values(value)
                    .into_iter()
                    .map(|derived| IndexSpec::new(field.name.clone(), derived))
            })
            .collect()
    }

    /// Splits `data` into core attributes, buckets and index specs.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unknown fields, rejected values and missing
    /// mandatory fields.
    pub fn resolve(&self, data: &Attributes) -> CoreResult<Resolved> {
        Ok(Resolved {
            core: self.resolve_core(data)?,
            buckets: self.resolve_buckets(data)?,
            index_specs: self.resolve_index_specs(data),
        })
    }
}

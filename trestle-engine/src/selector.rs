//! Selector identity.
//!
//! A selector is one unit of resolver input and doubles as the
//! deduplication key and the result-map key for a batch. Equality and hash
//! therefore cover only the semantically meaningful fields; the deferred
//! accessors are fresh closures on every call site and must not split a
//! batch, so they are stored alongside the key, not as part of it.

use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use derivative::Derivative;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::json_ext::ValueExt;
use crate::spec::SelectionSet;

/// Resolved object data: a type name plus its materialized fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectData {
    pub type_name: String,
    pub fields: Object,
}

impl ObjectData {
    pub fn new(type_name: impl Into<String>, fields: Object) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// A field of this object, if materialized.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Deep-merges `other`'s fields into this object.
    pub fn merge_fields(&mut self, other: &ObjectData) {
        self.fields
            .deep_merge(Value::Object(other.fields.clone()));
    }
}

impl Hash for ObjectData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.fields.stable_hash(state);
    }
}

/// A deferred accessor for a synchronously-materialized object value.
pub type DeferredAccessor = Arc<dyn Fn() -> Arc<ObjectData> + Send + Sync>;

/// One unit of field-resolver input.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FieldSelector {
    /// Caller-provided arguments, name to value.
    pub arguments: Object,

    /// The resolved parent object, scoped to the resolver's declared
    /// object selection set.
    pub object_value: Option<Arc<ObjectData>>,

    /// The resolved query-root object, scoped to the resolver's declared
    /// query selection set.
    pub query_value: Option<Arc<ObjectData>>,

    /// The sub-selection the caller requested for this field's output, if
    /// the field has a composite type.
    pub selections: Option<SelectionSet>,

    /// Deferred accessor for the parent object. Not part of identity.
    #[derivative(Debug = "ignore")]
    pub object_accessor: Option<DeferredAccessor>,

    /// Deferred accessor for the query object. Not part of identity.
    #[derivative(Debug = "ignore")]
    pub query_accessor: Option<DeferredAccessor>,
}

#[buildstructor::buildstructor]
impl FieldSelector {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(
        arguments: Option<Object>,
        object_value: Option<Arc<ObjectData>>,
        query_value: Option<Arc<ObjectData>>,
        selections: Option<SelectionSet>,
        object_accessor: Option<DeferredAccessor>,
        query_accessor: Option<DeferredAccessor>,
    ) -> Self {
        Self {
            arguments: arguments.unwrap_or_default(),
            object_value,
            query_value,
            selections,
            object_accessor,
            query_accessor,
        }
    }
}

impl FieldSelector {
    /// This selector with a different parent object attached.
    pub(crate) fn with_object_value(mut self, object_value: Arc<ObjectData>) -> Self {
        self.object_value = Some(object_value);
        self
    }

    /// This selector with a different query object attached.
    pub(crate) fn with_query_value(mut self, query_value: Arc<ObjectData>) -> Self {
        self.query_value = Some(query_value);
        self
    }
}

impl PartialEq for FieldSelector {
    fn eq(&self, other: &Self) -> bool {
        self.arguments == other.arguments
            && self.object_value == other.object_value
            && self.query_value == other.query_value
            && self.selections == other.selections
    }
}

impl Eq for FieldSelector {}

impl Hash for FieldSelector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.arguments.stable_hash(state);
        self.object_value.is_some().hash(state);
        if let Some(object_value) = &self.object_value {
            object_value.hash(state);
        }
        self.query_value.is_some().hash(state);
        if let Some(query_value) = &self.query_value {
            query_value.hash(state);
        }
        self.selections.hash(state);
    }
}

/// One unit of node-resolver input: a serialized global id plus the
/// caller's requested sub-selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSelector {
    pub id: String,
    pub selections: Option<SelectionSet>,
}

impl NodeSelector {
    pub fn new(id: impl Into<String>, selections: Option<SelectionSet>) -> Self {
        Self {
            id: id.into(),
            selections,
        }
    }
}

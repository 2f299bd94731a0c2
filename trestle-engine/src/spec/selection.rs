//! Requested and required selection sets.
//!
//! The query language grammar is out of scope here: an external
//! schema/validation layer hands the engine already-structured selections.
//! What matters locally is value identity (selection sets participate in
//! selector equality and in selective node-cache keys) and enumeration of
//! the top-level fields a resolver declared as prerequisites.

use serde::Deserialize;
use serde::Serialize;

/// One selection inside a selection set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selection {
    /// A named field, optionally aliased, optionally carrying sub-selections.
    Field {
        name: String,
        alias: Option<String>,
        selection_set: Option<Vec<Selection>>,
    },
    /// An inline fragment narrowing to a type condition.
    InlineFragment {
        type_condition: String,
        selection_set: Vec<Selection>,
    },
}

impl Selection {
    /// A leaf field selection.
    pub fn field(name: impl Into<String>) -> Self {
        Selection::Field {
            name: name.into(),
            alias: None,
            selection_set: None,
        }
    }

    /// A field selection with sub-selections.
    pub fn field_with(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::Field {
            name: name.into(),
            alias: None,
            selection_set: Some(selections),
        }
    }
}

/// The selections a caller requested for one field or node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    /// A selection set of leaf fields, in order.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selections: names.into_iter().map(Selection::field).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Top-level field names, fragments flattened.
    pub fn field_names(&self) -> Vec<&str> {
        fn walk<'a>(selections: &'a [Selection], out: &mut Vec<&'a str>) {
            for selection in selections {
                match selection {
                    Selection::Field { name, .. } => out.push(name),
                    Selection::InlineFragment { selection_set, .. } => walk(selection_set, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.selections, &mut out);
        out
    }

    /// Whether `name` is selected at the top level.
    pub fn contains_field(&self, name: &str) -> bool {
        self.field_names().contains(&name)
    }
}

/// Data a resolver declares it needs from its parent or query object before
/// it can run.
///
/// The engine materializes these selections and attaches them to the
/// selector; a resolver never fetches its own declared prerequisites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredSelectionSet {
    /// The type the selections apply to.
    pub type_condition: String,

    /// The declared prerequisite selections.
    pub selection_set: SelectionSet,
}

impl RequiredSelectionSet {
    pub fn new(type_condition: impl Into<String>, selection_set: SelectionSet) -> Self {
        Self {
            type_condition: type_condition.into(),
            selection_set,
        }
    }
}

mod schema;
mod selection;

pub use schema::Schema;
pub use schema::StaticSchema;
pub use selection::RequiredSelectionSet;
pub use selection::Selection;
pub use selection::SelectionSet;

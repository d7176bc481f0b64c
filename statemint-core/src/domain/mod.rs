//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod category;
mod file_type;
mod mapping;
mod schema;
mod source;
mod table;
mod transaction;
pub mod result;

pub use category::{
    leaf_categories, subcategory_display_name, CategorizationResult, Category, CategoryNode,
    TxDescriptor,
};
pub use file_type::FileType;
pub use mapping::{CanonicalField, ColumnMapping, ConversionModel};
pub use schema::{statement_hash, SchemaUpdate, StatementSchema};
pub use source::Source;
pub use table::{Cell, RawTable};
pub(crate) use table::unique_column_names;
pub use transaction::{
    normalize_description, to_amount_scale, CategorizationStatus, StatementTransaction, Transaction,
};

//! Utilities for schema_drift

pub mod logging;
pub mod naming;

pub use logging::init_logging;
pub use naming::{
    apply_naming_convention, get_column_name, get_foreign_key_name, get_index_name,
    get_max_identifier_length, get_table_name, truncate_identifier,
};

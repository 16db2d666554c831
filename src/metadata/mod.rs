//! Metadata mapping: `DatabaseModel` -> generation-ready entities and procedures.
//! Output is sorted and deterministic for a given model.

mod entities;
mod pluralize;
mod procedures;
mod type_map;
mod types;
pub mod view;

pub use entities::map_entities;
pub use pluralize::pluralize;
pub use procedures::map_procedures;
pub use type_map::map_type;
pub use types::{
    EntityMetadata, ForeignKeyMeta, ParameterMeta, ProcedureMetadata, PropertyMeta, TargetType,
};

//! Source generation: metadata -> a complete Cargo package for one connection.

mod generate;
pub mod manifest;
pub mod template;
pub mod templates;

pub use generate::{render_entity, render_procedure, GeneratedModule, Generator, SourceFiles};
pub use manifest::build_manifest;
pub use template::Template;
pub use templates::TemplateSet;

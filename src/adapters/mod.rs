mod embedded_registry;
mod file_registry;

pub use embedded_registry::{EmbeddedOptions, EmbeddedRegistry};
pub use file_registry::FileRegistry;

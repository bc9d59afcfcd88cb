//! Python interpreters: versions, specifiers, discovery and selection

pub mod discovery;
pub mod resolver;
pub mod specifier;
pub mod version;

pub use discovery::{probe, Interpreter, InterpreterDiscovery, PathDiscovery};
pub use resolver::{parse_constraint, resolve, select};
pub use specifier::{InvalidSpecifier, Operator, Specifier, SpecifierSet};
pub use version::{InvalidVersion, Version};

//! Resolves a declarative multi-site storage topology into a complete project
//! graph of sites, hosts, controllers, volumes, qtrees, LUNs and protection
//! relationships.

pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod primitives;
pub mod resolver;

pub use resolver::{resolve, Diagnostic, Diagnostics, Resolution, Severity};

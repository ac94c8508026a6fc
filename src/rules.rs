//! Built-in rule sets.

pub mod file_name;

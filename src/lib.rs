//! Depscope - finds declared npm/pnpm dependencies that are never imported
//! by your project's own source code.
//!
//! The engine normalizes a package-lock.json or pnpm-lock.yaml into a
//! dependency graph, checks which root declarations are required by other
//! installed packages, and correlates static and dynamic import references
//! from the scanned sources back to the declared package names.

pub mod analysis;
pub mod config;
pub mod lockfile;
pub mod report;
pub mod resolver;
pub mod scanner;

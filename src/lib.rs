//! modernizer - Plan the migration of a legacy codebase to a modern stack
//!
//! Three chains of agents run against a repository and/or a requirements
//! text: analysis (structure, technology stack), migration (plan, starter
//! code) and report (documentation). Stage results are cached on disk by a
//! fingerprint of their input, and a finished run is assembled into a
//! report bundle with a checksummed manifest.

pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod llm;
pub mod parsers;
pub mod pipeline;
pub mod report;
pub mod repository;
pub mod util;

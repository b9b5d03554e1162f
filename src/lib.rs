//! awsrm: remove AWS resources via the CLI.
//!
//! Resource identifiers come in as arguments or piped from a companion
//! listing tool. The pipeline refreshes each resource's remote state through
//! a per-profile/region provider backend, shows what still exists, asks for
//! confirmation, then deletes with bounded concurrency.

pub mod confirm;
pub mod destroy;
pub mod input;
pub mod pipeline;
pub mod pool;
pub mod refresh;
pub mod report;
pub mod resource;

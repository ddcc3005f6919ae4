// Prompt Registry & Renderer core.
// Versioned immutable templates and bundles, deterministic assembly with
// content-addressable hashes, append-only render audit.

pub mod assemble;
pub mod audit;
pub mod bundles;
pub mod constraints;
pub mod generator;
pub mod handlers;
pub mod memory;
pub mod metrics;
pub mod sources;
pub mod templates;
pub mod validation;

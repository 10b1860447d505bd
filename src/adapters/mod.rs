// Adapters layer: concrete implementations for external systems
// (bundled dataset, remote interpreter API, local persistence).

pub mod dataset;
pub mod interpreter;
pub mod store;

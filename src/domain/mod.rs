// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing a run: what the configuration
// document contains, which model kinds exist, and what can go
// wrong while loading it.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Typed run configuration (the five YAML sections)
pub mod config;

// The closed set of registered model kinds
pub mod model_kind;

// Configuration errors
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;

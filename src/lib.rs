//! Purpose: Particle-geometry core plus the stable `sdr_` C ABI boundary.
//! Exports: `core` (context, structure, calculator, errors) and `abi` (C surface).
//! Role: Library crate producing libsiderite for foreign-language bindings.
//! Invariants: `core` is FFI-free and panic-propagating; `abi` is the only unsafe layer.
//! Invariants: Foreign callers only ever see opaque, kind-tagged handles.
pub mod abi;
pub mod core;

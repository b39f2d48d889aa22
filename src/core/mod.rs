// Core modules implementing geometry, diagnostics, and error modeling.
pub mod calc;
pub mod context;
pub mod error;
pub mod structure;

//! Database query functions organized by domain.

pub mod accounts;
pub mod addresses;
pub mod keys;
pub mod outputs;
pub mod replay;
pub mod settings;
pub mod signed_inputs;
pub mod transactions;

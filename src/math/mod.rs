// src/math/mod.rs

// Arithmétique des flux (entiers 256 bits) et formatage pour l'affichage.
pub mod flow_math;
pub mod format;

pub use flow_math::{U256, parse_flow_amount};

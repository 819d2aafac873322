//! Feeding control algorithms.

pub mod ration;

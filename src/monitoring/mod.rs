// Monitoring Module - Project Maester
// "The watchers report on the health of the realm"

pub mod health;

pub use health::*;

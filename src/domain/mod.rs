// Domain layer - Core vitals and classification types
pub mod errors;
pub mod features;
pub mod label;
pub mod session;
pub mod vitals;

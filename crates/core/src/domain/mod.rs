pub mod action;
pub mod condition;
pub mod intent;
pub mod rule;

mod params;

pub use params::Parameters;

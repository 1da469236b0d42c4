mod steps;
mod world;

pub use world::{AffiliateSystem, AffiliateWorld};

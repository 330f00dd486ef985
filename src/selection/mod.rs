//! Selection core - candidate pools, recency filtering, weighted draw

pub mod pool;
pub mod recency;
pub mod select;

pub use pool::*;
pub use recency::*;
pub use select::*;

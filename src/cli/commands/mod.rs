//! Command implementations

mod post;
mod provision;

pub use post::execute as post;
pub use provision::execute as provision;

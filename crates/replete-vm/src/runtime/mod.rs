pub mod bridge;
pub mod context;

mod bindings;
mod conversions;
mod registry;


pub(crate) use bridge::Bridge;
pub(crate) use context::RepleteContext;

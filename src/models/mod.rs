pub mod nox_item;

pub use nox_item::*;

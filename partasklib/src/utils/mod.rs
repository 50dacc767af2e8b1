#[macro_use]
pub mod map_macros;

// Allow common clippy warnings for game development
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

pub mod constants;
pub mod protocol;
pub mod tilemap;

pub use constants::*;
pub use protocol::*;
pub use tilemap::*;

pub mod area_cache;
pub mod cluster;
pub mod display;
pub mod profile;
pub mod provider;
pub mod record;
pub mod render;
pub mod viewport;
pub mod zoom;

pub use area_cache::*;
pub use cluster::*;
pub use display::*;
pub use profile::*;
pub use provider::*;
pub use record::*;
pub use render::*;
pub use viewport::*;
pub use zoom::*;

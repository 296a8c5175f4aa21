pub mod advisory;
pub mod control;
pub mod lifecycle;
pub mod plan;
pub mod point_overlay;
pub mod providers;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod state;
pub mod store;

pub use advisory::*;
pub use control::*;
pub use lifecycle::*;
pub use plan::*;
pub use point_overlay::*;
pub use providers::*;
pub use reconciler::*;
pub use record::*;
pub use registry::*;
pub use state::*;
pub use store::*;

// Storefront Theme Services
// Business logic layer

mod key_value_store;
mod theme_catalog;
mod custom_theme_store;
mod session_draft_store;
mod palette_gateway;
mod events;
mod theme_engine;

pub use key_value_store::*;
pub use theme_catalog::*;
pub use custom_theme_store::*;
pub use session_draft_store::*;
pub use palette_gateway::*;
pub use events::*;
pub use theme_engine::*;

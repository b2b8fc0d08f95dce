// Storefront Theme Models
// Data structures shared by the theme services

mod error;
mod color_token;
mod palette;
mod theme;
mod session;
mod engine_state;

pub use error::*;
pub use color_token::*;
pub use palette::*;
pub use theme::*;
pub use session::*;
pub use engine_state::*;

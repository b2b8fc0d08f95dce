// Storefront Theme Commands
// Command handlers invoked over HTTP

mod theme;

pub use theme::*;

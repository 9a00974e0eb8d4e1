#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Browser form for the wine quality service: one page with eleven inputs, the
//! verdict rendered under it, and a health probe for process supervisors.

/// HTML rendering of the form and results.
#[path = "../page.rs"]
pub mod page;

/// Router, handlers and the listener loop.
#[path = "../routes.rs"]
pub mod routes;

pub use page::{FormValues, Outcome, PageSettings};
pub use routes::{create_router, serve, AppState, Banner};

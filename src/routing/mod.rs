//! Routing Module
//!
//! Live plugin routing:
//! - Route metadata
//! - Copy-on-write route table
//! - Binder that grafts plugin handlers on enable/disable

pub mod binder;
pub mod route;
pub mod table;

pub use binder::{BindOutcome, RouteBinder};
pub use route::Route;
pub use table::{BoundRoute, RouteOwner, RouteTable};

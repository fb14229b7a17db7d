//! Local store: SQLite entities, SQL repositories and change notification.
//!
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into domain entities.
//! - `store`: pool handle that broadcasts a generation bump on list writes.
//!
//! External modules import from `movie_pager::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;
pub mod store;

pub use repo::*;

pub use model::CachedDetails;
pub use store::Store;

mod catalog;
mod purge;

pub use catalog::{CatalogRepo, CatalogRow};
pub use purge::PurgeRepo;

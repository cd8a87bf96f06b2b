mod catalog;
mod purge;

pub use catalog::PostgresCatalogRepo;
pub use purge::PostgresPurgeRepo;

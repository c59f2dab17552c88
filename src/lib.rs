//! Closet crawler: harvests listings and photos from a JavaScript-rendered
//! marketplace, either one item or a whole seller closet.

pub mod browser;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod lazy_load;
pub mod ledger;
pub mod media;
pub mod selectors;

#[cfg(test)]
pub(crate) mod testing;

pub use config::HarvestConfig;
pub use error::{HarvestError, SessionError};
pub use harvest::{HarvestReport, HarvestRequest, Harvester};

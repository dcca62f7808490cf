// Entity Models
// Stores and the franchises they belong to.

pub mod franchise;
pub mod store;

pub use franchise::{Franchise, FranchiseAlias, FranchiseLookup};
pub use store::{NaturalKey, StoreCandidate, StoreField, StoreRecord};

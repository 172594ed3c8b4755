pub mod location_store;

pub use location_store::LocationStore;

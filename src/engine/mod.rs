pub mod location_reaper;
pub mod retention;

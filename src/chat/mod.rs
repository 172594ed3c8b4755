pub mod broker;
pub mod relay;
pub mod room;
pub mod token;

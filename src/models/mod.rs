pub mod location;
pub mod message;
pub mod user;

pub type CourierId = u64;
pub type OrderId = u64;
pub type UserId = u64;

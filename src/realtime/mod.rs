pub mod hub;
pub mod session;
pub mod socket;

pub mod directory;
pub mod ledger;
pub mod messages;
pub mod trip_service;
pub mod trips;

pub mod api;
pub mod auth;
pub mod backend;
pub mod ballot;
pub mod client;
pub mod crypto;
pub mod intermediary;
pub mod ledger;
pub mod mongodb;
pub mod remote;
pub mod store;
pub mod submission;
pub mod token;

pub mod command;
pub mod config;
pub mod controller;
pub mod engine;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod retry;
pub mod source;
pub mod voting;

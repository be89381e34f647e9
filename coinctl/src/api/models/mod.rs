//! Request and response bodies for the HTTP API.
//!
//! These are kept apart from the database models in [`crate::db::models`]; `From` impls convert
//! between the two so storage details never leak into the wire format.

pub mod coins;
pub mod rewards;

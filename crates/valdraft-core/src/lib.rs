// Core of the draft service: configuration, the player model, pick storage,
// the live sync channel, and the wire protocol and transport shared by the
// server and its clients.

pub mod config;
pub mod db;
pub mod ledger;
pub mod player;
pub mod protocol;
pub mod sync;
pub mod ws_server;

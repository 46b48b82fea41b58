//! Library crate for nettools-rs: the bounded-rate port scan engine plus the DNS,
//! WHOIS and geolocation helpers behind the HTTP API.
pub mod config;
pub mod dns;
pub mod error;
pub mod geoip;
pub mod hash;
pub mod links;
pub mod normalize;
pub mod scanner;
pub mod server;
pub mod services;
pub mod types;
pub mod whois;

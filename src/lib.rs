// Strainer: write policies for Nostr relays
//
// This is the library root. `policy` holds the verdict contract and every
// policy, `store` the TTL counter store they share, and `relay` the
// line protocol that feeds them.

pub mod config;
pub mod policy;
pub mod relay;
pub mod store;

// Business logic services layer
//
// Shared by the HTTP server and the CLI.

pub mod analysis;
pub mod catalog;
pub mod sync;

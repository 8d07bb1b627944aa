//! Subcommand implementations

pub mod certificates;
pub mod configure;
pub mod diff;
pub mod download;
pub mod export;
pub mod installation;
pub mod product;
pub mod stemcell;
pub mod tile;

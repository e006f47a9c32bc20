pub mod checksum;
pub mod download;
pub mod fsops;

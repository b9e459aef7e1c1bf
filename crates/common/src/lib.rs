// livepoll-common: shared types and the wire protocol for the livepoll workspace

pub mod protocol;
pub mod types;

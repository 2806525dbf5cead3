// marginalia-common: shared types and pure logic for the marginalia workspace

pub mod anchor;
pub mod path;
pub mod types;

// Domain layer: core entities and ports. No I/O here.

pub mod model;
pub mod ports;

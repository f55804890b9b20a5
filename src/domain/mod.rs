// Domain layer: core models, wire messages and ports (interfaces).

pub mod messages;
pub mod model;
pub mod ports;

// Domain layer: request/record models and the ports the content manager talks through.

pub mod model;
pub mod ports;

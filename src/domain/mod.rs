// Domain layer: resource models and ports. No process or IO dependencies.

pub mod model;
pub mod ports;

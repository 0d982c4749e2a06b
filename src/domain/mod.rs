// Domain layer: request and result models shared by core and adapters.

pub mod model;
pub mod request;

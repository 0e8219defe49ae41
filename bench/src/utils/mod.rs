pub mod barrier;
pub mod transport_factory;

pub mod envelope;
pub mod publisher;
pub mod subscriber;
pub mod worker;

use derive_more::derive::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display)]
pub enum ActorKind {
    #[display("Publisher")]
    #[serde(rename = "publisher")]
    Publisher,
    #[display("Subscriber")]
    #[serde(rename = "subscriber")]
    Subscriber,
}

pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod registry;
pub mod store;

pub use amount::Amount;
pub use config::Config;
pub use engine::{Engine, EngineError, ErrorKind, Receipt, Settlement};
pub use model::{Actor, Decision, Intent, Reference, RegistrationId, UserId};
pub use store::JsonStore;

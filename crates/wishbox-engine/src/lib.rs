pub mod changes;
pub mod error;
pub mod facade;
pub mod live;
pub mod resolver;
pub mod scope;

pub use changes::{ChangeBus, Table};
pub use error::EngineError;
pub use facade::App;
pub use live::{LiveQuery, Subscription};
pub use scope::TaskScope;

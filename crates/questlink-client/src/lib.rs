pub mod api;
pub mod callback;
pub mod context;
pub mod host;
pub mod initiate;
pub mod refresh;
pub mod store;

pub use api::{BrokerClient, ExchangeApi};
pub use callback::{CallbackParams, CallbackPhase, LoginCompletion};
pub use context::{AuthContext, AuthSnapshot};
pub use host::{BrowserHost, HostDetector, HostEnvironment};
pub use initiate::AuthorizeEndpoint;
pub use refresh::RefreshScheduler;
pub use store::{FileStorage, KeyValueStorage, MemoryStorage, StoreEvent, StoreOp, TokenStore};

mod kv;
pub use kv::KeyValue;

mod service_env;
pub use service_env::ServiceEnv;

mod service_state;
pub use service_state::ServiceState;

mod termination;
pub use termination::Termination;

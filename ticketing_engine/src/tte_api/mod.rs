pub mod sweeper;
pub mod transaction_flow_api;
pub mod transaction_objects;

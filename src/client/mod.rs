// Client module
pub mod interface;
pub mod rpc_client;

pub use interface::ChainInterface;
pub use rpc_client::{CallingConvention, HttpTransport, RemoteBackend, Transport, TransportFailure};

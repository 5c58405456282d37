//! snek transport - Collaborator seams for the REST and gateway APIs
//!
//! The client core only talks to the outside world through the traits in
//! this crate:
//!
//! - [`HttpTransport`]: REST control plane (login, command registry,
//!   permissions, entity fetches)
//! - [`GatewayConnector`] / [`FrameSocket`]: the persistent gateway socket
//!
//! [`memory`] provides in-memory implementations used for dry runs and
//! tests.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod gateway;
pub mod http;
pub mod memory;

pub use error::{HttpError, TransportError};
pub use gateway::{FrameSocket, GatewayConnector, SocketEvent};
pub use http::{HttpResult, HttpTransport};
pub use memory::{HttpCall, MemoryHttp, ScriptStep, ScriptedGateway};

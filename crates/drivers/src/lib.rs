pub mod driver;
pub mod error;
pub mod rest;
pub mod selector;
pub mod soap;
pub mod stub;
pub mod types;

pub use driver::{authenticate_callback, EndpointDriver};
pub use error::{InvalidCallback, PollError, SubmitError, UnknownEndpoint};
pub use rest::RestDriver;
pub use selector::DriverSelector;
pub use soap::SoapDriver;
pub use stub::StubDriver;
pub use types::{Credentials, RemoteStatus, RemoteTask, RouteConfig};

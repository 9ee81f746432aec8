//! Broker backend client: transport, retry, status calls and the OAuth flow.

pub mod broker;
pub mod oauth;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod scripted;

pub use broker::{BrokerClient, TokenUpdate};
pub use oauth::{CallbackParams, OAuthFlow, OAuthOutcome, OAuthState, OAuthWindow, login_url};
pub use retry::RetryPolicy;
pub use transport::{
    BrokerRequest, BrokerTransport, Method, ReqwestTransport, TransportError, TransportResponse,
};

use busprobe_transport::Address;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::handshake::{authenticate_user, Credentials, HandshakeConfig, HandshakeOutcome};

/// Dial a peer without authenticating.
pub async fn connect(address: &Address) -> Result<Endpoint> {
    let endpoint = Endpoint::dial(address).await?;
    debug!(peer = %endpoint.peer(), "connected");
    Ok(endpoint)
}

/// Dial a peer and authenticate.
///
/// The endpoint is closed again if authentication does not complete.
pub async fn connect_authenticated(
    address: &Address,
    credentials: &Credentials,
    config: &HandshakeConfig,
) -> Result<(Endpoint, HandshakeOutcome)> {
    let endpoint = connect(address).await?;
    match authenticate_user(&endpoint, credentials, config).await {
        Ok(outcome) => Ok((endpoint, outcome)),
        Err(err) => {
            endpoint.close().await;
            Err(err)
        }
    }
}

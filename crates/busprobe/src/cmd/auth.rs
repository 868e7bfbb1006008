use busprobe_peer::{connect, handshake, AuthState, FeatureFlags, HandshakeConfig};
use serde::Serialize;

use crate::cmd::AuthArgs;
use crate::exit::{peer_error, CliResult, AUTH_REJECTED, FAILURE, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct AuthOutput {
    url: String,
    user: String,
    state: AuthState,
    status: u32,
    reason: Option<String>,
    token_renewed: bool,
    capabilities: Vec<String>,
}

pub async fn run(args: AuthArgs, format: OutputFormat) -> CliResult<i32> {
    let address = args.peer.address()?;
    let config = HandshakeConfig {
        timeout: args.peer.timeout()?,
        features: if args.features {
            FeatureFlags::all()
        } else {
            FeatureFlags::default()
        },
        ..HandshakeConfig::default()
    };
    let credentials = args.credentials.credentials();

    let endpoint = connect(&address)
        .await
        .map_err(|err| peer_error("connect failed", err))?;
    let outcome = handshake(&endpoint, &credentials, &config)
        .await
        .map_err(|err| peer_error("handshake failed", err))?;
    endpoint.close().await;

    let out = AuthOutput {
        url: address.to_string(),
        user: credentials.user.clone(),
        state: outcome.state,
        status: outcome.state.status(),
        reason: outcome.reason().map(str::to_string),
        token_renewed: outcome.new_token().is_some(),
        capabilities: outcome.capabilities.keys().map(str::to_string).collect(),
    };
    let fields = [
        ("url", out.url.clone()),
        ("user", out.user.clone()),
        ("state", out.state.to_string()),
        ("reason", out.reason.clone().unwrap_or_default()),
        ("capabilities", out.capabilities.join(", ")),
    ];
    print_record(&out, &fields, format);

    Ok(match outcome.state {
        AuthState::Done => SUCCESS,
        AuthState::Error => AUTH_REJECTED,
        AuthState::Continue => FAILURE,
    })
}

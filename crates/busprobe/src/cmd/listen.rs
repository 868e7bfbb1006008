use busprobe_peer::{AuthListener, Credentials, ListenerConfig, StatusEncoding};
use busprobe_value::samples::{DEFAULT_TOKEN, DEFAULT_USER};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cmd::{parse_address, parse_credential, ListenArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct ListeningOutput {
    url: String,
    users: Vec<String>,
    signed_status: bool,
}

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let address = parse_address(&args.url)?;
    let mut credentials = args
        .credentials
        .iter()
        .map(|text| parse_credential(text))
        .collect::<CliResult<Vec<_>>>()?;
    if credentials.is_empty() {
        credentials.push(Credentials::new(DEFAULT_USER, DEFAULT_TOKEN));
    }
    let config = ListenerConfig {
        status_encoding: if args.signed_status {
            StatusEncoding::Signed
        } else {
            StatusEncoding::Unsigned
        },
        credentials,
        ..ListenerConfig::default()
    };
    let users = config.credentials.iter().map(|c| c.user.clone()).collect();

    let listener = AuthListener::bind(&address, config)
        .await
        .map_err(|err| peer_error("bind failed", err))?;

    // Printed before serving so callers binding port 0 learn the address.
    let out = ListeningOutput {
        url: listener.local_address().to_string(),
        users,
        signed_status: args.signed_status,
    };
    let fields = [
        ("url", out.url.clone()),
        ("users", out.users.join(", ")),
        ("signed_status", out.signed_status.to_string()),
    ];
    print_record(&out, &fields, format);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received");
                trigger.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "cannot watch for interrupts"),
        }
    });

    listener
        .run(shutdown)
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("listener failed: {err}")))?;
    Ok(SUCCESS)
}

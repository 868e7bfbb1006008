use busprobe_peer::{test_credentials, BulkConfig};

use crate::cmd::{handshake_config, BruteforceArgs};
use crate::exit::{io_error, CliError, CliResult, FINDING, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat};

pub async fn run(args: BruteforceArgs, format: OutputFormat) -> CliResult<i32> {
    if args.width == 0 {
        return Err(CliError::new(USAGE, "width must be greater than zero"));
    }
    let address = args.peer.address()?;
    let config = BulkConfig {
        width: args.width,
        handshake: handshake_config(args.peer.timeout()?),
    };

    let text = tokio::fs::read_to_string(&args.dict)
        .await
        .map_err(|err| io_error(&format!("read {}", args.dict.display()), err))?;
    let tokens = dictionary(&text);
    tracing::info!(tokens = tokens.len(), width = args.width, url = %address, "testing dictionary");

    let report = test_credentials(&address, &args.user, tokens, &config).await;
    let fields = [
        ("attempts", report.attempts.to_string()),
        ("accepted", report.accepted.to_string()),
        ("rejected", report.rejected.to_string()),
        ("errors", report.errors.to_string()),
        ("accepted_tokens", report.accepted_tokens.join(", ")),
    ];
    print_record(&report, &fields, format);

    Ok(if report.accepted > 0 { FINDING } else { SUCCESS })
}

/// One token per line; line endings stripped, blank lines skipped.
fn dictionary(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

use busprobe_peer::{replay, ReplayOutcome};
use bytes::Bytes;
use serde::Serialize;

use crate::cmd::{handshake_config, ReplayArgs};
use crate::exit::{io_error, peer_error, CliResult, FINDING, SUCCESS};
use crate::output::{print_rows, OutputFormat};

#[derive(Serialize)]
struct ReplayRow {
    file: String,
    size: usize,
    #[serde(flatten)]
    outcome: ReplayOutcome,
}

pub async fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let address = args.peer.address()?;
    let config = handshake_config(args.peer.timeout()?);
    let credentials = args.credentials.credentials();

    let mut results = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = tokio::fs::read(path)
            .await
            .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
        let size = data.len();
        let outcome = replay(&address, Bytes::from(data), &credentials, &config)
            .await
            .map_err(|err| peer_error("replay failed", err))?;
        results.push(ReplayRow {
            file: path.display().to_string(),
            size,
            outcome,
        });
    }

    let rows = results
        .iter()
        .map(|row| {
            let verdict = match &row.outcome {
                ReplayOutcome::Healthy { replied: true } => "healthy (replied)".to_string(),
                ReplayOutcome::Healthy { replied: false } => "healthy (refused)".to_string(),
                ReplayOutcome::Finding { reason } => format!("FINDING: {reason}"),
            };
            vec![row.file.clone(), row.size.to_string(), verdict]
        })
        .collect();
    print_rows(&results, &["FILE", "SIZE", "RESULT"], rows, format);

    let found = results.iter().any(|row| row.outcome.is_finding());
    Ok(if found { FINDING } else { SUCCESS })
}

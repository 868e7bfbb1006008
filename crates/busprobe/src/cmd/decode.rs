use busprobe_value::CapabilityMap;
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{decode_error, io_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_rows, OutputFormat};

#[derive(Serialize)]
struct Entry {
    key: String,
    signature: String,
    value: String,
}

pub async fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let data = tokio::fs::read(&args.file)
        .await
        .map_err(|err| io_error(&format!("read {}", args.file.display()), err))?;
    let map = CapabilityMap::decode(&data)
        .map_err(|err| decode_error(&format!("decode {}", args.file.display()), err))?;

    let entries: Vec<Entry> = map
        .iter()
        .map(|(key, value)| Entry {
            key: key.to_string(),
            signature: value.signature(),
            value: value.to_string(),
        })
        .collect();
    let rows = entries
        .iter()
        .map(|entry| {
            vec![
                entry.key.clone(),
                entry.signature.clone(),
                entry.value.clone(),
            ]
        })
        .collect();
    print_rows(&entries, &["KEY", "SIGNATURE", "VALUE"], rows, format);

    if map.encode().as_ref() != data.as_slice() {
        tracing::warn!(file = %args.file.display(), "re-encoded map differs from input");
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

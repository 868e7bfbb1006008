use std::path::Path;

use busprobe_value::{samples, CapabilityMap, GeneratorConfig, ValueGenerator};
use serde::Serialize;

use crate::cmd::CorpusArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct CorpusOutput {
    dir: String,
    samples: usize,
    random: usize,
    seed: u64,
    files: Vec<String>,
}

pub async fn run(args: CorpusArgs, format: OutputFormat) -> CliResult<i32> {
    tokio::fs::create_dir_all(&args.dir)
        .await
        .map_err(|err| io_error(&format!("create {}", args.dir.display()), err))?;

    let mut files = Vec::new();
    let fixed = samples::all_samples();
    let sample_count = fixed.len();
    for (name, map) in fixed {
        files.push(write_map(&args.dir, &format!("cap-auth-{name}.bin"), &map).await?);
    }

    let mut generator = ValueGenerator::from_seed(args.seed, GeneratorConfig::default());
    for index in 0..args.count {
        let map = generator.capability_map();
        files.push(write_map(&args.dir, &format!("cap-random-{index:04}.bin"), &map).await?);
    }

    let out = CorpusOutput {
        dir: args.dir.display().to_string(),
        samples: sample_count,
        random: args.count,
        seed: args.seed,
        files,
    };
    let fields = [
        ("dir", out.dir.clone()),
        ("samples", out.samples.to_string()),
        ("random", out.random.to_string()),
        ("seed", out.seed.to_string()),
    ];
    print_record(&out, &fields, format);
    Ok(SUCCESS)
}

async fn write_map(dir: &Path, file_name: &str, map: &CapabilityMap) -> CliResult<String> {
    let path = dir.join(file_name);
    tokio::fs::write(&path, map.encode())
        .await
        .map_err(|err| io_error(&format!("write {}", path.display()), err))?;
    tracing::debug!(path = %path.display(), entries = map.len(), "corpus entry written");
    Ok(file_name.to_string())
}

use busprobe_peer::{run_scenario, InjectConfig, ProbeOutcome, Scenario};

use crate::cmd::{handshake_config, parse_address, InjectArgs, ScenarioArg};
use crate::exit::{peer_error, CliResult, FINDING, SUCCESS};
use crate::output::{print_record, OutputFormat};

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Call => Scenario::Call,
            ScenarioArg::CallRemote => Scenario::CallRemote,
            ScenarioArg::Post => Scenario::Post,
        }
    }
}

pub async fn run(args: InjectArgs, format: OutputFormat) -> CliResult<i32> {
    let target = args.peer.address()?;
    let victim = args.victim.as_deref().map(parse_address).transpose()?;
    let timeout = args.peer.timeout()?;
    let config = InjectConfig {
        credentials: (!args.no_auth).then(|| args.credentials.credentials()),
        handshake: handshake_config(timeout),
        timeout,
        tag: args.tag.clone(),
    };

    let report = run_scenario(args.scenario.into(), &target, victim.as_ref(), &config)
        .await
        .map_err(|err| peer_error("injection failed", err))?;

    let outcome = match &report.outcome {
        ProbeOutcome::Replied { kind, detail } => format!("{kind}: {detail}"),
        ProbeOutcome::TimedOut => "silent".to_string(),
        ProbeOutcome::Disconnected { reason } => format!("disconnected: {reason}"),
    };
    let fields = [
        ("scenario", report.scenario.name().to_string()),
        ("target", report.target.clone()),
        ("authenticated", report.authenticated.to_string()),
        ("outcome", outcome),
        ("finding", report.finding().to_string()),
    ];
    print_record(&report, &fields, format);

    Ok(if report.finding() { FINDING } else { SUCCESS })
}

//! CLI for the flaw demonstrations

use anyhow::Result;
use clap::{Parser, Subcommand};
use flawkit::attack::nonce_reuse::{NonceReuseConfig, NonceReuseFinding};
use flawkit::attack::protocol_abort::{ProtocolAbortConfig, ProtocolAbortFinding};
use flawkit::attack::side_channel::{SideChannelConfig, SideChannelFinding};
use flawkit::attack::{Attack, Finding, NonceReuseAttack, ProtocolAbortAttack, SideChannelAttack};
use flawkit::math::parse_scalar_decimal_strict;
use flawkit::signature::CurveParams;
use flawkit::Verdict;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "flawkit")]
#[command(about = "Demonstrations of ECDSA nonce reuse, protocol-abort leakage and timing side channels")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Seed for the random source (drawn at random when omitted)")]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Recover a private key from two signatures sharing a nonce
    NonceReuse {
        #[arg(long, help = "Private key in decimal (default 12345)")]
        private_key: Option<String>,

        #[arg(long, conflicts_with = "private_key", help = "Draw the private key at random")]
        random_key: bool,

        #[arg(long, help = "Shared nonce in decimal (default 42)")]
        nonce: Option<String>,

        #[arg(long, default_value = "This is the first message")]
        message1: String,

        #[arg(long, default_value = "This is the second message")]
        message2: String,
    },
    /// Abort a staged protocol at each stage and show what leaks
    ProtocolAbort {
        #[arg(long, default_value = "Test message")]
        message: String,
    },
    /// Measure an input-dependent operation and look for a timing correlation
    SideChannel {
        #[arg(long, default_value = "50")]
        samples: usize,

        #[arg(long, default_value = "1000", help = "Artificial delay per set bit, in microseconds")]
        delay_us: u64,
    },
    /// Run every demonstration with default settings
    All,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let attacks = build_attacks(cli.command.unwrap_or(Command::All))?;

    let seed = cli.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let demonstrations: Vec<DemonstrationOutput> = attacks
        .iter()
        .map(|attack| match attack.run(&mut rng) {
            Ok(finding) => DemonstrationOutput {
                name: attack.name(),
                status: "completed",
                vulnerable: finding.is_vulnerable(),
                finding: Some(finding),
                error: None,
            },
            Err(e) => DemonstrationOutput {
                name: attack.name(),
                status: "failed",
                vulnerable: false,
                finding: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    println!("{}", format_output(seed, demonstrations, cli.json)?);
    Ok(())
}

fn build_attacks(command: Command) -> Result<Vec<Box<dyn Attack>>> {
    let mut attacks: Vec<Box<dyn Attack>> = Vec::new();
    match command {
        Command::NonceReuse {
            private_key,
            random_key,
            nonce,
            message1,
            message2,
        } => {
            let n = CurveParams::secp256k1().n;
            let private_key = match (private_key, random_key) {
                (_, true) => None,
                (Some(d), false) => Some(parse_scalar_decimal_strict(&d, &n)?),
                (None, false) => NonceReuseConfig::default().private_key,
            };
            let nonce = nonce
                .map(|k| parse_scalar_decimal_strict(&k, &n))
                .transpose()?;
            attacks.push(Box::new(NonceReuseAttack::new(NonceReuseConfig {
                private_key,
                nonce,
                message1,
                message2,
            })));
        }
        Command::ProtocolAbort { message } => {
            attacks.push(Box::new(ProtocolAbortAttack::new(ProtocolAbortConfig {
                message,
            })));
        }
        Command::SideChannel { samples, delay_us } => {
            if samples == 0 {
                anyhow::bail!("Sample count must be at least 1");
            }
            attacks.push(Box::new(SideChannelAttack::new(SideChannelConfig {
                samples,
                unit_delay: Duration::from_micros(delay_us),
            })));
        }
        Command::All => {
            attacks.push(Box::new(NonceReuseAttack::default()));
            attacks.push(Box::new(ProtocolAbortAttack::default()));
            attacks.push(Box::new(SideChannelAttack::default()));
        }
    }
    Ok(attacks)
}

#[derive(Serialize)]
struct OutputReport {
    seed: u64,
    demonstrations: Vec<DemonstrationOutput>,
    summary: SummaryOutput,
}

#[derive(Serialize)]
struct DemonstrationOutput {
    name: &'static str,
    status: &'static str,
    vulnerable: bool,
    finding: Option<Finding>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SummaryOutput {
    demonstrations_run: usize,
    vulnerabilities_detected: usize,
    failures: usize,
}

fn format_output(
    seed: u64,
    demonstrations: Vec<DemonstrationOutput>,
    json: bool,
) -> Result<String> {
    let summary = SummaryOutput {
        demonstrations_run: demonstrations.len(),
        vulnerabilities_detected: demonstrations.iter().filter(|d| d.vulnerable).count(),
        failures: demonstrations.iter().filter(|d| d.error.is_some()).count(),
    };
    let report = OutputReport {
        seed,
        demonstrations,
        summary,
    };

    if json {
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut output = String::new();
    output.push_str(&format!("Seed: {}\n\n", report.seed));

    for demo in &report.demonstrations {
        output.push_str(&format!("== {} ==\n", demo.name));
        match (&demo.finding, &demo.error) {
            (Some(Finding::NonceReuse(f)), _) => format_nonce_reuse(&mut output, f),
            (Some(Finding::ProtocolAbort(f)), _) => format_protocol_abort(&mut output, f),
            (Some(Finding::SideChannel(f)), _) => format_side_channel(&mut output, f),
            (None, error) => {
                output.push_str(&format!("  Status: {}\n", demo.status));
                if let Some(reason) = error {
                    output.push_str(&format!("  Reason: {}\n", reason));
                }
            }
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "Ran {} demonstrations: {} vulnerable, {} failed\n",
        report.summary.demonstrations_run,
        report.summary.vulnerabilities_detected,
        report.summary.failures
    ));
    Ok(output)
}

fn format_nonce_reuse(output: &mut String, f: &NonceReuseFinding) {
    output.push_str(&format!("  Private Key: {}\n", f.private_key_decimal));
    for (i, sig) in f.signatures.iter().enumerate() {
        output.push_str(&format!("  Signature {} ({:?})\n", i + 1, sig.message));
        output.push_str(&format!("    r: {}\n", sig.r));
        output.push_str(&format!("    s: {}\n", sig.s));
    }
    output.push_str(&format!("  Shared R: {}\n", f.shared_r));

    match &f.recovered_key {
        Some(key) => {
            output.push_str("  Status: recovered\n");
            output.push_str(&format!(
                "  Recovered Private Key (decimal): {}\n",
                key.private_key_decimal
            ));
            output.push_str(&format!(
                "  Recovered Private Key (hex): {}\n",
                key.private_key_hex
            ));
            output.push_str(&format!("  Recovered Nonce: {}\n", key.nonce_decimal));
            output.push_str(&format!("  Key Matches: {}\n", f.key_matches));
            output.push_str(&format!("  Verified: {}\n", f.verified));
        }
        None => output.push_str("  Status: unrecoverable\n"),
    }
    if f.key_matches {
        output.push_str("  VULNERABILITY DETECTED: private key recovered from nonce reuse\n");
    }
}

fn format_protocol_abort(output: &mut String, f: &ProtocolAbortFinding) {
    output.push_str(&format!("  Normal Result: {}\n", f.normal_result));
    for leak in &f.leaks {
        output.push_str(&format!("  Abort from {}:\n", leak.aborted_from));
        let values = [
            ("nonce", leak.values.nonce),
            ("phase1_result", leak.values.phase1_result),
            ("phase2_result", leak.values.phase2_result),
        ];
        for (name, value) in values {
            if let Some(value) = value {
                output.push_str(&format!("    {}: {}\n", name, value));
            }
        }
        for field in &leak.leaked_fields {
            output.push_str(&format!(
                "    VULNERABILITY DETECTED: {} leaked through protocol abort\n",
                field
            ));
        }
        if let Some(secret) = leak.recovered_secret {
            output.push_str(&format!(
                "    Secret Recovered: {} (matches: {})\n",
                secret, leak.secret_matches
            ));
        }
    }

    output.push_str(&format!(
        "  Hardened abort from {}: scrubbed [{}], leaked [{}]\n",
        f.hardened.aborted_from,
        f.hardened.scrubbed_fields.join(", "),
        f.hardened_leaked_fields.join(", ")
    ));
}

fn format_side_channel(output: &mut String, f: &SideChannelFinding) {
    output.push_str(&format!("  Samples: {}\n", f.sample_count));
    output.push_str(&format!(
        "  Delay Per Set Bit: {:.6} seconds\n",
        f.unit_delay_seconds
    ));
    for timing in &f.timings {
        output.push_str(&format!(
            "  Bit count {}: {:.6} seconds\n",
            timing.set_bits, timing.mean_seconds
        ));
    }
    let verdict = match f.verdict {
        Verdict::SideChannelDetected => {
            "VULNERABILITY DETECTED: execution time increases with bit count"
        }
        Verdict::NoClearCorrelation => "No clear correlation between bit count and execution time",
        Verdict::InsufficientData => "Not enough data to analyze correlation",
    };
    output.push_str(&format!("  Verdict: {}\n", verdict));
}

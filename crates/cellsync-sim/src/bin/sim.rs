#![forbid(unsafe_code)]

use anyhow::Result;
use cellsync_sim::campaign::{CampaignConfig, run_campaign};

fn main() -> Result<()> {
    let report = run_campaign(&CampaignConfig::default())?;

    println!(
        "campaign complete: seeds={} passed={} interesting={} rejected_ops={}",
        report.seeds_run,
        report.seeds_passed,
        report.interesting_states_reached,
        report.rejected_ops
    );
    if let Some(seed) = report.first_failure {
        println!("first failing seed: {seed}");
        std::process::exit(1);
    }

    Ok(())
}

//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cadence::CadenceConfig;
use crate::campaign::CampaignConfig;

/// Fleetperf campaign runner.
#[derive(Parser, Debug)]
#[command(name = "fleetperf-control", about = "Fleet speed-test campaign runner")]
pub struct Cli {
    /// HTTP listen address for agent result pushes.
    #[arg(long, default_value = "0.0.0.0:5050")]
    pub listen: String,

    /// Number of test iterations to run.
    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    /// Length of each iteration's traffic window in seconds.
    #[arg(long, default_value_t = 60)]
    pub iteration_secs: u64,

    /// Run traffic this long before each pause, in seconds.
    /// Without it the window runs continuously.
    #[arg(long)]
    pub stop_interval_secs: Option<u64>,

    /// Pause between traffic runs in seconds.
    #[arg(long, default_value_t = 5)]
    pub stop_pause_secs: u64,

    /// How long to wait for stragglers at the end of each iteration.
    #[arg(long, default_value_t = 120)]
    pub barrier_timeout_secs: u64,

    /// Barrier poll interval in seconds.
    #[arg(long, default_value_t = 1)]
    pub barrier_poll_secs: u64,

    /// Traffic counter sampling tick in seconds.
    #[arg(long, default_value_t = 1)]
    pub sample_tick_secs: u64,

    /// Port inventory JSON file.
    #[arg(long)]
    pub ports: PathBuf,

    /// ADB registration inventory JSON file.
    #[arg(long)]
    pub adb: PathBuf,

    /// Resource inventory JSON file.
    #[arg(long)]
    pub resources: PathBuf,

    /// Append every accepted report to this JSONL file.
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Write per-iteration results to this JSON file.
    #[arg(long, default_value = "fleetperf-results.json")]
    pub output: PathBuf,
}

impl Cli {
    pub fn campaign(&self) -> CampaignConfig {
        CampaignConfig {
            iterations: self.iterations,
            cadence: CadenceConfig {
                total: Duration::from_secs(self.iteration_secs),
                stop_interval: self.stop_interval_secs.map(Duration::from_secs),
                pause: Duration::from_secs(self.stop_pause_secs),
            },
            sample_tick: Duration::from_secs(self.sample_tick_secs),
            barrier_timeout: Duration::from_secs(self.barrier_timeout_secs),
            barrier_poll: Duration::from_secs(self.barrier_poll_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from([
            "fleetperf-control",
            "--ports",
            "ports.json",
            "--adb",
            "adb.json",
            "--resources",
            "resources.json",
        ]);
        assert_eq!(cli.listen, "0.0.0.0:5050");
        assert_eq!(cli.iterations, 1);

        let campaign = cli.campaign();
        assert_eq!(campaign.barrier_timeout, Duration::from_secs(120));
        assert_eq!(campaign.cadence.stop_interval, None);
    }

    #[test]
    fn stop_interval_flows_into_cadence() {
        let cli = Cli::parse_from([
            "fleetperf-control",
            "--ports",
            "p.json",
            "--adb",
            "a.json",
            "--resources",
            "r.json",
            "--iteration-secs",
            "30",
            "--stop-interval-secs",
            "10",
            "--stop-pause-secs",
            "2",
        ]);
        let campaign = cli.campaign();
        assert_eq!(campaign.cadence.total, Duration::from_secs(30));
        assert_eq!(campaign.cadence.stop_interval, Some(Duration::from_secs(10)));
        assert_eq!(campaign.cadence.pause, Duration::from_secs(2));
    }
}

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::{LivenessProber, ProbeRunner};

/// Echo requests sent per liveness check
pub const PING_COUNT: u32 = 5;

/// A device is alive when less than this share of packets is lost
const MAX_PACKET_LOSS: f64 = 0.5;

static TRANSMITTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("valid regex")
});

static RTT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max(?:/mdev|/stddev)? = [\d.]+/([\d.]+)/")
        .expect("valid regex")
});

/// Summary of one ping run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingReport {
    pub transmitted: u32,
    pub received: u32,
    pub avg_rtt_ms: Option<f64>,
}

impl PingReport {
    /// Report for a device that did not answer at all
    pub fn unreachable() -> Self {
        Self { transmitted: PING_COUNT, received: 0, avg_rtt_ms: None }
    }

    /// Parse the summary printed by the system `ping` utility
    pub fn parse(output: &str) -> Option<Self> {
        let counts = TRANSMITTED_RE.captures(output)?;
        let transmitted = counts[1].parse().ok()?;
        let received = counts[2].parse().ok()?;
        let avg_rtt_ms = RTT_RE.captures(output).and_then(|c| c[1].parse().ok());

        Some(Self { transmitted, received, avg_rtt_ms })
    }

    /// Fraction of packets lost, 0.0 to 1.0
    pub fn packet_loss(&self) -> f64 {
        if self.transmitted == 0 {
            return 1.0;
        }
        1.0 - (f64::from(self.received.min(self.transmitted)) / f64::from(self.transmitted))
    }

    /// Alive when more than half of the replies came back
    pub fn is_alive(&self) -> bool {
        self.packet_loss() < MAX_PACKET_LOSS
    }

    /// Performance data readable by the perf parser
    pub fn perf_data(&self) -> String {
        format!(
            "percent_packet_loss={:.0}% average_return_time={:.3}ms",
            self.packet_loss() * 100.0,
            self.avg_rtt_ms.unwrap_or(0.0)
        )
    }
}

/// ICMP liveness prober backed by the system `ping` binary
pub struct PingProber {
    runner: Arc<dyn ProbeRunner>,
    count: u32,
}

impl PingProber {
    pub fn new(runner: Arc<dyn ProbeRunner>) -> Self {
        Self { runner, count: PING_COUNT }
    }

    fn argv(&self, address: &str) -> Vec<String> {
        vec![
            "ping".to_string(),
            "-q".to_string(),
            "-n".to_string(),
            "-c".to_string(),
            self.count.to_string(),
            "-W".to_string(),
            "2".to_string(),
            address.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl LivenessProber for PingProber {
    async fn ping(&self, address: &str) -> PingReport {
        let output = self.runner.run(&self.argv(address)).await;
        let report = PingReport::parse(&output.stdout).unwrap_or_else(PingReport::unreachable);

        debug!(
            address = %address,
            received = report.received,
            transmitted = report.transmitted,
            alive = report.is_alive(),
            "Ping finished"
        );
        report
    }
}

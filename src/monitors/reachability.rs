//! Reachability poller
//!
//! Probes a fixed roster of hosts once per cycle and records each one as
//! up (1) or down (0). A timeout is simply "down" for this cycle; the host is
//! probed again on the next one.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tracing::{debug, trace, warn};

use super::{Batch, Collector};
use crate::point::TimeSeriesPoint;

/// Hosts to probe, fixed for the life of the worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRoster {
    hosts: Vec<String>,
}

impl HostRoster {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_string())
            .filter(|host| !host.is_empty())
            .collect();

        Self { hosts }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Up/down state of every host for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityState(BTreeMap<String, u8>);

impl ReachabilityState {
    pub fn get(&self, host: &str) -> Option<u8> {
        self.0.get(host).copied()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn any_down(&self) -> bool {
        self.0.values().any(|state| *state == 0)
    }

    pub fn to_point(&self, table: &str) -> TimeSeriesPoint {
        TimeSeriesPoint::new(table)
            .with_fields(self.0.iter().map(|(host, state)| (host.clone(), f64::from(*state))))
    }
}

/// Something that can tell whether a host answers
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Round trip time, or `None` when no reply arrived within `timeout`
    async fn probe(&self, host: &str, timeout: Duration) -> Option<Duration>;
}

/// Probe every host once and build the state for this cycle
pub async fn poll_once(
    probe: &dyn ReachabilityProbe,
    roster: &HostRoster,
    timeout: Duration,
) -> ReachabilityState {
    let mut state = BTreeMap::new();

    for host in roster.hosts() {
        let reply = probe.probe(host, timeout).await;
        trace!("{host}: {reply:?}");
        state.insert(host.clone(), u8::from(reply.is_some()));
    }

    ReachabilityState(state)
}

/// ICMP echo probe
#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpProbe;

async fn resolve_host(host: &str) -> Result<IpAddr, std::io::Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
    addrs
        .into_iter()
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"))
}

#[async_trait]
impl ReachabilityProbe for IcmpProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> Option<Duration> {
        let ip = match resolve_host(host).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!("{host}: could not resolve: {e}");
                return None;
            }
        };

        let client = match ip {
            IpAddr::V4(_) => Client::new(&Config::default()),
            IpAddr::V6(_) => Client::new(&Config::builder().kind(ICMP::V6).build()),
        };
        let client = match client {
            Ok(client) => client,
            Err(e) => {
                warn!("{host}: could not open ICMP socket: {e}");
                return None;
            }
        };

        let identifier = PingIdentifier((std::process::id() & 0xffff) as u16);
        let mut pinger = client.pinger(ip, identifier).await;
        pinger.timeout(timeout);

        let start = Instant::now();
        match tokio::time::timeout(timeout, pinger.ping(PingSequence(0), &[])).await {
            Ok(Ok((_, rtt))) => Some(rtt),
            Ok(Err(e)) => {
                debug!("{host}: no reply after {:?}: {e}", start.elapsed());
                None
            }
            Err(_) => {
                debug!("{host}: timed out after {timeout:?}");
                None
            }
        }
    }
}

/// Periodic collector writing one point with the state of every host
pub struct ReachabilityPoller<P> {
    probe: P,
    roster: HostRoster,
    timeout: Duration,
    table: String,
}

impl<P: ReachabilityProbe> ReachabilityPoller<P> {
    pub fn new(probe: P, roster: HostRoster, timeout: Duration, table: impl Into<String>) -> Self {
        Self {
            probe,
            roster,
            timeout,
            table: table.into(),
        }
    }

    pub async fn poll_once(&self) -> ReachabilityState {
        poll_once(&self.probe, &self.roster, self.timeout).await
    }
}

#[async_trait]
impl<P: ReachabilityProbe> Collector for ReachabilityPoller<P> {
    fn name(&self) -> &str {
        "devices"
    }

    async fn collect(&mut self) -> anyhow::Result<Option<Batch>> {
        let state = self.poll_once().await;

        // an empty roster has nothing to report
        if state.is_empty() {
            return Ok(None);
        }

        Ok(Some(Batch {
            flagged: state.any_down(),
            points: vec![state.to_point(&self.table)],
        }))
    }
}

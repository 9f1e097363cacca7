use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rand::Rng;

use sv_core::{Error, Result};

use crate::conn::Connection;
use crate::config::ServerConfig;
use crate::pool::ServerPool;

/// Manages every configured upstream server and drives `post`/`retrieve`/
/// `search` across them with priority-ordered failover.
pub struct Transport {
    pools: Vec<ServerPool>,
    max_attempts: usize,
}

/// Per-call tuning that would otherwise need a long, rarely-varied
/// parameter list on every `Transport` method.
#[derive(Clone, Copy, Debug)]
pub struct CallOptions {
    pub deadline: Duration,
    pub checkout_timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self { deadline: Duration::from_secs(60), checkout_timeout: Duration::from_secs(10) }
    }
}

/// An in-flight request, dispatched against whichever connection the
/// failover loop hands it next. Kept as data rather than a closure so the
/// retry driver stays free of async-closure lifetime gymnastics.
enum Call<'a> {
    Post { subject: &'a str, group: &'a str, body: &'a [u8] },
    Retrieve { message_id: &'a str },
    Search { group: &'a str, pattern: &'a str, limit: usize },
}

enum CallOutput {
    MessageId(String),
    Body(Vec<u8>),
    Ids(Vec<String>),
}

impl Call<'_> {
    async fn run(&self, conn: &mut Connection) -> Result<CallOutput> {
        match self {
            Call::Post { subject, group, body } => {
                conn.post(subject, group, body).await.map(CallOutput::MessageId)
            }
            Call::Retrieve { message_id } => conn.retrieve(message_id).await.map(CallOutput::Body),
            Call::Search { group, pattern, limit } => {
                conn.search(group, pattern, *limit).await.map(CallOutput::Ids)
            }
        }
    }
}

impl Transport {
    /// Builds a transport over `servers`, highest priority (lowest number)
    /// first. `idle_ttl` bounds how long a pooled connection may sit idle
    /// before it is rotated out; `rate_limit_per_sec` applies per server,
    /// for the Downloader's bounded-concurrency fetch plan.
    pub fn new(
        mut servers: Vec<ServerConfig>,
        idle_ttl: Duration,
        rate_limit_per_sec: Option<u32>,
        max_attempts: usize,
    ) -> Self {
        servers.sort_by_key(|s| s.priority);
        let pools = servers
            .into_iter()
            .map(|s| ServerPool::new(s, idle_ttl, rate_limit_per_sec))
            .collect();
        Self { pools, max_attempts: max_attempts.max(1) }
    }

    /// Names of every enabled server, in priority order. The uploader uses
    /// this to spread a segment's redundant copies across distinct servers
    /// rather than letting them all land on the same one.
    pub fn enabled_server_names(&self) -> Vec<&str> {
        self.pools.iter().filter(|p| p.config.enabled).map(|p| p.config.name.as_str()).collect()
    }

    fn ordered_pools(&self, prefer: Option<&str>) -> Vec<&ServerPool> {
        let enabled = || self.pools.iter().filter(|p| p.config.enabled);
        match prefer.and_then(|name| self.pools.iter().find(|p| p.config.name == name)) {
            Some(preferred) => std::iter::once(preferred)
                .chain(enabled().filter(|p| p.config.name != preferred.config.name))
                .collect(),
            None => enabled().collect(),
        }
    }

    /// Posts `body` under `subject` to `group`, preferring `prefer` when
    /// given and otherwise the highest-priority server with capacity.
    /// Retries retryable failures against the next server in priority order
    /// up to `max_attempts`, with exponential backoff and jitter between
    /// attempts on the *same* server.
    pub async fn post(
        &self,
        subject: &str,
        body: &[u8],
        group: &str,
        prefer: Option<&str>,
        opts: CallOptions,
    ) -> Result<String> {
        match self.dispatch(Call::Post { subject, group, body }, prefer, opts).await? {
            CallOutput::MessageId(id) => Ok(id),
            _ => unreachable!("Call::Post always yields CallOutput::MessageId"),
        }
    }

    pub async fn retrieve(
        &self,
        message_id: &str,
        prefer: Option<&str>,
        opts: CallOptions,
    ) -> Result<Vec<u8>> {
        match self.dispatch(Call::Retrieve { message_id }, prefer, opts).await? {
            CallOutput::Body(body) => Ok(body),
            _ => unreachable!("Call::Retrieve always yields CallOutput::Body"),
        }
    }

    pub async fn search(
        &self,
        group: &str,
        subject_pattern: &str,
        limit: usize,
        prefer: Option<&str>,
        opts: CallOptions,
    ) -> Result<Vec<String>> {
        match self.dispatch(Call::Search { group, pattern: subject_pattern, limit }, prefer, opts).await? {
            CallOutput::Ids(ids) => Ok(ids),
            _ => unreachable!("Call::Search always yields CallOutput::Ids"),
        }
    }

    /// Shared retry/failover driver: tries `prefer` first if named and
    /// enabled, then every enabled pool in priority order, backing off
    /// between same-pool retries. A terminal error stops the loop
    /// immediately; only retryable/resource-exhausted failures drive
    /// another attempt.
    async fn dispatch(&self, call: Call<'_>, prefer: Option<&str>, opts: CallOptions) -> Result<CallOutput> {
        let ordered = self.ordered_pools(prefer);
        if ordered.is_empty() {
            return Err(Error::TransportTerminal("no enabled servers configured".into()));
        }

        let mut last_err = Error::TransportTerminal("no server attempted".into());
        let mut attempts = 0usize;

        for pool in ordered {
            let mut backoff = ExponentialBackoff {
                initial_interval: Duration::from_millis(200),
                max_interval: Duration::from_secs(5),
                max_elapsed_time: Some(opts.deadline),
                ..Default::default()
            };

            loop {
                if attempts >= self.max_attempts {
                    return Err(last_err);
                }
                attempts += 1;

                let attempt = tokio::time::timeout(opts.deadline, async {
                    let mut guard = pool.checkout(opts.checkout_timeout).await?;
                    let outcome = call.run(guard.connection_mut()).await;
                    match &outcome {
                        Ok(_) => guard.release().await,
                        Err(_) => guard.mark_broken(),
                    }
                    outcome
                })
                .await;

                match attempt {
                    Ok(Ok(output)) => return Ok(output),
                    Ok(Err(e)) => {
                        let retryable = e.is_retryable();
                        last_err = e;
                        if !retryable {
                            return Err(last_err);
                        }
                        match backoff.next_backoff() {
                            Some(delay) => {
                                tokio::time::sleep(jitter(delay)).await;
                                continue;
                            }
                            None => break, // this server's backoff budget is spent; try the next
                        }
                    }
                    Err(_) => {
                        last_err = Error::Cancelled;
                        break;
                    }
                }
            }
        }

        Err(last_err)
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_pools_prefers_named_server_first() {
        let servers = vec![
            ServerConfig::new("primary", "news1.example", 563).with_priority(1),
            ServerConfig::new("backup", "news2.example", 563).with_priority(2),
        ];
        let transport = Transport::new(servers, Duration::from_secs(60), None, 3);
        let ordered = transport.ordered_pools(Some("backup"));
        assert_eq!(ordered[0].config.name, "backup");
        assert_eq!(ordered[1].config.name, "primary");
    }

    #[test]
    fn ordered_pools_skips_disabled_servers() {
        let mut backup = ServerConfig::new("backup", "news2.example", 563).with_priority(2);
        backup.enabled = false;
        let servers = vec![ServerConfig::new("primary", "news1.example", 563).with_priority(1), backup];
        let transport = Transport::new(servers, Duration::from_secs(60), None, 3);
        let ordered = transport.ordered_pools(None);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].config.name, "primary");
    }

    #[test]
    fn no_enabled_servers_yields_empty_order() {
        let mut only = ServerConfig::new("only", "news.example", 563);
        only.enabled = false;
        let transport = Transport::new(vec![only], Duration::from_secs(60), None, 3);
        assert!(transport.ordered_pools(None).is_empty());
    }

    #[test]
    fn enabled_server_names_excludes_disabled_and_keeps_priority_order() {
        let mut backup = ServerConfig::new("backup", "news2.example", 563).with_priority(2);
        backup.enabled = false;
        let servers = vec![
            ServerConfig::new("slow", "news3.example", 563).with_priority(50),
            ServerConfig::new("fast", "news1.example", 563).with_priority(1),
            backup,
        ];
        let transport = Transport::new(servers, Duration::from_secs(60), None, 3);
        assert_eq!(transport.enabled_server_names(), vec!["fast", "slow"]);
    }

    #[test]
    fn priority_sort_runs_lowest_number_first() {
        let servers = vec![
            ServerConfig::new("slow", "news2.example", 563).with_priority(50),
            ServerConfig::new("fast", "news1.example", 563).with_priority(1),
        ];
        let transport = Transport::new(servers, Duration::from_secs(60), None, 3);
        let ordered = transport.ordered_pools(None);
        assert_eq!(ordered[0].config.name, "fast");
    }
}

//! Routing table management
//!
//! Once the tunnel is up the default route is moved onto it. The VPN server
//! itself must stay reachable through the original gateway, so a host route
//! to it is installed first.

use regex::Regex;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::{debug, info};

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::L2tpConfig;
use crate::error::{L2tpError, L2tpResult};
use crate::validation;

/// A route as handed to `ip route`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Host address or `default`
    pub destination: String,
    pub gateway: Option<Ipv4Addr>,
    pub device: String,
}

impl RouteEntry {
    fn ip_args(&self) -> Vec<String> {
        let mut args = vec![self.destination.clone()];
        if let Some(gw) = self.gateway {
            args.push("via".to_string());
            args.push(gw.to_string());
        }
        args.push("dev".to_string());
        args.push(self.device.clone());
        args
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip_args().join(" "))
    }
}

/// Gateway and device from `ip route get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInfo {
    pub gateway: Ipv4Addr,
    pub device: Option<String>,
}

pub struct RouteManager {
    runner: Arc<dyn CommandRunner>,
    tunnel_interface: String,
    physical_interface: Option<String>,
    sudo: bool,
    via: Regex,
    dev: Regex,
}

impl RouteManager {
    pub fn new(config: &L2tpConfig, runner: Arc<dyn CommandRunner>) -> L2tpResult<Self> {
        validation::validate_interface_name(&config.tunnel.tunnel_interface)?;
        if let Some(iface) = &config.tunnel.physical_interface {
            validation::validate_interface_name(iface)?;
        }

        Ok(Self {
            runner,
            tunnel_interface: config.tunnel.tunnel_interface.clone(),
            physical_interface: config.tunnel.physical_interface.clone(),
            sudo: config.elevation.needs_sudo(),
            via: compile(r"\bvia\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\b")?,
            dev: compile(r"\bdev\s+(\S+)")?,
        })
    }

    /// Pin the server to the current gateway, then send everything else
    /// through the tunnel
    ///
    /// Returns the host route and the default route, in installation order.
    /// Nothing is changed if the gateway cannot be determined.
    pub async fn commit_routes(&self, server: &str) -> L2tpResult<Vec<RouteEntry>> {
        let addr = resolve_server(server).await?;
        let info = self.discover_gateway(addr).await?;

        let device = match (&self.physical_interface, info.device) {
            (Some(configured), _) => configured.clone(),
            (None, Some(discovered)) => discovered,
            (None, None) => {
                return Err(L2tpError::GatewayNotFound {
                    server: addr.to_string(),
                    detail: "no physical interface configured or reported".to_string(),
                })
            }
        };

        let host = RouteEntry {
            destination: addr.to_string(),
            gateway: Some(info.gateway),
            device,
        };
        self.add_host_route(&host).await?;

        let default = RouteEntry {
            destination: "default".to_string(),
            gateway: None,
            device: self.tunnel_interface.clone(),
        };
        self.replace_default_route(&default).await?;

        Ok(vec![host, default])
    }

    /// Ask the kernel how it currently reaches `addr`
    pub async fn discover_gateway(&self, addr: Ipv4Addr) -> L2tpResult<GatewayInfo> {
        let cmd = CommandSpec::new("ip").args(["route".to_string(), "get".to_string(), addr.to_string()]);
        let output = run_checked(self.runner.as_ref(), cmd)
            .await
            .map_err(|e| L2tpError::GatewayNotFound {
                server: addr.to_string(),
                detail: e.to_string(),
            })?;

        debug!("Route to {}: {}", addr, output.stdout.trim());

        self.parse_route_get(&output.stdout).ok_or_else(|| L2tpError::GatewayNotFound {
            server: addr.to_string(),
            detail: format!("no 'via' gateway in: {}", output.stdout.trim()),
        })
    }

    /// Extract `via <ipv4>` and `dev <name>` from `ip route get` output
    pub fn parse_route_get(&self, text: &str) -> Option<GatewayInfo> {
        let gateway = self
            .via
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<Ipv4Addr>().ok())?;

        let device = self
            .dev
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|name| validation::validate_interface_name(name).is_ok());

        Some(GatewayInfo { gateway, device })
    }

    async fn add_host_route(&self, route: &RouteEntry) -> L2tpResult<()> {
        info!("Adding host route {}", route);
        self.route_cmd("add", route).await
    }

    async fn replace_default_route(&self, route: &RouteEntry) -> L2tpResult<()> {
        info!("Replacing default route: {}", route);
        self.route_cmd("replace", route).await
    }

    async fn route_cmd(&self, action: &str, route: &RouteEntry) -> L2tpResult<()> {
        let cmd = CommandSpec::new("ip")
            .args(["route", action])
            .args(route.ip_args())
            .privileged(self.sudo);

        run_checked(self.runner.as_ref(), cmd)
            .await
            .map(|_| ())
            .map_err(|e| L2tpError::RouteFailed(format!("ip route {} {}: {}", action, route, e)))
    }
}

fn compile(pattern: &str) -> L2tpResult<Regex> {
    Regex::new(pattern).map_err(|e| L2tpError::ParseError(format!("Invalid route pattern: {}", e)))
}

/// IPv4 address for `server`, resolving hostnames
pub async fn resolve_server(server: &str) -> L2tpResult<Ipv4Addr> {
    match server.parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => return Ok(addr),
        Ok(IpAddr::V6(_)) => {
            return Err(L2tpError::InvalidParameter(format!(
                "IPv6 server address {} cannot be routed over an IPv4 gateway",
                server
            )))
        }
        Err(_) => {}
    }

    let addrs = lookup_host((server, 0))
        .await
        .map_err(|e| L2tpError::GatewayNotFound {
            server: server.to_string(),
            detail: format!("could not resolve: {}", e),
        })?;

    addrs
        .filter_map(|sa| match sa.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| L2tpError::GatewayNotFound {
            server: server.to_string(),
            detail: "no IPv4 address".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, MockCommandRunner};
    use crate::config::Elevation;
    use mockall::Sequence;

    const ROUTE_GET: &str =
        "203.0.113.5 via 10.0.2.2 dev eth0 src 10.0.2.15 uid 1000 \n    cache \n";

    fn config() -> L2tpConfig {
        let mut config = L2tpConfig::default();
        config.elevation = Elevation::Sudo;
        config
    }

    fn is_route_get(cmd: &CommandSpec) -> bool {
        cmd.program == "ip" && cmd.args.first().map(String::as_str) == Some("route")
            && cmd.args.get(1).map(String::as_str) == Some("get")
    }

    #[tokio::test]
    async fn test_host_route_before_default() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        runner
            .expect_run()
            .withf(|cmd| cmd.to_string() == "ip route get 203.0.113.5")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(ROUTE_GET)));
        runner
            .expect_run()
            .withf(|cmd| cmd.to_string() == "sudo ip route add 203.0.113.5 via 10.0.2.2 dev eth0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_run()
            .withf(|cmd| cmd.to_string() == "sudo ip route replace default dev ppp0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));

        let manager = RouteManager::new(&config(), Arc::new(runner)).unwrap();
        let routes = manager.commit_routes("203.0.113.5").await.unwrap();

        assert_eq!(
            routes,
            vec![
                RouteEntry {
                    destination: "203.0.113.5".to_string(),
                    gateway: Some(Ipv4Addr::new(10, 0, 2, 2)),
                    device: "eth0".to_string(),
                },
                RouteEntry {
                    destination: "default".to_string(),
                    gateway: None,
                    device: "ppp0".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_no_gateway_means_no_mutation() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(is_route_get)
            .times(1)
            .returning(|_| Ok(CommandOutput::ok("203.0.113.5 dev eth0 src 10.0.2.15 uid 0\n    cache\n")));
        runner
            .expect_run()
            .withf(|cmd| !is_route_get(cmd))
            .times(0)
            .returning(|_| Ok(CommandOutput::ok("")));

        let manager = RouteManager::new(&config(), Arc::new(runner)).unwrap();
        let err = manager.commit_routes("203.0.113.5").await.unwrap_err();

        assert!(matches!(err, L2tpError::GatewayNotFound { ref server, .. } if server == "203.0.113.5"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_route_query_failure_means_no_mutation() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(is_route_get)
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(2, "RTNETLINK answers: Network is unreachable")));
        runner
            .expect_run()
            .withf(|cmd| !is_route_get(cmd))
            .times(0)
            .returning(|_| Ok(CommandOutput::ok("")));

        let manager = RouteManager::new(&config(), Arc::new(runner)).unwrap();
        let err = manager.commit_routes("203.0.113.5").await.unwrap_err();

        match err {
            L2tpError::GatewayNotFound { detail, .. } => assert!(detail.contains("Network is unreachable")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configured_physical_interface_wins() {
        let mut config = config();
        config.elevation = Elevation::Never;
        config.tunnel.physical_interface = Some("ens5".to_string());

        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        runner
            .expect_run()
            .withf(is_route_get)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(ROUTE_GET)));
        runner
            .expect_run()
            .withf(|cmd| cmd.to_string() == "ip route add 203.0.113.5 via 10.0.2.2 dev ens5")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));
        runner
            .expect_run()
            .withf(|cmd| cmd.to_string() == "ip route replace default dev ppp0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));

        let manager = RouteManager::new(&config, Arc::new(runner)).unwrap();
        manager.commit_routes("203.0.113.5").await.unwrap();
    }

    #[tokio::test]
    async fn test_host_route_failure_skips_default() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(is_route_get)
            .returning(|_| Ok(CommandOutput::ok(ROUTE_GET)));
        runner
            .expect_run()
            .withf(|cmd| cmd.args.contains(&"add".to_string()))
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(2, "RTNETLINK answers: File exists")));
        runner
            .expect_run()
            .withf(|cmd| cmd.args.contains(&"replace".to_string()))
            .times(0)
            .returning(|_| Ok(CommandOutput::ok("")));

        let manager = RouteManager::new(&config(), Arc::new(runner)).unwrap();
        let err = manager.commit_routes("203.0.113.5").await.unwrap_err();

        assert!(matches!(err, L2tpError::RouteFailed(ref msg) if msg.contains("File exists")));
    }

    #[test]
    fn test_parse_route_get() {
        let manager = RouteManager::new(&config(), Arc::new(MockCommandRunner::new())).unwrap();

        assert_eq!(
            manager.parse_route_get(ROUTE_GET),
            Some(GatewayInfo {
                gateway: Ipv4Addr::new(10, 0, 2, 2),
                device: Some("eth0".to_string()),
            })
        );
        assert_eq!(manager.parse_route_get("local 127.0.0.1 dev lo src 127.0.0.1\n"), None);
        assert_eq!(manager.parse_route_get("203.0.113.5 via fe80::1 dev eth0\n"), None);
    }

    #[test]
    fn test_rejects_bad_interface_names() {
        let mut config = config();
        config.tunnel.physical_interface = Some("eth0; reboot".to_string());
        assert!(RouteManager::new(&config, Arc::new(MockCommandRunner::new())).is_err());
    }

    #[tokio::test]
    async fn test_resolve_server() {
        assert_eq!(resolve_server("203.0.113.5").await.unwrap(), Ipv4Addr::new(203, 0, 113, 5));
        assert!(matches!(
            resolve_server("2001:db8::1").await,
            Err(L2tpError::InvalidParameter(_))
        ));
        assert_eq!(resolve_server("localhost").await.unwrap(), Ipv4Addr::LOCALHOST);
    }
}

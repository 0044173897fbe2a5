//! Configuration artifacts for strongSwan, xl2tpd and pppd
//!
//! Generation is a pure function of the credentials and the configuration:
//! no IO happens here, and the same inputs always give the same bytes.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ConfigPaths, L2tpConfig, TunnelSettings};
use super::credentials::Credentials;

/// IKE proposals, most widely supported first
pub const CIPHER_SUITES: [&str; 3] = [
    "aes128-sha1-modp2048",
    "aes256-sha1-modp2048",
    "aes256-sha256-modp2048",
];

/// Owner read/write only
pub const PROTECTED_MODE: u32 = 0o600;

/// MTU/MRU leaving room for L2TP/IPsec overhead
pub const TUNNEL_MTU: u32 = 1410;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    IpsecConf,
    IpsecSecrets,
    PppOptions,
    Xl2tpdConf,
    ResolvConf,
}

impl ArtifactKind {
    /// Whether the content embeds a credential
    pub fn is_secret(self) -> bool {
        matches!(self, ArtifactKind::IpsecSecrets | ArtifactKind::PppOptions)
    }
}

/// One generated file
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub content: String,
    pub mode: u32,
}

// Content may hold the password or PSK
impl fmt::Debug for ConfigArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigArtifact")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .field("mode", &format_args!("{:o}", self.mode))
            .finish()
    }
}

/// Builds every artifact needed for one L2TP/IPsec session
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    paths: ConfigPaths,
    tunnel: TunnelSettings,
}

impl ConfigGenerator {
    pub fn new(config: &L2tpConfig) -> Self {
        Self {
            paths: config.paths.clone(),
            tunnel: config.tunnel.clone(),
        }
    }

    /// All artifacts, in the order they should be written
    pub fn generate(&self, creds: &Credentials) -> Vec<ConfigArtifact> {
        vec![
            self.artifact(ArtifactKind::IpsecConf, &self.paths.ipsec_conf, self.build_ipsec_conf(creds)),
            self.artifact(ArtifactKind::IpsecSecrets, &self.paths.ipsec_secrets, self.build_ipsec_secrets(creds)),
            self.artifact(ArtifactKind::PppOptions, &self.paths.ppp_options, self.build_ppp_options(creds)),
            self.artifact(ArtifactKind::Xl2tpdConf, &self.paths.xl2tpd_conf, self.build_xl2tpd_conf(creds)),
            self.artifact(ArtifactKind::ResolvConf, &self.paths.resolv_conf, self.build_resolv_conf()),
        ]
    }

    fn artifact(&self, kind: ArtifactKind, path: &Path, content: String) -> ConfigArtifact {
        ConfigArtifact {
            kind,
            path: path.to_path_buf(),
            content,
            mode: PROTECTED_MODE,
        }
    }

    /// strongSwan connection: IKEv1, transport mode, PSK, started with the daemon
    pub fn build_ipsec_conf(&self, creds: &Credentials) -> String {
        let mut conf = String::new();

        conf.push_str("config setup\n\n");

        conf.push_str("conn %default\n");
        conf.push_str("\tikelifetime=60m\n");
        conf.push_str("\tkeylife=20m\n");
        conf.push_str("\trekeymargin=3m\n");
        conf.push_str("\tkeyingtries=1\n");
        conf.push_str("\tkeyexchange=ikev1\n");
        conf.push_str("\tauthby=secret\n\n");

        conf.push_str(&format!("conn {}\n", self.tunnel.connection_name));
        conf.push_str("\tkeyexchange=ikev1\n");
        conf.push_str("\ttype=transport\n");
        conf.push_str("\tauthby=secret\n");
        conf.push_str("\tauto=start\n");

        // Local configuration
        conf.push_str("\tleft=%defaultroute\n");
        conf.push_str("\tleftprotoport=17/1701\n");

        // Remote configuration
        conf.push_str("\trightprotoport=17/1701\n");
        conf.push_str(&format!("\tright={}\n", creds.server()));

        conf.push_str(&format!("\tike={}\n", CIPHER_SUITES.join(",")));

        conf
    }

    /// `<server> : PSK "<psk>"`
    pub fn build_ipsec_secrets(&self, creds: &Credentials) -> String {
        format!("{} : PSK \"{}\"", creds.server(), creds.psk().expose())
    }

    /// pppd options for the LAC
    ///
    /// Authentication towards the peer is MS-CHAPv2 only; `noauth` because
    /// the peer is already authenticated by IPsec.
    pub fn build_ppp_options(&self, creds: &Credentials) -> String {
        let mut opts = String::new();

        opts.push_str("ipcp-accept-local\n");
        opts.push_str("ipcp-accept-remote\n");
        opts.push_str("refuse-eap\n");
        opts.push_str("require-mschap-v2\n");
        opts.push_str("noccp\n");
        opts.push_str("noauth\n");
        opts.push_str(&format!("mtu {}\n", TUNNEL_MTU));
        opts.push_str(&format!("mru {}\n", TUNNEL_MTU));
        opts.push_str("noipdefault\n");
        opts.push_str("defaultroute\n");
        opts.push_str("usepeerdns\n");
        opts.push_str("connect-delay 5000\n");
        opts.push_str(&format!("name \"{}\"\n", ppp_escape(creds.username().expose())));
        opts.push_str(&format!("password \"{}\"\n", ppp_escape(creds.password().expose())));
        opts.push_str("debug\n");
        opts.push_str(&format!("logfile {}\n", self.paths.daemon_log.display()));

        opts
    }

    /// xl2tpd with a single LAC pointing at the server
    pub fn build_xl2tpd_conf(&self, creds: &Credentials) -> String {
        let mut conf = String::new();

        conf.push_str(&format!("[lac {}]\n", self.tunnel.lac_name));
        conf.push_str(&format!("lns = {}\n", creds.server()));
        conf.push_str("ppp debug = yes\n");
        conf.push_str(&format!("pppoptfile = {}\n", self.paths.ppp_options.display()));
        conf.push_str("length bit = yes\n");
        conf.push_str("autodial = yes\n");

        conf
    }

    /// Resolver used once the tunnel is up
    pub fn build_resolv_conf(&self) -> String {
        self.tunnel
            .nameservers
            .iter()
            .map(|ns| format!("nameserver {}\n", ns))
            .collect()
    }
}

/// pppd expands backslash escapes inside quoted words
fn ppp_escape(value: &str) -> String {
    value.replace('\\', "\\\\")
}

use std::fmt;

use crate::error::L2tpResult;
use crate::validation;

/// A string that never shows up in logs or `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for writing into protected artifacts only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Inputs for one VPN session. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct Credentials {
    server: String,
    username: Secret,
    password: Secret,
    psk: Secret,
}

impl Credentials {
    /// Build and validate credentials
    ///
    /// Fails with `MissingInput` for an empty field, or `InvalidParameter`
    /// for values that cannot be embedded safely in the generated files.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        psk: impl Into<String>,
    ) -> L2tpResult<Self> {
        let server = server.into().trim().to_string();
        let username = username.into();
        let password = password.into();
        let psk = psk.into();

        validation::require_input("server", &server)?;
        validation::require_input("username", &username)?;
        validation::require_input("password", &password)?;
        validation::require_input("psk", &psk)?;

        validation::validate_hostname(&server)?;
        validation::validate_config_value("username", &username)?;
        validation::validate_config_value("password", &password)?;
        validation::validate_config_value("psk", &psk)?;

        Ok(Self {
            server,
            username: Secret::new(username),
            password: Secret::new(password),
            psk: Secret::new(psk),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn username(&self) -> &Secret {
        &self.username
    }

    pub fn password(&self) -> &Secret {
        &self.password
    }

    pub fn psk(&self) -> &Secret {
        &self.psk
    }
}

//! Storage account credentials and connection strings.
//!
//! A [`StorageAccount`] pairs an account name with exactly one credential:
//! an account key or a shared access signature. It renders the connection
//! string and endpoint a block-blob client needs. Secrets never appear in
//! `Debug` output.
//!
//! ```rust
//! use gzchunk::connection::StorageAccount;
//!
//! let account = StorageAccount::new("logsarchive", None, Some("sv=2021&sig=abc".into())).unwrap();
//! assert_eq!(
//!     account.connection_string(),
//!     "DefaultEndpointsProtocol=https;AccountName=logsarchive;\
//!      SharedAccessSignature=sv=2021&sig=abc;EndpointSuffix=core.windows.net"
//! );
//! assert_eq!(account.blob_endpoint(), "https://logsarchive.blob.core.windows.net");
//! assert!(!format!("{:?}", account).contains("sig=abc"));
//! ```

use std::fmt;

use crate::{Error, Result};

/// Endpoint suffix of the public cloud.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// A storage account credential.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Shared account key.
    AccountKey(String),
    /// Shared access signature token, without a leading `?`.
    SharedAccessSignature(String),
}

impl Credential {
    /// The connection string key naming this kind of credential.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountKey(_) => "AccountKey",
            Self::SharedAccessSignature(_) => "SharedAccessSignature",
        }
    }

    /// The secret value.
    pub fn secret(&self) -> &str {
        match self {
            Self::AccountKey(s) | Self::SharedAccessSignature(s) => s,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<redacted>)", self.kind())
    }
}

/// A storage account and the credential used to reach it.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    name: String,
    credential: Credential,
    endpoint_suffix: String,
}

impl StorageAccount {
    /// Creates an account from optional key and SAS arguments.
    ///
    /// Exactly one of `key` and `sas` must be present and non-empty.
    pub fn new(name: impl Into<String>, key: Option<String>, sas: Option<String>) -> Result<Self> {
        let name = name.into();
        let key = key.filter(|k| !k.is_empty());
        let sas = sas.filter(|s| !s.is_empty());
        let credential = match (key, sas) {
            (Some(key), None) => Credential::AccountKey(key),
            (None, Some(sas)) => {
                Credential::SharedAccessSignature(sas.trim_start_matches('?').to_string())
            }
            (None, None) => {
                return Err(Error::InvalidCredentials {
                    account: name,
                    reason: "either an account key or a shared access signature is required",
                });
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidCredentials {
                    account: name,
                    reason: "an account key and a shared access signature are mutually exclusive",
                });
            }
        };
        Self::with_credential(name, credential)
    }

    /// Creates an account from a credential.
    pub fn with_credential(name: impl Into<String>, credential: Credential) -> Result<Self> {
        let name = name.into();
        validate_account_name(&name)?;
        if credential.secret().is_empty() {
            return Err(Error::InvalidCredentials {
                account: name,
                reason: "credential is empty",
            });
        }
        Ok(Self {
            name,
            credential,
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
        })
    }

    /// Uses a different endpoint suffix (sovereign clouds, emulators).
    pub fn endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = suffix.into();
        self
    }

    /// The account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Renders the connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "DefaultEndpointsProtocol=https;AccountName={};{}={};EndpointSuffix={}",
            self.name,
            self.credential.kind(),
            self.credential.secret(),
            self.endpoint_suffix
        )
    }

    /// The blob service endpoint URL.
    pub fn blob_endpoint(&self) -> String {
        format!("https://{}.blob.{}", self.name, self.endpoint_suffix)
    }

    /// Parses a connection string produced by [`connection_string`](Self::connection_string)
    /// or by the storage portal.
    pub fn parse_connection_string(input: &str) -> Result<Self> {
        let mut name = None;
        let mut key = None;
        let mut sas = None;
        let mut suffix = None;

        for part in input.split(';').filter(|p| !p.trim().is_empty()) {
            // keys and SAS tokens contain '=' themselves
            let Some((field, value)) = part.split_once('=') else {
                return Err(Error::invalid_config(format!(
                    "malformed connection string segment '{}'",
                    part
                )));
            };
            match field.trim() {
                "AccountName" => name = Some(value.to_string()),
                "AccountKey" => key = Some(value.to_string()),
                "SharedAccessSignature" => sas = Some(value.to_string()),
                "EndpointSuffix" => suffix = Some(value.to_string()),
                _ => {}
            }
        }

        let name = name.ok_or_else(|| Error::invalid_config("connection string lacks AccountName"))?;
        let account = Self::new(name, key, sas)?;
        Ok(match suffix {
            Some(suffix) => account.endpoint_suffix(suffix),
            None => account,
        })
    }
}

impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .finish()
    }
}

/// Account names are 3 to 24 lowercase letters and digits.
fn validate_account_name(name: &str) -> Result<()> {
    let reason = if !(3..=24).contains(&name.len()) {
        "account name must be 3 to 24 characters long"
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        "account name may contain only lowercase letters and digits"
    } else {
        return Ok(());
    };
    Err(Error::InvalidCredentials {
        account: name.to_string(),
        reason,
    })
}

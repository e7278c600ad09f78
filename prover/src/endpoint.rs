use url::Url;

pub mod cli;

/// Connection settings for the node and the coin-flip contract. Built once at
/// startup and owned by the contract client afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub rpc_url: Url,
    /// Access key the node requires on every request.
    pub rpc_key: String,
    /// Address that signs and pays for contract calls.
    pub sender: String,
    pub contract: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("unsupported node url scheme `{0}`, expected http or https")]
    UrlScheme(String),
    #[error("{field} `{value}` is not a 0x-prefixed 20-byte hex address")]
    Address { field: &'static str, value: String },
    #[error("invalid signing key: {0}")]
    Key(#[from] coinflip_vrf::KeyError),
}

impl EndpointConfig {
    pub fn new(
        rpc_url: Url,
        rpc_key: String,
        sender: String,
        contract: String,
    ) -> Result<Self, ConfigError> {
        if !matches!(rpc_url.scheme(), "http" | "https") {
            return Err(ConfigError::UrlScheme(rpc_url.scheme().to_string()));
        }
        if rpc_key.trim().is_empty() {
            return Err(ConfigError::Empty("node access key"));
        }
        Ok(Self {
            rpc_url,
            rpc_key,
            sender: parse_address("sender address", sender)?,
            contract: parse_address("contract address", contract)?,
        })
    }
}

// The access key stays out of logs.
impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("sender", &self.sender)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

fn parse_address(field: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty(field));
    }
    match value.strip_prefix("0x") {
        Some(digits) if digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Ok(value.to_lowercase())
        }
        _ => Err(ConfigError::Address {
            field,
            value: value.to_string(),
        }),
    }
}

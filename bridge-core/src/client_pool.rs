use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::error::{BridgeError, Result};

/// How outbound gRPC connections authenticate the backend (§6: `--secure`/`--tls-ca`).
#[derive(Clone, Debug)]
pub enum Credentials {
    Plaintext,
    /// TLS, trusting either the given PEM-encoded CA bundle or the native
    /// trust store if none is configured.
    Tls { ca_pem: Option<Vec<u8>> },
}

/// Caches `(target, serviceFQN) -> Channel`, shared across all connections.
///
/// The lock only ever guards the cache map; channel construction happens
/// outside it, so two connections racing on the same cold key may each build
/// a channel and the loser's is simply dropped (§4.2).
pub struct ClientPool {
    credentials: Credentials,
    channels: Mutex<HashMap<(String, String), Channel>>,
}

impl ClientPool {
    pub fn new(credentials: Credentials) -> Arc<Self> {
        Arc::new(ClientPool {
            credentials,
            channels: Mutex::new(HashMap::new()),
        })
    }

    pub async fn get(&self, target: &str, service_fqn: &str) -> Result<Channel> {
        let key = (target.to_string(), service_fqn.to_string());

        {
            let cache = self.channels.lock().await;
            if let Some(channel) = cache.get(&key) {
                return Ok(channel.clone());
            }
        }

        let channel = self.build_channel(target).await?;

        let mut cache = self.channels.lock().await;
        Ok(cache.entry(key).or_insert(channel).clone())
    }

    async fn build_channel(&self, target: &str) -> Result<Channel> {
        let uri = match &self.credentials {
            Credentials::Plaintext => format!("http://{target}"),
            Credentials::Tls { .. } => format!("https://{target}"),
        };

        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid target '{target}': {e}")))?;

        if let Credentials::Tls { ca_pem } = &self.credentials {
            endpoint = endpoint
                .tls_config(build_tls_config(ca_pem.as_deref())?)
                .map_err(|e| BridgeError::Unknown(format!("invalid TLS configuration: {e}")))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| BridgeError::Unknown(format!("failed to connect to {target}: {e}")))
    }
}

fn build_tls_config(ca_pem: Option<&[u8]>) -> Result<ClientTlsConfig> {
    let mut tls = ClientTlsConfig::new();
    tls = match ca_pem {
        Some(pem) => tls.ca_certificate(Certificate::from_pem(pem)),
        None => tls.with_native_roots(),
    };
    Ok(tls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_config_with_ca_bundle_builds() {
        // `ClientTlsConfig` construction never parses the PEM eagerly —
        // validation happens at connect time, so a bogus bundle is fine here.
        let pem = b"-----BEGIN CERTIFICATE-----\nbogus\n-----END CERTIFICATE-----\n";
        let result = build_tls_config(Some(pem));
        assert!(result.is_ok());
    }

    #[test]
    fn tls_config_without_ca_bundle_uses_native_roots() {
        let result = build_tls_config(None);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn pool_rejects_malformed_target() {
        let pool = ClientPool::new(Credentials::Plaintext);
        let result = pool.get("not a valid uri \u{0}", "demo.Greeter").await;
        assert!(result.is_err());
    }
}

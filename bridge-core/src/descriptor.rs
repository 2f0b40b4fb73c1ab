use std::collections::HashSet;
use std::path::{Path, PathBuf};

use http::uri::PathAndQuery;
use prost_reflect::{DescriptorPool, MessageDescriptor};

use crate::error::{BridgeError, Result};

/// A resolved gRPC method, ready to drive a call against it.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub pkg_path: String,
    pub service_name: String,
    pub method_name: String,
    pub request_stream: bool,
    pub response_stream: bool,
    pub request_desc: MessageDescriptor,
    pub response_desc: MessageDescriptor,
    pub path: PathAndQuery,
}

/// Holds the descriptor pool compiled from the `--proto`/`--include` flags.
///
/// Built once at startup and shared read-only across all connections.
pub struct DescriptorRegistry {
    pool: DescriptorPool,
}

impl DescriptorRegistry {
    #[cfg(test)]
    pub(crate) fn from_pool(pool: DescriptorPool) -> Self {
        DescriptorRegistry { pool }
    }

    /// Compile the given proto files against the given include paths.
    ///
    /// The effective include-path list is the union of `includes`, the parent
    /// directory of every file in `protos`, and the process working
    /// directory, de-duplicated preserving first occurrence.
    pub fn load(protos: &[String], includes: &[String]) -> Result<Self> {
        if protos.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "at least one --proto file is required".into(),
            ));
        }

        let effective_includes = effective_include_paths(includes, protos);
        let fds = protox::compile(protos, &effective_includes)
            .map_err(|e| BridgeError::Proto(format!("failed to compile proto files: {e}")))?;
        let pool = DescriptorPool::from_file_descriptor_set(fds)
            .map_err(|e| BridgeError::Proto(format!("failed to build descriptor pool: {e}")))?;

        Ok(DescriptorRegistry { pool })
    }

    /// Number of distinct services visible across all loaded files, for
    /// startup logging.
    pub fn service_count(&self) -> usize {
        self.pool.services().count()
    }

    /// Number of distinct files compiled into the pool, for startup logging.
    pub fn file_count(&self) -> usize {
        self.pool.files().count()
    }

    /// Split `"pkg.sub.Service/Method"` into `(pkgPath, serviceName, methodName)`.
    pub fn parse_fq_method(method: &str) -> Result<(String, String, String)> {
        let (service_fqn, method_name) = method.split_once('/').ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "method must be in 'pkg.sub.Service/Method' form, got '{method}'"
            ))
        })?;
        if method_name.is_empty() || method_name.contains('/') {
            return Err(BridgeError::InvalidArgument(format!(
                "method must be in 'pkg.sub.Service/Method' form, got '{method}'"
            )));
        }

        let (pkg_path, service_name) = match service_fqn.rsplit_once('.') {
            Some((pkg, svc)) => (pkg.to_string(), svc.to_string()),
            None => (String::new(), service_fqn.to_string()),
        };
        Ok((pkg_path, service_name, method_name.to_string()))
    }

    /// Resolve a method descriptor, naming the missing element on failure.
    pub fn get_method_descriptor(
        &self,
        pkg_path: &str,
        service_name: &str,
        method_name: &str,
    ) -> Result<MethodDescriptor> {
        let service_fqn = if pkg_path.is_empty() {
            service_name.to_string()
        } else {
            format!("{pkg_path}.{service_name}")
        };

        let svc = self.pool.get_service_by_name(&service_fqn).ok_or_else(|| {
            if pkg_path.is_empty() || self.pool.files().any(|f| f.package_name() == pkg_path) {
                BridgeError::NotFound(format!("service not found: {service_fqn}"))
            } else {
                BridgeError::NotFound(format!("package not found: {pkg_path}"))
            }
        })?;

        let method = svc.methods().find(|m| m.name() == method_name).ok_or_else(|| {
            BridgeError::NotFound(format!("method not found: {service_fqn}/{method_name}"))
        })?;

        let path = PathAndQuery::try_from(format!("/{service_fqn}/{method_name}"))
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid method path: {e}")))?;

        Ok(MethodDescriptor {
            pkg_path: pkg_path.to_string(),
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
            request_stream: method.is_client_streaming(),
            response_stream: method.is_server_streaming(),
            request_desc: method.input(),
            response_desc: method.output(),
            path,
        })
    }
}

/// Union of user include dirs, the parent directory of every proto file, and
/// the process working directory, de-duplicated preserving first occurrence.
fn effective_include_paths(includes: &[String], protos: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |p: String| {
        if seen.insert(p.clone()) {
            out.push(p);
        }
    };

    for dir in includes {
        push(dir.clone());
    }
    for proto in protos {
        let parent = Path::new(proto)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        push(parent.to_string_lossy().into_owned());
    }
    if let Ok(cwd) = std::env::current_dir() {
        push(cwd.to_string_lossy().into_owned());
    } else {
        push(".".to_string());
    }

    out
}

#[allow(dead_code)]
fn as_path(s: &str) -> PathBuf {
    PathBuf::from(s)
}

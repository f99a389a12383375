//! Service registry with async handlers
//!
//! Entity domains register their services here (e.g. `fan.set_speed`).
//! Callers await the handler, so every call is blocking in the platform
//! sense: state written by the handler is visible once `call` returns.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall, SupportsResponse};
use jsonschema::JSONSchema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("invalid service schema for {0}: {1}")]
    InvalidSchema(String, String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    pub description: Option<String>,
    /// JSON schema the service data must satisfy
    pub schema: Option<serde_json::Value>,
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// Description with no schema and no response
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            supports_response: SupportsResponse::None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn key(&self) -> String {
        service_key(&self.domain, &self.service)
    }

    /// Check service data against the schema, if there is one
    fn validate(&self, data: &serde_json::Value) -> Result<(), ServiceError> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };

        let compiled = JSONSchema::compile(schema)
            .map_err(|e| ServiceError::InvalidSchema(self.key(), e.to_string()))?;

        if let Err(errors) = compiled.validate(data) {
            let message = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ServiceError::InvalidData(message));
        }
        Ok(())
    }
}

fn service_key(domain: &str, service: &str) -> String {
    format!("{}.{}", domain, service)
}

struct RegisteredService {
    handler: ServiceHandler,
    description: ServiceDescription,
}

/// All registered services, keyed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service, replacing any previous registration
    #[instrument(skip(self, handler), fields(service = %description.key()))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            description.key(),
            RegisteredService {
                handler,
                description,
            },
        );
    }

    /// Call a service and wait for its handler
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let (handler, description) = {
            let registered = self
                .services
                .get(&service_key(domain, service))
                .ok_or_else(|| {
                    warn!("Service not found");
                    ServiceError::NotFound {
                        domain: domain.to_string(),
                        service: service.to_string(),
                    }
                })?;
            (registered.handler.clone(), registered.description.clone())
        };

        if return_response && description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        description.validate(&service_data)?;

        debug!("Calling service");
        let result = handler(ServiceCall::new(domain, service, service_data, context)).await?;

        Ok(if return_response { result } else { None })
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&service_key(domain, service))
    }

    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&service_key(domain, service))
            .map(|s| s.description.clone())
    }

    /// Descriptions of a domain's services, sorted by service name
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect();
        services.sort_by(|a, b| a.service.cmp(&b.service));
        services
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&service_key(domain, service))
            .is_some();
        if removed {
            debug!("Unregistered service");
        }
        removed
    }

    /// Unregister all services of a domain, returning how many were removed
    #[instrument(skip(self))]
    pub fn unregister_domain(&self, domain: &str) -> usize {
        let before = self.services.len();
        self.services.retain(|_, s| s.description.domain != domain);
        let count = before - self.services.len();
        debug!(count, "Unregistered domain services");
        count
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;

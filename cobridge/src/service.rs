//! Verb service.
//!
//! `Service` ties the request compiler, the batch codec, the subscription
//! registry and the poll scheduler to one backend and serves the four
//! verbs of the API:
//!
//! | verb   | argument                                   | reply             |
//! |--------|--------------------------------------------|-------------------|
//! | `get`  | description tree                           | array of values   |
//! | `add`  | `name`, `periodms` and a description tree  | none (subscribed) |
//! | `rem`  | `{"name": ..}` or a bare string            | none              |
//! | `info` | none                                       | introspection     |
//!
//! It is built explicitly at startup and shared by `Arc`; there is no
//! global state.

use crate::backend_registry::BackendRegistry;
use crate::batch::{JsonArray, pair};
use crate::compiler::compile;
use crate::error::ServiceError;
use crate::registry::{EventPayload, SubscriptionHandle, SubscriptionInfo, SubscriptionRegistry};
use crate::scheduler::PollScheduler;
use cobridge_common::config::ServiceConfig;
use cobridge_common::consts::{XCHG_GET_VERB, XCHG_SERVICE_NAME};
use cobridge_common::xchg::{BackendDiagnostics, BackendError, RegisterBackend};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Outcome of a dispatched verb.
#[derive(Debug)]
pub struct Response {
    /// 0 on success, otherwise the negative code of the error kind.
    pub status: i32,
    /// Reply payload, if the verb produces one.
    pub payload: Option<Value>,
    /// Subscription created by `add`, carrying the caller's listener.
    pub events: Option<SubscriptionHandle>,
    /// Error text on failure.
    pub error: Option<String>,
}

impl Response {
    fn ok(payload: Option<Value>, events: Option<SubscriptionHandle>) -> Self {
        Self {
            status: 0,
            payload,
            events,
            error: None,
        }
    }

    fn failed(error: &ServiceError) -> Self {
        Self {
            status: error.status(),
            payload: None,
            events: None,
            error: Some(error.to_string()),
        }
    }

    /// True when the verb succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Register polling service.
pub struct Service {
    /// API name reported by `info`
    api_name: String,
    /// Register exchange backend
    backend: Arc<dyn RegisterBackend>,
    /// Live subscriptions
    registry: Arc<SubscriptionRegistry>,
    /// Timer driver for subscriptions
    scheduler: PollScheduler,
}

impl Service {
    /// Create a service around an initialized backend.
    pub fn new(config: &ServiceConfig, backend: Arc<dyn RegisterBackend>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(config.events.channel_capacity));
        let scheduler = PollScheduler::new(Arc::clone(&backend), Arc::clone(&registry));
        info!(
            "Service '{}' created on backend '{}' v{}",
            config.shared.service_name,
            backend.name(),
            backend.version()
        );
        Self {
            api_name: config.shared.service_name.clone(),
            backend,
            registry,
            scheduler,
        }
    }

    /// Validate `config`, create its backend from `backends` and build the service.
    ///
    /// # Errors
    /// Returns `BackendError::ConfigError` for an invalid configuration, or
    /// the error of backend creation or initialization.
    pub fn from_config(config: &ServiceConfig, backends: &BackendRegistry) -> Result<Self, BackendError> {
        config
            .validate()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;
        let backend = backends.init_backend(&config.backend)?;
        Ok(Self::new(config, Arc::from(backend)))
    }

    /// Read every register of `description` once.
    ///
    /// # Errors
    /// - `InvalidDescription` if the description does not compile
    /// - `ResourceExhausted` if buffers cannot be allocated
    /// - `BackendFailure` if the exchange fails
    pub async fn get(&self, description: &Value) -> Result<JsonArray, ServiceError> {
        let mut buffers = pair(compile(description)?)?;
        debug!(
            "get: {} requests to {}/{}",
            buffers.requests.len(),
            XCHG_SERVICE_NAME,
            XCHG_GET_VERB
        );
        if let Err(e) = self
            .backend
            .exchange(&buffers.requests, &mut buffers.results)
            .await
        {
            warn!("get failed: {}", e);
            return Err(e.into());
        }
        Ok(buffers.render()?)
    }

    /// Create a periodic subscription and start its timer.
    ///
    /// `args` must carry a non-empty string `name` and a positive integer
    /// `periodms`. The register description is `args` itself; `name`,
    /// `periodms` and any other unrecognized key are ignored by the
    /// compiler. Nothing is registered unless every step succeeds.
    ///
    /// # Errors
    /// - `InvalidDescription` for bad arguments or a bad description
    /// - `DuplicateName` if `name` is in use
    /// - `ResourceExhausted` if buffers cannot be allocated
    /// - `Internal` if no runtime can host the timer
    pub fn add(&self, args: &Value) -> Result<SubscriptionHandle, ServiceError> {
        let (name, period) = subscription_args(args)?;
        let buffers = pair(compile(args)?)?;
        let handle = self.registry.create(name, buffers, period)?;

        if let Err(e) = self.scheduler.arm(&handle) {
            if !self.registry.remove_handle(&handle) {
                debug!("add rollback of '{}': already replaced", name);
            }
            return Err(ServiceError::Internal(e.to_string()));
        }
        Ok(handle)
    }

    /// Remove a subscription.
    ///
    /// # Errors
    /// - `InvalidDescription` if no name can be extracted from `args`
    /// - `NotFound` if no subscription has that name
    pub fn rem(&self, args: &Value) -> Result<(), ServiceError> {
        let name = match args {
            Value::String(name) => name.as_str(),
            Value::Object(map) => map.get("name").and_then(Value::as_str).ok_or_else(|| {
                ServiceError::InvalidDescription("rem requires a string 'name'".to_string())
            })?,
            other => {
                return Err(ServiceError::InvalidDescription(format!(
                    "rem expects a name, got {other}"
                )));
            }
        };
        Ok(self.registry.remove(name)?)
    }

    /// Attach an extra listener to a live subscription.
    pub fn subscribe(&self, name: &str) -> Result<broadcast::Receiver<EventPayload>, ServiceError> {
        Ok(self.registry.subscribe(name)?)
    }

    /// Static description of the API.
    pub fn info(&self) -> Value {
        json!({
            "metadata": {
                "uid": self.api_name,
                "info": "CANopen register polling bridge",
                "version": env!("CARGO_PKG_VERSION"),
                "requires": XCHG_SERVICE_NAME,
            },
            "verbs": [
                {
                    "uid": "info",
                    "info": "describe the API",
                },
                {
                    "uid": "get",
                    "info": "read registers once",
                    "sample": [
                        {"itf": 0, "id": 1, "reg": "0x6041", "subreg": 0, "type": "u16"},
                        {"itf": 0, "id": 1, "subreg": 0, "type": "i32",
                         "items": [{"reg": "0x6064"}, {"reg": "0x606c"}]},
                    ],
                },
                {
                    "uid": "add",
                    "info": "poll registers periodically and push them on the event 'name'",
                    "sample": {"name": "status", "periodms": 100,
                               "itf": 0, "id": 1, "reg": "0x6041", "subreg": 0, "type": "u16"},
                },
                {
                    "uid": "rem",
                    "info": "stop a periodic poll",
                    "sample": {"name": "status"},
                },
            ],
        })
    }

    /// Dispatch `verb` with its argument.
    pub async fn call(&self, verb: &str, args: &Value) -> Response {
        let result = match verb {
            "get" => self.get(args).await.and_then(|values| {
                values
                    .to_value()
                    .map(|payload| Response::ok(Some(payload), None))
                    .map_err(|e| ServiceError::Internal(e.to_string()))
            }),
            "add" => self.add(args).map(|handle| Response::ok(None, Some(handle))),
            "rem" => self.rem(args).map(|()| Response::ok(None, None)),
            "info" => Ok(Response::ok(Some(self.info()), None)),
            other => Err(ServiceError::UnknownVerb(other.to_string())),
        };

        result.unwrap_or_else(|e| {
            debug!("{} failed with status {}: {}", verb, e.status(), e);
            Response::failed(&e)
        })
    }

    /// Summaries of the live subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.list()
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Backend diagnostics, if it keeps any.
    pub fn diagnostics(&self) -> Option<BackendDiagnostics> {
        self.backend.diagnostics()
    }

    /// Remove every subscription and shut the backend down.
    ///
    /// # Errors
    /// Returns `BackendFailure` if the backend fails to shut down.
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        let removed = self.registry.remove_all();
        info!("Shutdown: released {} subscriptions", removed);
        self.backend.shutdown()?;
        Ok(())
    }
}

fn subscription_args(args: &Value) -> Result<(&str, Duration), ServiceError> {
    let Value::Object(map) = args else {
        return Err(ServiceError::InvalidDescription(
            "add expects an object".to_string(),
        ));
    };
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ServiceError::InvalidDescription("add requires a non-empty string 'name'".to_string())
        })?;
    let period_ms = map
        .get("periodms")
        .and_then(Value::as_i64)
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            ServiceError::InvalidDescription(
                "add requires a positive integer 'periodms'".to_string(),
            )
        })?;
    Ok((name, Duration::from_millis(period_ms.unsigned_abs())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimulationBackend;

    fn service() -> Service {
        Service::new(&ServiceConfig::default(), Arc::new(SimulationBackend::new()))
    }

    #[test]
    fn subscription_args_are_checked() {
        assert!(subscription_args(&json!({"name": "a", "periodms": 10})).is_ok());
        for bad in [
            json!([]),
            json!({"periodms": 10}),
            json!({"name": "", "periodms": 10}),
            json!({"name": 3, "periodms": 10}),
            json!({"name": "a"}),
            json!({"name": "a", "periodms": 0}),
            json!({"name": "a", "periodms": -5}),
            json!({"name": "a", "periodms": "100"}),
            json!({"name": "a", "periodms": 1.5}),
        ] {
            assert!(
                matches!(subscription_args(&bad), Err(ServiceError::InvalidDescription(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn rem_argument_shapes() {
        let service = service();
        assert_eq!(
            service.rem(&json!("ghost")),
            Err(ServiceError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            service.rem(&json!({"name": "ghost"})),
            Err(ServiceError::NotFound("ghost".to_string()))
        );
        assert!(matches!(
            service.rem(&json!({"name": 1})),
            Err(ServiceError::InvalidDescription(_))
        ));
        assert!(matches!(
            service.rem(&json!(12)),
            Err(ServiceError::InvalidDescription(_))
        ));
    }

    #[test]
    fn info_lists_every_verb() {
        let info = service().info();
        assert_eq!(info["metadata"]["uid"], "demexco");
        let verbs: Vec<&str> = info["verbs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["uid"].as_str().unwrap())
            .collect();
        assert_eq!(verbs, vec!["info", "get", "add", "rem"]);
    }

    #[tokio::test]
    async fn unknown_verb_has_its_own_status() {
        let response = service().call("set", &Value::Null).await;
        assert_eq!(response.status, -38);
        assert!(response.payload.is_none());
        assert!(response.error.unwrap().contains("set"));
    }

    #[tokio::test]
    async fn add_compiles_its_own_fields() {
        let service = service();
        let handle = service
            .add(&json!({
                "name": "flat",
                "periodms": 1000,
                "get": true,
                "itf": 0, "id": 1, "reg": 1, "subreg": 0, "type": "u8"
            }))
            .unwrap();
        assert_eq!(handle.name(), "flat");
        assert_eq!(service.subscriptions()[0].requests, 1);

        // A nested `get` object is not a description source.
        let handle = service
            .add(&json!({
                "name": "shadowed",
                "periodms": 1000,
                "get": {"itf": 9, "id": 9, "items": [{"reg": 1}, {"reg": 2}], "subreg": 0, "type": "u8"},
                "itf": 0, "id": 1, "reg": 1, "subreg": 0, "type": "u8"
            }))
            .unwrap();
        assert_eq!(handle.name(), "shadowed");
        let subs = service.subscriptions();
        assert_eq!(subs.iter().find(|s| s.name == "shadowed").unwrap().requests, 1);

        let err = service
            .add(&json!({
                "name": "bare",
                "periodms": 1000,
                "get": {"itf": 0, "id": 1, "reg": 1, "subreg": 0, "type": "u8"}
            }))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidDescription(_)));

        service.shutdown().unwrap();
        assert!(service.subscriptions().is_empty());
    }

    #[test]
    fn add_outside_a_runtime_leaves_nothing_behind() {
        let service = service();
        let err = service
            .add(&json!({
                "name": "orphan",
                "periodms": 100,
                "itf": 0, "id": 1, "reg": 1, "subreg": 0, "type": "u8"
            }))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(err.status(), -14);
        assert!(service.subscriptions().is_empty());
    }
}

//! Supervisor
//!
//! Owns the store, the admission service and the scheduler worker for one
//! process. The worker is a value started at boot and stopped on shutdown
//! through its cancellation flag; nothing relies on module-level
//! initialisation. With `Config::testing` set the worker is not started and
//! tests drive scheduler ticks themselves.

use crate::config::Config;
use crate::scheduler::SchedulerWorker;
use crate::service::AdmissionService;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;

/// Process-level owner of the core components
pub struct Supervisor {
    config: Config,
    store: Arc<Store>,
    service: AdmissionService,
    worker: Option<SchedulerWorker>,
}

impl Supervisor {
    /// Build the store and service, and start the scheduler worker unless
    /// the configuration asks for a quiescent (testing) boot
    pub fn boot(config: Config) -> Self {
        let store = Arc::new(Store::new());
        let service = AdmissionService::new(Arc::clone(&store));
        let worker = if config.testing {
            info!("testing mode: scheduler worker not started");
            None
        } else {
            Some(SchedulerWorker::start(
                Arc::clone(&store),
                config.scheduler_interval,
            ))
        };

        Self {
            config,
            store,
            service,
            worker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn service(&self) -> &AdmissionService {
        &self.service
    }

    /// Stop the scheduler worker (if running) and drop the components
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        info!("supervisor shut down");
    }
}

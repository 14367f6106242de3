use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub workflow_transitions_total: IntCounterVec,
    pub auth_attempts_total: IntCounterVec,
    pub snapshot_writes_total: IntCounterVec,
    pub vehicles_by_status: IntGaugeVec,
    pub drivers_by_status: IntGaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let workflow_transitions_total = IntCounterVec::new(
            Opts::new(
                "workflow_transitions_total",
                "Trip and maintenance transitions by kind and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid workflow_transitions_total metric");

        let auth_attempts_total = IntCounterVec::new(
            Opts::new("auth_attempts_total", "Register and login attempts by outcome"),
            &["action", "outcome"],
        )
        .expect("valid auth_attempts_total metric");

        let snapshot_writes_total = IntCounterVec::new(
            Opts::new("snapshot_writes_total", "State snapshot writes by outcome"),
            &["outcome"],
        )
        .expect("valid snapshot_writes_total metric");

        let vehicles_by_status = IntGaugeVec::new(
            Opts::new("vehicles_by_status", "Number of vehicles per status"),
            &["status"],
        )
        .expect("valid vehicles_by_status metric");

        let drivers_by_status = IntGaugeVec::new(
            Opts::new("drivers_by_status", "Number of drivers per status"),
            &["status"],
        )
        .expect("valid drivers_by_status metric");

        registry
            .register(Box::new(workflow_transitions_total.clone()))
            .expect("register workflow_transitions_total");
        registry
            .register(Box::new(auth_attempts_total.clone()))
            .expect("register auth_attempts_total");
        registry
            .register(Box::new(snapshot_writes_total.clone()))
            .expect("register snapshot_writes_total");
        registry
            .register(Box::new(vehicles_by_status.clone()))
            .expect("register vehicles_by_status");
        registry
            .register(Box::new(drivers_by_status.clone()))
            .expect("register drivers_by_status");

        Self {
            registry,
            workflow_transitions_total,
            auth_attempts_total,
            snapshot_writes_total,
            vehicles_by_status,
            drivers_by_status,
        }
    }

    pub fn record_transition(&self, transition: &str, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "rejected" };
        self.workflow_transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
    }

    pub fn record_auth(&self, action: &str, succeeded: bool) {
        let outcome = if succeeded { "success" } else { "failure" };
        self.auth_attempts_total
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

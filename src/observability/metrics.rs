use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_updates_total: IntCounter,
    pub couriers_tracked: IntGauge,
    pub chat_room_members: IntGauge,
    pub chat_sends_total: IntCounterVec,
    pub relay_latency_seconds: HistogramVec,
    pub chat_purges_total: IntCounterVec,
    pub chat_purges_pending: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_updates_total =
            IntCounter::new("location_updates_total", "Total courier location updates")
                .expect("valid location_updates_total metric");

        let couriers_tracked = IntGauge::new(
            "couriers_tracked",
            "Couriers with a live location entry",
        )
        .expect("valid couriers_tracked metric");

        let chat_room_members = IntGauge::new(
            "chat_room_members",
            "Open websocket connections across all chat rooms",
        )
        .expect("valid chat_room_members metric");

        let chat_sends_total = IntCounterVec::new(
            Opts::new("chat_sends_total", "Chat sends by outcome"),
            &["outcome"],
        )
        .expect("valid chat_sends_total metric");

        let relay_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_latency_seconds",
                "Latency of broker publish calls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid relay_latency_seconds metric");

        let chat_purges_total = IntCounterVec::new(
            Opts::new("chat_purges_total", "Scheduled chat purges by outcome"),
            &["outcome"],
        )
        .expect("valid chat_purges_total metric");

        let chat_purges_pending =
            IntGauge::new("chat_purges_pending", "Chat purges armed and waiting")
                .expect("valid chat_purges_pending metric");

        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(couriers_tracked.clone()))
            .expect("register couriers_tracked");
        registry
            .register(Box::new(chat_room_members.clone()))
            .expect("register chat_room_members");
        registry
            .register(Box::new(chat_sends_total.clone()))
            .expect("register chat_sends_total");
        registry
            .register(Box::new(relay_latency_seconds.clone()))
            .expect("register relay_latency_seconds");
        registry
            .register(Box::new(chat_purges_total.clone()))
            .expect("register chat_purges_total");
        registry
            .register(Box::new(chat_purges_pending.clone()))
            .expect("register chat_purges_pending");

        Self {
            registry,
            location_updates_total,
            couriers_tracked,
            chat_room_members,
            chat_sends_total,
            relay_latency_seconds,
            chat_purges_total,
            chat_purges_pending,
        }
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

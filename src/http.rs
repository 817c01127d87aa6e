//! Scrape endpoint and operator HTTP surface.
//!
//! `GET /metrics` renders a coherent snapshot of the sample cache in the
//! Prometheus text exposition (label values quoted, timestamps in
//! milliseconds). `POST /telemetry-device` provisions a device in the KV
//! store. `GET /` serves a short informational page.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use log::{debug, error, info};
use prometheus::proto::{self, MetricType};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::cache::{Sample, SampleCache, SampleKind};
use crate::kvstore::KvStore;

const WELCOME_PAGE: &str = r#"<html>
<head><title>Cisco MDT Telemetry Collector</title></head>
<body>
<h1>Cisco MDT Telemetry Collector</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>"#;

pub async fn serve(
    addr: SocketAddr,
    cache: Arc<SampleCache>,
    kv: KvStore,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("scrape endpoint listening on {addr}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let cache = Arc::clone(&cache);
                let kv = kv.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let cache = Arc::clone(&cache);
                        let kv = kv.clone();
                        async move { route(req, cache, kv).await }
                    });

                    if let Err(err) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("error serving scrape connection: {err:?}");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("scrape endpoint draining");
                return Ok(());
            }
        }
    }
}

async fn route(
    req: Request<Incoming>,
    cache: Arc<SampleCache>,
    kv: KvStore,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match render_exposition(cache.snapshot()) {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .unwrap(),
            Err(e) => {
                error!("failed to render metrics exposition: {e}");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from("error gathering metrics")))
                    .unwrap()
            }
        },
        (&Method::GET, "/") => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .body(Full::new(Bytes::from(WELCOME_PAGE)))
            .unwrap(),
        (&Method::POST, "/telemetry-device") => register_device(req, kv).await,
        (_, "/telemetry-device") => status_only(StatusCode::BAD_REQUEST),
        _ => status_only(StatusCode::NOT_FOUND),
    };

    Ok(response)
}

#[derive(Debug, Deserialize)]
struct DeviceRegistration {
    #[serde(rename = "ipAddress")]
    ip_address: String,
    hostname: String,
}

async fn register_device(req: Request<Incoming>, kv: KvStore) -> Response<Full<Bytes>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read telemetry-device request body: {e}");
            return status_only(StatusCode::BAD_REQUEST);
        }
    };

    let registration: DeviceRegistration = match serde_json::from_slice(&body) {
        Ok(registration) => registration,
        Err(e) => {
            error!("unable to decode telemetry-device JSON payload: {e}");
            return status_only(StatusCode::BAD_REQUEST);
        }
    };

    let Ok(ip) = registration.ip_address.parse::<IpAddr>() else {
        error!(
            "unable to validate IP address {} for new telemetry device",
            registration.ip_address
        );
        return status_only(StatusCode::BAD_REQUEST);
    };

    if registration.hostname.is_empty() {
        return status_only(StatusCode::BAD_REQUEST);
    }

    if let Err(e) = kv.register_host(&ip.to_string(), &registration.hostname).await {
        error!("unable to create host in the kv store: {e}");
        return status_only(StatusCode::BAD_REQUEST);
    }

    Response::builder()
        .status(StatusCode::CREATED)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Groups the snapshot into metric families and renders the text
/// exposition with per-sample timestamps.
fn render_exposition(samples: Vec<Sample>) -> Result<String> {
    let mut grouped: BTreeMap<&'static str, Vec<&Sample>> = BTreeMap::new();
    for sample in &samples {
        grouped.entry(sample.desc.name).or_default().push(sample);
    }

    let mut families = Vec::with_capacity(grouped.len());
    for (name, group) in grouped {
        let desc = group[0].desc;
        let kind = group[0].kind;

        let mut family = proto::MetricFamily::default();
        family.set_name(name.to_string());
        family.set_help(desc.help.to_string());
        family.set_field_type(match kind {
            SampleKind::Gauge => MetricType::GAUGE,
            SampleKind::Counter => MetricType::COUNTER,
        });

        for sample in group {
            let mut metric = proto::Metric::default();

            for (label_name, label_value) in desc.labels.iter().zip(&sample.labels) {
                let mut pair = proto::LabelPair::default();
                pair.set_name((*label_name).to_string());
                pair.set_value(label_value.clone());
                metric.mut_label().push(pair);
            }

            match sample.kind {
                SampleKind::Gauge => {
                    let mut gauge = proto::Gauge::default();
                    gauge.set_value(sample.value);
                    metric.set_gauge(gauge);
                }
                SampleKind::Counter => {
                    let mut counter = proto::Counter::default();
                    counter.set_value(sample.value);
                    metric.set_counter(counter);
                }
            }

            metric.set_timestamp_ms(sample.timestamp_ms);
            family.mut_metric().push(metric);
        }

        families.push(family);
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Descriptor, SourceKey};

    static CPU_5_SEC: Descriptor = Descriptor {
        name: "cisco_iosxe_iosd_cpu_busy_5_sec_percentage",
        help: "The IOSd daemon CPU busy percentage over the last 5 seconds",
        labels: &["node"],
    };

    static IF_IN_OCTETS: Descriptor = Descriptor {
        name: "cisco_iosxe_if_stats_in_octets",
        help: "The number of inbound octets processed by the interface",
        labels: &["node", "interface"],
    };

    #[test]
    fn exposition_carries_labels_and_timestamps() {
        let cache = SampleCache::new();
        let bucket = cache.install(SourceKey::new("10.0.0.1", "cpu"));
        bucket.record(
            &CPU_5_SEC,
            SampleKind::Gauge,
            7.0,
            vec!["10.0.0.1".to_string()],
            1_700_000_000_000,
        );

        let body = render_exposition(cache.snapshot()).unwrap();
        assert!(body.contains("# TYPE cisco_iosxe_iosd_cpu_busy_5_sec_percentage gauge"));
        assert!(body.contains(
            "cisco_iosxe_iosd_cpu_busy_5_sec_percentage{node=\"10.0.0.1\"} 7 1700000000000"
        ));
    }

    #[test]
    fn counters_render_with_their_type() {
        let cache = SampleCache::new();
        let bucket = cache.install(SourceKey::new("10.0.0.1", "if"));
        bucket.record(
            &IF_IN_OCTETS,
            SampleKind::Counter,
            1000.0,
            vec!["10.0.0.1".to_string(), "GigabitEthernet1".to_string()],
            1_700_000_000_000,
        );
        bucket.record(
            &IF_IN_OCTETS,
            SampleKind::Counter,
            2000.0,
            vec!["10.0.0.1".to_string(), "GigabitEthernet2".to_string()],
            1_700_000_000_000,
        );

        let body = render_exposition(cache.snapshot()).unwrap();
        assert!(body.contains("# TYPE cisco_iosxe_if_stats_in_octets counter"));
        assert!(body.contains(
            "cisco_iosxe_if_stats_in_octets{node=\"10.0.0.1\",interface=\"GigabitEthernet1\"} 1000 1700000000000"
        ));
        assert!(body.contains("GigabitEthernet2"));
    }

    #[test]
    fn empty_cache_renders_empty_exposition() {
        assert_eq!(render_exposition(Vec::new()).unwrap(), "");
    }
}

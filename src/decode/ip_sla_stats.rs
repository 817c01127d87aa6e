//! IP SLA operational statistics decoder.
//!
//! All probe types report RTT, success/failure counts, the latest return
//! code and operation time. UDP jitter probes add one-way latency, jitter
//! and packet-loss breakdowns per direction; HTTP probes add status,
//! lookup/transaction timings and error counters.

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::{ip_sla_return_code, rfc3339_to_epoch};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, DecodeContext};
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-ip-sla-oper:ip-sla-stats/sla-oper-entry";

const TYPE_UDP_JITTER: &str = "oper-type-udp-jitter";
const TYPE_HTTP: &str = "oper-type-http";

const SLA_LABELS: &[&str] = &["node", "sla_entry_id", "sla_type"];

static PROBE_RTT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_rtt_msec",
    help: "The IP SLA probe reported Round Trip Time in milliseconds",
    labels: SLA_LABELS,
};

static PROBE_FAILURE_COUNT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_failure_count",
    help: "The IP SLA probe failure count",
    labels: SLA_LABELS,
};

static PROBE_SUCCESS_COUNT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_success_count",
    help: "The IP SLA probe success count",
    labels: SLA_LABELS,
};

static PROBE_LATEST_RETURN_CODE: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_latest_return_code",
    help: "The IP SLA Latest Return Code",
    labels: SLA_LABELS,
};

static PROBE_LATEST_OPER_TIME: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_latest_operation_time_epoch",
    help: "The IP SLA Latest Operation start in epoch time",
    labels: SLA_LABELS,
};

static PACKET_LOSS_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_packet_loss_sd",
    help: "The IP SLA probe packet loss source to destination",
    labels: SLA_LABELS,
};

static PACKET_LOSS_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_packet_loss_ds",
    help: "The IP SLA probe packet loss destination to source",
    labels: SLA_LABELS,
};

static LATENCY_MIN_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_min_latency_sd_msec",
    help: "The IP SLA probe minimum one way latency source to destination in milliseconds",
    labels: SLA_LABELS,
};

static LATENCY_MIN_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_min_latency_ds_msec",
    help: "The IP SLA probe minimum one way latency destination to source in milliseconds",
    labels: SLA_LABELS,
};

static LATENCY_AVG_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_avg_latency_sd_msec",
    help: "The IP SLA probe average one way latency source to destination in milliseconds",
    labels: SLA_LABELS,
};

static LATENCY_AVG_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_avg_latency_ds_msec",
    help: "The IP SLA probe average one way latency destination to source in milliseconds",
    labels: SLA_LABELS,
};

static LATENCY_MAX_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_max_latency_sd_msec",
    help: "The IP SLA probe maximum one way latency source to destination in milliseconds",
    labels: SLA_LABELS,
};

static LATENCY_MAX_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_max_latency_ds_msec",
    help: "The IP SLA probe maximum one way latency destination to source in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_MIN_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_min_jitter_sd_msec",
    help: "The IP SLA probe minimum jitter source to destination in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_MIN_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_min_jitter_ds_msec",
    help: "The IP SLA probe minimum jitter destination to source in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_AVG_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_avg_jitter_sd_msec",
    help: "The IP SLA probe average jitter source to destination in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_AVG_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_avg_jitter_ds_msec",
    help: "The IP SLA probe average jitter destination to source in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_MAX_SD: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_max_jitter_sd_msec",
    help: "The IP SLA probe maximum jitter source to destination in milliseconds",
    labels: SLA_LABELS,
};

static JITTER_MAX_DS: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_max_jitter_ds_msec",
    help: "The IP SLA probe maximum jitter destination to source in milliseconds",
    labels: SLA_LABELS,
};

static HTTP_STATUS_CODE: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_status_code",
    help: "The HTTP IP SLA probe Status Code",
    labels: SLA_LABELS,
};

static HTTP_TRANSACTION_RTT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_transaction_rtt_msec",
    help: "The HTTP IP SLA probe Transaction Round Trip Time in milliseconds",
    labels: SLA_LABELS,
};

static HTTP_DNS_RTT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_dns_rtt_msec",
    help: "The HTTP IP SLA probe DNS lookup Round Trip Time in milliseconds",
    labels: SLA_LABELS,
};

static HTTP_TRANSACTION_ERROR: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_transaction_error",
    help: "The HTTP IP SLA probe number of HTTP transaction errors occurred",
    labels: SLA_LABELS,
};

static HTTP_TCP_ERROR: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_tcp_error",
    help: "The HTTP IP SLA probe number of TCP errors occurred",
    labels: SLA_LABELS,
};

static HTTP_DNS_ERROR: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_dns_error",
    help: "The HTTP IP SLA probe number of DNS errors occurred",
    labels: SLA_LABELS,
};

static HTTP_TRANSACTION_TIMEOUT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_transaction_timeout",
    help: "The HTTP IP SLA probe number of HTTP transaction timeout occurred",
    labels: SLA_LABELS,
};

static HTTP_TCP_TIMEOUT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_tcp_timeout",
    help: "The HTTP IP SLA probe number of TCP timeout occurred",
    labels: SLA_LABELS,
};

static HTTP_DNS_TIMEOUT: Descriptor = Descriptor {
    name: "cisco_iosxe_ip_sla_probe_http_dns_timeout",
    help: "The HTTP IP SLA probe number of DNS timeout occurred",
    labels: SLA_LABELS,
};

/// Label context shared by every sample of one SLA entry.
struct SlaProbe<'a> {
    bucket: &'a Bucket,
    node: &'a str,
    entry_id: String,
    sla_type: String,
    timestamp_ms: i64,
}

impl SlaProbe<'_> {
    fn labels(&self) -> Vec<String> {
        vec![
            self.node.to_string(),
            self.entry_id.clone(),
            self.sla_type.clone(),
        ]
    }

    fn sample(&self, desc: &'static Descriptor, kind: SampleKind, value: f64) {
        self.bucket
            .record(desc, kind, value, self.labels(), self.timestamp_ms);
    }

    fn numeric(&self, desc: &'static Descriptor, kind: SampleKind, field: &TelemetryField) {
        let Some(value) = leaf_f64(field) else {
            warn!(
                "IP SLA leaf {} for entry {} from {} is not numeric",
                field.name, self.entry_id, self.node
            );
            return;
        };
        self.sample(desc, kind, value);
    }
}

pub(crate) fn handle(ctx: DecodeContext) {
    record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) {
    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("IP SLA oper entry from {node} has unexpected shape");
            continue;
        };

        let Some(entry_id) = key
            .fields
            .first()
            .filter(|f| f.name == "oper-id")
            .and_then(leaf_f64)
        else {
            warn!("IP SLA oper entry from {node} carries no oper-id key");
            continue;
        };

        let mut probe = SlaProbe {
            bucket,
            node,
            entry_id: (entry_id as i64).to_string(),
            sla_type: String::new(),
            timestamp_ms,
        };

        for field in &content.fields {
            match field.name.as_str() {
                "oper-type" => {
                    probe.sla_type = leaf_string(field).unwrap_or_default();
                }
                "latest-return-code" => {
                    let Some(code) = leaf_string(field) else {
                        continue;
                    };
                    if let Some(value) = ip_sla_return_code(&code) {
                        probe.sample(&PROBE_LATEST_RETURN_CODE, SampleKind::Gauge, value);
                    }
                }
                "latest-oper-start-time" => {
                    match leaf_string(field).as_deref().and_then(rfc3339_to_epoch) {
                        Some(epoch) => probe.sample(
                            &PROBE_LATEST_OPER_TIME,
                            SampleKind::Gauge,
                            epoch as f64,
                        ),
                        None => warn!(
                            "IP SLA entry {} from {node} has unparsable start time",
                            probe.entry_id
                        ),
                    }
                }
                "success-count" => {
                    probe.numeric(&PROBE_SUCCESS_COUNT, SampleKind::Counter, field)
                }
                "failure-count" => {
                    probe.numeric(&PROBE_FAILURE_COUNT, SampleKind::Counter, field)
                }
                "rtt-info" => record_rtt(&probe, &field.fields),
                "stats" => record_stats(&probe, &field.fields),
                _ => {}
            }
        }
    }
}

fn record_rtt(probe: &SlaProbe<'_>, fields: &[TelemetryField]) {
    for measure in fields {
        if measure.name != "latest-rtt" {
            continue;
        }
        for value in &measure.fields {
            if value.name == "rtt" {
                probe.numeric(&PROBE_RTT, SampleKind::Gauge, value);
            }
        }
    }
}

fn record_stats(probe: &SlaProbe<'_>, fields: &[TelemetryField]) {
    for stat in fields {
        if probe.sla_type == TYPE_UDP_JITTER {
            match stat.name.as_str() {
                "oneway-latency" => record_min_avg_max(
                    probe,
                    &stat.fields,
                    [&LATENCY_MIN_SD, &LATENCY_AVG_SD, &LATENCY_MAX_SD],
                    [&LATENCY_MIN_DS, &LATENCY_AVG_DS, &LATENCY_MAX_DS],
                ),
                "jitter" => record_min_avg_max(
                    probe,
                    &stat.fields,
                    [&JITTER_MIN_SD, &JITTER_AVG_SD, &JITTER_MAX_SD],
                    [&JITTER_MIN_DS, &JITTER_AVG_DS, &JITTER_MAX_DS],
                ),
                "packet-loss" => record_packet_loss(probe, &stat.fields),
                _ => {}
            }
        }

        if probe.sla_type == TYPE_HTTP && stat.name == "http-specific-stats" {
            record_http_stats(probe, &stat.fields);
        }
    }
}

fn record_min_avg_max(
    probe: &SlaProbe<'_>,
    directions: &[TelemetryField],
    sd: [&'static Descriptor; 3],
    ds: [&'static Descriptor; 3],
) {
    for direction in directions {
        let descriptors = match direction.name.as_str() {
            "sd" => sd,
            "ds" => ds,
            _ => continue,
        };

        for value in &direction.fields {
            let desc = match value.name.as_str() {
                "min" => descriptors[0],
                "avg" => descriptors[1],
                "max" => descriptors[2],
                _ => continue,
            };
            probe.numeric(desc, SampleKind::Gauge, value);
        }
    }
}

fn record_packet_loss(probe: &SlaProbe<'_>, directions: &[TelemetryField]) {
    for direction in directions {
        let desc = match direction.name.as_str() {
            "sd-loss" => &PACKET_LOSS_SD,
            "ds-loss" => &PACKET_LOSS_DS,
            _ => continue,
        };

        for value in &direction.fields {
            if value.name == "loss-period-count" {
                probe.numeric(desc, SampleKind::Gauge, value);
            }
        }
    }
}

fn record_http_stats(probe: &SlaProbe<'_>, fields: &[TelemetryField]) {
    for measure in fields {
        match measure.name.as_str() {
            "http-stats" => {
                for value in &measure.fields {
                    let desc = match value.name.as_str() {
                        "status-code" => &HTTP_STATUS_CODE,
                        "dns-rtt" => &HTTP_DNS_RTT,
                        "transaction-rtt" => &HTTP_TRANSACTION_RTT,
                        _ => continue,
                    };
                    probe.numeric(desc, SampleKind::Gauge, value);
                }
            }
            "http-errors" => {
                for value in &measure.fields {
                    let desc = match value.name.as_str() {
                        "transaction-error" => &HTTP_TRANSACTION_ERROR,
                        "tcp-error" => &HTTP_TCP_ERROR,
                        "dns-error" => &HTTP_DNS_ERROR,
                        "transaction-timeout" => &HTTP_TRANSACTION_TIMEOUT,
                        "tcp-timeout" => &HTTP_TCP_TIMEOUT,
                        "dns-timeout" => &HTTP_DNS_TIMEOUT,
                        _ => continue,
                    };
                    probe.numeric(desc, SampleKind::Counter, value);
                }
            }
            _ => {}
        }
    }
}

//! Performance benchmarks for eip-agent
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eip_agent::config::{AgentConfig, Protocol};
use eip_agent::launcher::{build_args, CipherSuite, ManagementSocket, TunnelOptions};
use eip_agent::monitoring::{parse_route_table, FileRouteSource, RouteTableInspector};

const HEADER: &str =
    "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT";

fn route_table(extra_routes: usize) -> String {
    let mut text = HEADER.to_string();
    text.push_str("\neth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0");
    for i in 0..extra_routes {
        text.push_str(&format!(
            "\neth0\t{:08X}\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0",
            ((i as u32) << 8) | 10
        ));
    }
    text.push_str("\ntun0\t00000000\t01002A0A\t0003\t0\t0\t0\t00000080\t0\t0\t0");
    text.push_str("\ntun0\t00000080\t01002A0A\t0003\t0\t0\t0\t00000080\t0\t0\t0");
    text
}

fn bench_route_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_table");

    for size in [4, 64, 512].iter() {
        let snapshot = route_table(*size);
        group.bench_with_input(BenchmarkId::new("parse", size), &snapshot, |b, snapshot| {
            b.iter(|| parse_route_table(black_box(snapshot)))
        });
    }

    group.finish();
}

fn bench_route_inspection(c: &mut Criterion) {
    let inspector = RouteTableInspector::new(Box::new(FileRouteSource::default()));
    let snapshot = route_table(64);

    c.bench_function("inspect_default_path", |b| {
        b.iter(|| inspector.inspect(black_box(&snapshot)))
    });
}

fn bench_build_args(c: &mut Criterion) {
    let options = TunnelOptions::builder()
        .remote("198.51.100.2", 1194, Protocol::Udp)
        .ciphers(CipherSuite {
            auth: Some("SHA256".to_string()),
            cipher: Some("AES-256-GCM".to_string()),
            tls_cipher: Some("DHE-RSA-AES128-SHA".to_string()),
        })
        .privilege_drop("nobody", "nogroup")
        .management(ManagementSocket::unix("/tmp/eip-agent/openvpn.socket"))
        .certificates("/etc/eip/openvpn.pem", "/etc/eip/openvpn.pem", "/etc/eip/cacert.pem")
        .build()
        .unwrap();

    c.bench_function("build_args", |b| b.iter(|| build_args(black_box(&options))));
}

fn bench_config_parsing(c: &mut Criterion) {
    let toml_data = r#"
[provider]
eip_config = "/etc/eip/eip.json"
eip_service_config = "/etc/eip/eip-service.json"
ca_cert = "/etc/eip/cacert.pem"
client_cert = "/etc/eip/openvpn.pem"

[tunnel]
port = 443
protocol = "tcp"
verbosity = 3

[supervision]
interval_secs = 5
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| AgentConfig::from_toml_str(black_box(toml_data)))
    });
}

criterion_group!(
    benches,
    bench_route_parsing,
    bench_route_inspection,
    bench_build_args,
    bench_config_parsing
);
criterion_main!(benches);

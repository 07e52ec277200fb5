//! Integration tests for the launch pipeline
//!
//! These tests build a provider bundle in a temporary directory and run the
//! whole pipeline against it, without spawning the tunnel daemon.

use eip_agent::config::{AgentConfig, EipConfig, EipServiceConfig};
use eip_agent::launcher::{ElevationWrapper, LaunchPipeline, LaunchStep, StepOutcome};
use eip_agent::platform::{LinuxLauncher, PlatformLauncher, SearchPath, WindowsLauncher};
use eip_agent::security::ProcessTable;
use eip_agent::EipAgentError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Process table with a fixed set of command lines
struct StaticProcesses(Vec<String>);

impl ProcessTable for StaticProcesses {
    fn command_lines(&self) -> eip_agent::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

struct Bundle {
    dir: TempDir,
    bin: PathBuf,
}

impl Bundle {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        write(&dir.path().join("keys/cacert.pem"), "ca", 0o644);
        write(&dir.path().join("keys/openvpn.pem"), "cert and key", 0o644);
        write(
            &dir.path().join("eip.json"),
            r#"{"primary_gateway": "cluster-b"}"#,
            0o644,
        );
        write(
            &dir.path().join("eip-service.json"),
            r#"{
                "gateways": [
                    {"cluster": "cluster-a", "ip_address": "198.51.100.1"},
                    {"cluster": "cluster-b", "ip_address": "198.51.100.2"}
                ],
                "openvpn_configuration": {
                    "auth": "SHA256",
                    "cipher": "AES-256-GCM",
                    "keepalive": "10 30"
                },
                "serial": 1,
                "version": 1
            }"#,
            0o644,
        );

        Self { dir, bin }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn executable(&self, name: &str) -> PathBuf {
        let path = self.bin.join(name);
        write(&path, "#!/bin/sh\nexit 0\n", 0o755);
        path
    }

    fn config(&self, extra: &str) -> AgentConfig {
        let toml = format!(
            r#"
[provider]
eip_config = "{eip}"
eip_service_config = "{service}"
ca_cert = "{ca}"
client_cert = "{cert}"

[tunnel]
user = "nobody"
group = "nogroup"
up_down_script = "{missing}"
{extra}
"#,
            eip = self.path("eip.json").display(),
            service = self.path("eip-service.json").display(),
            ca = self.path("keys/cacert.pem").display(),
            cert = self.path("keys/openvpn.pem").display(),
            missing = self.path("no-such-script").display(),
            extra = extra,
        );
        AgentConfig::from_toml_str(&toml).expect("valid config")
    }

    fn provider_docs(&self) -> (EipConfig, EipServiceConfig) {
        (
            EipConfig::from_file(self.path("eip.json")).unwrap(),
            EipServiceConfig::from_file(self.path("eip-service.json")).unwrap(),
        )
    }

    fn search_path(&self) -> SearchPath {
        SearchPath::new(vec![self.bin.clone()])
    }
}

fn write(path: &Path, contents: &str, mode: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }
    #[cfg(not(unix))]
    let _ = mode;
}

fn agent_running() -> Box<dyn ProcessTable> {
    Box::new(StaticProcesses(vec![
        "/usr/lib/policykit-1-gnome/polkit-gnome-authentication-agent-1".to_string(),
    ]))
}

#[cfg(unix)]
#[test]
fn test_linux_launch_plan() {
    let bundle = Bundle::new();
    let pkexec = bundle.executable("pkexec");
    let openvpn = bundle.executable("openvpn");
    let config = bundle.config("");
    let (eip, service) = bundle.provider_docs();

    let plan = LaunchPipeline::new(PlatformLauncher::Linux(LinuxLauncher))
        .with_search_path(bundle.search_path())
        .with_process_table(agent_running())
        .run(&config, &eip, &service)
        .expect("launch plan");

    assert_eq!(plan.gateway.ip_address, "198.51.100.2");
    assert_eq!(plan.directive.executable(), pkexec.as_path());
    assert_eq!(
        plan.directive.elevation(),
        Some(&ElevationWrapper::Pkexec(pkexec.clone()))
    );

    let argv = plan.directive.argv();
    assert_eq!(argv[0], openvpn.to_string_lossy());
    assert_eq!(&argv[1..4], ["--client", "--dev", "tun"]);
    assert!(argv.windows(2).any(|w| w == ["--auth", "SHA256"]));
    assert!(argv.windows(2).any(|w| w == ["--cipher", "AES-256-GCM"]));
    assert!(!argv.iter().any(|a| a == "--keepalive"));
    assert!(argv.windows(2).any(|w| w == ["--management-client-user", "nobody"]));
    assert!(!argv.iter().any(|a| a == "--up"));

    // Key files were tightened before launch
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(bundle.path("keys/openvpn.pem"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);

    if let Some(dir) = Path::new(&plan.management.endpoint).parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[cfg(unix)]
#[test]
fn test_linux_launch_fails_closed_without_agent() {
    let bundle = Bundle::new();
    bundle.executable("pkexec");
    bundle.executable("openvpn");
    let config = bundle.config("[management]\nhost = \"127.0.0.1\"\nport = 7505\n");
    let (eip, service) = bundle.provider_docs();

    let outcomes: Arc<Mutex<Vec<StepOutcome>>> = Arc::default();
    let recorded = outcomes.clone();

    let result = LaunchPipeline::new(PlatformLauncher::Linux(LinuxLauncher))
        .with_search_path(bundle.search_path())
        .with_process_table(Box::new(StaticProcesses(vec!["/usr/bin/bash".to_string()])))
        .on_step(move |outcome| recorded.lock().unwrap().push(outcome.clone()))
        .run(&config, &eip, &service);

    assert!(matches!(
        result,
        Err(EipAgentError::NoAuthenticationAgentAvailable)
    ));

    let outcomes = outcomes.lock().unwrap();
    let last = outcomes.last().unwrap();
    assert_eq!(last.step, LaunchStep::VerifyElevation);
    assert!(!last.passed);
    assert!(outcomes[..outcomes.len() - 1].iter().all(|o| o.passed));
}

#[test]
fn test_windows_launch_plan() {
    let bundle = Bundle::new();
    let openvpn = bundle.executable("openvpn.exe");
    let config = bundle.config("");
    let (eip, service) = bundle.provider_docs();

    let plan = LaunchPipeline::new(PlatformLauncher::Windows(WindowsLauncher))
        .with_search_path(bundle.search_path())
        .with_process_table(Box::new(StaticProcesses(vec![])))
        .run(&config, &eip, &service)
        .expect("launch plan");

    assert_eq!(plan.directive.executable(), openvpn.as_path());
    assert!(plan.directive.elevation().is_none());
    assert_eq!(plan.management.to_string(), "localhost 7777");

    let argv = plan.directive.argv();
    assert!(!argv.iter().any(|a| a == "--user"));
    assert!(!argv.iter().any(|a| a == "--management-client-user"));
}

#[test]
fn test_missing_daemon_stops_before_directive() {
    let bundle = Bundle::new();
    let config = bundle.config("");
    let (eip, service) = bundle.provider_docs();

    let result = LaunchPipeline::new(PlatformLauncher::Windows(WindowsLauncher))
        .with_search_path(bundle.search_path())
        .with_process_table(Box::new(StaticProcesses(vec![])))
        .run(&config, &eip, &service);

    assert!(matches!(
        result,
        Err(EipAgentError::TunnelBinaryNotFound(ref name)) if name == "openvpn.exe"
    ));
}

#[test]
fn test_unknown_cluster_is_fatal() {
    let bundle = Bundle::new();
    bundle.executable("openvpn.exe");
    let config = bundle.config("\n[compat]\ngateway_placeholder = \"testprovider.example.org\"\n");
    let (_, service) = bundle.provider_docs();
    let eip = EipConfig {
        primary_gateway: Some("cluster-z".to_string()),
    };

    let result = LaunchPipeline::new(PlatformLauncher::Windows(WindowsLauncher))
        .with_search_path(bundle.search_path())
        .run(&config, &eip, &service);

    let err = result.unwrap_err();
    assert!(matches!(err, EipAgentError::GatewayNotFound(_)));
    assert!(err.is_fatal());
}

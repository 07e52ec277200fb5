//! Daemon argument construction
//!
//! The argument order is fixed. Identical options always produce an
//! identical argument vector, which audit tooling compares byte for byte.

use super::options::TunnelOptions;
use crate::error::Result;

/// Build the daemon arguments for `options`
pub fn build_args(options: &TunnelOptions) -> Result<Vec<String>> {
    options.validate()?;

    let mut args: Vec<String> = Vec::with_capacity(48);

    push(&mut args, &["--client", "--dev", &options.device.to_string()]);
    if options.persist_tun {
        push(&mut args, &["--persist-tun"]);
    }
    if options.persist_key {
        push(&mut args, &["--persist-key"]);
    }
    if let Some(verbosity) = options.verbosity {
        push(&mut args, &["--verb", &verbosity.to_string()]);
    }

    let remote = &options.remote;
    push(&mut args, &[
        "--remote",
        &remote.address,
        &remote.port.to_string(),
        &remote.protocol.to_string(),
    ]);
    push(&mut args, &["--tls-client", "--remote-cert-tls", "server"]);

    for (key, value) in options.ciphers.options() {
        push(&mut args, &[&format!("--{}", key), value]);
    }

    if let Some(drop) = &options.privilege_drop {
        push(&mut args, &["--user", &drop.user, "--group", &drop.group]);
        if options.management.is_unix() {
            push(&mut args, &["--management-client-user", &drop.user]);
        }
    }

    push(&mut args, &[
        "--management-signal",
        "--management",
        &options.management.endpoint,
        &options.management.transport.to_string(),
        "--script-security",
        &options.script_security.to_string(),
    ]);

    if let Some(scripts) = &options.scripts {
        let script = scripts.up_down_script.to_string_lossy();
        push(&mut args, &[
            "--up",
            &script,
            "--down",
            &script,
            "--plugin",
            &scripts.plugin.to_string_lossy(),
            &format!("script_type=down {}", script),
        ]);
    }

    let certs = &options.certificates;
    push(&mut args, &[
        "--cert",
        &certs.client_cert.to_string_lossy(),
        "--key",
        &certs.client_key.to_string_lossy(),
        "--ca",
        &certs.ca_cert.to_string_lossy(),
    ]);

    if let Some(log_file) = &options.log_file {
        push(&mut args, &["--log", &log_file.to_string_lossy()]);
    }

    Ok(args)
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::error::EipAgentError;
    use crate::launcher::gateway::CipherSuite;
    use crate::launcher::options::{ManagementSocket, ScriptHooks};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn linux_options() -> TunnelOptions {
        TunnelOptions::builder()
            .remote("4.2.2.2", 1194, Protocol::Udp)
            .ciphers(CipherSuite {
                auth: Some("SHA1".to_string()),
                cipher: Some("AES-128-CBC".to_string()),
                tls_cipher: None,
            })
            .privilege_drop("alice", "users")
            .management(ManagementSocket::unix("/tmp/eip/openvpn.socket"))
            .certificates("/p/client.pem", "/p/client.pem", "/p/ca.crt")
            .build()
            .unwrap()
    }

    #[test]
    fn test_linux_argument_order() {
        let args = build_args(&linux_options()).unwrap();
        let expected: Vec<&str> = vec![
            "--client", "--dev", "tun", "--persist-tun", "--persist-key",
            "--remote", "4.2.2.2", "1194", "udp",
            "--tls-client", "--remote-cert-tls", "server",
            "--auth", "SHA1", "--cipher", "AES-128-CBC",
            "--user", "alice", "--group", "users",
            "--management-client-user", "alice",
            "--management-signal", "--management", "/tmp/eip/openvpn.socket", "unix",
            "--script-security", "2",
            "--cert", "/p/client.pem", "--key", "/p/client.pem", "--ca", "/p/ca.crt",
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn test_tcp_management_has_no_client_user() {
        let mut options = linux_options();
        options.management = ManagementSocket::tcp("localhost", 7777);
        options.privilege_drop = None;

        let args = build_args(&options).unwrap();
        assert!(!args.contains(&"--management-client-user".to_string()));
        assert!(!args.contains(&"--user".to_string()));
        let pos = args.iter().position(|a| a == "--management").unwrap();
        assert_eq!(args[pos + 1], "localhost");
        assert_eq!(args[pos + 2], "7777");
    }

    #[test]
    fn test_scripts_verbosity_and_log() {
        let mut options = linux_options();
        options.verbosity = Some(3);
        options.scripts = Some(ScriptHooks {
            up_down_script: PathBuf::from("/etc/leap/resolv-update"),
            plugin: PathBuf::from("/usr/lib/openvpn/openvpn-down-root.so"),
        });
        options.log_file = Some(PathBuf::from("/tmp/leap_openvpn.log"));

        let args = build_args(&options).unwrap();
        assert_eq!(&args[5..7], ["--verb", "3"]);

        let up = args.iter().position(|a| a == "--up").unwrap();
        assert_eq!(
            &args[up..up + 7],
            [
                "--up",
                "/etc/leap/resolv-update",
                "--down",
                "/etc/leap/resolv-update",
                "--plugin",
                "/usr/lib/openvpn/openvpn-down-root.so",
                "script_type=down /etc/leap/resolv-update",
            ]
        );
        assert!(up > args.iter().position(|a| a == "--script-security").unwrap());
        assert!(up < args.iter().position(|a| a == "--cert").unwrap());
        assert_eq!(&args[args.len() - 2..], ["--log", "/tmp/leap_openvpn.log"]);
    }

    #[test]
    fn test_incomplete_options_never_build_args() {
        let mut options = linux_options();
        options.remote.address = String::new();
        assert!(matches!(
            build_args(&options),
            Err(EipAgentError::IncompleteTunnelOptions(_))
        ));

        let mut options = linux_options();
        options.certificates.ca_cert = PathBuf::new();
        assert!(build_args(&options).is_err());
    }

    proptest! {
        #[test]
        fn prop_args_are_deterministic(
            address in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
            port in 1u16..,
            user in "[a-z]{1,12}",
            verbosity in proptest::option::of(1u8..=6),
        ) {
            let build = || {
                TunnelOptions::builder()
                    .remote(address.clone(), port, Protocol::Tcp)
                    .verbosity(verbosity)
                    .privilege_drop(user.clone(), user.clone())
                    .management(ManagementSocket::tcp("127.0.0.1", 7777))
                    .certificates("/c", "/k", "/ca")
                    .build()
                    .unwrap()
            };
            let first = build_args(&build()).unwrap();
            let second = build_args(&build()).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.iter().filter(|a| *a == "--remote").count(), 1);
        }
    }
}

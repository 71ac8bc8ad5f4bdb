//! End-to-end test against a real `gpg` executable.
//!
//! Opt-in: runs only when `GPGWRAP_GPG_TESTS=1` is set, since it needs
//! GnuPG installed and generates a throwaway key. Everything happens in a
//! temporary home directory so the user's keyring is never touched.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use gpgwrap::config::PluginConfig;
use gpgwrap::gpg::{GpgCli, GpgProgram, default_program};
use gpgwrap::host::recording::RecordingHost;
use gpgwrap::host::{Context, Eat, PrintEvent};
use gpgwrap::inbound::LABEL_MESSAGE;
use gpgwrap::plugin::Plugin;

const USER_ID: &str = "GpgWrap Test <gpgwrap-test@example.org>";
const EMAIL: &str = "gpgwrap-test@example.org";

fn enabled() -> bool {
    std::env::var("GPGWRAP_GPG_TESTS").is_ok_and(|v| v == "1")
}

/// Temporary GnuPG home, removed (and its agent stopped) on drop.
struct TempHome(PathBuf);

impl TempHome {
    fn create() -> Self {
        let dir = std::env::temp_dir().join(format!("gpgwrap-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp homedir");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .expect("restrict temp homedir");
        }
        Self(dir)
    }

    fn as_str(&self) -> &str {
        self.0.to_str().expect("utf-8 temp path")
    }
}

impl Drop for TempHome {
    fn drop(&mut self) {
        let _ = Command::new("gpgconf")
            .args(["--homedir", self.as_str(), "--kill", "gpg-agent"])
            .status();
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn generate_key(home: &TempHome) {
    let status = Command::new(default_program())
        .args([
            "--batch",
            "--homedir",
            home.as_str(),
            "--passphrase",
            "",
            "--quick-gen-key",
            USER_ID,
            "default",
            "default",
            "never",
        ])
        .status()
        .expect("run gpg --quick-gen-key");
    assert!(status.success(), "key generation failed");
}

#[test]
fn encrypt_then_decrypt_through_the_plugin() {
    if !enabled() {
        eprintln!("skipping: set GPGWRAP_GPG_TESTS=1 to run against real gpg");
        return;
    }

    let home = TempHome::create();
    generate_key(&home);

    let host = Arc::new(RecordingHost::new("#chan", "alice"));
    let config = PluginConfig {
        gpg: GpgProgram {
            homedir: Some(home.as_str().to_string()),
            ..GpgProgram::default()
        },
        ..PluginConfig::default()
    };
    let plugin = Plugin::load(Arc::clone(&host), Arc::new(GpgCli), &config).expect("plugin loads");

    assert_eq!(plugin.on_command(&format!("gpg {EMAIL} the  eagle lands")), Eat::All);

    let sent: Vec<String> = host
        .sent()
        .into_iter()
        .map(|c| c.raw.trim_start_matches("PRIVMSG #chan ").to_string())
        .collect();
    assert!(sent.len() > 2, "nothing was sent");
    assert_eq!(sent[0], "-----BEGIN PGP MESSAGE-----");
    assert_eq!(sent[sent.len() - 1], "-----END PGP MESSAGE-----");
    assert!(sent.iter().all(|line| !line.is_empty()));

    // Replay the sent lines as if they had come back from the server.
    let ctx = Context::new("#chan");
    for line in &sent {
        plugin.on_print(PrintEvent::ChannelMessage, &ctx, "bob", line);
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    while host.printed_with_label(LABEL_MESSAGE).is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    let messages = host.printed_with_label(LABEL_MESSAGE);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "the  eagle lands");
    assert_eq!(messages[0].context, ctx);

    plugin.unload();
}

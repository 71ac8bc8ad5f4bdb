//! Integration tests for plugin load and unload.
//!
//! Load must register both commands with their help text and all three
//! watched print events. Unload must remove every one of them, stop
//! background work, and be safe to repeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gpgwrap::config::PluginConfig;
use gpgwrap::gpg::scripted::{Reply, ScriptedTool};
use gpgwrap::host::recording::RecordingHost;
use gpgwrap::host::{Context, Eat, PrintEvent};
use gpgwrap::inbound::LABEL_MESSAGE;
use gpgwrap::outbound::{HELP_GPG, HELP_GPGS};
use gpgwrap::plugin::{PLUGIN_NAME, Plugin};
use gpgwrap::pool::PoolConfig;

fn host() -> Arc<RecordingHost> {
    Arc::new(RecordingHost::new("#chan", "alice"))
}

#[test]
fn load_registers_commands_prints_and_notice() {
    let host = host();
    let _plugin = Plugin::load(
        Arc::clone(&host),
        Arc::new(ScriptedTool::replying("", "")),
        &PluginConfig::default(),
    )
    .expect("plugin loads");

    let commands = host.hooked_commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands["gpg"], HELP_GPG);
    assert_eq!(commands["gpgs"], HELP_GPGS);

    let mut prints = host.hooked_prints();
    prints.sort();
    assert_eq!(prints, PrintEvent::WATCHED.to_vec());

    let notices = host.printed_with_label(PLUGIN_NAME);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, "GpgWrap loaded!");
    assert_eq!(notices[0].context, Context::new("#chan"));
}

#[test]
fn unload_removes_both_commands_and_all_prints() {
    let host = host();
    let plugin = Plugin::load(
        Arc::clone(&host),
        Arc::new(ScriptedTool::replying("", "")),
        &PluginConfig::default(),
    )
    .expect("plugin loads");

    plugin.unload();

    assert!(host.hooked_commands().is_empty());
    assert!(host.hooked_prints().is_empty());
    assert!(plugin.is_unloaded());
    let notices: Vec<String> = host
        .printed_with_label(PLUGIN_NAME)
        .into_iter()
        .map(|p| p.text)
        .collect();
    assert_eq!(notices, vec!["GpgWrap loaded!", "GpgWrap unloaded!"]);
}

#[test]
fn repeated_unload_and_drop_announce_once() {
    let host = host();
    let plugin = Plugin::load(
        Arc::clone(&host),
        Arc::new(ScriptedTool::replying("", "")),
        &PluginConfig::default(),
    )
    .expect("plugin loads");

    plugin.unload();
    plugin.unload();
    drop(plugin);

    let unloads = host
        .printed_with_label(PLUGIN_NAME)
        .into_iter()
        .filter(|p| p.text == "GpgWrap unloaded!")
        .count();
    assert_eq!(unloads, 1);
}

#[test]
fn drop_without_unload_still_unhooks() {
    let host = host();
    let plugin = Plugin::load(
        Arc::clone(&host),
        Arc::new(ScriptedTool::replying("", "")),
        &PluginConfig::default(),
    )
    .expect("plugin loads");

    drop(plugin);

    assert!(host.hooked_commands().is_empty());
    assert!(host.hooked_prints().is_empty());
}

#[test]
fn unload_aborts_a_hung_decryption_within_grace_period() {
    let host = host();
    let config = PluginConfig {
        pool: PoolConfig {
            shutdown_grace: Duration::from_millis(100),
            ..PoolConfig::default()
        },
        ..PluginConfig::default()
    };
    let plugin = Plugin::load(Arc::clone(&host), Arc::new(ScriptedTool::new(Reply::Hang)), &config)
        .expect("plugin loads");
    let ctx = Context::new("#chan");

    for line in [
        "-----BEGIN PGP MESSAGE-----",
        "abc",
        "-----END PGP MESSAGE-----",
    ] {
        plugin.on_print(PrintEvent::ChannelMessage, &ctx, "bob", line);
    }

    let started = Instant::now();
    plugin.unload();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(host.printed_with_label(LABEL_MESSAGE).is_empty());
}

#[test]
fn unload_waits_for_a_decryption_that_finishes_in_time() {
    let host = host();
    let tool = ScriptedTool::new(Reply::Delayed(
        Duration::from_millis(50),
        gpgwrap::gpg::ToolOutput::ok("made it", ""),
    ));
    let plugin = Plugin::load(Arc::clone(&host), Arc::new(tool), &PluginConfig::default())
        .expect("plugin loads");
    let ctx = Context::new("#chan");

    for line in [
        "-----BEGIN PGP MESSAGE-----",
        "abc",
        "-----END PGP MESSAGE-----",
    ] {
        plugin.on_print(PrintEvent::ChannelMessage, &ctx, "bob", line);
    }
    plugin.unload();

    let messages = host.printed_with_label(LABEL_MESSAGE);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "made it");
}

#[test]
fn unloaded_plugin_ignores_callbacks() {
    let host = host();
    let tool = Arc::new(ScriptedTool::replying("x", ""));
    let plugin = Plugin::load(Arc::clone(&host), Arc::clone(&tool), &PluginConfig::default())
        .expect("plugin loads");
    plugin.unload();

    assert_eq!(plugin.on_command("gpg bob hi"), Eat::None);
    assert_eq!(
        plugin.on_print(
            PrintEvent::PrivateMessage,
            &Context::new("bob"),
            "bob",
            "-----BEGIN PGP MESSAGE-----"
        ),
        Eat::None
    );
    assert_eq!(tool.calls(), 0);
    assert!(host.sent().is_empty());
}

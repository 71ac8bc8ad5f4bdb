//! Integration tests for inbound capture and background decryption.
//!
//! Incoming lines are fed through the plugin's print callback. Completed
//! armored blocks must reach the tool exactly once, with the blank line
//! after the BEGIN marker restored, and the result must be printed back
//! into the conversation the block arrived in.

use std::sync::Arc;
use std::time::Duration;

use gpgwrap::config::PluginConfig;
use gpgwrap::gpg::ToolOutput;
use gpgwrap::gpg::scripted::{Reply, ScriptedTool};
use gpgwrap::host::recording::RecordingHost;
use gpgwrap::host::{Context, Eat, PrintEvent};
use gpgwrap::inbound::{LABEL_GPG, LABEL_MESSAGE};
use gpgwrap::plugin::Plugin;

const WAIT: Duration = Duration::from_secs(5);
const BEGIN: &str = "-----BEGIN PGP MESSAGE-----";
const END: &str = "-----END PGP MESSAGE-----";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn loaded(tool: ScriptedTool) -> (Plugin<RecordingHost, ScriptedTool>, Arc<RecordingHost>, Arc<ScriptedTool>) {
    let host = Arc::new(RecordingHost::new("#chan", "alice"));
    let tool = Arc::new(tool);
    let plugin = Plugin::load(Arc::clone(&host), Arc::clone(&tool), &PluginConfig::default())
        .expect("plugin loads");
    (plugin, host, tool)
}

fn feed(plugin: &Plugin<RecordingHost, ScriptedTool>, event: PrintEvent, ctx: &Context, lines: &[&str]) {
    for line in lines {
        assert_eq!(plugin.on_print(event, ctx, "bob", line), Eat::None);
    }
}

/// Prints other than the load notice.
fn output(host: &RecordingHost) -> Vec<(String, String, String)> {
    host.printed()
        .into_iter()
        .skip(1)
        .map(|p| (p.context.to_string(), p.label, p.text))
        .collect()
}

// ---------------------------------------------------------------------------
// Capture and decrypt
// ---------------------------------------------------------------------------

#[test]
fn complete_block_is_decrypted_once_with_blank_line_restored() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying(
        "meet at noon",
        "gpg: encrypted with 2048-bit RSA key\ngpg: Good signature from \"bob\"\n",
    ));
    let ctx = Context::new("#chan");

    feed(&plugin, PrintEvent::ChannelMessage, &ctx, &[BEGIN, "abc", "def", END]);

    assert!(!plugin.is_capturing(&ctx));
    assert!(host.wait_for_prints(4, WAIT));

    let invocations = tool.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations[0].stdin,
        "-----BEGIN PGP MESSAGE-----\n\nabc\ndef\n-----END PGP MESSAGE-----"
    );

    assert_eq!(
        output(&host),
        vec![
            ("#chan".into(), LABEL_GPG.into(), "gpg: encrypted with 2048-bit RSA key".into()),
            ("#chan".into(), LABEL_GPG.into(), "gpg: Good signature from \"bob\"".into()),
            ("#chan".into(), LABEL_MESSAGE.into(), "meet at noon".into()),
        ]
    );
}

#[test]
fn armor_headers_stay_ahead_of_blank_line() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying("ok", ""));
    let ctx = Context::new("#chan");

    feed(
        &plugin,
        PrintEvent::ChannelMessage,
        &ctx,
        &[BEGIN, "Version: GnuPG v2", "hQEMA", "=abcd", END],
    );

    assert!(host.wait_for_prints(2, WAIT));
    assert_eq!(
        tool.invocations()[0].stdin,
        "-----BEGIN PGP MESSAGE-----\nVersion: GnuPG v2\n\nhQEMA\n=abcd\n-----END PGP MESSAGE-----"
    );
}

#[test]
fn begin_without_end_never_decrypts() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying("never", ""));
    let ctx = Context::new("#chan");

    feed(&plugin, PrintEvent::ChannelMessage, &ctx, &[BEGIN, "abc", "def", "ghi"]);

    assert!(plugin.is_capturing(&ctx));
    plugin.unload();
    assert_eq!(tool.calls(), 0);
    assert!(host.printed_with_label(LABEL_MESSAGE).is_empty());
}

#[test]
fn ordinary_chat_is_left_alone() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying("never", ""));
    let ctx = Context::new("#chan");

    feed(&plugin, PrintEvent::ChannelMessage, &ctx, &["hi", END, "bye"]);

    plugin.unload();
    assert_eq!(tool.calls(), 0);
    assert_eq!(host.printed().len(), 2);
}

// ---------------------------------------------------------------------------
// Conversations and events
// ---------------------------------------------------------------------------

#[test]
fn conversations_are_captured_independently() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying("plain", ""));
    let chan = Context::new("#rust");
    let query = Context::new("bob");

    // Interleave two blocks line by line.
    plugin.on_print(PrintEvent::ChannelMessage, &chan, "carol", BEGIN);
    plugin.on_print(PrintEvent::PrivateMessageToDialog, &query, "bob", BEGIN);
    plugin.on_print(PrintEvent::ChannelMessage, &chan, "carol", "RUST");
    plugin.on_print(PrintEvent::PrivateMessageToDialog, &query, "bob", "BOB");
    plugin.on_print(PrintEvent::ChannelMessage, &chan, "carol", END);
    assert!(plugin.is_capturing(&query));
    plugin.on_print(PrintEvent::PrivateMessageToDialog, &query, "bob", END);

    assert!(host.wait_for_prints(3, WAIT));

    let mut bodies: Vec<String> = tool.invocations().into_iter().map(|i| i.stdin).collect();
    bodies.sort();
    assert_eq!(
        bodies,
        vec![
            format!("{BEGIN}\n\nBOB\n{END}"),
            format!("{BEGIN}\n\nRUST\n{END}"),
        ]
    );

    // Each conversation gets its own plaintext line back.
    let mut contexts: Vec<Context> = host
        .printed_with_label(LABEL_MESSAGE)
        .into_iter()
        .map(|p| p.context)
        .collect();
    contexts.sort();
    assert_eq!(contexts, vec![chan, query]);
}

#[test]
fn all_watched_events_are_handled_alike() {
    for event in PrintEvent::WATCHED {
        let (plugin, host, tool) = loaded(ScriptedTool::replying("plain", ""));
        let ctx = Context::new("bob");

        feed(&plugin, event, &ctx, &[BEGIN, "abc", END]);

        assert!(host.wait_for_prints(2, WAIT), "no output for {event}");
        assert_eq!(tool.calls(), 1, "wrong call count for {event}");
        assert_eq!(host.printed_with_label(LABEL_MESSAGE)[0].text, "plain");
    }
}

#[test]
fn restarted_block_discards_the_partial_one() {
    let (plugin, host, tool) = loaded(ScriptedTool::replying("second", ""));
    let ctx = Context::new("#chan");

    feed(
        &plugin,
        PrintEvent::ChannelMessage,
        &ctx,
        &[BEGIN, "first", BEGIN, "second", END],
    );

    assert!(host.wait_for_prints(3, WAIT));
    let invocations = tool.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].stdin, format!("{BEGIN}\n\nsecond\n{END}"));
    assert!(
        host.printed_with_label(LABEL_GPG)
            .iter()
            .any(|p| p.text.contains("discarded"))
    );
}

// ---------------------------------------------------------------------------
// Background execution
// ---------------------------------------------------------------------------

#[test]
fn slow_decryption_does_not_block_the_callback() {
    let (plugin, host, _tool) = loaded(ScriptedTool::new(Reply::Delayed(
        Duration::from_millis(300),
        ToolOutput::ok("late", ""),
    )));
    let ctx = Context::new("#chan");

    let started = std::time::Instant::now();
    feed(&plugin, PrintEvent::ChannelMessage, &ctx, &[BEGIN, "abc", END]);
    assert!(started.elapsed() < Duration::from_millis(250));

    assert!(host.wait_for_prints(2, WAIT));
    assert_eq!(host.printed_with_label(LABEL_MESSAGE)[0].text, "late");
}

#[test]
fn failed_decryption_still_prints_diagnostics() {
    let (plugin, host, _tool) = loaded(ScriptedTool::new(Reply::Output(ToolOutput::failed(
        2,
        "gpg: decryption failed: No secret key\n",
    ))));
    let ctx = Context::new("#chan");

    feed(&plugin, PrintEvent::ChannelMessage, &ctx, &[BEGIN, "abc", END]);

    assert!(host.wait_for_prints(3, WAIT));
    assert_eq!(
        output(&host),
        vec![
            ("#chan".into(), LABEL_GPG.into(), "gpg: decryption failed: No secret key".into()),
            ("#chan".into(), LABEL_MESSAGE.into(), String::new()),
        ]
    );
}

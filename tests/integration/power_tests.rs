//! Reboot and power-off.

use domsvc::adapters::PlatformCall;
use domsvc::ds::codec::WireReader;
use domsvc::ds::protocol::{VarOp, VarResult};
use domsvc::EngineConfig;

use crate::mock_host::Harness;

#[test]
fn reboot_stores_boot_command_then_resets() {
    let h = Harness::new();
    h.establish();
    let responder = h.spawn_var_responder(VarResult::Success as u32, 1);

    h.engine.reboot("disk1 -s");

    let seen = responder.join().unwrap();
    assert_eq!(seen.len(), 1);
    let mut r = WireReader::new(seen[0].body());
    assert_eq!(r.u32().unwrap(), VarOp::SetReq as u32);
    assert_eq!(r.cstr().unwrap(), b"reboot-command");
    assert_eq!(r.cstr().unwrap(), b"boot disk1 -s");
    assert_eq!(h.platform.calls(), [PlatformCall::SystemReset]);
}

#[test]
fn reboot_without_command_only_resets() {
    let h = Harness::new();
    h.establish();

    h.engine.reboot("");
    assert!(h.host.take_sent().is_empty());
    assert_eq!(h.platform.calls(), [PlatformCall::SystemReset]);
}

#[test]
fn reboot_resets_even_when_variable_cannot_be_stored() {
    // Nothing registered yet.
    let h = Harness::new();
    h.engine.reboot("net");
    assert!(h.host.take_sent().is_empty());
    assert_eq!(h.platform.calls(), [PlatformCall::SystemReset]);

    // Registered, but the host never answers.
    let h = Harness::with_config(EngineConfig {
        var_timeout_ms: 20,
        ..EngineConfig::default()
    });
    h.establish();
    h.engine.reboot("net");
    assert_eq!(h.host.take_sent().len(), 1);
    assert_eq!(h.platform.calls(), [PlatformCall::SystemReset]);
}

#[test]
fn long_boot_command_is_truncated() {
    let h = Harness::new();
    h.establish();
    let responder = h.spawn_var_responder(VarResult::Success as u32, 1);

    h.engine.reboot(&"d".repeat(400));

    let seen = responder.join().unwrap();
    let mut r = WireReader::new(seen[0].body());
    r.u32().unwrap();
    r.cstr().unwrap();
    let value = r.cstr().unwrap();
    assert_eq!(value.len(), 256);
    assert!(value.starts_with(b"boot ddd"));
}

#[test]
fn power_off_delegates_to_platform() {
    let h = Harness::new();
    h.engine.power_off();
    assert_eq!(h.platform.calls(), [PlatformCall::PowerOff]);
    assert!(h.host.take_sent().is_empty());
}

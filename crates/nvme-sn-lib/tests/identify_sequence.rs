//! Integration tests: end-to-end identity queries using MockChannel.
//!
//! These tests drive the public API from channel open through identify
//! submission, byte-order correction and field extraction, checking both
//! what the caller sees and what reached the channel.

use nvme_sn_lib::NvmeSnError;
use nvme_sn_lib::byteorder::ByteOrder;
use nvme_sn_lib::device::mock::{MockChannel, MockResponse};
use nvme_sn_lib::device::{ChannelOptions, DeviceError, NvmeChannel};
use nvme_sn_lib::field::format_char_array;
use nvme_sn_lib::identify::{IdentifyReader, read_controller_identity};
use nvme_sn_lib::protocol::*;
use nvme_sn_lib::query::{QueryOptions, query_identity};

/// Helper: identify controller bytes as a little-endian controller sends them.
fn controller_wire(vid: u16, model: &str, serial: &[u8], firmware: &str) -> Vec<u8> {
    let mut b = vec![0u8; IDENTIFY_DATA_SIZE];
    b[0..2].copy_from_slice(&vid.to_le_bytes());
    b[4..24].fill(b' ');
    b[4..4 + serial.len()].copy_from_slice(serial);
    b[24..64].fill(b' ');
    b[24..24 + model.len()].copy_from_slice(model.as_bytes());
    b[64..72].fill(b' ');
    b[64..64 + firmware.len()].copy_from_slice(firmware.as_bytes());
    b
}

// ── Scenario: padded model is trimmed ──

#[test]
fn padded_model_is_trimmed() {
    let mut dev = MockChannel::new();
    dev.push_response(MockResponse::Data(controller_wire(
        0x144D,
        "   WD Blue SN570 1TB",
        b"22123A456789",
        "234110WD",
    )));

    let id = query_identity(&mut dev, QueryOptions::new(ByteOrder::Little)).unwrap();
    assert_eq!(id.model, "WD Blue SN570 1TB");
    assert_eq!(id.serial, "22123A456789");
    assert_eq!(id.firmware, "234110WD");
}

// ── Scenario: control bytes in serial ──

#[test]
fn control_bytes_in_serial_are_replaced() {
    let mut dev = MockChannel::new();
    dev.push_response(MockResponse::Data(controller_wire(
        0x1E0F,
        "KXG60ZNV256G",
        &[b'X', 0x1B, b'Y', 0xFF, b'Z'],
        "AGGA4104",
    )));

    let id = query_identity(&mut dev, QueryOptions::new(ByteOrder::Little)).unwrap();
    assert_eq!(id.serial, "X?Y?Z");
    assert!(id.serial.bytes().all(|c| (0x20..=0x7E).contains(&c)));
}

// ── Scenario: nonexistent device ──

#[test]
fn unopenable_device_is_not_found_and_never_submits() {
    let mut dev = MockChannel::new();
    dev.fail_open.set(true);
    dev.push_response(MockResponse::Data(controller_wire(1, "M", b"S", "F")));

    let err = query_identity(&mut dev, QueryOptions::new(ByteOrder::Little)).unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        NvmeSnError::Device(DeviceError::OpenFailed { .. })
    ));
    assert!(dev.submitted.borrow().is_empty());
    assert_eq!(dev.responses.borrow().len(), 1, "response must stay queued");
}

// ── Scenario: big-endian host ──

#[test]
fn big_endian_host_corrects_vid() {
    let wire = controller_wire(0x1234, "M", b"S", "F");
    assert_eq!(&wire[0..2], &[0x34, 0x12]);

    let mut be = MockChannel::new();
    be.open().unwrap();
    be.push_response(MockResponse::Data(wire.clone()));
    let id = read_controller_identity(&be, ByteOrder::Big).unwrap();
    assert_eq!(id.raw().vid, [0x12, 0x34], "swapped in place");
    assert_eq!(id.vid(), 0x1234);

    let mut le = MockChannel::new();
    le.open().unwrap();
    le.push_response(MockResponse::Data(wire));
    let id = read_controller_identity(&le, ByteOrder::Little).unwrap();
    assert_eq!(id.raw().vid, [0x34, 0x12], "left as received");
    assert_eq!(id.vid(), 0x1234);
}

// ── Command shape ──

#[test]
fn one_identify_controller_command_per_query() {
    let mut dev = MockChannel::new();
    dev.push_response(MockResponse::Data(controller_wire(1, "M", b"S", "F")));
    query_identity(&mut dev, QueryOptions::new(ByteOrder::Little)).unwrap();

    let sub = dev.submitted.borrow();
    assert_eq!(sub.len(), 1);
    assert_eq!(sub[0].opcode, AdminOpcode::Identify);
    assert_eq!(sub[0].opcode.raw(), 0x06);
    assert_eq!(sub[0].nsid, NSID_CONTROLLER);
    assert_eq!(sub[0].cdw10, IDENTIFY_CNS_CONTROLLER);
    assert_eq!(sub[0].direction, DataDirection::In);
    assert_eq!(sub[0].data_len, IDENTIFY_DATA_SIZE);
}

#[test]
fn namespace_identify_uses_channel_nsid() {
    let mut dev = MockChannel::with_options(ChannelOptions::default());
    dev.reported_nsid.set(NSID_BROADCAST);
    dev.open().unwrap();
    dev.push_response(MockResponse::Data(vec![0x5A; 8]));

    let mut buf = vec![0u8; IDENTIFY_DATA_SIZE];
    IdentifyReader::new(ByteOrder::host())
        .read_identify(&dev, dev.namespace_id(), IDENTIFY_CNS_NAMESPACE, &mut buf)
        .unwrap();

    assert_eq!(&buf[..8], &[0x5A; 8]);
    let sub = dev.submitted.borrow();
    assert_eq!(sub[0].nsid, 0xFFFF_FFFF);
    assert_eq!(sub[0].cdw10, 0);
}

#[test]
fn system_error_is_reported_as_query_failure() {
    let mut dev = MockChannel::new();
    dev.push_response(MockResponse::SysError("NVME_IOCTL_ADMIN_CMD: EINVAL".into()));

    let err = query_identity(&mut dev, QueryOptions::new(ByteOrder::Little)).unwrap_err();
    assert!(!err.is_not_found());
    assert!(err.to_string().contains("EINVAL"));
    assert!(!dev.is_open());
}

// ── Field extraction with a shared buffer ──

#[test]
fn shared_buffer_truncates_to_capacity() {
    let id_bytes = controller_wire(1, "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789ABCD", b"S", "F");
    let mut dev = MockChannel::new();
    dev.open().unwrap();
    dev.push_response(MockResponse::Data(id_bytes));
    let id = read_controller_identity(&dev, ByteOrder::Little).unwrap();

    let mut small = [0xEEu8; 8];
    let s = format_char_array(&mut small, id.model_bytes());
    assert_eq!(s, "ABCDEFG");
    assert_eq!(small[7], 0);

    assert_eq!(id.model().len(), 40);
}

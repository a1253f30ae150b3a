//! Identify protocol layer.
//!
//! Builds the Identify admin command, submits it through an
//! [`NvmeChannel`], and exposes the 4096-byte controller data structure.
//! Numeric fields are little-endian on the wire; on a big-endian host every
//! multi-byte number is swapped in place after the read.  Text fields
//! (serial, model, firmware) are byte strings and are never swapped.

use serde::Serialize;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::byteorder::{ByteOrder, swap2, swap4};
use crate::command::{AdminCommand, CommandCompletion};
use crate::device::{NvmeChannel, Result};
use crate::field::field_to_string;
use crate::protocol::{
    AdminOpcode, IDENTIFY_CNS_CONTROLLER, IDENTIFY_DATA_SIZE, NSID_CONTROLLER, POWER_STATE_COUNT,
};

// ── Wire layout ──

/// Power state descriptor (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PowerStateDescriptor {
    /// Maximum power, centiwatts.
    pub max_power: [u8; 2],
    pub rsvd2: u8,
    pub flags: u8,
    /// Entry latency, microseconds.
    pub entry_lat: [u8; 4],
    /// Exit latency, microseconds.
    pub exit_lat: [u8; 4],
    pub read_tput: u8,
    pub read_lat: u8,
    pub write_tput: u8,
    pub write_lat: u8,
    pub idle_power: [u8; 2],
    pub idle_scale: u8,
    pub rsvd19: u8,
    pub active_power: [u8; 2],
    pub active_work_scale: u8,
    pub rsvd23: [u8; 9],
}

/// Identify Controller data structure (CNS 01h), 4096 bytes.
///
/// Multi-byte numbers are kept as byte arrays so the layout has no padding
/// and their interpretation is governed by the [`ByteOrder`] in use.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct IdentifyController {
    pub vid: [u8; 2],
    pub ssvid: [u8; 2],
    pub sn: [u8; 20],
    pub mn: [u8; 40],
    pub fr: [u8; 8],
    pub rab: u8,
    pub ieee: [u8; 3],
    pub cmic: u8,
    pub mdts: u8,
    pub cntlid: [u8; 2],
    pub ver: [u8; 4],
    pub rtd3r: [u8; 4],
    pub rtd3e: [u8; 4],
    pub oaes: [u8; 4],
    pub rsvd96: [u8; 160],
    pub oacs: [u8; 2],
    pub acl: u8,
    pub aerl: u8,
    pub frmw: u8,
    pub lpa: u8,
    pub elpe: u8,
    pub npss: u8,
    pub avscc: u8,
    pub apsta: u8,
    pub wctemp: [u8; 2],
    pub cctemp: [u8; 2],
    pub mtfa: [u8; 2],
    pub hmpre: [u8; 4],
    pub hmmin: [u8; 4],
    pub tnvmcap: [u8; 16],
    pub unvmcap: [u8; 16],
    pub rpmbs: [u8; 4],
    pub rsvd316: [u8; 196],
    pub sqes: u8,
    pub cqes: u8,
    pub rsvd514: [u8; 2],
    pub nn: [u8; 4],
    pub oncs: [u8; 2],
    pub fuses: [u8; 2],
    pub fna: u8,
    pub vwc: u8,
    pub awun: [u8; 2],
    pub awupf: [u8; 2],
    pub nvscc: u8,
    pub rsvd531: u8,
    pub acwu: [u8; 2],
    pub rsvd534: [u8; 2],
    pub sgls: [u8; 4],
    pub rsvd540: [u8; 1508],
    pub psd: [PowerStateDescriptor; POWER_STATE_COUNT],
    pub vs: [u8; 1024],
}

const _: () = assert!(std::mem::size_of::<PowerStateDescriptor>() == 32);
const _: () = assert!(std::mem::size_of::<IdentifyController>() == IDENTIFY_DATA_SIZE);

impl IdentifyController {
    /// Zero-filled structure on the heap.
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self::new_zeroed())
    }

    /// Bring every multi-byte numeric field into host order.
    ///
    /// Wire order is little-endian, so this is a no-op unless `host` is
    /// big-endian.  Text and reserved byte arrays are left alone.
    pub fn correct_byte_order(&mut self, host: ByteOrder) {
        if host.needs_swap() {
            self.swap_numeric_fields();
        }
    }

    fn swap_numeric_fields(&mut self) {
        for f in [
            &mut self.vid,
            &mut self.ssvid,
            &mut self.cntlid,
            &mut self.oacs,
            &mut self.wctemp,
            &mut self.cctemp,
            &mut self.mtfa,
            &mut self.oncs,
            &mut self.fuses,
            &mut self.awun,
            &mut self.awupf,
            &mut self.acwu,
        ] {
            swap2(f);
        }
        for f in [
            &mut self.ver,
            &mut self.rtd3r,
            &mut self.rtd3e,
            &mut self.oaes,
            &mut self.hmpre,
            &mut self.hmmin,
            &mut self.rpmbs,
            &mut self.nn,
            &mut self.sgls,
        ] {
            swap4(f);
        }
        for ps in &mut self.psd {
            swap2(&mut ps.max_power);
            swap4(&mut ps.entry_lat);
            swap4(&mut ps.exit_lat);
            swap2(&mut ps.idle_power);
            swap2(&mut ps.active_power);
        }
    }
}

// ── Decoded views ──

/// One power state with numbers decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerState {
    pub max_power_cw: u16,
    pub non_operational: bool,
    pub entry_latency_us: u32,
    pub exit_latency_us: u32,
    pub idle_power: u16,
    pub active_power: u16,
}

/// Controller identify data plus the byte order its numbers are held in.
#[derive(Debug, Clone)]
pub struct ControllerIdentity {
    data: Box<IdentifyController>,
    order: ByteOrder,
}

impl ControllerIdentity {
    /// Wrap a raw structure whose numeric fields are already in `order`.
    pub fn from_raw(data: Box<IdentifyController>, order: ByteOrder) -> Self {
        ControllerIdentity { data, order }
    }

    /// Wrap a wire-format (little-endian) buffer, correcting it for `host`.
    pub fn from_wire(bytes: &[u8], host: ByteOrder) -> Option<Self> {
        let mut data = Box::new(IdentifyController::read_from_bytes(bytes).ok()?);
        data.correct_byte_order(host);
        Some(Self::from_raw(data, host))
    }

    pub fn raw(&self) -> &IdentifyController {
        &self.data
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn serial_bytes(&self) -> &[u8; 20] {
        &self.data.sn
    }

    pub fn model_bytes(&self) -> &[u8; 40] {
        &self.data.mn
    }

    pub fn firmware_bytes(&self) -> &[u8; 8] {
        &self.data.fr
    }

    pub fn serial(&self) -> String {
        field_to_string(&self.data.sn)
    }

    pub fn model(&self) -> String {
        field_to_string(&self.data.mn)
    }

    pub fn firmware(&self) -> String {
        field_to_string(&self.data.fr)
    }

    pub fn vid(&self) -> u16 {
        self.order.read_u16(self.data.vid)
    }

    pub fn ssvid(&self) -> u16 {
        self.order.read_u16(self.data.ssvid)
    }

    pub fn cntlid(&self) -> u16 {
        self.order.read_u16(self.data.cntlid)
    }

    pub fn oacs(&self) -> u16 {
        self.order.read_u16(self.data.oacs)
    }

    /// Raw VER register value (0 on pre-1.2 controllers).
    pub fn ver(&self) -> u32 {
        self.order.read_u32(self.data.ver)
    }

    /// NVMe version as `major.minor[.tertiary]`, if reported.
    pub fn version(&self) -> Option<String> {
        let v = self.ver();
        if v == 0 {
            return None;
        }
        let (major, minor, ter) = (v >> 16, (v >> 8) & 0xFF, v & 0xFF);
        Some(if ter == 0 {
            format!("{major}.{minor}")
        } else {
            format!("{major}.{minor}.{ter}")
        })
    }

    /// Number of namespaces (NN).
    pub fn namespace_count(&self) -> u32 {
        self.order.read_u32(self.data.nn)
    }

    /// IEEE OUI identifier, least significant byte first on the wire.
    pub fn ieee_oui(&self) -> u32 {
        let [a, b, c] = self.data.ieee;
        u32::from_le_bytes([a, b, c, 0])
    }

    /// Maximum data transfer size exponent (MDTS), 0 = unlimited.
    pub fn max_data_transfer(&self) -> u8 {
        self.data.mdts
    }

    /// Total NVM capacity in bytes (TNVMCAP, 128-bit little-endian).
    pub fn total_capacity(&self) -> u128 {
        u128::from_le_bytes(self.data.tnvmcap)
    }

    /// Number of supported power states (NPSS is zero-based).
    pub fn power_state_count(&self) -> usize {
        (self.data.npss as usize + 1).min(POWER_STATE_COUNT)
    }

    pub fn power_state(&self, index: usize) -> Option<PowerState> {
        let ps = self.data.psd.get(index)?;
        Some(PowerState {
            max_power_cw: self.order.read_u16(ps.max_power),
            non_operational: ps.flags & 0x02 != 0,
            entry_latency_us: self.order.read_u32(ps.entry_lat),
            exit_latency_us: self.order.read_u32(ps.exit_lat),
            idle_power: self.order.read_u16(ps.idle_power),
            active_power: self.order.read_u16(ps.active_power),
        })
    }
}

// ── Commands ──

/// Issues Identify commands over a channel.
#[derive(Debug, Clone, Copy)]
pub struct IdentifyReader {
    host: ByteOrder,
    timeout_ms: u32,
}

impl IdentifyReader {
    pub fn new(host: ByteOrder) -> Self {
        IdentifyReader {
            host,
            timeout_ms: 0,
        }
    }

    /// Command timeout; 0 keeps the kernel default.
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Zero `data`, then read the structure selected by `cns` into it.
    ///
    /// On error the contents of `data` are unspecified.
    pub fn read_identify(
        &self,
        dev: &impl NvmeChannel,
        nsid: u32,
        cns: u32,
        data: &mut [u8],
    ) -> Result<CommandCompletion> {
        data.fill(0);
        let mut cmd = AdminCommand::data_in(AdminOpcode::Identify, nsid, data)?.with_cdw10(cns);
        cmd.timeout_ms = self.timeout_ms;
        dev.submit(&mut cmd)
    }

    /// Read and byte-order-correct the Identify Controller structure.
    pub fn read_controller(&self, dev: &impl NvmeChannel) -> Result<ControllerIdentity> {
        let mut data = IdentifyController::new_boxed();
        self.read_identify(
            dev,
            NSID_CONTROLLER,
            IDENTIFY_CNS_CONTROLLER,
            data.as_mut_bytes(),
        )?;
        data.correct_byte_order(self.host);
        Ok(ControllerIdentity::from_raw(data, self.host))
    }
}

/// Read the controller identity with the kernel's default timeout.
pub fn read_controller_identity(
    dev: &impl NvmeChannel,
    host: ByteOrder,
) -> Result<ControllerIdentity> {
    IdentifyReader::new(host).read_controller(dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::device::mock::{MockChannel, MockResponse};
    use crate::protocol::DataDirection;
    use std::mem::offset_of;

    fn wire() -> Vec<u8> {
        let mut b = vec![0u8; IDENTIFY_DATA_SIZE];
        b[0..2].copy_from_slice(&[0x34, 0x12]); // vid 0x1234
        b[2..4].copy_from_slice(&[0x4D, 0x14]); // ssvid 0x144D
        b[4..24].copy_from_slice(b"  S4EWNX0R123456    ");
        b[24..64].fill(b' ');
        b[24..31].copy_from_slice(b"Model-X");
        b[64..72].copy_from_slice(b"2B2QEXM7");
        b[73..76].copy_from_slice(&[0x38, 0x25, 0x00]);
        b[77] = 9; // mdts
        b[78..80].copy_from_slice(&[0x05, 0x00]); // cntlid
        b[80..84].copy_from_slice(&0x0001_0300u32.to_le_bytes()); // ver 1.3
        b[263] = 2; // npss
        b[280..296].copy_from_slice(&500_107_862_016u128.to_le_bytes());
        b[516..520].copy_from_slice(&1u32.to_le_bytes()); // nn
        // psd[0]
        b[2048..2050].copy_from_slice(&790u16.to_le_bytes());
        b[2052..2056].copy_from_slice(&0x0102_0304u32.to_le_bytes());
        b[2056..2060].copy_from_slice(&200u32.to_le_bytes());
        // psd[2] non-operational
        b[2048 + 64 + 3] = 0x02;
        b
    }

    #[test]
    fn layout_matches_protocol() {
        assert_eq!(std::mem::size_of::<IdentifyController>(), 4096);
        assert_eq!(offset_of!(IdentifyController, sn), 4);
        assert_eq!(offset_of!(IdentifyController, mn), 24);
        assert_eq!(offset_of!(IdentifyController, fr), 64);
        assert_eq!(offset_of!(IdentifyController, cntlid), 78);
        assert_eq!(offset_of!(IdentifyController, ver), 80);
        assert_eq!(offset_of!(IdentifyController, oacs), 256);
        assert_eq!(offset_of!(IdentifyController, npss), 263);
        assert_eq!(offset_of!(IdentifyController, wctemp), 266);
        assert_eq!(offset_of!(IdentifyController, hmpre), 272);
        assert_eq!(offset_of!(IdentifyController, tnvmcap), 280);
        assert_eq!(offset_of!(IdentifyController, rpmbs), 312);
        assert_eq!(offset_of!(IdentifyController, sqes), 512);
        assert_eq!(offset_of!(IdentifyController, nn), 516);
        assert_eq!(offset_of!(IdentifyController, oncs), 520);
        assert_eq!(offset_of!(IdentifyController, acwu), 532);
        assert_eq!(offset_of!(IdentifyController, sgls), 536);
        assert_eq!(offset_of!(IdentifyController, psd), 2048);
        assert_eq!(offset_of!(IdentifyController, vs), 3072);
        assert_eq!(offset_of!(PowerStateDescriptor, entry_lat), 4);
        assert_eq!(offset_of!(PowerStateDescriptor, idle_power), 16);
        assert_eq!(offset_of!(PowerStateDescriptor, active_power), 20);
    }

    #[test]
    fn little_endian_host_reads_wire_unchanged() {
        let id = ControllerIdentity::from_wire(&wire(), ByteOrder::Little).unwrap();
        assert_eq!(id.raw().vid, [0x34, 0x12]);
        assert_eq!(id.vid(), 0x1234);
        assert_eq!(id.ssvid(), 0x144D);
        assert_eq!(id.cntlid(), 5);
        assert_eq!(id.namespace_count(), 1);
    }

    #[test]
    fn big_endian_host_swaps_numeric_fields() {
        let id = ControllerIdentity::from_wire(&wire(), ByteOrder::Big).unwrap();
        assert_eq!(id.raw().vid, [0x12, 0x34]);
        assert_eq!(id.vid(), 0x1234);
        assert_eq!(id.ssvid(), 0x144D);
        assert_eq!(id.cntlid(), 5);
        assert_eq!(id.ver(), 0x0001_0300);
        assert_eq!(id.namespace_count(), 1);
        let ps = id.power_state(0).unwrap();
        assert_eq!(ps.max_power_cw, 790);
        assert_eq!(ps.entry_latency_us, 0x0102_0304);
        assert_eq!(ps.exit_latency_us, 200);
    }

    #[test]
    fn both_orders_decode_identically() {
        let le = ControllerIdentity::from_wire(&wire(), ByteOrder::Little).unwrap();
        let be = ControllerIdentity::from_wire(&wire(), ByteOrder::Big).unwrap();
        assert_eq!(le.vid(), be.vid());
        assert_eq!(le.ver(), be.ver());
        for i in 0..POWER_STATE_COUNT {
            assert_eq!(le.power_state(i), be.power_state(i));
        }
    }

    #[test]
    fn text_fields_are_not_swapped() {
        let be = ControllerIdentity::from_wire(&wire(), ByteOrder::Big).unwrap();
        assert_eq!(be.model(), "Model-X");
        assert_eq!(be.serial(), "S4EWNX0R123456");
        assert_eq!(be.firmware(), "2B2QEXM7");
        assert_eq!(&be.firmware_bytes()[..], b"2B2QEXM7");
        assert_eq!(be.raw().ieee, [0x38, 0x25, 0x00]);
    }

    #[test]
    fn big_endian_swap_twice_restores_wire() {
        let mut data = Box::new(IdentifyController::read_from_bytes(&wire()).unwrap());
        data.correct_byte_order(ByteOrder::Big);
        data.correct_byte_order(ByteOrder::Big);
        assert_eq!(data.as_bytes(), &wire()[..]);
    }

    #[test]
    fn little_endian_correction_is_noop() {
        let mut data = Box::new(IdentifyController::read_from_bytes(&wire()).unwrap());
        data.correct_byte_order(ByteOrder::Little);
        assert_eq!(data.as_bytes(), &wire()[..]);
    }

    #[test]
    fn decoded_extras() {
        let id = ControllerIdentity::from_wire(&wire(), ByteOrder::Little).unwrap();
        assert_eq!(id.version().as_deref(), Some("1.3"));
        assert_eq!(id.ieee_oui(), 0x002538);
        assert_eq!(id.max_data_transfer(), 9);
        assert_eq!(id.total_capacity(), 500_107_862_016);
        assert_eq!(id.power_state_count(), 3);
        assert!(id.power_state(2).unwrap().non_operational);
        assert!(id.power_state(POWER_STATE_COUNT).is_none());
    }

    #[test]
    fn version_absent_when_zero() {
        let id = ControllerIdentity::from_wire(&[0u8; 4096], ByteOrder::Little).unwrap();
        assert_eq!(id.version(), None);
        let mut b = vec![0u8; 4096];
        b[80..84].copy_from_slice(&0x0001_0401u32.to_le_bytes());
        let id = ControllerIdentity::from_wire(&b, ByteOrder::Little).unwrap();
        assert_eq!(id.version().as_deref(), Some("1.4.1"));
    }

    #[test]
    fn from_wire_rejects_short_buffer() {
        assert!(ControllerIdentity::from_wire(&[0u8; 100], ByteOrder::Little).is_none());
    }

    #[test]
    fn read_controller_submits_identify_cns_1() {
        let mut dev = MockChannel::new();
        dev.open().unwrap();
        dev.push_response(MockResponse::Data(wire()));
        let id = read_controller_identity(&dev, ByteOrder::Little).unwrap();
        assert_eq!(id.model(), "Model-X");

        let sub = dev.submitted.borrow();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].opcode, AdminOpcode::Identify);
        assert_eq!(sub[0].nsid, 0);
        assert_eq!(sub[0].cdw10, 0x01);
        assert_eq!(sub[0].direction, DataDirection::In);
        assert_eq!(sub[0].data_len, 4096);
    }

    #[test]
    fn read_controller_propagates_status_error() {
        let mut dev = MockChannel::new();
        dev.open().unwrap();
        dev.push_response(MockResponse::Status(0x4002));
        let err = read_controller_identity(&dev, ByteOrder::Little).unwrap_err();
        assert!(matches!(err, DeviceError::CommandStatus(0x4002)));
    }

    #[test]
    fn read_controller_on_closed_channel() {
        let dev = MockChannel::new();
        let err = read_controller_identity(&dev, ByteOrder::Little).unwrap_err();
        assert!(matches!(err, DeviceError::NotOpen));
    }

    #[test]
    fn read_identify_zero_fills_before_submit() {
        let mut dev = MockChannel::new();
        dev.open().unwrap();
        dev.push_response(MockResponse::Data(vec![0xAB; 2]));
        let mut buf = vec![0xFFu8; 16];
        IdentifyReader::new(ByteOrder::Little)
            .read_identify(&dev, 1, 0x00, &mut buf)
            .unwrap();
        assert_eq!(&buf[..2], &[0xAB, 0xAB]);
        assert!(buf[2..].iter().all(|&b| b == 0));
        assert_eq!(dev.submitted.borrow()[0].nsid, 1);
        assert_eq!(dev.submitted.borrow()[0].cdw10, 0x00);
    }
}

//! Raw HCI socket backend.
//!
//! Scans for BLE advertisements through a raw Linux HCI socket, without
//! the BlueZ daemon. Requires CAP_NET_RAW and CAP_NET_ADMIN capabilities
//! or root privileges. Each LE Advertising Report is parsed into a full
//! [`AdvertEvent`]: local name, manufacturer data, 16-bit-UUID service
//! data and the trailing RSSI byte.

use super::{
    AD_TYPE_COMPLETE_NAME, AD_TYPE_MANUFACTURER_DATA, AD_TYPE_SERVICE_DATA_16, AD_TYPE_SHORT_NAME,
    EVENT_CHANNEL_BUFFER_SIZE, EventError, EventResult, PermissionStatus, ScanError,
};
use crate::advert::{AdvertEvent, AdvertPayload};
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

/// Bluetooth base UUID with a 16-bit UUID substituted in, matching the key
/// format the BlueZ backend produces for service data.
fn expand_uuid16(uuid16: u16) -> String {
    format!("0000{uuid16:04x}-0000-1000-8000-00805f9b34fb")
}

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Scan Parameters command
#[repr(C, packed)]
struct LeSetScanParametersCmd {
    scan_type: u8,
    interval: u16,
    window: u16,
    own_address_type: u8,
    filter_policy: u8,
}

/// LE Set Scan Enable command
#[repr(C, packed)]
struct LeSetScanEnableCmd {
    enable: u8,
    filter_dup: u8,
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.push((opcode & 0xFF) as u8);
    packet.push((opcode >> 8) as u8);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Open a raw, non-blocking HCI socket.
fn open_hci_socket() -> io::Result<OwnedFd> {
    // libc directly since nix doesn't support BTPROTO_HCI.
    // SOCK_NONBLOCK is required for AsyncFd to work properly.
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> io::Result<()> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Restrict the socket to LE meta events.
fn set_hci_filter(fd: &OwnedFd) -> io::Result<()> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Send an HCI command
fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> io::Result<()> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Configure and enable passive LE scanning.
fn start_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    // Passive scan, 10ms interval, 10ms window (in 0.625ms units)
    let params = LeSetScanParametersCmd {
        scan_type: LE_SCAN_PASSIVE,
        interval: 0x0010,
        window: 0x0010,
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_ACCEPT_ALL,
    };

    let params_bytes = unsafe {
        std::slice::from_raw_parts(
            &params as *const LeSetScanParametersCmd as *const u8,
            mem::size_of::<LeSetScanParametersCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, params_bytes);
    send_hci_command(fd, &packet).map_err(|e| ScanError::StartFailed(e.to_string()))?;

    let enable = LeSetScanEnableCmd {
        enable: 0x01,
        filter_dup: 0x00, // Don't filter duplicates, we want RSSI updates
    };

    let enable_bytes = unsafe {
        std::slice::from_raw_parts(
            &enable as *const LeSetScanEnableCmd as *const u8,
            mem::size_of::<LeSetScanEnableCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, enable_bytes);
    send_hci_command(fd, &packet).map_err(|e| ScanError::StartFailed(e.to_string()))?;

    Ok(())
}

/// Ask the controller to cease scanning. Called when the event receiver is
/// dropped.
fn stop_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    let disable = LeSetScanEnableCmd {
        enable: 0x00,
        filter_dup: 0x00,
    };

    let disable_bytes = unsafe {
        std::slice::from_raw_parts(
            &disable as *const LeSetScanEnableCmd as *const u8,
            mem::size_of::<LeSetScanEnableCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, disable_bytes);
    send_hci_command(fd, &packet).map_err(|e| ScanError::StopFailed(e.to_string()))
}

/// Parse an LE Advertising Report event into an advertisement sighting.
///
/// Walks the AD structures collecting the local name (complete preferred
/// over shortened), manufacturer-specific data (company id stripped) and
/// 16-bit-UUID service data, then reads the RSSI byte that trails the AD
/// data. Malformed reports yield `None`, or `Some(Err(..))` in verbose
/// mode.
fn parse_advertising_report(data: &[u8], verbose: bool) -> Option<EventResult> {
    let malformed = |what: &str| -> Option<EventResult> {
        verbose.then(|| Err(EventError::MalformedReport(what.to_string())))
    };

    // Minimum size for an advertising report
    if data.len() < 12 {
        return malformed("advertising report too short");
    }

    // Skip HCI header (1 byte packet type + 1 byte event code + 1 byte param len + 1 byte subevent)
    let report = &data[4..];

    // Number of reports; we process the first one
    let num_reports = report[0] as usize;
    if num_reports == 0 {
        return None;
    }

    // Layout: num_reports(1) event_type(1) addr_type(1) addr(6) data_len(1)
    if report.len() < 10 {
        return malformed("advertising report header truncated");
    }

    // Extract address (6 bytes, in reverse order)
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&report[3..9]);
    addr.reverse(); // HCI uses little-endian address

    let data_len = report[9] as usize;

    // AD data plus the trailing RSSI byte must fit
    if report.len() < 10 + data_len + 1 {
        return malformed("advertising report data truncated");
    }

    let ad_data = &report[10..10 + data_len];
    let rssi = i16::from(report[10 + data_len] as i8);

    let mut complete_name: Option<String> = None;
    let mut short_name: Option<String> = None;
    let mut manufacturer_data: Option<Vec<u8>> = None;
    let mut service_data: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let mut offset = 0;
    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        let value = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_TYPE_COMPLETE_NAME => {
                complete_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_SHORT_NAME => {
                short_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TYPE_MANUFACTURER_DATA if value.len() >= 2 => {
                // Strip the little-endian company identifier so both
                // backends hand the parser the same bytes.
                manufacturer_data = Some(value[2..].to_vec());
            }
            AD_TYPE_SERVICE_DATA_16 if value.len() >= 2 => {
                let uuid16 = u16::from_le_bytes([value[0], value[1]]);
                service_data.insert(expand_uuid16(uuid16), value[2..].to_vec());
            }
            _ => {}
        }

        offset += 1 + len;
    }

    Some(Ok(AdvertEvent {
        mac: MacAddress(addr),
        name: complete_name.or(short_name),
        rssi,
        payload: AdvertPayload {
            manufacturer_data,
            service_data,
        },
    }))
}

/// Start scanning for BLE devices using raw HCI sockets.
///
/// Opens a raw HCI socket, enables passive LE scanning and forwards every
/// advertising report through the returned channel. Scanning is disabled
/// again when the receiver is dropped.
///
/// # Arguments
/// * `verbose` - If true, malformed reports are sent as Err values;
///   otherwise they're silently dropped.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan(verbose: bool) -> Result<mpsc::Receiver<EventResult>, ScanError> {
    // Open and configure HCI socket for receiving events
    let fd = open_hci_socket().map_err(|e| ScanError::Init(e.to_string()))?;
    bind_hci_socket(&fd, 0).map_err(|e| ScanError::Init(e.to_string()))?; // hci0
    set_hci_filter(&fd).map_err(|e| ScanError::Init(e.to_string()))?;

    // A separate socket for sending commands
    let cmd_fd = open_hci_socket().map_err(|e| ScanError::Init(e.to_string()))?;
    bind_hci_socket(&cmd_fd, 0).map_err(|e| ScanError::Init(e.to_string()))?;
    start_le_scan(&cmd_fd)?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);

    let async_fd = AsyncFd::new(fd)
        .map_err(|e| ScanError::Init(format!("Failed to create async fd: {}", e)))?;

    // Spawn a task to read and process HCI events
    tokio::spawn(async move {
        let mut buf = [0u8; 258]; // Max HCI event size

        'outer: loop {
            // Wait for the socket to be readable
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(_) => break,
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                }) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break 'outer, // EOF
                    Ok(Err(_)) => break 'outer, // Read error
                    Err(_) => break, // WouldBlock - no more data
                };

                if n >= 4 && buf[0] == HCI_EVENT_PKT && buf[1] == EVT_LE_META_EVENT {
                    let subevent = buf[3];
                    if subevent == EVT_LE_ADVERTISING_REPORT
                        && let Some(result) = parse_advertising_report(&buf[..n], verbose)
                        && tx.send(result).await.is_err()
                    {
                        // Receiver dropped: the session asked us to stop.
                        break 'outer;
                    }
                }
            }
        }

        let _ = stop_le_scan(&cmd_fd);
    });

    Ok(rx)
}

/// Report whether raw HCI scanning is possible right now.
///
/// Probes socket creation and binding to hci0 so a missing capability or
/// adapter becomes a readable status instead of a failed scan.
pub fn check_permissions() -> Result<PermissionStatus, ScanError> {
    let denied = |e: &io::Error| {
        matches!(e.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES))
    };

    let fd = match open_hci_socket() {
        Ok(fd) => fd,
        Err(e) if denied(&e) => {
            return Ok(PermissionStatus {
                adapter_present: true,
                scan_allowed: false,
                detail: Some(format!("raw HCI sockets need CAP_NET_RAW: {e}")),
            });
        }
        Err(e) => return Err(ScanError::Init(e.to_string())),
    };

    match bind_hci_socket(&fd, 0) {
        Ok(()) => Ok(PermissionStatus {
            adapter_present: true,
            scan_allowed: true,
            detail: None,
        }),
        Err(e) if denied(&e) => Ok(PermissionStatus {
            adapter_present: true,
            scan_allowed: false,
            detail: Some(format!("binding hci0 was denied: {e}")),
        }),
        Err(e) => Ok(PermissionStatus {
            adapter_present: false,
            scan_allowed: false,
            detail: Some(format!("no usable HCI device: {e}")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a full advertising-report packet around the given AD bytes.
    fn report_packet(addr_le: [u8; 6], ad: &[u8], rssi: i8) -> Vec<u8> {
        let mut packet = vec![
            HCI_EVENT_PKT,
            EVT_LE_META_EVENT,
            0x00, // param len, unused by the parser
            EVT_LE_ADVERTISING_REPORT,
            0x01, // one report
            0x00, // event type
            0x00, // address type
        ];
        packet.extend_from_slice(&addr_le);
        packet.push(ad.len() as u8);
        packet.extend_from_slice(ad);
        packet.push(rssi as u8);
        packet
    }

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    #[test]
    fn test_expand_uuid16() {
        assert_eq!(
            expand_uuid16(0x180A),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_parse_report_with_name_and_manufacturer_data() {
        let ad = [
            5, AD_TYPE_COMPLETE_NAME, b'G', b'r', b'i', b'p', // "Grip"
            7, AD_TYPE_MANUFACTURER_DATA, 0x34, 0x12, 0x00, 0x00, 0x01, 0x2C,
        ];
        // Address on the wire is little-endian
        let packet = report_packet([0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA], &ad, -42);

        let event = parse_advertising_report(&packet, false).unwrap().unwrap();
        assert_eq!(event.mac, MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
        assert_eq!(event.name.as_deref(), Some("Grip"));
        assert_eq!(event.rssi, -42);
        // Company id 0x1234 stripped
        assert_eq!(
            event.payload.manufacturer_data,
            Some(vec![0x00, 0x00, 0x01, 0x2C])
        );
        assert!(event.payload.service_data.is_empty());
    }

    #[test]
    fn test_parse_report_with_service_data() {
        let ad = [5, AD_TYPE_SERVICE_DATA_16, 0x0A, 0x18, 0x00, 0x0A];
        let packet = report_packet([0x01, 0x02, 0x03, 0x04, 0x05, 0x06], &ad, -60);

        let event = parse_advertising_report(&packet, false).unwrap().unwrap();
        assert_eq!(event.name, None);
        assert_eq!(
            event.payload.service_data.get("0000180a-0000-1000-8000-00805f9b34fb"),
            Some(&vec![0x00, 0x0A])
        );
    }

    #[test]
    fn test_parse_report_prefers_complete_name() {
        let ad = [
            3, AD_TYPE_SHORT_NAME, b'G', b'r',
            5, AD_TYPE_COMPLETE_NAME, b'G', b'r', b'i', b'p',
        ];
        let packet = report_packet([0x01, 0x02, 0x03, 0x04, 0x05, 0x06], &ad, -60);

        let event = parse_advertising_report(&packet, false).unwrap().unwrap();
        assert_eq!(event.name.as_deref(), Some("Grip"));
    }

    #[test]
    fn test_parse_report_without_payload() {
        let ad = [3, AD_TYPE_SHORT_NAME, b'T', b'V'];
        let packet = report_packet([0x01, 0x02, 0x03, 0x04, 0x05, 0x06], &ad, -70);

        let event = parse_advertising_report(&packet, false).unwrap().unwrap();
        assert_eq!(event.name.as_deref(), Some("TV"));
        assert_eq!(event.payload.manufacturer_data, None);
    }

    #[test]
    fn test_parse_truncated_report() {
        assert!(parse_advertising_report(&[HCI_EVENT_PKT, EVT_LE_META_EVENT], false).is_none());

        let result = parse_advertising_report(&[HCI_EVENT_PKT, EVT_LE_META_EVENT], true).unwrap();
        assert!(matches!(result, Err(EventError::MalformedReport(_))));
    }

    #[test]
    fn test_parse_report_with_lying_data_len() {
        let ad = [3, AD_TYPE_SHORT_NAME, b'T', b'V'];
        let mut packet = report_packet([0x01, 0x02, 0x03, 0x04, 0x05, 0x06], &ad, -70);
        // Claim more AD bytes than the packet holds
        packet[13] = 0x20;

        assert!(parse_advertising_report(&packet, false).is_none());
    }
}

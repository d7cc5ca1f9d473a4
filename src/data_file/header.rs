//! Binary fragment header and trigger-candidate decoding.
//!
//! Every fragment stored in a raw data file starts with a fixed 72-byte,
//! little-endian header:
//!
//! ```text
//! offset  size  field
//!      0     4  marker (0x11112222)
//!      4     4  version
//!      8     8  size (header + payload, bytes)
//!     16     8  trigger_number
//!     24     8  trigger_timestamp
//!     32     8  window_begin
//!     40     8  window_end
//!     48     4  run_number
//!     52     4  error_bits
//!     56     4  fragment_type
//!     60     2  sequence_number
//!     62     2  detector_id
//!     64     2  source version
//!     66     2  source subsystem
//!     68     4  source id
//! ```
//!
//! The payload of a `Trigger_Candidate` fragment begins with the candidate data,
//! whose type code sits at [`TC_TYPE_OFFSET`].

use std::fmt;

use super::{SourceId, Subsystem};
use crate::error::{CheckResult, IntegtestError};

/// Size of the fixed fragment header in bytes.
pub const FRAGMENT_HEADER_SIZE: usize = 72;
/// Magic number at the start of every fragment header.
pub const FRAGMENT_HEADER_MARKER: u32 = 0x1111_2222;
/// Header version written by [`FragmentHeader::new`].
pub const FRAGMENT_HEADER_VERSION: u32 = 5;

/// Offset of the candidate type code inside a trigger-candidate payload.
pub const TC_TYPE_OFFSET: usize = 34;
/// Type string used when a record's trigger candidate cannot be decoded.
pub const UNKNOWN_TC_TYPE: &str = "kUnknown";

const FRAGMENT_TYPE_NAMES: [&str; 16] = [
    "Unknown",
    "ProtoWIB",
    "WIB",
    "DAPHNE",
    "TDE_AMC",
    "FW_Trigger_Primitive",
    "Trigger_Primitive",
    "Trigger_Activity",
    "Trigger_Candidate",
    "Hardware_Signal",
    "PACMAN",
    "MPD",
    "WIBEth",
    "DAPHNEStream",
    "CRT",
    "TDEEth",
];

const TC_TYPE_NAMES: [&str; 16] = [
    "kUnknown",
    "kTiming",
    "kTPCLowE",
    "kSupernova",
    "kRandom",
    "kPrescale",
    "kADCSimpleWindow",
    "kHorizontalMuon",
    "kMichelElectron",
    "kPlaneCoincidence",
    "kDBSCAN",
    "kChannelDistance",
    "kBundle",
    "kCTBFakeTrigger",
    "kCTBBeam",
    "kCTBBeamChkvHL",
];

const ERROR_BIT_NAMES: [&str; 3] = ["kDataNotFound", "kIncomplete", "kInvalidWindow"];

/// Name of a fragment type code, or `None` for codes this crate does not know.
pub fn fragment_type_name(code: u32) -> Option<&'static str> {
    FRAGMENT_TYPE_NAMES.get(code as usize).copied()
}

/// Fragment type code for a name such as `"Trigger_Candidate"`.
pub fn fragment_type_code(name: &str) -> Option<u32> {
    FRAGMENT_TYPE_NAMES
        .iter()
        .position(|n| *n == name)
        .map(|i| i as u32)
}

/// Name of a trigger-candidate type code; unknown codes map to `"kUnknown"`.
pub fn tc_type_name(code: u16) -> &'static str {
    TC_TYPE_NAMES
        .get(code as usize)
        .copied()
        .unwrap_or(UNKNOWN_TC_TYPE)
}

/// Subdetector name for a detector id.
pub fn subdetector_name(detector_id: u16) -> &'static str {
    match detector_id {
        1 => "DAQ",
        2 => "HD_PDS",
        3 => "HD_TPC",
        4 => "HD_CRT",
        8 => "VD_CathodePDS",
        9 => "VD_MembranePDS",
        10 => "VD_BottomTPC",
        11 => "VD_TopTPC",
        32 => "NDLAr_TPC",
        33 => "NDLAr_PDS",
        34 => "ND_GAr",
        _ => "Unknown",
    }
}

/// Names of the bits set in a fragment's error word, lowest bit first.
pub fn error_bit_names(error_bits: u32) -> Vec<String> {
    (0u32..32)
        .filter(|bit| error_bits & (1u32 << bit) != 0)
        .map(|bit| match ERROR_BIT_NAMES.get(bit as usize) {
            Some(name) => name.to_string(),
            None => format!("kUnassigned{bit}"),
        })
        .collect()
}

/// Decoded fixed-size fragment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Layout version.
    pub version: u32,
    /// Total fragment size including this header.
    pub size: u64,
    /// Trigger number of the owning record.
    pub trigger_number: u64,
    /// Trigger timestamp.
    pub trigger_timestamp: u64,
    /// Readout window start.
    pub window_begin: u64,
    /// Readout window end.
    pub window_end: u64,
    /// Run number.
    pub run_number: u32,
    /// Error flags, see [`error_bit_names`].
    pub error_bits: u32,
    /// Fragment type code, see [`fragment_type_name`].
    pub fragment_type: u32,
    /// Sequence number of the owning record.
    pub sequence_number: u16,
    /// Detector id, see [`subdetector_name`].
    pub detector_id: u16,
    /// Producer of the fragment.
    pub source_id: SourceId,
}

impl FragmentHeader {
    /// Header for a fragment of `fragment_type` carrying `payload_len` bytes.
    pub fn new(fragment_type: u32, source_id: SourceId, payload_len: usize) -> Self {
        Self {
            version: FRAGMENT_HEADER_VERSION,
            size: (FRAGMENT_HEADER_SIZE + payload_len) as u64,
            trigger_number: 0,
            trigger_timestamp: 0,
            window_begin: 0,
            window_end: 0,
            run_number: 0,
            error_bits: 0,
            fragment_type,
            sequence_number: 0,
            detector_id: 0,
            source_id,
        }
    }

    /// Decode a header from the first [`FRAGMENT_HEADER_SIZE`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> CheckResult<Self> {
        if bytes.len() < FRAGMENT_HEADER_SIZE {
            return Err(IntegtestError::DataFile(format!(
                "fragment of {} bytes is shorter than its {FRAGMENT_HEADER_SIZE}-byte header",
                bytes.len()
            )));
        }
        let marker = read_u32(bytes, 0);
        if marker != FRAGMENT_HEADER_MARKER {
            return Err(IntegtestError::DataFile(format!(
                "bad fragment header marker {marker:#010x}"
            )));
        }
        Ok(Self {
            version: read_u32(bytes, 4),
            size: read_u64(bytes, 8),
            trigger_number: read_u64(bytes, 16),
            trigger_timestamp: read_u64(bytes, 24),
            window_begin: read_u64(bytes, 32),
            window_end: read_u64(bytes, 40),
            run_number: read_u32(bytes, 48),
            error_bits: read_u32(bytes, 52),
            fragment_type: read_u32(bytes, 56),
            sequence_number: read_u16(bytes, 60),
            detector_id: read_u16(bytes, 62),
            source_id: SourceId {
                subsystem: Subsystem::from_code(read_u16(bytes, 66)),
                id: read_u32(bytes, 68),
            },
        })
    }

    /// Encode the header in its on-disk layout.
    pub fn encode(&self) -> [u8; FRAGMENT_HEADER_SIZE] {
        let mut out = [0u8; FRAGMENT_HEADER_SIZE];
        out[0..4].copy_from_slice(&FRAGMENT_HEADER_MARKER.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..16].copy_from_slice(&self.size.to_le_bytes());
        out[16..24].copy_from_slice(&self.trigger_number.to_le_bytes());
        out[24..32].copy_from_slice(&self.trigger_timestamp.to_le_bytes());
        out[32..40].copy_from_slice(&self.window_begin.to_le_bytes());
        out[40..48].copy_from_slice(&self.window_end.to_le_bytes());
        out[48..52].copy_from_slice(&self.run_number.to_le_bytes());
        out[52..56].copy_from_slice(&self.error_bits.to_le_bytes());
        out[56..60].copy_from_slice(&self.fragment_type.to_le_bytes());
        out[60..62].copy_from_slice(&self.sequence_number.to_le_bytes());
        out[62..64].copy_from_slice(&self.detector_id.to_le_bytes());
        out[64..66].copy_from_slice(&0u16.to_le_bytes());
        out[66..68].copy_from_slice(&self.source_id.subsystem.code().to_le_bytes());
        out[68..72].copy_from_slice(&self.source_id.id.to_le_bytes());
        out
    }

    /// Fragment type name, `"Unknown"` for unrecognised codes.
    pub fn fragment_type_name(&self) -> &'static str {
        fragment_type_name(self.fragment_type).unwrap_or("Unknown")
    }

    /// Subdetector name derived from the detector id.
    pub fn subdetector(&self) -> &'static str {
        subdetector_name(self.detector_id)
    }
}

/// A fragment read from a data file: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Decoded header.
    pub header: FragmentHeader,
    /// Bytes following the header.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Split raw fragment bytes into header and payload.
    pub fn decode(bytes: &[u8]) -> CheckResult<Self> {
        let header = FragmentHeader::decode(bytes)?;
        Ok(Self {
            header,
            payload: bytes[FRAGMENT_HEADER_SIZE..].to_vec(),
        })
    }

    /// Total size in bytes as recorded in the header.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    /// Trigger-candidate type carried by this fragment.
    ///
    /// Returns `None` when the fragment has no payload beyond its header or the
    /// payload is too short to hold the type code.
    pub fn tc_type(&self) -> Option<&'static str> {
        if self.size() <= FRAGMENT_HEADER_SIZE as u64 {
            return None;
        }
        let raw = self.payload.get(TC_TYPE_OFFSET..TC_TYPE_OFFSET + 2)?;
        Some(tc_type_name(u16::from_le_bytes([raw[0], raw[1]])))
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fragment from {} ({} bytes)",
            self.header.fragment_type_name(),
            self.header.source_id,
            self.size()
        )
    }
}

/// Payload bytes of a trigger candidate with the given type code.
pub fn tc_payload(tc_type: u16) -> Vec<u8> {
    let mut payload = vec![0u8; TC_TYPE_OFFSET + 8];
    payload[TC_TYPE_OFFSET..TC_TYPE_OFFSET + 2].copy_from_slice(&tc_type.to_le_bytes());
    payload
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

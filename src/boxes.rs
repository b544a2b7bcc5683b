use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(b: &[u8; 4]) -> Self {
        FourCC(*b)
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

pub const UUID: FourCC = FourCC::new(b"uuid");
pub const MDAT: FourCC = FourCC::new(b"mdat");
pub const MOOV: FourCC = FourCC::new(b"moov");
pub const MOOF: FourCC = FourCC::new(b"moof");
pub const TRAK: FourCC = FourCC::new(b"trak");
pub const MDIA: FourCC = FourCC::new(b"mdia");
pub const MINF: FourCC = FourCC::new(b"minf");
pub const STBL: FourCC = FourCC::new(b"stbl");
pub const STSD: FourCC = FourCC::new(b"stsd");
pub const STPP: FourCC = FourCC::new(b"stpp");
pub const PSSH: FourCC = FourCC::new(b"pssh");

/// Smallest possible box header: 32-bit size followed by the type.
pub const MIN_HEADER_SIZE: usize = 8;

/// Version and flags that prefix the payload of a full box.
pub const FULL_BOX_HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u64,          // total size including header; size==0 is resolved to the scope end
    pub typ: FourCC,        // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,   // 8, 16, 24 or 32
    pub start: u64,         // absolute offset of header start
}

impl BoxHeader {
    /// Absolute offset one past the last byte of the box.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Number of payload bytes the header declares.
    pub fn payload_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

//! On-disk constants and record typing for the wallet format.
//!
//! A wallet file is a fixed-size header followed by a flat record stream
//! with no trailer and no index. Each record is `tag(1) || key || body`.
//! All integers are little-endian; every checksum is the first four bytes
//! of a double SHA-256 over the protected field.

/// Leading file id, never valid UTF-8 so text tools don't mangle wallets.
pub const FILE_ID: [u8; 8] = [0xba, b'W', b'A', b'L', b'L', b'E', b'T', 0x00];

/// Current wallet file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header size; the record stream starts immediately after.
pub const HEADER_SIZE: usize = 912;

/// Fixed serialized size of an address entry.
pub const ENTRY_SIZE: usize = 237;

/// Full size of a KEYDATA record: tag + hash160 key + entry body.
pub const KEYDATA_RECORD_SIZE: usize = 1 + 20 + ENTRY_SIZE;

/// Size of the zero-padded KDF parameter block inside the header.
pub const KDF_BLOCK_SIZE: usize = 256;

/// Size of the zero-padded crypto block (key check value) inside the header.
pub const CRYPTO_BLOCK_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::Testnet => [0x0b, 0x11, 0x09, 0x07],
        }
    }

    pub fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            [0xf9, 0xbe, 0xb4, 0xd9] => Some(Network::Mainnet),
            [0x0b, 0x11, 0x09, 0x07] => Some(Network::Testnet),
            _ => None,
        }
    }

    /// Network byte prefixed to the wallet unique id.
    pub fn id_byte(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Record type tags of the wallet body stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    KeyData,
    AddrComment,
    TxComment,
    OpEval,
    Deleted,
}

impl EntryType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryType::KeyData),
            1 => Some(EntryType::AddrComment),
            2 => Some(EntryType::TxComment),
            3 => Some(EntryType::OpEval),
            4 => Some(EntryType::Deleted),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            EntryType::KeyData => 0,
            EntryType::AddrComment => 1,
            EntryType::TxComment => 2,
            EntryType::OpEval => 3,
            EntryType::Deleted => 4,
        }
    }
}

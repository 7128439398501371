pub type ModeBits = u16;

pub const PERMISSIONS_MASK: ModeBits = 0o777;
pub const TYPE_MASK: ModeBits = 0xF000;
pub const IS_DIR_MASK: ModeBits = 0x4000;
pub const IS_FILE_MASK: ModeBits = 0x8000;

pub const OWNER_READ: ModeBits = 0x0100;
pub const OWNER_WRITE: ModeBits = 0x0080;
pub const OWNER_EXECUTE: ModeBits = 0x0040;

pub const DEFAULT_DIR_MODE: ModeBits = IS_DIR_MASK | OWNER_READ | OWNER_WRITE | OWNER_EXECUTE;
pub const DEFAULT_FILE_MODE: ModeBits = IS_FILE_MASK | OWNER_READ | OWNER_WRITE;

/// The file type stored both in the mode's type nibble and in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Directory,
}

impl InodeType {
    /// The byte written into a directory entry's type field.
    pub fn to_entry_byte(self) -> u8 {
        match self {
            InodeType::File => 1,
            InodeType::Directory => 2,
        }
    }

    pub fn from_entry_byte(byte: u8) -> Option<InodeType> {
        match byte {
            1 => Some(InodeType::File),
            2 => Some(InodeType::Directory),
            _ => None,
        }
    }

    pub fn type_bits(self) -> ModeBits {
        match self {
            InodeType::File => IS_FILE_MASK,
            InodeType::Directory => IS_DIR_MASK,
        }
    }
}

pub trait ModeBitsHelper {
    fn get_permissions(&self) -> u16;
    fn inode_type(&self) -> Option<InodeType>;
    fn is_directory(&self) -> bool;
    fn is_file(&self) -> bool;
}

impl ModeBitsHelper for ModeBits {
    fn get_permissions(&self) -> u16 {
        self & PERMISSIONS_MASK
    }

    fn inode_type(&self) -> Option<InodeType> {
        match self & TYPE_MASK {
            IS_DIR_MASK => Some(InodeType::Directory),
            IS_FILE_MASK => Some(InodeType::File),
            _ => None,
        }
    }

    fn is_directory(&self) -> bool {
        (self & TYPE_MASK) == IS_DIR_MASK
    }

    fn is_file(&self) -> bool {
        (self & TYPE_MASK) == IS_FILE_MASK
    }
}

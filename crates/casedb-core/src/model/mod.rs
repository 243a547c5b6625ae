//! Typed rows and the numeric codes stored in the case database
//!
//! Every enum here round-trips through the integer stored in its column.
//! Unknown codes are reported as data errors instead of being guessed.

use serde::{Deserialize, Serialize};

/// Declares a fieldless enum backed by an integer column.
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty {
            $($variant:ident = $code:expr => $label:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Integer stored in the database
            pub fn code(self) -> $repr {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Parse a stored integer
            pub fn from_code(code: $repr) -> $crate::error::Result<Self> {
                match code {
                    $(c if c == $code => Ok($name::$variant),)+
                    other => Err($crate::error::CaseDbError::Data(format!(
                        "unknown {} code {}",
                        stringify!($name),
                        other
                    ))),
                }
            }

            /// Human readable label
            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.label())
            }
        }
    };
}

pub(crate) use code_enum;

pub mod artifact;
pub mod content;

pub use artifact::{
    ArtifactCategory, ArtifactType, Attribute, AttributeType, AttributeValue, AttributeValueType,
    BlackboardArtifact, ReviewStatus,
};
pub use content::{
    AbstractFile, Content, FileSystem, Image, LayoutRange, NewFile, Volume, VolumeSystem,
};

code_enum! {
    /// Kind of row in `tsk_objects`
    ObjectType: i32 {
        Image = 0 => "Image",
        VolumeSystem = 1 => "Volume System",
        Volume = 2 => "Volume",
        FileSystem = 3 => "File System",
        AbstractFile = 4 => "File",
        Artifact = 5 => "Artifact",
        Report = 6 => "Report",
        Pool = 7 => "Pool",
        OsAccount = 8 => "OS Account",
        HostAddress = 9 => "Host Address",
        Unsupported = 10 => "Unsupported",
    }
}

code_enum! {
    /// Origin of a `tsk_files` row
    FileType: i32 {
        Fs = 0 => "File System",
        Carved = 1 => "Carved",
        Derived = 2 => "Derived",
        Local = 3 => "Local",
        UnallocBlocks = 4 => "Unallocated Blocks",
        UnusedBlocks = 5 => "Unused Blocks",
        VirtualDir = 6 => "Virtual Directory",
        Slack = 7 => "Slack",
        LocalDir = 8 => "Local Directory",
        LayoutFile = 9 => "Layout File",
    }
}

code_enum! {
    /// Hash database verdict for a file
    FileKnown: i32 {
        Unknown = 0 => "unknown",
        Known = 1 => "known",
        Bad = 2 => "known bad",
    }
}

code_enum! {
    /// Type recorded in a file's metadata structure
    MetaType: i32 {
        Undef = 0 => "-",
        Reg = 1 => "r",
        Dir = 2 => "d",
        Fifo = 3 => "p",
        Chr = 4 => "c",
        Blk = 5 => "b",
        Lnk = 6 => "l",
        Shad = 7 => "h",
        Sock = 8 => "s",
        Wht = 9 => "w",
        Virt = 10 => "v",
    }
}

code_enum! {
    /// Type recorded in a file's name structure
    NameType: i32 {
        Undef = 0 => "-",
        Fifo = 1 => "p",
        Chr = 2 => "c",
        Dir = 3 => "d",
        Blk = 4 => "b",
        Reg = 5 => "r",
        Lnk = 6 => "l",
        Sock = 7 => "s",
        Shad = 8 => "h",
        Wht = 9 => "w",
        Virt = 10 => "v",
    }
}

code_enum! {
    /// Disk image container format
    ImageType: i32 {
        Detect = 0 => "Auto Detect",
        RawSingle = 1 => "Raw Single",
        RawSplit = 2 => "Raw Split",
        AffAff = 4 => "AFF",
        AffAfd = 8 => "AFD",
        AffAfm = 16 => "AFM",
        AffAny = 32 => "AFF",
        Ewf = 64 => "E01",
        Unsupported = 65535 => "Unsupported",
    }
}

code_enum! {
    /// Partition table type
    VsType: i32 {
        Detect = 0x0000 => "Auto Detect",
        Dos = 0x0001 => "DOS",
        Bsd = 0x0002 => "BSD",
        Sun = 0x0004 => "SUN VTOC",
        Mac = 0x0008 => "Mac",
        Gpt = 0x0010 => "GPT",
        DbFiller = 0x00F0 => "Fake",
        Unsupported = 0xFFFF => "Unsupported",
    }
}

code_enum! {
    /// File system type
    FsType: i64 {
        Detect = 0x0000_0000 => "Auto Detect",
        Ntfs = 0x0000_0001 => "NTFS",
        Fat12 = 0x0000_0002 => "FAT12",
        Fat16 = 0x0000_0004 => "FAT16",
        Fat32 = 0x0000_0008 => "FAT32",
        Ffs1 = 0x0000_0010 => "UFS1",
        Ffs1b = 0x0000_0020 => "UFS1b",
        Ffs2 = 0x0000_0040 => "UFS2",
        Ext2 = 0x0000_0080 => "Ext2",
        Ext3 = 0x0000_0100 => "Ext3",
        Swap = 0x0000_0200 => "Swap",
        Raw = 0x0000_0400 => "Raw",
        Iso9660 = 0x0000_0800 => "ISO9660",
        Hfs = 0x0000_1000 => "HFS",
        Ext4 = 0x0000_2000 => "Ext4",
        Unsupported = 0xFFFF_FFFF => "Unsupported",
    }
}

code_enum! {
    /// Status of host and person rows
    DbStatus: i32 {
        Active = 0 => "Active",
        Merged = 1 => "Merged",
        Deleted = 2 => "Deleted",
    }
}

/// Bit flags over an integer column.
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident { $($flag:ident = $bit:expr => $label:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i32);

        impl $name {
            $(pub const $flag: $name = $name($bit);)+

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }

            /// Labels of the set flags, in declaration order
            pub fn labels(self) -> Vec<&'static str> {
                let mut labels = Vec::new();
                $(if $bit != 0 && self.contains($name::$flag) {
                    labels.push($label);
                })+
                labels
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.labels().join(", "))
            }
        }
    };
}

flag_set! {
    /// Allocation state of a file name
    NameFlags {
        ALLOC = 1 => "Allocated",
        UNALLOC = 2 => "Unallocated",
    }
}

flag_set! {
    /// Allocation state of a metadata structure
    MetaFlags {
        ALLOC = 1 => "Allocated",
        UNALLOC = 2 => "Unallocated",
        USED = 4 => "Used",
        UNUSED = 8 => "Unused",
        COMP = 16 => "Compressed",
        ORPHAN = 32 => "Orphan",
    }
}

flag_set! {
    /// Allocation state of a partition
    VsPartFlags {
        ALLOC = 1 => "Allocated",
        UNALLOC = 2 => "Unallocated",
        META = 4 => "Volume System",
    }
}

flag_set! {
    /// Unix permission bits
    Mode {
        ISUID = 0o4000 => "setuid",
        ISGID = 0o2000 => "setgid",
        ISVTX = 0o1000 => "sticky",
        IRUSR = 0o400 => "r-user",
        IWUSR = 0o200 => "w-user",
        IXUSR = 0o100 => "x-user",
        IRGRP = 0o40 => "r-group",
        IWGRP = 0o20 => "w-group",
        IXGRP = 0o10 => "x-group",
        IROTH = 0o4 => "r-other",
        IWOTH = 0o2 => "w-other",
        IXOTH = 0o1 => "x-other",
    }
}

impl VsPartFlags {
    pub const ALL: VsPartFlags = VsPartFlags(7);
}

impl Mode {
    /// `ls -l` style permission string, without the type character
    pub fn to_permission_string(self) -> String {
        let bits = [
            (Mode::IRUSR, 'r'),
            (Mode::IWUSR, 'w'),
            (Mode::IXUSR, 'x'),
            (Mode::IRGRP, 'r'),
            (Mode::IWGRP, 'w'),
            (Mode::IXGRP, 'x'),
            (Mode::IROTH, 'r'),
            (Mode::IWOTH, 'w'),
            (Mode::IXOTH, 'x'),
        ];
        bits.iter()
            .map(|(flag, c)| if self.contains(*flag) { *c } else { '-' })
            .collect()
    }
}

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};
use log::{error, info, warn};

use crate::consts::{InodePointer, BLOCK_SIZE};
use crate::driver::file_drive::FileDrive;
use crate::driver::DeviceDriver;
use crate::fs::FS;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::mode::{InodeType, ModeBits, ModeBitsHelper, IS_DIR_MASK, IS_FILE_MASK, PERMISSIONS_MASK};

const TTL: Duration = Duration::from_secs(1);
const SECTOR_SIZE: usize = 512;

/// FUSE reserves inode 1 for the root, so kernel numbers are shifted by one.
pub fn to_fuse_ino(inode: InodePointer) -> u64 {
    inode as u64 + 1
}

pub fn from_fuse_ino(ino: u64) -> Option<InodePointer> {
    ino.checked_sub(1).and_then(|inode| InodePointer::try_from(inode).ok())
}

fn to_system_time(seconds: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds as u64)
}

fn file_type(kind: Option<InodeType>) -> FileType {
    match kind {
        Some(InodeType::Directory) => FileType::Directory,
        _ => FileType::RegularFile,
    }
}

/// `allocated` counts device blocks actually held, so holes in sparse files
/// do not show up as usage.
pub fn attr_from_inode(number: InodePointer, inode: &Inode, allocated: u64, block_size: usize) -> FileAttr {
    FileAttr {
        ino: to_fuse_ino(number),
        size: inode.size as u64,
        blocks: allocated * (block_size as u64 / 512),
        atime: to_system_time(inode.atime),
        mtime: to_system_time(inode.mtime),
        ctime: to_system_time(inode.ctime),
        crtime: to_system_time(inode.ctime),
        kind: file_type(inode.inode_type()),
        perm: inode.mode.get_permissions(),
        nlink: inode.links_count as u32,
        // ownership is not stored on disk; everything belongs to the mounting user
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        flags: 0,
        blksize: block_size as u32,
    }
}

/// Exposes a mounted [`FS`] to the kernel.
pub struct BlockFuse<A: DeviceDriver> {
    fs: FS<A>,
}

impl<A: DeviceDriver> BlockFuse<A> {
    pub fn new(fs: FS<A>) -> BlockFuse<A> {
        BlockFuse { fs }
    }

    pub fn into_inner(self) -> FS<A> {
        self.fs
    }

    fn attr(&self, number: InodePointer) -> Result<FileAttr> {
        if !self.fs.is_inode_used(number) {
            return Err(FsError::NotFound(format!("inode {}", number)));
        }
        let inode = self.fs.read_inode(number)?;
        let allocated = self.fs.allocated_blocks(&inode)?;
        Ok(attr_from_inode(number, &inode, allocated, self.fs.block_size()))
    }

    fn lookup_attr(&self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let parent = resolve_ino(parent)?;
        let child = self.fs.dir_lookup(parent, utf8_name(name)?)?;
        self.attr(child)
    }

    fn make_dir(&mut self, parent: u64, name: &OsStr, mode: u32) -> Result<FileAttr> {
        let mode = IS_DIR_MASK | (mode as ModeBits & PERMISSIONS_MASK);
        let dir = self.fs.mkdir(resolve_ino(parent)?, utf8_name(name)?, mode)?;
        self.attr(dir)
    }

    fn make_file(&mut self, parent: u64, name: &OsStr, mode: u32) -> Result<FileAttr> {
        let mode = IS_FILE_MASK | (mode as ModeBits & PERMISSIONS_MASK);
        let file = self.fs.create_file(resolve_ino(parent)?, utf8_name(name)?, mode)?;
        self.attr(file)
    }

    fn list(&self, ino: u64, offset: i64, reply: &mut ReplyDirectory) -> Result<()> {
        let dir = resolve_ino(ino)?;
        for (index, entry) in self.fs.dir_list(dir)?.enumerate().skip(offset.max(0) as usize) {
            let entry = entry?;
            let next_offset = index as i64 + 1;
            if reply.add(to_fuse_ino(entry.inode_num), next_offset, file_type(entry.inode_type()), &entry.name) {
                break;
            }
        }
        Ok(())
    }
}

fn resolve_ino(ino: u64) -> Result<InodePointer> {
    from_fuse_ino(ino).ok_or_else(|| FsError::NotFound(format!("fuse inode {}", ino)))
}

fn utf8_name(name: &OsStr) -> Result<&str> {
    name.to_str().ok_or_else(|| FsError::InvalidName(name.to_string_lossy().into_owned()))
}

fn errno(error: FsError) -> libc::c_int {
    if !matches!(error, FsError::NotFound(_) | FsError::AlreadyExists(_)) {
        warn!("request failed: {}", error);
    }
    error.errno()
}

impl<A: DeviceDriver> Filesystem for BlockFuse<A> {
    fn destroy(&mut self) {
        if let Err(e) = self.fs.sync() {
            error!("final sync failed: {}", e);
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_attr(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match resolve_ino(ino).and_then(|number| self.attr(number)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        match self.make_dir(parent, name, mode) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.make_file(parent, name, mode) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let inode = resolve_ino(ino).and_then(|number| self.fs.read_inode(number));
        match inode {
            Ok(inode) if inode.mode.is_file() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::EISDIR),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let data = resolve_ino(ino).and_then(|file| self.fs.read_file(file, offset.max(0) as u64, size as usize));
        match data {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let written = resolve_ino(ino).and_then(|file| self.fs.write_file(file, offset.max(0) as u64, data));
        match written {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(errno(e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        match self.list(ino, offset, &mut reply) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(e)),
        }
    }
}

/// Mounts the image at `image` on `mountpoint` and serves requests until unmounted.
pub fn mount<P: AsRef<Path>, Q: AsRef<Path>>(image: P, mountpoint: Q) -> Result<()> {
    let drive = FileDrive::open(image.as_ref(), SECTOR_SIZE)?;
    let fs = FS::mount(drive)?;
    info!(
        "serving {} ({} byte blocks) on {}",
        image.as_ref().display(),
        BLOCK_SIZE,
        mountpoint.as_ref().display()
    );

    let options = [MountOption::FSName("blockfs".to_string()), MountOption::DefaultPermissions];
    fuser::mount2(BlockFuse::new(fs), mountpoint, &options)?;
    Ok(())
}

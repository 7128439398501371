use std::env;
use std::process::ExitCode;

use blockfs::consts::BLOCK_SIZE;
use blockfs::{FileDrive, FsError, FS};

const SECTOR_SIZE: usize = 512;

fn usage() -> ExitCode {
    eprintln!("usage: blockfs mkfs <image> <blocks>");
    eprintln!("       blockfs mount <image> <mountpoint>");
    ExitCode::from(2)
}

fn mkfs(image: &str, blocks: u32) -> Result<(), FsError> {
    let drive = FileDrive::create(image, blocks as u64 * BLOCK_SIZE as u64, SECTOR_SIZE)?;
    let fs = FS::format(drive, blocks)?;
    println!("Superblock: {:?}", fs.superblock());
    fs.unmount()?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["mkfs", image, blocks] => match blocks.parse() {
            Ok(blocks) => mkfs(image, blocks),
            Err(_) => return usage(),
        },
        ["mount", image, mountpoint] => blockfs::fuse::mount(image, mountpoint),
        _ => return usage(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("blockfs: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! Command-line utilities for flashfs image files.

use std::cell::RefCell;
use std::io::Write as _;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flashfs::{FileDevice, FlashFileSystem, Filesystem, OpenFlags};

#[derive(Parser)]
#[command(name = "flashfs", version, about = "Inspect and edit flashfs image files")]
struct Cli {
    /// Path to the image file.
    image: PathBuf,

    /// Logical page size of the image.
    #[arg(long, default_value_t = 256)]
    page_size: u32,

    /// Logical block size of the image.
    #[arg(long, default_value_t = 4096)]
    block_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty filesystem, creating the image file if needed.
    Format {
        /// Image size in bytes when the image file does not exist yet.
        #[arg(long, default_value_t = 1024 * 1024)]
        size: u64,
    },
    /// List files with their sizes.
    Ls,
    /// Show file metadata.
    Stat { path: String },
    /// Print a file's contents to stdout.
    Cat { path: String },
    /// Copy a host file into the image.
    Write { path: String, host: PathBuf },
    /// Remove a file.
    Rm { path: String },
    /// Rename a file.
    Mv { from: String, to: String },
}

fn main() -> Result<()> {
    env_logger::init();
    run(Cli::parse())
}

fn open_device(cli: &Cli) -> Result<Rc<RefCell<FileDevice>>> {
    let device = FileDevice::open(&cli.image, cli.block_size, cli.page_size)
        .with_context(|| format!("opening image {}", cli.image.display()))?;
    Ok(Rc::new(RefCell::new(device)))
}

fn mount(cli: &Cli) -> Result<FlashFileSystem<FileDevice>> {
    FlashFileSystem::attach("image", open_device(cli)?)
        .with_context(|| format!("mounting image {}", cli.image.display()))
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Format { size } => {
            let device = if cli.image.exists() {
                FileDevice::open(&cli.image, cli.block_size, cli.page_size)?
            } else {
                FileDevice::create(&cli.image, *size, cli.block_size, cli.page_size)?
            };
            FlashFileSystem::format(Rc::new(RefCell::new(device)), cli.page_size, cli.block_size)
                .context("formatting image")?;
            println!("formatted {}", cli.image.display());
        }
        Command::Ls => {
            let mut fs = mount(&cli)?;
            let mut dir = fs.dir_open("/")?;
            while let Some(entry) = fs.dir_read(&mut dir)? {
                let stat = fs.stat(&entry.name)?;
                println!("{:>10}  {}", stat.size, entry.name);
            }
            fs.dir_close(dir)?;
            fs.unmount()?;
        }
        Command::Stat { path } => {
            let mut fs = mount(&cli)?;
            let stat = fs.stat(path)?;
            println!("{path}: {} bytes, mode {:o}", stat.size, stat.mode.bits());
            fs.unmount()?;
        }
        Command::Cat { path } => {
            let mut fs = mount(&cli)?;
            let file = fs.file_open(path, OpenFlags::RDONLY)?;
            let size = fs.file_size(&file)? as usize;
            let mut data = vec![0u8; size];
            let mut done = 0;
            while done < size {
                done += fs.file_read(&file, &mut data[done..])?;
            }
            fs.file_close(file)?;
            std::io::stdout().write_all(&data)?;
            fs.unmount()?;
        }
        Command::Write { path, host } => {
            let data = std::fs::read(host)
                .with_context(|| format!("reading host file {}", host.display()))?;
            let mut fs = mount(&cli)?;
            let file = fs.file_open(
                path,
                OpenFlags::WRONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )?;
            fs.file_write(&file, &data)?;
            fs.file_close(file)?;
            fs.unmount()?;
            println!("wrote {} bytes to {path}", data.len());
        }
        Command::Rm { path } => {
            let mut fs = mount(&cli)?;
            fs.remove(path)?;
            fs.unmount()?;
        }
        Command::Mv { from, to } => {
            let mut fs = mount(&cli)?;
            fs.rename(from, to)?;
            fs.unmount()?;
        }
    }
    Ok(())
}

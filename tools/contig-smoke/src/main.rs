mod client;
mod logger;

use crate::logger::StderrLogger;
use contig_abi::Command;
use kernel_contig_alloc::{ContigAllocator, OwnerId, PhysicalAddress};
use kernel_memmap::{E820Entry, E820Kind, E820Map, SystemMemoryMap, discover};
use log::{error, info};
use std::{env, process};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    StderrLogger::from_env().init()?;

    // args: <cmdline> <count> <size> [a64|a32]
    let mut args = env::args().skip(1);
    let cmdline = args.next().expect("kernel command line with memmap=SIZE$START");
    let count: usize = args.next().expect("buffer count").parse()?;
    let (size, _) = kernel_memmap::memparse(&args.next().expect("buffer size"))?;
    let command = match args.next().as_deref() {
        None | Some("a64") => Command::AllocA64,
        Some("a32") => Command::AllocA32,
        Some(other) => return Err(format!("unknown address class {other:?}").into()),
    };

    // Pretend the firmware reported RAM everywhere and the kernel applied the
    // command line to it.
    let firmware: E820Map = [E820Entry::new(0, u64::MAX, E820Kind::Ram)]
        .into_iter()
        .collect();
    let mut memory = SystemMemoryMap::new(firmware);
    memory.apply_command_line(&cmdline);

    let extents = discover(&cmdline, &memory);
    let pool = ContigAllocator::initialize(&extents)?;

    let session = pool.open_session(OwnerId::new(u64::from(process::id())));
    let granted = client::allocate(&session, command, count, size)?;

    let mut failed = 0;
    for (index, buffer) in granted.iter().enumerate() {
        if buffer.is_failed() {
            failed += 1;
            continue;
        }

        let base = PhysicalAddress::new(buffer.base_address);
        if session.mapping_for(base, buffer.length).is_none() {
            error!("buffer {index} at {base} is not mappable by its owner");
            return Err("mapping check failed".into());
        }
        info!("buffer {index}: {base} + {:#x}", buffer.length);
    }

    let stats = pool.stats();
    info!(
        "{} of {count} buffers granted, {:#x} bytes allocated, {:#x} free in {} region(s)",
        count - failed,
        stats.allocated_bytes,
        stats.free_bytes,
        stats.regions
    );

    client::free(&session, &granted)?;
    drop(session);

    let stats = pool.stats();
    if stats.allocated_bytes != 0 {
        return Err(format!("{:#x} bytes still allocated after free", stats.allocated_bytes).into());
    }
    eprintln!("smoke test passed: {} buffers, {failed} failed", count - failed);
    Ok(())
}

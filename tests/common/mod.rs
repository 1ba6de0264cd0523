#![allow(dead_code)]

use std::sync::Arc;

use vmcore::config::{VmConfig, PAGE_SIZE, SECTORS_PER_SLOT, STACK_LIMIT_ADDR};
use vmcore::console::{self, Console};
use vmcore::drivers::RamDisk;
use vmcore::fs::File;
use vmcore::logging;
use vmcore::mm::{PageOrigin, VirtAddr, Vm};
use vmcore::task::Process;

struct TestConsole;

impl Console for TestConsole {
    fn put_str(&self, s: &str) {
        print!("{}", s);
    }
}

static CONSOLE: TestConsole = TestConsole;

pub fn init() {
    console::set_console(&CONSOLE);
    logging::init();
}

/// a system with `frames` user frames and `slots` swap slots
pub fn vm(frames: usize, slots: usize) -> Vm {
    init();
    Vm::new(
        VmConfig {
            user_frames: frames,
        },
        Some(Arc::new(RamDisk::new(slots * SECTORS_PER_SLOT))),
    )
}

/// A process whose stack pointer sits at the bottom of the stack region, so
/// the whole region can be used as anonymous zero-fill memory.
pub fn spawn() -> Arc<Process> {
    let process = Process::new();
    process.set_user_sp(VirtAddr::from(STACK_LIMIT_ADDR));
    process
}

/// `i`-th anonymous page of [`spawn`]ed processes
pub fn anon(i: usize) -> VirtAddr {
    VirtAddr::from(STACK_LIMIT_ADDR + i * PAGE_SIZE)
}

pub fn pattern(seed: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (seed * 31 + i * 7) as u8).collect()
}

/// swap slots referenced by non-resident pages of `process`
pub fn held_slots(process: &Process) -> usize {
    process
        .memory_set()
        .spt()
        .iter()
        .filter(|(_, e)| matches!(e.origin, PageOrigin::Swapped { .. }) && !e.resident)
        .count()
}

/// A `PT_LOAD` segment of a hand-built executable.
pub struct Segment {
    pub offset: usize,
    pub vaddr: usize,
    pub filesz: usize,
    pub memsz: usize,
    pub writable: bool,
}

/// Minimal little-endian ELF64 RISC-V executable holding `segments`; every
/// byte past the headers is `pattern(1, ..)`.
pub fn elf_image(entry: usize, segments: &[Segment], len: usize) -> Vec<u8> {
    let mut image = pattern(1, len);
    let ph_off = 64;
    image[..ph_off + 56 * segments.len()].fill(0);
    image[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    image[4] = 2; // ELFCLASS64
    image[5] = 1; // little endian
    image[6] = 1; // EV_CURRENT
    put(&mut image, 16, &2u16.to_le_bytes()); // ET_EXEC
    put(&mut image, 18, &0xf3u16.to_le_bytes()); // EM_RISCV
    put(&mut image, 20, &1u32.to_le_bytes());
    put(&mut image, 24, &(entry as u64).to_le_bytes());
    put(&mut image, 32, &(ph_off as u64).to_le_bytes());
    put(&mut image, 52, &64u16.to_le_bytes());
    put(&mut image, 54, &56u16.to_le_bytes());
    put(&mut image, 56, &(segments.len() as u16).to_le_bytes());
    put(&mut image, 58, &64u16.to_le_bytes());
    for (i, seg) in segments.iter().enumerate() {
        let at = ph_off + 56 * i;
        let flags: u32 = if seg.writable { 0b110 } else { 0b101 };
        put(&mut image, at, &1u32.to_le_bytes()); // PT_LOAD
        put(&mut image, at + 4, &flags.to_le_bytes());
        put(&mut image, at + 8, &(seg.offset as u64).to_le_bytes());
        put(&mut image, at + 16, &(seg.vaddr as u64).to_le_bytes());
        put(&mut image, at + 24, &(seg.vaddr as u64).to_le_bytes());
        put(&mut image, at + 32, &(seg.filesz as u64).to_le_bytes());
        put(&mut image, at + 40, &(seg.memsz as u64).to_le_bytes());
        put(&mut image, at + 48, &(PAGE_SIZE as u64).to_le_bytes());
    }
    image
}

fn put(image: &mut [u8], at: usize, bytes: &[u8]) {
    image[at..at + bytes.len()].copy_from_slice(bytes);
}

/// A file whose writes never reach the disk.
pub struct BrokenFile {
    len: usize,
}

impl BrokenFile {
    pub fn new(len: usize) -> Arc<Self> {
        Arc::new(Self { len })
    }
}

impl File for BrokenFile {
    fn reopen(&self) -> Arc<dyn File> {
        Arc::new(Self { len: self.len })
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len.saturating_sub(offset));
        buf[..n].fill(0);
        n
    }

    fn write_at(&self, _offset: usize, _buf: &[u8]) -> usize {
        0
    }

    fn length(&self) -> usize {
        self.len
    }
}

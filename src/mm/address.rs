use core::fmt::{self, Debug, Formatter};

use crate::config;

const PA_WIDTH_SV39: usize = 56;
const VA_WIDTH_SV39: usize = 39;
const PPN_WIDTH_SV39: usize = PA_WIDTH_SV39 - config::PAGE_SIZE_BITS;
const VPN_WIDTH_SV39: usize = VA_WIDTH_SV39 - config::PAGE_SIZE_BITS;

/// virtual address
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct VirtAddr(usize);

/// physical page number
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct PhysPageNum(usize);

/// virtual page number
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct VirtPageNum(usize);

impl VirtAddr {
    pub fn floor(&self) -> VirtPageNum {
        VirtPageNum(self.0 / config::PAGE_SIZE)
    }

    pub fn ceil(&self) -> VirtPageNum {
        VirtPageNum(self.0.div_ceil(config::PAGE_SIZE))
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (config::PAGE_SIZE - 1)
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// below the user/kernel split
    pub fn is_user(&self) -> bool {
        self.0 < config::USER_SPACE_END
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// `v` as an address, if it lies below the user/kernel split
    pub fn try_user(v: usize) -> Option<Self> {
        let va = Self(v);
        va.is_user().then_some(va)
    }
}

/// 每个页表都用 9 位索引的，因此有 `1 << 9 = 512` 个页表项
pub(super) const NUM_PTE_PER_TABLE: usize = 1 << 9;

impl VirtPageNum {
    /// 取出虚拟页号的三级页索引，并按照从高到低的顺序返回 `[VPN2, VPN1, VPN0]`
    ///
    /// 在 SV39 模式中采用三级页表，即将 27 位的虚拟页号分为三个等长的部分，
    /// 第 26-18 位为三级索引 VPN2 ，第17-9 位为二级索引 VPN1 ，第 8-0 位为一级索引 VPN0
    pub fn indexes(&self) -> [usize; 3] {
        let mut vpn: usize = self.0;
        let mut idx = [0usize; 3];
        for i in (0..3).rev() {
            idx[i] = vpn & (NUM_PTE_PER_TABLE - 1);
            vpn >>= 9;
        }
        idx
    }

    /// the page `n` pages above this one
    pub fn offset(&self, n: usize) -> Self {
        Self(self.0 + n)
    }

    pub fn base(&self) -> VirtAddr {
        (*self).into()
    }
}

impl PhysPageNum {
    /// index of the frame inside the user pool
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for PhysPageNum {
    fn from(v: usize) -> Self {
        Self(v & ((1 << PPN_WIDTH_SV39) - 1))
    }
}

impl Debug for PhysPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PPN:{:#x}", self.0))
    }
}

/// Keeps every bit, so an address above user space never aliases a user page.
impl From<usize> for VirtAddr {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl From<VirtPageNum> for VirtAddr {
    fn from(v: VirtPageNum) -> Self {
        Self(v.0 << config::PAGE_SIZE_BITS)
    }
}

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VA:{:#x}", self.0))
    }
}

impl From<usize> for VirtPageNum {
    fn from(v: usize) -> Self {
        Self(v & ((1 << VPN_WIDTH_SV39) - 1))
    }
}

impl From<VirtAddr> for VirtPageNum {
    fn from(v: VirtAddr) -> Self {
        assert_eq!(v.page_offset(), 0);
        v.floor()
    }
}

impl Debug for VirtPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VPN:{:#x}", self.0))
    }
}

impl From<PhysPageNum> for usize {
    fn from(v: PhysPageNum) -> Self {
        v.0
    }
}

impl From<VirtAddr> for usize {
    fn from(v: VirtAddr) -> Self {
        v.0
    }
}

impl From<VirtPageNum> for usize {
    fn from(v: VirtPageNum) -> Self {
        v.0
    }
}

/// half-open range of virtual pages `[start, end)`
#[derive(Copy, Clone, Debug)]
pub struct VPNRange {
    start: VirtPageNum,
    end: VirtPageNum,
}

impl VPNRange {
    pub fn new(start: VirtPageNum, end: VirtPageNum) -> Self {
        assert!(start <= end, "start {:?} > end {:?}!", start, end);
        Self { start, end }
    }

    /// pages covering `len` bytes starting at the aligned address `base`
    pub fn covering(base: VirtAddr, len: usize) -> Self {
        let end = VirtAddr(base.0 + len).ceil();
        Self::new(base.floor(), end)
    }

    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for VPNRange {
    type Item = VirtPageNum;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start == self.end {
            None
        } else {
            let current = self.start;
            self.start.0 += 1;
            Some(current)
        }
    }
}

use bitflags::*;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use super::address::NUM_PTE_PER_TABLE;
use super::{PhysPageNum, VirtPageNum};

bitflags! {
    /// page table entry flags
    pub struct PTEFlags: u8 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
        const G = 1 << 5;
        const A = 1 << 6;
        const D = 1 << 7;
    }
}

type PageTableNode = [PageTableEntry; NUM_PTE_PER_TABLE];

/// Per-process SV39 page table.
///
/// Nodes live in `nodes` (the root is node 0); a non-leaf entry stores the
/// index of its child node in the PPN field. Leaf entries point into the user
/// pool. The `A` and `D` bits are maintained by [`super::mmu`] exactly the
/// way the hardware walker would.
pub struct PageTable {
    nodes: Vec<Box<PageTableNode>>,
    /// number of valid leaf entries
    mapped: usize,
}

impl PageTable {
    pub fn new() -> Self {
        PageTable {
            nodes: vec![Box::new([PageTableEntry::empty(); NUM_PTE_PER_TABLE])],
            mapped: 0,
        }
    }

    /// 在多级页表找到一个虚拟页号对应的页表项的可变引用。如果在遍历的过程中发现有节点尚未创建则会新建一个节点
    fn find_pte_create(&mut self, vpn: VirtPageNum) -> &mut PageTableEntry {
        let idxs: [usize; 3] = vpn.indexes();
        let mut node = 0usize;
        for &idx in &idxs[..2] {
            let pte = self.nodes[node][idx];
            if pte.is_valid() {
                node = pte.ppn().index();
            } else {
                self.nodes
                    .push(Box::new([PageTableEntry::empty(); NUM_PTE_PER_TABLE]));
                let child = self.nodes.len() - 1;
                self.nodes[node][idx] = PageTableEntry::new(PhysPageNum::from(child), PTEFlags::V);
                node = child;
            }
        }
        &mut self.nodes[node][idxs[2]]
    }

    /// 当找不到中间节点的时候不会新建节点而是直接返回 `None` 即查找失败
    fn find_node(&self, vpn: VirtPageNum) -> Option<(usize, usize)> {
        let idxs: [usize; 3] = vpn.indexes();
        let mut node = 0usize;
        for &idx in &idxs[..2] {
            let pte = self.nodes[node][idx];
            if !pte.is_valid() {
                return None;
            }
            node = pte.ppn().index();
        }
        Some((node, idxs[2]))
    }

    fn find_pte_mut(&mut self, vpn: VirtPageNum) -> Option<&mut PageTableEntry> {
        let (node, idx) = self.find_node(vpn)?;
        let pte = &mut self.nodes[node][idx];
        pte.is_valid().then_some(pte)
    }

    /// 建立虚实地址映射关系
    pub fn map(&mut self, vpn: VirtPageNum, ppn: PhysPageNum, flags: PTEFlags) {
        let pte: &mut PageTableEntry = self.find_pte_create(vpn);
        assert!(!pte.is_valid(), "vpn {:?} is mapped before mapping", vpn);
        *pte = PageTableEntry::new(ppn, flags | PTEFlags::V);
        self.mapped += 1;
    }

    /// 拆除虚实地址映射关系
    pub fn unmap(&mut self, vpn: VirtPageNum) {
        let pte: &mut PageTableEntry = self
            .find_pte_mut(vpn)
            .unwrap_or_else(|| panic!("vpn {:?} is invalid before unmapping", vpn));
        *pte = PageTableEntry::empty();
        self.mapped -= 1;
    }

    /// the valid leaf entry for `vpn`, if any
    pub fn translate(&self, vpn: VirtPageNum) -> Option<PageTableEntry> {
        let (node, idx) = self.find_node(vpn)?;
        let pte = self.nodes[node][idx];
        pte.is_valid().then_some(pte)
    }

    pub fn is_accessed(&self, vpn: VirtPageNum) -> bool {
        self.translate(vpn).map_or(false, |pte| pte.accessed())
    }

    pub fn is_dirty(&self, vpn: VirtPageNum) -> bool {
        self.translate(vpn).map_or(false, |pte| pte.dirty())
    }

    pub fn set_accessed(&mut self, vpn: VirtPageNum, accessed: bool) {
        if let Some(pte) = self.find_pte_mut(vpn) {
            pte.set_flag(PTEFlags::A, accessed);
        }
    }

    pub fn set_dirty(&mut self, vpn: VirtPageNum, dirty: bool) {
        if let Some(pte) = self.find_pte_mut(vpn) {
            pte.set_flag(PTEFlags::D, dirty);
        }
    }

    /// number of pages currently mapped
    pub fn mapped_pages(&self) -> usize {
        self.mapped
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(C)]
/// page table entry structure
///
/// SV39 分页模式下的页表项，其中 `[53 : 10]` 这 44 位是物理页号，最低的 8 位 `[7 ：0]` 则是标志位，
/// 控制页表项是否合法、控制索引到这个页表项的对应虚拟页面是否允许读/写/执行等
pub struct PageTableEntry {
    pub bits: usize,
}

impl PageTableEntry {
    pub fn new(ppn: PhysPageNum, flags: PTEFlags) -> Self {
        PageTableEntry {
            bits: <PhysPageNum as Into<usize>>::into(ppn) << 10 | flags.bits() as usize,
        }
    }

    pub fn empty() -> Self {
        PageTableEntry { bits: 0 }
    }

    /// 物理页号
    pub fn ppn(&self) -> PhysPageNum {
        (self.bits >> 10 & ((1usize << 44) - 1)).into()
    }

    /// 标志位，控制页表项是否合法、控制索引到这个页表项的对应虚拟页面是否允许读/写/执行等
    pub fn flags(&self) -> PTEFlags {
        PTEFlags::from_bits_truncate(self.bits as u8)
    }

    fn set_flag(&mut self, flag: PTEFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.bits = (self.bits & !0xff) | flags.bits() as usize;
    }

    /// 页表项是否合法
    pub fn is_valid(&self) -> bool {
        self.flags().contains(PTEFlags::V)
    }

    /// 索引到这个页表项的对应虚拟页面是否允许读
    pub fn readable(&self) -> bool {
        self.flags().contains(PTEFlags::R)
    }

    /// 索引到这个页表项的对应虚拟页面是否允许写
    pub fn writable(&self) -> bool {
        self.flags().contains(PTEFlags::W)
    }

    pub fn accessed(&self) -> bool {
        self.flags().contains(PTEFlags::A)
    }

    pub fn dirty(&self) -> bool {
        self.flags().contains(PTEFlags::D)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rw() -> PTEFlags {
        PTEFlags::R | PTEFlags::W | PTEFlags::U
    }

    #[test]
    fn map_translate_unmap() {
        let mut pt = PageTable::new();
        let vpn = VirtPageNum::from(0x12345);
        pt.map(vpn, PhysPageNum::from(7), user_rw());
        let pte = pt.translate(vpn).unwrap();
        assert_eq!(pte.ppn(), PhysPageNum::from(7));
        assert!(pte.writable());
        assert_eq!(pt.mapped_pages(), 1);
        pt.unmap(vpn);
        assert!(pt.translate(vpn).is_none());
        assert_eq!(pt.mapped_pages(), 0);
    }

    #[test]
    fn neighbours_share_intermediate_nodes() {
        let mut pt = PageTable::new();
        pt.map(VirtPageNum::from(0x400), PhysPageNum::from(1), user_rw());
        pt.map(VirtPageNum::from(0x401), PhysPageNum::from(2), user_rw());
        assert_eq!(pt.nodes.len(), 3);
        assert_eq!(
            pt.translate(VirtPageNum::from(0x401)).unwrap().ppn(),
            PhysPageNum::from(2)
        );
        assert!(pt.translate(VirtPageNum::from(0x402)).is_none());
    }

    #[test]
    fn accessed_and_dirty_bits() {
        let mut pt = PageTable::new();
        let vpn = VirtPageNum::from(3);
        pt.map(vpn, PhysPageNum::from(3), PTEFlags::R | PTEFlags::U);
        assert!(!pt.is_accessed(vpn));
        pt.set_accessed(vpn, true);
        pt.set_dirty(vpn, true);
        assert!(pt.is_accessed(vpn) && pt.is_dirty(vpn));
        pt.set_accessed(vpn, false);
        assert!(!pt.is_accessed(vpn));
        assert_eq!(pt.translate(vpn).unwrap().ppn(), PhysPageNum::from(3));
    }

    #[test]
    #[should_panic]
    fn double_map_panics() {
        let mut pt = PageTable::new();
        let vpn = VirtPageNum::from(9);
        pt.map(vpn, PhysPageNum::from(1), user_rw());
        pt.map(vpn, PhysPageNum::from(2), user_rw());
    }
}

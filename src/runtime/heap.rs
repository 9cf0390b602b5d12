//! Heap block allocator
//!
//! FAT-style: a fixed table of cells, a bitmap of used cells, and a `next` link
//! per cell. An allocation of `n` cells is the chain obtained by taking the
//! first free cell and then repeatedly the next free cell after it, so a block
//! is logically contiguous but may be scattered physically.

use crate::error::Fault;

const WORD: usize = u64::BITS as usize;

/// Occupancy bitmap over the cell table
#[derive(Debug, Clone)]
struct UsedMap {
    words: Vec<u64>,
    len: usize,
}

impl UsedMap {
    fn new(len: usize) -> Self {
        UsedMap {
            words: vec![0; len.div_ceil(WORD)],
            len,
        }
    }

    fn get(&self, i: usize) -> bool {
        self.words[i / WORD] & (1 << (i % WORD)) != 0
    }

    fn set(&mut self, i: usize) {
        self.words[i / WORD] |= 1 << (i % WORD);
    }

    fn clear(&mut self, i: usize) {
        self.words[i / WORD] &= !(1 << (i % WORD));
    }

    /// First clear bit at or after `from`
    fn next_clear(&self, from: usize) -> Option<usize> {
        let mut word = from / WORD;
        let mut bits = self.words.get(word)? | ((1u64 << (from % WORD)) - 1);
        loop {
            if bits != u64::MAX {
                let i = word * WORD + bits.trailing_ones() as usize;
                return (i < self.len).then_some(i);
            }
            word += 1;
            bits = *self.words.get(word)?;
        }
    }
}

/// Chained block allocator over a fixed number of cells
#[derive(Debug, Clone)]
pub struct BlockAllocator<T> {
    cells: Vec<Option<T>>,
    next: Vec<Option<usize>>,
    used: UsedMap,
    used_count: usize,
}

impl<T: Clone> BlockAllocator<T> {
    /// Creates an allocator managing `capacity` cells, all free
    pub fn new(capacity: usize) -> Self {
        BlockAllocator {
            cells: vec![None; capacity],
            next: vec![None; capacity],
            used: UsedMap::new(capacity),
            used_count: 0,
        }
    }

    /// Total number of cells
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells currently allocated
    pub fn used(&self) -> usize {
        self.used_count
    }

    /// True if `addr` is currently part of an allocation
    pub fn is_allocated(&self, addr: usize) -> bool {
        addr < self.capacity() && self.used.get(addr)
    }

    fn check(&self, addr: usize) -> Result<(), Fault> {
        if addr >= self.capacity() {
            return Err(Fault::InvalidAddress(addr as i64));
        }
        Ok(())
    }

    /// Allocates a chain of `n` fresh cells and returns its first cell, or
    /// `None` for an empty request
    pub fn allocate(&mut self, n: usize) -> Result<Option<usize>, Fault> {
        if n == 0 {
            return Ok(None);
        }
        let available = self.capacity() - self.used_count;
        let out_of_memory = Fault::OutOfMemory {
            requested: n,
            available,
        };
        if n > available {
            return Err(out_of_memory);
        }

        let start = self.used.next_clear(0).ok_or_else(|| out_of_memory.clone())?;
        self.claim(start);
        let mut cell = start;
        for _ in 1..n {
            let following = self
                .used
                .next_clear(cell + 1)
                .ok_or_else(|| out_of_memory.clone())?;
            self.next[cell] = Some(following);
            self.claim(following);
            cell = following;
        }
        self.next[cell] = None;
        Ok(Some(start))
    }

    fn claim(&mut self, cell: usize) {
        self.used.set(cell);
        self.used_count += 1;
        self.cells[cell] = None;
    }

    /// Walks the chain from `addr`, yielding at most `n` cells
    fn chain(&self, addr: usize, n: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(addr), move |c| self.next[*c]).take(n)
    }

    /// Frees up to `n` cells reachable from `addr`
    pub fn destroy(&mut self, addr: usize, n: usize) -> Result<(), Fault> {
        self.check(addr)?;
        let cells: Vec<usize> = self.chain(addr, n).collect();
        for cell in cells {
            if self.used.get(cell) {
                self.used.clear(cell);
                self.used_count -= 1;
            }
        }
        Ok(())
    }

    /// Reads one cell
    pub fn read(&self, addr: usize) -> Result<Option<&T>, Fault> {
        self.check(addr)?;
        Ok(self.cells[addr].as_ref())
    }

    /// Writes one cell
    pub fn write(&mut self, addr: usize, value: T) -> Result<(), Fault> {
        self.check(addr)?;
        self.cells[addr] = Some(value);
        Ok(())
    }

    /// Reads `n` logically consecutive cells; positions past the end of the
    /// chain read as `None`
    pub fn read_block(&self, addr: usize, n: usize) -> Result<Vec<Option<T>>, Fault> {
        self.check(addr)?;
        let mut out: Vec<Option<T>> = self.chain(addr, n).map(|c| self.cells[c].clone()).collect();
        out.resize(n, None);
        Ok(out)
    }

    /// Writes logically consecutive cells, stopping at the end of the chain
    pub fn write_block(&mut self, addr: usize, values: &[Option<T>]) -> Result<(), Fault> {
        self.check(addr)?;
        let targets: Vec<usize> = self.chain(addr, values.len()).collect();
        for (cell, value) in targets.into_iter().zip(values) {
            self.cells[cell] = value.clone();
        }
        Ok(())
    }

    /// Copies `n` logically consecutive cells from the chain at `src` to the
    /// chain at `dst`
    pub fn move_block(&mut self, dst: usize, src: usize, n: usize) -> Result<(), Fault> {
        self.check(dst)?;
        let cells = self.read_block(src, n)?;
        let len = self.chain(src, n).count();
        self.write_block(dst, &cells[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_clear() {
        let mut map = UsedMap::new(130);
        for i in 0..70 {
            map.set(i);
        }
        assert_eq!(map.next_clear(0), Some(70));
        map.clear(3);
        assert_eq!(map.next_clear(0), Some(3));
        assert_eq!(map.next_clear(4), Some(70));
        for i in 70..130 {
            map.set(i);
        }
        assert_eq!(map.next_clear(4), None);
    }

    #[test]
    fn test_allocate_contiguous_when_fresh() {
        let mut heap: BlockAllocator<i64> = BlockAllocator::new(16);
        assert_eq!(heap.allocate(3).unwrap(), Some(0));
        assert_eq!(heap.allocate(2).unwrap(), Some(3));
        assert_eq!(heap.used(), 5);
        assert_eq!(heap.allocate(0).unwrap(), None);
    }

    #[test]
    fn test_allocation_fills_holes() {
        let mut heap = BlockAllocator::new(8);
        let a = heap.allocate(2).unwrap().unwrap();
        let b = heap.allocate(2).unwrap().unwrap();
        heap.destroy(a, 2).unwrap();
        let c = heap.allocate(3).unwrap().unwrap();
        assert_eq!(c, 0);
        heap.write_block(c, &[Some(1), Some(2), Some(3)]).unwrap();
        assert_eq!(heap.read_block(c, 3).unwrap(), vec![Some(1), Some(2), Some(3)]);
        // third cell of the chain skips over `b`
        assert_eq!(heap.read(4).unwrap(), Some(&3));
        assert!(heap.is_allocated(b));
    }

    #[test]
    fn test_out_of_memory() {
        let mut heap: BlockAllocator<i64> = BlockAllocator::new(4);
        heap.allocate(3).unwrap();
        assert_eq!(
            heap.allocate(2),
            Err(Fault::OutOfMemory {
                requested: 2,
                available: 1
            })
        );
        assert!(heap.allocate(1).unwrap().is_some());
    }

    #[test]
    fn test_destroy_restores_free_count() {
        let mut heap: BlockAllocator<i64> = BlockAllocator::new(10);
        let a = heap.allocate(4).unwrap().unwrap();
        heap.destroy(a, 4).unwrap();
        assert_eq!(heap.used(), 0);
    }

    #[test]
    fn test_fresh_cells_are_unset() {
        let mut heap = BlockAllocator::new(2);
        let a = heap.allocate(1).unwrap().unwrap();
        heap.write(a, 9).unwrap();
        heap.destroy(a, 1).unwrap();
        let b = heap.allocate(1).unwrap().unwrap();
        assert_eq!(b, a);
        assert_eq!(heap.read(b).unwrap(), None);
    }

    #[test]
    fn test_move_between_chains() {
        let mut heap = BlockAllocator::new(8);
        let a = heap.allocate(3).unwrap().unwrap();
        let b = heap.allocate(3).unwrap().unwrap();
        heap.write_block(a, &[Some(7), Some(8), Some(9)]).unwrap();
        heap.move_block(b, a, 3).unwrap();
        assert_eq!(heap.read_block(b, 3).unwrap(), vec![Some(7), Some(8), Some(9)]);
        assert!(heap.read(8).is_err());
    }
}

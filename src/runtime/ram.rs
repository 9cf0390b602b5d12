//! Static RAM
//!
//! A logically contiguous, lazily grown cell array stored as a table of buckets
//! of doubling sizes. Bucket `k` holds `first << k` cells; buckets are allocated
//! on first write and released when the array shrinks below them, so memory
//! use tracks the live extent of the activation stack.

use crate::error::Fault;

/// Default size of the first bucket
pub const DEFAULT_FIRST_BUCKET: usize = 8;

type Bucket<T> = Box<[Option<T>]>;

/// Two-level resizable cell array with a hard size limit
#[derive(Debug, Clone)]
pub struct Ram<T> {
    buckets: Vec<Option<Bucket<T>>>,
    /// Size of bucket 0, a power of two
    first: usize,
    /// Addresses at or past this limit overflow
    max: usize,
    /// One past the highest written address
    end: usize,
}

impl<T: Clone> Ram<T> {
    /// Creates a RAM whose first bucket covers at least `fixed` cells (rounded
    /// up to a power of two) and which never grows past `max` cells
    pub fn new(fixed: usize, max: usize) -> Self {
        let first = fixed.max(1).next_power_of_two();
        Ram {
            buckets: vec![Some(Self::alloc_bucket(first))],
            first,
            max,
            end: 0,
        }
    }

    /// Creates a RAM with the default first bucket size
    pub fn with_max(max: usize) -> Self {
        Self::new(DEFAULT_FIRST_BUCKET, max)
    }

    fn alloc_bucket(len: usize) -> Bucket<T> {
        vec![None; len].into_boxed_slice()
    }

    /// One past the highest address in use
    pub fn len(&self) -> usize {
        self.end
    }

    /// True if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Configured size limit
    pub fn max_size(&self) -> usize {
        self.max
    }

    /// Number of buckets currently allocated
    pub fn allocated_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    /// Bucket index and offset within it of an address
    fn locate(&self, addr: usize) -> (usize, usize) {
        let pos = addr + self.first;
        let bucket = (self.first.leading_zeros() - pos.leading_zeros()) as usize;
        let high_bit = 1usize << (usize::BITS - 1 - pos.leading_zeros());
        (bucket, pos ^ high_bit)
    }

    fn bucket_len(&self, bucket: usize) -> usize {
        self.first << bucket
    }

    fn bucket_mut(&mut self, bucket: usize) -> &mut Bucket<T> {
        if self.buckets.len() <= bucket {
            self.buckets.resize_with(bucket + 1, || None);
        }
        let len = self.bucket_len(bucket);
        self.buckets[bucket].get_or_insert_with(|| Self::alloc_bucket(len))
    }

    fn check_range(&self, last: usize) -> Result<(), Fault> {
        if last >= self.max {
            return Err(Fault::StaticOverflow {
                addr: last,
                limit: self.max,
            });
        }
        Ok(())
    }

    /// Reads one cell; addresses past the end or never written read as `None`
    pub fn read(&self, addr: usize) -> Option<&T> {
        if addr >= self.end {
            return None;
        }
        let (bucket, offset) = self.locate(addr);
        self.buckets.get(bucket)?.as_ref()?[offset].as_ref()
    }

    /// Reads `n` consecutive cells starting at `addr`
    pub fn read_block(&self, addr: usize, n: usize) -> Vec<Option<T>> {
        let mut out = Vec::with_capacity(n);
        let mut addr = addr;
        while out.len() < n && addr < self.end {
            let (bucket, offset) = self.locate(addr);
            let take = (self.bucket_len(bucket) - offset)
                .min(n - out.len())
                .min(self.end - addr);
            match self.buckets.get(bucket).and_then(Option::as_ref) {
                Some(cells) => out.extend_from_slice(&cells[offset..offset + take]),
                None => out.extend(std::iter::repeat_with(|| None).take(take)),
            }
            addr += take;
        }
        out.resize(n, None);
        out
    }

    /// Writes one cell, growing the array as needed
    pub fn write(&mut self, addr: usize, value: T) -> Result<(), Fault> {
        self.check_range(addr)?;
        let (bucket, offset) = self.locate(addr);
        self.bucket_mut(bucket)[offset] = Some(value);
        self.end = self.end.max(addr + 1);
        Ok(())
    }

    /// Writes consecutive cells starting at `addr`, one bucket segment at a time
    pub fn write_block(&mut self, addr: usize, values: &[Option<T>]) -> Result<(), Fault> {
        if values.is_empty() {
            return Ok(());
        }
        self.check_range(addr + values.len() - 1)?;
        let mut addr = addr;
        let mut rest = values;
        while !rest.is_empty() {
            let (bucket, offset) = self.locate(addr);
            let take = (self.bucket_len(bucket) - offset).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.bucket_mut(bucket)[offset..offset + take].clone_from_slice(head);
            addr += take;
            rest = tail;
        }
        self.end = self.end.max(addr);
        Ok(())
    }

    /// Copies `n` cells from `src` to `dst`; overlapping ranges behave as if
    /// the source were read first
    pub fn move_block(&mut self, dst: usize, src: usize, n: usize) -> Result<(), Fault> {
        let cells = self.read_block(src, n);
        self.write_block(dst, &cells)
    }

    /// Ensures `[0, capacity)` is backed by buckets and marks it in use
    pub fn reserve(&mut self, capacity: usize) -> Result<(), Fault> {
        if capacity == 0 || self.end >= capacity {
            return Ok(());
        }
        self.check_range(capacity - 1)?;
        let (last, _) = self.locate(capacity - 1);
        for bucket in 0..=last {
            self.bucket_mut(bucket);
        }
        self.end = capacity;
        Ok(())
    }

    /// Appends a cell at the end
    pub fn push_back(&mut self, value: T) -> Result<(), Fault> {
        self.write(self.end, value)
    }

    /// Removes the last cell, releasing its bucket when it was the bucket's first
    pub fn pop_back(&mut self) -> Option<T> {
        if self.end == 0 {
            return None;
        }
        self.end -= 1;
        let (bucket, offset) = self.locate(self.end);
        if offset == 0 && bucket > 0 {
            let cells = self.buckets.get_mut(bucket)?.take()?;
            cells.into_vec().swap_remove(0)
        } else {
            self.buckets.get_mut(bucket)?.as_mut()?[offset].take()
        }
    }

    /// Discards every cell at or above `addr`
    pub fn truncate(&mut self, addr: usize) {
        if addr >= self.end {
            return;
        }
        let (bucket, offset) = self.locate(addr);
        let first_freed = if offset == 0 && bucket > 0 {
            bucket
        } else {
            if let Some(Some(cells)) = self.buckets.get_mut(bucket) {
                cells[offset..].iter_mut().for_each(|c| *c = None);
            }
            bucket + 1
        };
        for slot in self.buckets.iter_mut().skip(first_freed) {
            *slot = None;
        }
        self.end = addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_location() {
        let ram: Ram<i64> = Ram::new(8, 1000);
        assert_eq!(ram.locate(0), (0, 0));
        assert_eq!(ram.locate(7), (0, 7));
        assert_eq!(ram.locate(8), (1, 0));
        assert_eq!(ram.locate(23), (1, 15));
        assert_eq!(ram.locate(24), (2, 0));
    }

    #[test]
    fn test_first_bucket_rounding() {
        let ram: Ram<i64> = Ram::new(5, 100);
        assert_eq!(ram.first, 8);
        let ram: Ram<i64> = Ram::new(0, 100);
        assert_eq!(ram.first, 1);
    }

    #[test]
    fn test_write_and_read() {
        let mut ram = Ram::new(4, 100);
        ram.write(0, 1).unwrap();
        ram.write(50, 2).unwrap();
        assert_eq!(ram.read(0), Some(&1));
        assert_eq!(ram.read(50), Some(&2));
        assert_eq!(ram.read(10), None);
        assert_eq!(ram.len(), 51);
    }

    #[test]
    fn test_overflow() {
        let mut ram = Ram::new(4, 10);
        assert!(ram.write(9, 1).is_ok());
        assert_eq!(
            ram.write(10, 1),
            Err(Fault::StaticOverflow { addr: 10, limit: 10 })
        );
        assert!(ram.reserve(11).is_err());
    }

    #[test]
    fn test_block_across_buckets() {
        let mut ram = Ram::new(2, 100);
        let values: Vec<Option<i64>> = (0..20).map(Some).collect();
        ram.write_block(1, &values).unwrap();
        assert_eq!(ram.read_block(1, 20), values);
        let tail = ram.read_block(19, 4);
        assert_eq!(tail, vec![Some(18), Some(19), None, None]);
    }

    #[test]
    fn test_move_block_overlapping() {
        let mut ram = Ram::new(4, 100);
        let values: Vec<Option<i64>> = (0..6).map(Some).collect();
        ram.write_block(0, &values).unwrap();
        ram.move_block(2, 0, 6).unwrap();
        assert_eq!(ram.read_block(2, 6), values);
    }

    #[test]
    fn test_reserve_never_shrinks() {
        let mut ram: Ram<i64> = Ram::new(4, 100);
        ram.reserve(30).unwrap();
        assert_eq!(ram.len(), 30);
        ram.reserve(5).unwrap();
        assert_eq!(ram.len(), 30);
    }

    #[test]
    fn test_push_pop() {
        let mut ram = Ram::new(2, 100);
        for v in 0..10 {
            ram.push_back(v).unwrap();
        }
        let buckets = ram.allocated_buckets();
        assert_eq!(ram.pop_back(), Some(9));
        assert_eq!(ram.pop_back(), Some(8));
        assert_eq!(ram.pop_back(), Some(7));
        assert_eq!(ram.pop_back(), Some(6));
        assert_eq!(ram.allocated_buckets(), buckets - 1);
        ram.push_back(42).unwrap();
        assert_eq!(ram.read(6), Some(&42));
        assert_eq!(ram.len(), 7);
    }

    #[test]
    fn test_truncate_frees_upper_buckets() {
        let mut ram = Ram::new(2, 1000);
        ram.reserve(100).unwrap();
        ram.write(40, 1).unwrap();
        ram.write(5, 2).unwrap();
        ram.truncate(4);
        assert_eq!(ram.len(), 4);
        assert_eq!(ram.allocated_buckets(), 2);
        ram.reserve(50).unwrap();
        assert_eq!(ram.read(40), None);
        assert_eq!(ram.read(5), None);
    }
}

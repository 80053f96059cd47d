//! A fixed-capacity, power-of-two circular buffer of fixed-size slots.
//! `enqueue`/`dequeue` are not internally synchronised; callers that
//! need thread safety wrap a `Ring` in a lock of their own, which is
//! exactly what [`crate::concurrency::TaskQueue`] does.

use crate::error::Error;
use crate::Result;

pub struct Ring<T> {
    values: Vec<Option<T>>,
    capacity: u32,
    count: u32,
    write_index: u32,
}

impl<T> Ring<T> {
    /// `capacity` must be a nonzero power of two.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::invalid_argument("capacity must be a nonzero power of two"));
        }

        let mut values = Vec::with_capacity(capacity as usize);
        values.resize_with(capacity as usize, || None);

        Ok(Self { values, capacity, count: 0, write_index: 0 })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Push one item. Returns it back if the ring is full.
    pub fn enqueue(&mut self, value: T) -> std::result::Result<(), T> {
        if self.is_full() {
            return Err(value);
        }

        let item_index = (self.write_index & (self.capacity - 1)) as usize;
        self.values[item_index] = Some(value);
        self.write_index = self.write_index.wrapping_add(1);
        self.count += 1;
        Ok(())
    }

    /// Pop the oldest item, or `None` if the ring is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let item_index =
            ((self.capacity.wrapping_add(self.write_index.wrapping_sub(self.count))) & (self.capacity - 1)) as usize;
        let value = self.values[item_index].take();
        self.count -= 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_capacity() {
        assert!(Ring::<u32>::new(3).is_err());
        assert!(Ring::<u32>::new(0).is_err());
    }

    #[test]
    fn fifo_ordering_holds() {
        let mut ring = Ring::new(4).unwrap();
        ring.enqueue(1).unwrap();
        ring.enqueue(2).unwrap();
        ring.enqueue(3).unwrap();
        assert_eq!(ring.dequeue(), Some(1));
        assert_eq!(ring.dequeue(), Some(2));
        ring.enqueue(4).unwrap();
        ring.enqueue(5).unwrap();
        assert_eq!(ring.dequeue(), Some(3));
        assert_eq!(ring.dequeue(), Some(4));
        assert_eq!(ring.dequeue(), Some(5));
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn enqueue_fails_when_full_and_returns_the_value() {
        let mut ring = Ring::new(2).unwrap();
        ring.enqueue(1).unwrap();
        ring.enqueue(2).unwrap();
        assert_eq!(ring.enqueue(3), Err(3));
    }

    #[test]
    fn wraps_around_after_many_cycles() {
        let mut ring = Ring::new(4).unwrap();
        for cycle in 0..10 {
            for i in 0..4 {
                ring.enqueue(cycle * 4 + i).unwrap();
            }
            for i in 0..4 {
                assert_eq!(ring.dequeue(), Some(cycle * 4 + i));
            }
        }
    }
}

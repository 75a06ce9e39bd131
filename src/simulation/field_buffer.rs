//! Ping-pong storage for one simulated field
//!
//! A [`FieldBuffer`] owns two fields of identical shape. One is current
//! (readable), the other is next (writable). A pass writes into the next field
//! and the caller promotes it with [`FieldBuffer::swap`] once the write is
//! complete, so no later pass in the frame can observe a half-written field.

use super::backend::Backend;
use crate::error::SimResult;
use crate::simulation::field::FieldDesc;

pub struct FieldBuffer<T> {
    label: String,
    fields: [T; 2],
    current: usize,
    write_pending: bool,
}

impl<T> FieldBuffer<T> {
    /// Wrap two already-allocated fields; `current` starts readable
    pub fn new(label: impl Into<String>, current: T, next: T) -> Self {
        Self {
            label: label.into(),
            fields: [current, next],
            current: 0,
            write_pending: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The current field (read-only view)
    pub fn read(&self) -> &T {
        &self.fields[self.current]
    }

    /// The next field, exclusively borrowed for writing
    ///
    /// Calling this twice without an intervening [`swap`](Self::swap) is a
    /// programming error and panics in debug builds.
    pub fn write(&mut self) -> &mut T {
        self.begin_write();
        &mut self.fields[1 - self.current]
    }

    /// Current and next at once, for stages that read their own target
    /// (self-advection, splatting into the existing velocity)
    pub fn read_write(&mut self) -> (&T, &mut T) {
        self.begin_write();
        let (first, second) = self.fields.split_at_mut(1);
        if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Promote the next field to current
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
        self.write_pending = false;
    }

    /// Whether a write has been handed out and not yet swapped in
    pub fn is_write_pending(&self) -> bool {
        self.write_pending
    }

    /// Apply `f` to both fields, e.g. to re-seed them
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for field in &mut self.fields {
            f(field);
        }
    }

    fn begin_write(&mut self) {
        debug_assert!(
            !self.write_pending,
            "FieldBuffer `{}`: write() called twice without swap()",
            self.label
        );
        self.write_pending = true;
    }
}

impl<T> FieldBuffer<T> {
    /// Allocate both halves on `backend`
    ///
    /// If the second allocation fails the first is released before the error
    /// is returned.
    pub fn allocate<B>(backend: &mut B, desc: FieldDesc, label: &str) -> SimResult<Self>
    where
        B: Backend<Field = T>,
    {
        let current = backend.create_field(&desc, &format!("{label}.0"))?;
        let next = match backend.create_field(&desc, &format!("{label}.1")) {
            Ok(field) => field,
            Err(err) => {
                backend.release_field(current);
                return Err(err);
            }
        };
        Ok(Self::new(label, current, next))
    }

    /// Hand both fields back to `backend`
    pub fn release<B>(self, backend: &mut B)
    where
        B: Backend<Field = T>,
    {
        let [a, b] = self.fields;
        backend.release_field(a);
        backend.release_field(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_after_swap_returns_written() {
        let mut buffer = FieldBuffer::new("test", vec![0u32; 4], vec![0u32; 4]);
        buffer.write().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.read(), &vec![0, 0, 0, 0]);
        buffer.swap();
        assert_eq!(buffer.read(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_never_aliases_read() {
        let mut buffer = FieldBuffer::new("test", [0.0f32; 8], [0.0f32; 8]);
        let read_ptr = buffer.read() as *const [f32; 8];
        let write_ptr = buffer.write() as *const [f32; 8];
        assert!(!std::ptr::eq(read_ptr, write_ptr));
        buffer.swap();
        assert!(std::ptr::eq(buffer.read() as *const _, write_ptr));
    }

    #[test]
    fn test_read_write_splits_roles() {
        let mut buffer = FieldBuffer::new("test", 10i32, 20i32);
        {
            let (current, next) = buffer.read_write();
            *next = *current + 5;
        }
        buffer.swap();
        assert_eq!(*buffer.read(), 15);

        let (current, next) = buffer.read_write();
        assert_eq!(*current, 15);
        *next = *current * 2;
        buffer.swap();
        assert_eq!(*buffer.read(), 30);
    }

    #[test]
    fn test_swap_clears_pending_write() {
        let mut buffer = FieldBuffer::new("test", 0u8, 0u8);
        let _ = buffer.write();
        assert!(buffer.is_write_pending());
        buffer.swap();
        assert!(!buffer.is_write_pending());
        let _ = buffer.write();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "write() called twice")]
    fn test_double_write_fails_fast() {
        let mut buffer = FieldBuffer::new("velocity", 0u8, 0u8);
        let _ = buffer.write();
        let _ = buffer.write();
    }
}

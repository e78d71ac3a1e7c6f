/// A read/write pair of equally sized `f32` arrays.
///
/// Every pass reads from [`read`](Self::read) and writes into
/// [`write_mut`](Self::write_mut); [`swap`](Self::swap) then publishes the
/// written values. After a swap the new write side holds whatever the old
/// read side held, so a pass that only touches part of the range must not
/// assume the rest of the write side is current.
#[derive(Clone, Debug)]
pub struct DoubleBuffer {
    read: Vec<f32>,
    write: Vec<f32>,
}

impl DoubleBuffer {
    pub fn allocate(len: usize) -> Self {
        Self {
            read: vec![0.0; len],
            write: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    pub fn read(&self) -> &[f32] {
        &self.read
    }

    pub fn write(&self) -> &[f32] {
        &self.write
    }

    pub fn write_mut(&mut self) -> &mut [f32] {
        &mut self.write
    }

    /// Direct mutation of the current values, outside any pass.
    pub fn read_mut(&mut self) -> &mut [f32] {
        &mut self.read
    }

    /// Both sides at once: the read side immutably, the write side mutably.
    pub fn split(&mut self) -> (&[f32], &mut [f32]) {
        (&self.read, &mut self.write)
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    /// `write[..len] = factor * read[..len]`.
    pub fn scale_copy(&mut self, factor: f32, len: usize) {
        let len = len.min(self.read.len());
        for (w, r) in self.write[..len].iter_mut().zip(&self.read[..len]) {
            *w = factor * r;
        }
    }

    /// `write[..len] = read[..len]`, staging a pass that accumulates.
    pub fn copy_read_to_write(&mut self, len: usize) {
        let len = len.min(self.read.len());
        self.write[..len].copy_from_slice(&self.read[..len]);
    }

    /// Copies the first `len` current values into `dst`, returning how many
    /// were copied (bounded by `dst.len()`).
    pub fn copy_into(&self, dst: &mut [f32], len: usize) -> usize {
        let len = len.min(self.read.len()).min(dst.len());
        dst[..len].copy_from_slice(&self.read[..len]);
        len
    }
}

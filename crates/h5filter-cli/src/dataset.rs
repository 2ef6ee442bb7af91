use bytes::{BufMut, BytesMut};
use h5filter_core::Chunk;

const ELEMENT_SIZE: usize = std::mem::size_of::<i32>();

/// Row-major 2-D int32 dataset whose chunks are generated on demand.
///
/// Element `i` (linear index) holds `i` when `i` is even and `1` otherwise.
/// Edge chunks are padded with zeros to the full chunk shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticDataset {
    rows: u64,
    cols: u64,
    chunk_rows: u64,
    chunk_cols: u64,
}

impl SyntheticDataset {
    pub fn new(rows: u64, cols: u64, chunk_rows: u64, chunk_cols: u64) -> Result<Self, String> {
        if rows == 0 || cols == 0 {
            return Err("dataset dimensions must be non-zero".to_string());
        }
        if chunk_rows == 0 || chunk_cols == 0 {
            return Err("chunk dimensions must be non-zero".to_string());
        }
        if chunk_rows > rows || chunk_cols > cols {
            return Err(format!(
                "chunk {chunk_rows}x{chunk_cols} exceeds dataset {rows}x{cols}"
            ));
        }

        Ok(Self {
            rows,
            cols,
            chunk_rows,
            chunk_cols,
        })
    }

    pub fn dims(&self) -> [u64; 2] {
        [self.rows, self.cols]
    }

    pub fn chunk_dims(&self) -> [u64; 2] {
        [self.chunk_rows, self.chunk_cols]
    }

    pub fn value(&self, row: u64, col: u64) -> i32 {
        let index = row * self.cols + col;
        if index % 2 == 0 { index as i32 } else { 1 }
    }

    fn grid_cols(&self) -> u64 {
        self.cols.div_ceil(self.chunk_cols)
    }

    pub fn chunk_count(&self) -> usize {
        (self.rows.div_ceil(self.chunk_rows) * self.grid_cols()) as usize
    }

    pub fn chunk_bytes(&self) -> usize {
        (self.chunk_rows * self.chunk_cols) as usize * ELEMENT_SIZE
    }

    pub fn total_bytes(&self) -> u64 {
        self.rows * self.cols * ELEMENT_SIZE as u64
    }

    /// Builds chunk `index` in row-major chunk order.
    pub fn chunk(&self, index: usize) -> Chunk {
        let grid_cols = self.grid_cols();
        let row0 = (index as u64 / grid_cols) * self.chunk_rows;
        let col0 = (index as u64 % grid_cols) * self.chunk_cols;

        let mut data = BytesMut::with_capacity(self.chunk_bytes());
        for row in row0..row0 + self.chunk_rows {
            for col in col0..col0 + self.chunk_cols {
                let value = if row < self.rows && col < self.cols {
                    self.value(row, col)
                } else {
                    0
                };
                data.put_i32_le(value);
            }
        }

        Chunk::new(index, vec![row0, col0], data.freeze())
    }

    pub fn chunks(self) -> impl Iterator<Item = Chunk> {
        (0..self.chunk_count()).map(move |index| self.chunk(index))
    }
}
